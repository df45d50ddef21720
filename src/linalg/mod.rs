//! Linear algebra module.
//!
//! Contains the local kernels ([`matmul`], [`triangular_solve`], [`reductions`]) and the
//! factorizations built on top of them. Each factorization module provides a local version
//! operating on a [`MatMut`] and a distributed version, prefixed with `dist_`, operating on a
//! [`DistMatMut`](crate::DistMatMut).
//!
//! # Memory allocation
//! Local algorithms that need temporary space for intermediate computations take a
//! [`stack: PodStack`](dyn_stack::PodStack) parameter. Such functions have a corresponding
//! function with a similar name ending in `_req` that returns the memory requirements of the
//! algorithm, which can be combined with [`StackReq::try_all_of`] and [`StackReq::try_any_of`] and
//! then allocated once with [`dyn_stack::GlobalPodBuffer::new`].
//!
//! Distributed algorithms allocate their staging buffers themselves, since their size depends on
//! the local blocks of every process.

use crate::{ComplexField, MatMut};
use dyn_stack::{PodStack, SizeOverflow, StackReq};

pub mod condense;
pub mod diagonal_solve;
pub mod evd;
pub mod funcs;
pub mod householder;
pub mod lu;
pub mod matmul;
pub mod reductions;
pub mod triangular_solve;

const CACHELINE_ALIGN: usize = 64;

/// Returns the stack requirements for creating a temporary matrix with the given dimensions.
#[inline]
pub fn temp_mat_req<E: ComplexField>(nrows: usize, ncols: usize) -> Result<StackReq, SizeOverflow> {
    let len = nrows.checked_mul(ncols).ok_or(SizeOverflow)?;
    StackReq::try_new_aligned::<E>(len, CACHELINE_ALIGN)
}

/// Creates a temporary column-major matrix from the given memory stack. Its values are
/// unspecified.
///
/// # Panics
/// Panics if the stack is too small.
#[track_caller]
pub fn temp_mat_uninit<E: ComplexField>(
    nrows: usize,
    ncols: usize,
    stack: PodStack<'_>,
) -> (MatMut<'_, E>, PodStack<'_>) {
    let (alloc, stack) = stack.make_aligned_raw::<E>(nrows * ncols, CACHELINE_ALIGN);
    (MatMut::from_column_major_slice_mut(alloc, nrows, ncols), stack)
}

/// Creates a temporary matrix of zero values from the given memory stack.
///
/// # Panics
/// Panics if the stack is too small.
#[track_caller]
pub fn temp_mat_zeroed<E: ComplexField>(
    nrows: usize,
    ncols: usize,
    stack: PodStack<'_>,
) -> (MatMut<'_, E>, PodStack<'_>) {
    let (mut mat, stack) = temp_mat_uninit::<E>(nrows, ncols, stack);
    mat.fill_zero();
    (mat, stack)
}
