//! `plaid` is a dense linear algebra library for matrices distributed over a two-dimensional
//! grid of processes.
//!
//! Every process of an `r x c` [`Grid`] owns a local block of each [`DistMatrix`], chosen by the
//! matrix distribution (see [`dist`]). Algorithms alternate local computations on those blocks
//! with blocking collectives over the grid communicators, following the blocked right-looking
//! formulation: a panel is staged into a layout where it can be factored locally, the results are
//! redistributed, and the trailing matrix is updated with distributed level-3 kernels.
//!
//! The same algorithms are also available for plain local matrices ([`Mat`]).
//!
//! # Example
//! ```
//! use plaid::{dist::McMr, linalg::lu::partial_pivoting, DistMatrix, Grid};
//!
//! let residuals = Grid::run(2, 2, |grid| {
//!     let n = 8;
//!     let f = |i: usize, j: usize| if i == j { 4.0 } else { 1.0 / (1.0 + i as f64 + j as f64) };
//!     let mut a = DistMatrix::<f64, McMr>::from_fn(grid, n, n, f);
//!     let p = partial_pivoting::dist_lu_in_place(a.as_mut(), Default::default()).unwrap();
//!     let lu = a.as_ref().gather();
//!     let p = p.as_ref().gather();
//!     let mut max = 0.0f64;
//!     for i in 0..n {
//!         for j in 0..n {
//!             let mut acc = 0.0;
//!             for k in 0..=Ord::min(i, j) {
//!                 let l = if k == i { 1.0 } else { lu.read(i, k) };
//!                 acc += l * lu.read(k, j);
//!             }
//!             max = max.max((acc - f(p.read(i, 0), j)).abs());
//!         }
//!     }
//!     max
//! });
//! assert!(residuals.iter().all(|&r| r < 1e-12));
//! ```

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(non_snake_case)]

use core::sync::atomic::{AtomicUsize, Ordering};
use equator::{assert, debug_assert};

pub mod dist;
pub mod error;
pub mod grid;
pub mod linalg;
pub mod mat;
pub mod perm;
pub mod utils;

pub use dyn_stack;
pub use reborrow;

pub use dist::{DistMatMut, DistMatRef, DistMatrix};
pub use error::{Error, Result};
pub use grid::{Comm, Grid};
pub use mat::{Mat, MatMut, MatRef};
pub use plaid_entity::{c32, c64, ComplexField, Entity, RealField};

/// Which triangular part of a matrix is accessed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpLo {
    Lower,
    Upper,
}

/// Side on which an operator is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    /// `op(Q) * B`.
    Left,
    /// `B * op(Q)`.
    Right,
}

/// How an operator is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Transpose,
    Adjoint,
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diag {
    Unit,
    NonUnit,
}

/// Whether a matrix should be implicitly conjugated when read or not.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conj {
    /// Do conjugate.
    Yes,
    /// Do not conjugate.
    No,
}

impl Conj {
    /// Combine `self` and `other` to create a new conjugation object.
    #[inline]
    pub fn compose(self, other: Conj) -> Conj {
        if self == other {
            Conj::No
        } else {
            Conj::Yes
        }
    }

    #[inline]
    pub(crate) fn apply<E: ComplexField>(self, value: E) -> E {
        match self {
            Conj::Yes => value.conj(),
            Conj::No => value,
        }
    }
}

impl Orientation {
    #[inline]
    pub(crate) fn conj(self) -> Conj {
        match self {
            Orientation::Adjoint => Conj::Yes,
            _ => Conj::No,
        }
    }
}

/// Parallelism strategy that can be passed to local kernels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism.
    ///
    /// The code is executed sequentially on the same thread that calls a function
    /// and passes this argument.
    None,
    /// Rayon parallelism. Only avaialble with the `rayon` feature.
    ///
    /// The contained value represents a hint about the number of threads an implementation should
    /// use. `0` means the size of the current rayon thread pool.
    #[cfg(feature = "rayon")]
    Rayon(usize),
}

static GLOBAL_PARALLELISM: AtomicUsize = AtomicUsize::new(1);
static GLOBAL_BLOCKSIZE: AtomicUsize = AtomicUsize::new(32);

/// Sets the global parallelism settings used by local kernels inside distributed algorithms.
pub fn set_global_parallelism(parallelism: Parallelism) {
    let value = match parallelism {
        Parallelism::None => 1,
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(n) => n.saturating_add(2),
    };
    GLOBAL_PARALLELISM.store(value, Ordering::Relaxed);
}

/// Gets the global parallelism settings.
pub fn get_global_parallelism() -> Parallelism {
    let value = GLOBAL_PARALLELISM.load(Ordering::Relaxed);
    match value {
        #[cfg(feature = "rayon")]
        n if n >= 2 => Parallelism::Rayon(n - 2),
        _ => Parallelism::None,
    }
}

/// Sets the block size used by blocked algorithms that are not given an explicit one.
///
/// # Panics
/// Panics if `blocksize` is zero.
pub fn set_global_blocksize(blocksize: usize) {
    assert!(blocksize > 0);
    GLOBAL_BLOCKSIZE.store(blocksize, Ordering::Relaxed);
}

/// Gets the block size used by blocked algorithms that are not given an explicit one.
pub fn get_global_blocksize() -> usize {
    GLOBAL_BLOCKSIZE.load(Ordering::Relaxed)
}

/// Block size parameters of a blocked algorithm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct BlockParams {
    /// Panel width. `None` uses [`get_global_blocksize`].
    pub blocksize: Option<usize>,
}

impl BlockParams {
    #[inline]
    pub fn with_blocksize(blocksize: usize) -> Self {
        Self {
            blocksize: Some(blocksize),
        }
    }

    #[inline]
    pub(crate) fn resolve(self) -> usize {
        Ord::max(self.blocksize.unwrap_or_else(get_global_blocksize), 1)
    }
}

/// Creates a [`Mat`] containing the arguments, given row by row.
///
/// ```
/// use plaid::mat;
///
/// let matrix = mat![
///     [1.0, 5.0, 9.0],
///     [2.0, 6.0, 10.0f64],
/// ];
///
/// assert_eq!(matrix.read(0, 0), 1.0);
/// assert_eq!(matrix.read(1, 0), 2.0);
/// assert_eq!(matrix.read(0, 2), 9.0);
/// assert_eq!(matrix.read(1, 2), 10.0);
/// ```
#[macro_export]
macro_rules! mat {
    () => {
        {
            compile_error!("number of columns in the matrix is ambiguous");
        }
    };

    ($([$($v:expr),* $(,)?] ),+ $(,)?) => {
        {
            let data = [$([$($v),*]),+];
            let nrows = data.len();
            let ncols = data[0].len();
            $crate::mat::Mat::from_fn(nrows, ncols, |i, j| data[i][j])
        }
    };
}
