//! Norms of distributed matrices.
//!
//! Each norm is computed from the local blocks and combined over the communicator distributing
//! the rows, then over the one distributing the columns. A replicated axis uses the self
//! communicator, so that replicated elements are only counted once. Every process of the grid
//! receives the same value.

use super::{matrix::DistMatRef, Distribution};
use crate::{
    linalg::reductions::{col_abs_sums, max_of, norm_max, scaled_sum_of_squares},
    ComplexField, RealField,
};

fn sum_vec<T: RealField>(mut acc: Vec<T>, rhs: Vec<T>) -> Vec<T> {
    for (a, b) in acc.iter_mut().zip(rhs) {
        *a += b;
    }
    acc
}

/// Returns the largest absolute value of the elements of `a`.
///
/// This is a collective over the whole grid.
pub fn dist_norm_max<E: ComplexField, D: Distribution>(a: DistMatRef<'_, E, D>) -> E::Real {
    let local = norm_max(a.local);
    a.grid
        .vc_comm()
        .all_reduce(local, |x: E::Real, y| x.max(y))
}

/// Returns the Frobenius norm of `a`.
///
/// This is a collective over the whole grid.
pub fn dist_norm_frobenius<E: ComplexField, D: Distribution>(a: DistMatRef<'_, E, D>) -> E::Real {
    let scale = dist_norm_max(a);
    if scale == E::Real::zero() || !scale.is_finite() {
        return scale;
    }
    let ssq = scaled_sum_of_squares(a.local, scale);
    let ssq = D::COL.comm(a.grid).all_reduce(ssq, |x, y| x + y);
    let ssq = D::ROW.comm(a.grid).all_reduce(ssq, |x, y| x + y);
    scale * ssq.sqrt()
}

/// Returns the maximum absolute column sum of `a`.
///
/// This is a collective over the whole grid.
pub fn dist_norm_one<E: ComplexField, D: Distribution>(a: DistMatRef<'_, E, D>) -> E::Real {
    let sums = col_abs_sums(a.local);
    let sums = D::COL.comm(a.grid).all_reduce(sums, sum_vec);
    let local_max = max_of(&sums);
    D::ROW
        .comm(a.grid)
        .all_reduce(local_max, |x: E::Real, y| x.max(y))
}

/// Returns the maximum absolute row sum of `a`.
///
/// This is a collective over the whole grid.
pub fn dist_norm_inf<E: ComplexField, D: Distribution>(a: DistMatRef<'_, E, D>) -> E::Real {
    let sums = col_abs_sums(a.local.transpose());
    let sums = D::ROW.comm(a.grid).all_reduce(sums, sum_vec);
    let local_max = max_of(&sums);
    D::COL
        .comm(a.grid)
        .all_reduce(local_max, |x: E::Real, y| x.max(y))
}
