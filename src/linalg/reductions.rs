//! Matrix norms of local matrices.
//!
//! The Frobenius norm is computed in two passes: the largest magnitude is found first, then the
//! squares are accumulated after scaling by it, so that intermediate values can neither
//! overflow nor underflow. The distributed norms reuse the same two passes with a reduction
//! between them.

use crate::{ComplexField, MatRef, RealField};

/// Returns the largest absolute value of the elements of `mat`, or zero if it is empty.
pub fn norm_max<E: ComplexField>(mat: MatRef<'_, E>) -> E::Real {
    let mut max = E::Real::zero();
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            let v = unsafe { mat.read_unchecked(i, j) }.abs();
            if v > max {
                max = v;
            }
        }
    }
    max
}

/// Returns `sum(|a_ij / scale|^2)`. `scale` must be nonzero.
pub(crate) fn scaled_sum_of_squares<E: ComplexField>(
    mat: MatRef<'_, E>,
    scale: E::Real,
) -> E::Real {
    let inv = scale.inv();
    let mut acc = E::Real::zero();
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            acc += unsafe { mat.read_unchecked(i, j) }.scale_real(inv).abs2();
        }
    }
    acc
}

/// Returns the Frobenius norm of `mat`.
pub fn norm_frobenius<E: ComplexField>(mat: MatRef<'_, E>) -> E::Real {
    let scale = norm_max(mat);
    if scale == E::Real::zero() || !scale.is_finite() {
        return scale;
    }
    scale * scaled_sum_of_squares(mat, scale).sqrt()
}

/// Returns the sum of the absolute values of each column of `mat`.
pub(crate) fn col_abs_sums<E: ComplexField>(mat: MatRef<'_, E>) -> Vec<E::Real> {
    (0..mat.ncols())
        .map(|j| {
            let mut acc = E::Real::zero();
            for i in 0..mat.nrows() {
                acc += unsafe { mat.read_unchecked(i, j) }.abs();
            }
            acc
        })
        .collect()
}

pub(crate) fn max_of<T: RealField>(values: &[T]) -> T {
    values
        .iter()
        .fold(T::zero(), |acc, &x| if x > acc { x } else { acc })
}

/// Returns the maximum absolute column sum of `mat`.
pub fn norm_one<E: ComplexField>(mat: MatRef<'_, E>) -> E::Real {
    max_of(&col_abs_sums(mat))
}

/// Returns the maximum absolute row sum of `mat`.
pub fn norm_inf<E: ComplexField>(mat: MatRef<'_, E>) -> E::Real {
    norm_one(mat.transpose())
}
