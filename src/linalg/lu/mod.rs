//! LU decompositions.
//!
//! The LU factors of a matrix `A` are a unit lower triangular (or trapezoidal) matrix `L` and an
//! upper triangular (or trapezoidal) matrix `U`, both stored in place of `A`: the strictly lower
//! part holds `L` and the upper part holds `U`.
//!
//! - [`no_pivoting`]: $A = LU$.
//! - [`partial_pivoting`]: $PA = LU$, with `P` selecting at each step the row whose entry in the
//!   current column has the largest modulus.
//! - [`full_pivoting`]: $PAQ^\top = LU$, with the pivot chosen among the whole trailing block.

pub mod full_pivoting;
pub mod no_pivoting;
pub mod partial_pivoting;

use crate::{linalg::matmul::matmul, ComplexField, MatMut, MatRef, Parallelism};
use reborrow::*;

/// Right-looking elimination step `j`: scales the entries below the diagonal in column `j` by
/// the inverse of the pivot, then applies the rank one update to the trailing block.
///
/// A zero pivot skips the scaling.
pub(crate) fn eliminate<E: ComplexField>(
    matrix: MatMut<'_, E>,
    j: usize,
    parallelism: Parallelism,
) {
    let mut matrix = matrix;
    let m = matrix.nrows();
    let pivot = matrix.read(j, j);
    if pivot != E::zero() {
        let inv = pivot.inv();
        for i in j + 1..m {
            let v = matrix.read(i, j);
            matrix.write(i, j, v * inv);
        }
    }
    let (_, top_right, bottom_left, bottom_right) = matrix.split_at_mut(j + 1, j + 1);
    matmul(
        bottom_right,
        bottom_left.rb().col(j),
        top_right.rb().row(j),
        Some(E::one()),
        -E::one(),
        parallelism,
    );
}

/// Split point of a recursive factorization of `n` columns, keeping the right part a multiple
/// of a small register-friendly size.
pub(crate) fn recursion_blocksize(n: usize) -> usize {
    let base_rem = n / 2;
    n - if n >= 32 {
        (base_rem + 15) / 16 * 16
    } else if n >= 16 {
        (base_rem + 7) / 8 * 8
    } else if n >= 8 {
        (base_rem + 3) / 4 * 4
    } else {
        base_rem
    }
}

pub(crate) const RECURSION_THRESHOLD: usize = 16;

/// Returns the index of the entry of largest modulus among `col[start..]`, and its modulus.
///
/// Ties go to the smaller index.
#[inline]
pub(crate) fn best_in_col<E: ComplexField>(col: MatRef<'_, E>, start: usize) -> (usize, E::Real) {
    let mut best = E::Real::zero();
    let mut best_idx = start;
    for i in start..col.nrows() {
        let abs = col.read(i, 0).abs();
        if abs > best {
            best = abs;
            best_idx = i;
        }
    }
    (best_idx, best)
}

/// Candidate pivot of one process: modulus and global index.
///
/// Candidates are compared by modulus, ties going to the smaller index, and an absent candidate
/// loses against any other one.
pub(crate) fn better_pivot<R: PartialOrd + Copy, I: PartialOrd + Copy>(
    lhs: Option<(R, I)>,
    rhs: Option<(R, I)>,
) -> Option<(R, I)> {
    match (lhs, rhs) {
        (None, x) | (x, None) => x,
        (Some(l), Some(r)) => {
            if r.0 > l.0 || (r.0 == l.0 && r.1 < l.1) {
                Some(r)
            } else {
                Some(l)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{
        linalg::matmul::triangular::{matmul, BlockStructure},
        ComplexField, Mat, MatRef, Parallelism,
    };

    /// Returns `L * U` for the factors stored in `lu`.
    pub fn multiply_factors<E: ComplexField>(lu: MatRef<'_, E>) -> Mat<E> {
        let (m, n) = lu.shape();
        let size = Ord::min(m, n);
        let l = Mat::from_fn(m, size, |i, j| {
            if i == j {
                E::one()
            } else if i > j {
                lu.read(i, j)
            } else {
                E::zero()
            }
        });
        let u = Mat::from_fn(size, n, |i, j| if i <= j { lu.read(i, j) } else { E::zero() });
        let mut prod = Mat::zeros(m, n);
        matmul(
            prod.as_mut(),
            BlockStructure::Rectangular,
            l.as_ref(),
            BlockStructure::Rectangular,
            u.as_ref(),
            BlockStructure::Rectangular,
            None,
            E::one(),
            Parallelism::None,
        );
        prod
    }

    #[test]
    fn pivot_ordering() {
        use super::better_pivot;
        assert!(better_pivot(Some((1.0, 3)), Some((1.0, 2))) == Some((1.0, 2)));
        assert!(better_pivot(Some((2.0, 3)), Some((1.0, 2))) == Some((2.0, 3)));
        assert!(better_pivot(None, Some((0.0, 5))) == Some((0.0, 5)));
        assert!(better_pivot::<f64, usize>(None, None).is_none());
    }
}
