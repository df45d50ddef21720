//! Two-sided reductions to condensed forms with Householder reflectors.
//!
//! - [`hessenberg`]: $A = QHQ^H$, with $H$ upper (or lower) Hessenberg.
//! - [`tridiag`]: $A = QTQ^H$ for a Hermitian $A$, with $T$ real symmetric tridiagonal.
//! - [`bidiag`]: $A = QBP^H$, with $B$ upper bidiagonal if $m \ge n$ and lower bidiagonal
//!   otherwise.
//!
//! The reflectors are stored packed in place of the entries they annihilate, and their
//! coefficients are returned separately. They can be applied to other matrices with the
//! `apply_q` (and `apply_p`) functions of each module.
//!
//! All three reductions are blocked: the reflectors of a panel are accumulated together with the
//! products needed to update the trailing matrix lazily, and the trailing matrix is updated once
//! per panel with rank `2 * nb` products. The panel algorithms only see the matrix through
//! [`Condense`], which is implemented for local matrices and for `[MC, MR]` distributed
//! matrices. In the distributed case, the panel vectors are replicated on every process and the
//! matrix-vector products are reduced over the grid.

pub mod bidiag;
pub mod hessenberg;
pub mod tridiag;

use crate::{
    dist::{McMr, McStar, MrStar, StarMr, StarStar},
    get_global_parallelism,
    linalg::matmul::{matmul, matmul_with_conj},
    ComplexField, Conj, DistMatMut, DistMatrix, Mat, MatMut, MatRef,
};
use reborrow::*;

/// Rectangular block of a matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    pub row_start: usize,
    pub col_start: usize,
    pub nrows: usize,
    pub ncols: usize,
}

impl Block {
    #[inline]
    pub fn new(row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        Self {
            row_start,
            col_start,
            nrows,
            ncols,
        }
    }
}

/// Matrix being reduced, seen through the operations of the panel algorithms.
///
/// Vectors and small matrices exchanged through this trait are replicated: in the distributed
/// case, every process passes and receives all of their entries, and every method is a
/// collective over the whole grid.
pub(crate) trait Condense<E: ComplexField> {
    fn dims(&self) -> (usize, usize);

    /// Returns the entries `row_start..row_start + nrows` of column `j`.
    fn read_col(&self, j: usize, row_start: usize, nrows: usize) -> Vec<E>;
    /// Returns the entries `col_start..col_start + ncols` of row `i`.
    fn read_row(&self, i: usize, col_start: usize, ncols: usize) -> Vec<E>;
    fn write_col(&mut self, j: usize, row_start: usize, values: &[E]);
    fn write_row(&mut self, i: usize, col_start: usize, values: &[E]);

    /// Returns `A[block] * x`.
    fn mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E>;
    /// Returns `A[block]^H * x`.
    fn adjoint_mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E>;
    /// Computes `A[block] -= lhs * rhs^H`.
    fn sub_outer(&mut self, block: Block, lhs: MatRef<'_, E>, rhs: MatRef<'_, E>);
}

impl<E: ComplexField> Condense<E> for MatMut<'_, E> {
    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn read_col(&self, j: usize, row_start: usize, nrows: usize) -> Vec<E> {
        (row_start..row_start + nrows).map(|i| self.read(i, j)).collect()
    }

    fn read_row(&self, i: usize, col_start: usize, ncols: usize) -> Vec<E> {
        (col_start..col_start + ncols).map(|j| self.read(i, j)).collect()
    }

    fn write_col(&mut self, j: usize, row_start: usize, values: &[E]) {
        for (i, &value) in values.iter().enumerate() {
            self.write(row_start + i, j, value);
        }
    }

    fn write_row(&mut self, i: usize, col_start: usize, values: &[E]) {
        for (j, &value) in values.iter().enumerate() {
            self.write(i, col_start + j, value);
        }
    }

    fn mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E> {
        let view = self
            .rb()
            .submatrix(block.row_start, block.col_start, block.nrows, block.ncols);
        let mut out = Mat::zeros(block.nrows, x.ncols());
        matmul(
            out.as_mut(),
            view,
            x,
            None,
            E::one(),
            get_global_parallelism(),
        );
        out
    }

    fn adjoint_mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E> {
        let view = self
            .rb()
            .submatrix(block.row_start, block.col_start, block.nrows, block.ncols);
        let mut out = Mat::zeros(block.ncols, x.ncols());
        matmul_with_conj(
            out.as_mut(),
            view.transpose(),
            Conj::Yes,
            x,
            Conj::No,
            None,
            E::one(),
            get_global_parallelism(),
        );
        out
    }

    fn sub_outer(&mut self, block: Block, lhs: MatRef<'_, E>, rhs: MatRef<'_, E>) {
        let view = self
            .rb_mut()
            .submatrix_mut(block.row_start, block.col_start, block.nrows, block.ncols);
        matmul_with_conj(
            view,
            lhs,
            Conj::No,
            rhs.transpose(),
            Conj::Yes,
            Some(E::one()),
            -E::one(),
            get_global_parallelism(),
        );
    }
}

impl<E: ComplexField> Condense<E> for DistMatMut<'_, E, McMr> {
    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn read_col(&self, j: usize, row_start: usize, nrows: usize) -> Vec<E> {
        self.rb()
            .submatrix(row_start, j, nrows, 1)
            .redistribute::<StarStar>()
            .into_local()
            .into_vec()
    }

    fn read_row(&self, i: usize, col_start: usize, ncols: usize) -> Vec<E> {
        self.rb()
            .submatrix(i, col_start, 1, ncols)
            .redistribute::<StarStar>()
            .into_local()
            .into_vec()
    }

    fn write_col(&mut self, j: usize, row_start: usize, values: &[E]) {
        self.rb_mut()
            .submatrix_mut(row_start, j, values.len(), 1)
            .update_local(|i, _, _| values[i]);
    }

    fn write_row(&mut self, i: usize, col_start: usize, values: &[E]) {
        self.rb_mut()
            .submatrix_mut(i, col_start, 1, values.len())
            .update_local(|_, j, _| values[j]);
    }

    fn mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E> {
        let view = self
            .rb()
            .submatrix(block.row_start, block.col_start, block.nrows, block.ncols);
        let grid = view.grid();
        let x = DistMatrix::<E, StarStar>::from_replicated(grid, x);
        let x = x
            .as_ref()
            .redistribute_aligned::<MrStar>(view.row_align(), 0);

        // partial sums over the local columns, completed over the grid row
        let mut z = DistMatrix::<E, McStar>::with_alignments(
            grid,
            block.nrows,
            x.ncols(),
            view.col_align(),
            0,
        );
        matmul(
            z.local_mut().as_mut(),
            view.local(),
            x.local().as_ref(),
            None,
            E::one(),
            get_global_parallelism(),
        );
        z.as_mut().sum_over(grid.row_comm());
        z.as_ref().redistribute::<StarStar>().into_local()
    }

    fn adjoint_mul(&self, block: Block, x: MatRef<'_, E>) -> Mat<E> {
        let view = self
            .rb()
            .submatrix(block.row_start, block.col_start, block.nrows, block.ncols);
        let grid = view.grid();
        let x = DistMatrix::<E, StarStar>::from_replicated(grid, x);
        let x = x
            .as_ref()
            .redistribute_aligned::<McStar>(view.col_align(), 0);

        // x^H * A, completed over the grid column
        let mut w = DistMatrix::<E, StarMr>::with_alignments(
            grid,
            x.ncols(),
            block.ncols,
            0,
            view.row_align(),
        );
        matmul_with_conj(
            w.local_mut().as_mut(),
            x.local().as_ref().transpose(),
            Conj::Yes,
            view.local(),
            Conj::No,
            None,
            E::one(),
            get_global_parallelism(),
        );
        w.as_mut().sum_over(grid.col_comm());
        w.as_ref().redistribute::<StarStar>().into_local().adjoint()
    }

    fn sub_outer(&mut self, block: Block, lhs: MatRef<'_, E>, rhs: MatRef<'_, E>) {
        let grid = self.grid();
        let (col_align, row_align) = {
            let view = (*self)
                .rb()
                .submatrix(block.row_start, block.col_start, block.nrows, block.ncols);
            (view.col_align(), view.row_align())
        };
        let lhs = DistMatrix::<E, StarStar>::from_replicated(grid, lhs)
            .as_ref()
            .redistribute_aligned::<McStar>(col_align, 0);
        let rhs_adjoint = rhs.adjoint_to_owned();
        let rhs_adjoint = DistMatrix::<E, StarStar>::from_replicated(grid, rhs_adjoint.as_ref())
            .as_ref()
            .redistribute_aligned::<StarMr>(0, row_align);

        let mut view = self
            .rb_mut()
            .submatrix_mut(block.row_start, block.col_start, block.nrows, block.ncols);
        matmul(
            view.local_mut(),
            lhs.local().as_ref(),
            rhs_adjoint.local().as_ref(),
            Some(E::one()),
            -E::one(),
            get_global_parallelism(),
        );
    }
}

/// Returns `sum_i conj(lhs[i]) * rhs[i]`.
#[inline]
pub(crate) fn dot<E: ComplexField>(lhs: &[E], rhs: &[E]) -> E {
    let mut acc = E::zero();
    for (&l, &r) in lhs.iter().zip(rhs) {
        acc += l.conj() * r;
    }
    acc
}

/// Returns a column matrix holding `values`.
#[inline]
pub(crate) fn col_mat<E: ComplexField>(values: &[E]) -> Mat<E> {
    Mat::from_column_major_vec(values.to_vec(), values.len(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, c64, Grid};
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;

    #[test]
    fn dist_operations_match_local() {
        let mut rng = StdRng::seed_from_u64(0);
        let (m, n) = (9, 7);
        let a = Mat::from_fn(m, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let x = Mat::from_fn(4, 2, |_, _| c64::new(rng.gen(), rng.gen()));
        let y = Mat::from_fn(5, 2, |_, _| c64::new(rng.gen(), rng.gen()));
        let block = Block::new(3, 2, 5, 4);

        let mut local = a.clone();
        let mut local = local.as_mut();
        let mul = local.mul(block, x.as_ref());
        let adjoint_mul = local.adjoint_mul(block, y.as_ref());
        local.sub_outer(block, y.as_ref(), x.as_ref());
        let col = local.read_col(4, 1, 6);
        let row = local.read_row(2, 3, 4);
        let expected = local.rb().to_owned();

        for (h, w) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(h, w, |grid| {
                let mut d = crate::DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let mut d = d.as_mut();
                let d_mul = d.mul(block, x.as_ref());
                let d_adjoint_mul = d.adjoint_mul(block, y.as_ref());
                d.sub_outer(block, y.as_ref(), x.as_ref());
                assert!(d.read_col(4, 1, 6).len() == col.len());
                for (l, r) in d.read_col(4, 1, 6).iter().zip(&col) {
                    assert_approx_eq!(*l, *r, 1e-12);
                }
                for (l, r) in d.read_row(2, 3, 4).iter().zip(&row) {
                    assert_approx_eq!(*l, *r, 1e-12);
                }
                for j in 0..2 {
                    for i in 0..5 {
                        assert_approx_eq!(d_mul.read(i, j), mul.read(i, j), 1e-12);
                    }
                    for i in 0..4 {
                        assert_approx_eq!(d_adjoint_mul.read(i, j), adjoint_mul.read(i, j), 1e-12);
                    }
                }
                let g = d.rb().gather();
                for j in 0..n {
                    for i in 0..m {
                        assert_approx_eq!(g.read(i, j), expected.read(i, j), 1e-12);
                    }
                }

                d.write_row(0, 1, &[c64::one(); 3]);
                d.write_col(6, 2, &[c64::zero(); 7]);
                let g = d.rb().gather();
                assert!(g.read(0, 2) == c64::one());
                assert!(g.read(8, 6) == c64::zero());
                assert!(g.read(1, 6) == expected.read(1, 6));
            });
        }
    }
}
