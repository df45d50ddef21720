//! Local dense matrices and views over them.
//!
//! [`Mat`] owns a column-major buffer. [`MatRef`] and [`MatMut`] are strided views whose lifetime
//! is bound to the matrix they were created from, so that a view can never outlive its parent.
//! Mutable views can be split into disjoint mutable views.

use crate::{assert, debug_assert, ComplexField, Entity};
use core::{marker::PhantomData, ptr::NonNull};
use reborrow::*;

mod matmut;
mod matown;
mod matref;

pub use matmut::MatMut;
pub use matown::Mat;
pub use matref::MatRef;

struct MatImpl<E> {
    ptr: NonNull<E>,
    nrows: usize,
    ncols: usize,
    row_stride: isize,
    col_stride: isize,
}

impl<E> Copy for MatImpl<E> {}
impl<E> Clone for MatImpl<E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> MatImpl<E> {
    #[inline(always)]
    fn overflowing_ptr_at(self, row: usize, col: usize) -> *mut E {
        self.ptr
            .as_ptr()
            .wrapping_offset(row as isize * self.row_stride)
            .wrapping_offset(col as isize * self.col_stride)
    }

    #[inline(always)]
    fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        assert!(all(
            row_start <= self.nrows,
            col_start <= self.ncols,
            nrows <= self.nrows - row_start,
            ncols <= self.ncols - col_start
        ));
        let ptr = self.overflowing_ptr_at(row_start, col_start);
        Self {
            ptr: NonNull::new(ptr).unwrap_or(NonNull::dangling()),
            nrows,
            ncols,
            row_stride: self.row_stride,
            col_stride: self.col_stride,
        }
    }

    #[inline(always)]
    fn reverse_rows(self) -> Self {
        let ptr = if self.nrows == 0 {
            self.ptr.as_ptr()
        } else {
            self.overflowing_ptr_at(self.nrows - 1, 0)
        };
        Self {
            ptr: NonNull::new(ptr).unwrap_or(NonNull::dangling()),
            row_stride: self.row_stride.wrapping_neg(),
            ..self
        }
    }

    #[inline(always)]
    fn transpose(self) -> Self {
        Self {
            ptr: self.ptr,
            nrows: self.ncols,
            ncols: self.nrows,
            row_stride: self.col_stride,
            col_stride: self.row_stride,
        }
    }
}

/// Returns the number of elements of a column-major `nrows x ncols` buffer, or panics on
/// overflow.
#[inline]
#[track_caller]
pub(crate) fn column_major_len(nrows: usize, ncols: usize) -> usize {
    match nrows.checked_mul(ncols) {
        Some(len) => len,
        None => panic!("matrix dimensions overflow: {nrows} x {ncols}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, c64, mat};

    #[test]
    fn views_share_storage() {
        let mut a = Mat::from_fn(4, 3, |i, j| (i + 10 * j) as f64);
        {
            let (_, tr, bl, mut br) = a.as_mut().split_at_mut(2, 1);
            assert!(tr.nrows() == 2);
            assert!(tr.ncols() == 2);
            assert!(bl.read(1, 0) == 3.0);
            br.write(0, 0, -1.0);
        }
        assert!(a.read(2, 1) == -1.0);
        assert!(a.as_ref().transpose().read(1, 2) == -1.0);
    }

    #[test]
    fn split_rows_and_cols() {
        let mut a = mat![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0f64]];
        let (top, mut bot) = a.as_mut().split_at_row_mut(1);
        bot.write(0, 2, top.read(0, 0) + 10.0);
        assert!(a.read(1, 2) == 11.0);

        let (left, right) = a.as_ref().split_at_col(2);
        assert!(left.ncols() == 2);
        assert!(right.read(0, 0) == 3.0);
        assert!(a.as_ref().row(1).read(0, 1) == 5.0);
        assert!(a.as_ref().col(1).read(1, 0) == 5.0);
    }

    #[test]
    fn empty_views() {
        let a = Mat::<f64>::zeros(0, 5);
        let v = a.as_ref().submatrix(0, 5, 0, 0);
        assert!(v.nrows() == 0);
        assert!(v.ncols() == 0);
        let b = v.to_owned();
        assert!(b.nrows() == 0);
    }

    #[test]
    fn reversed_submatrix_views() {
        let mut a = Mat::from_fn(5, 4, |i, j| c64::new(i as f64, j as f64));
        let view = a.as_ref().submatrix(1, 1, 3, 2);
        let reversed = view.reverse_rows();
        assert!(view.read(0, 0) == c64::new(1.0, 1.0));
        assert!(reversed.read(0, 1) == c64::new(3.0, 2.0));
        assert!(reversed.submatrix(1, 0, 2, 1).read(1, 0) == c64::new(1.0, 1.0));

        let mut flipped = a.as_mut().submatrix_mut(2, 0, 3, 4).reverse_rows_mut();
        flipped.write(0, 3, c64::new(-1.0, 0.0));
        assert!(a.read(4, 3) == c64::new(-1.0, 0.0));
    }

    #[test]
    fn adjoint_conjugates() {
        let a = Mat::from_fn(2, 3, |i, j| c64::new(i as f64, j as f64));
        let b = a.adjoint();
        assert!(b.nrows() == 3);
        assert!(b.read(2, 1) == c64::new(1.0, -2.0));
    }

    #[test]
    fn products() {
        let a = mat![[1.0, 2.0], [3.0, 4.0f64]];
        let b = mat![[0.0, 1.0], [1.0, 0.0f64]];
        let c = &a * &b;
        assert!(c == mat![[2.0, 1.0], [4.0, 3.0f64]]);
        let d = &c - &a;
        assert!(d == mat![[1.0, -1.0], [1.0, -1.0f64]]);
    }
}
