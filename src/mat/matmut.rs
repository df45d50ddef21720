use super::*;
use crate::{assert, debug_assert};

/// Mutable view over a matrix, similar to a mutable reference to a 2D strided [prim@slice].
pub struct MatMut<'a, E: Entity> {
    pub(super) inner: MatImpl<E>,
    pub(super) __marker: PhantomData<&'a mut E>,
}

unsafe impl<E: Entity> Send for MatMut<'_, E> {}
unsafe impl<E: Entity> Sync for MatMut<'_, E> {}

impl<'short, E: Entity> Reborrow<'short> for MatMut<'_, E> {
    type Target = MatRef<'short, E>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        MatRef::from_inner(self.inner)
    }
}

impl<'short, E: Entity> ReborrowMut<'short> for MatMut<'_, E> {
    type Target = MatMut<'short, E>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        MatMut::from_inner(self.inner)
    }
}

impl<'a, E: Entity> IntoConst for MatMut<'a, E> {
    type Target = MatRef<'a, E>;

    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef::from_inner(self.inner)
    }
}

impl<'a, E: Entity> MatMut<'a, E> {
    #[inline]
    pub(super) fn from_inner(inner: MatImpl<E>) -> Self {
        Self {
            inner,
            __marker: PhantomData,
        }
    }

    /// Creates a `MatMut` from a pointer to the matrix data, dimensions and strides.
    ///
    /// # Safety
    /// For the lifetime `'a`, every element `(i, j)` with `i < nrows` and `j < ncols` must be
    /// readable and writable at `ptr + i * row_stride + j * col_stride`, distinct indices must map
    /// to distinct elements, and no other path may access them.
    #[inline]
    pub unsafe fn from_raw_parts_mut(
        ptr: *mut E,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self::from_inner(MatImpl {
            ptr: NonNull::new(ptr).unwrap_or(NonNull::dangling()),
            nrows,
            ncols,
            row_stride,
            col_stride,
        })
    }

    /// Creates a column-major view over `slice`.
    ///
    /// # Panics
    /// Panics if `slice.len() != nrows * ncols`.
    #[track_caller]
    pub fn from_column_major_slice_mut(slice: &'a mut [E], nrows: usize, ncols: usize) -> Self {
        assert!(slice.len() == column_major_len(nrows, ncols));
        unsafe { Self::from_raw_parts_mut(slice.as_mut_ptr(), nrows, ncols, 1, nrows as isize) }
    }

    #[inline(always)]
    pub fn as_ptr_mut(self) -> *mut E {
        self.inner.ptr.as_ptr()
    }

    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.inner.nrows
    }

    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.inner.ncols
    }

    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    #[inline(always)]
    pub fn row_stride(&self) -> isize {
        self.inner.row_stride
    }

    #[inline(always)]
    pub fn col_stride(&self) -> isize {
        self.inner.col_stride
    }

    /// Reads the value of the element at the given indices.
    ///
    /// # Panics
    /// Panics if `row >= self.nrows()` or `col >= self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> E {
        self.rb().read(row, col)
    }

    /// Writes the value to the element at the given indices.
    ///
    /// # Panics
    /// Panics if `row >= self.nrows()` or `col >= self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn write(&mut self, row: usize, col: usize, value: E) {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { *self.inner.overflowing_ptr_at(row, col) = value };
    }

    /// Writes the value to the element at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn write_unchecked(&mut self, row: usize, col: usize, value: E) {
        debug_assert!(all(row < self.nrows(), col < self.ncols()));
        *self.inner.overflowing_ptr_at(row, col) = value;
    }

    /// Returns a mutable reference to the element at the given indices.
    #[inline(always)]
    #[track_caller]
    pub fn get_mut(self, row: usize, col: usize) -> &'a mut E {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &mut *self.inner.overflowing_ptr_at(row, col) }
    }

    /// Returns the transpose of `self`.
    #[inline(always)]
    #[must_use]
    pub fn transpose_mut(self) -> Self {
        Self::from_inner(self.inner.transpose())
    }

    #[inline(always)]
    #[must_use]
    pub fn reverse_rows_mut(self) -> Self {
        Self::from_inner(self.inner.reverse_rows())
    }

    #[inline(always)]
    #[must_use]
    pub fn reverse_cols_mut(self) -> Self {
        self.transpose_mut().reverse_rows_mut().transpose_mut()
    }

    #[inline(always)]
    #[must_use]
    pub fn reverse_rows_and_cols_mut(self) -> Self {
        self.reverse_rows_mut().reverse_cols_mut()
    }

    #[inline(always)]
    #[track_caller]
    pub fn submatrix_mut(
        self,
        row_start: usize,
        col_start: usize,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        Self::from_inner(self.inner.submatrix(row_start, col_start, nrows, ncols))
    }

    #[inline(always)]
    #[track_caller]
    pub fn subrows_mut(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols();
        self.submatrix_mut(row_start, 0, nrows, ncols)
    }

    #[inline(always)]
    #[track_caller]
    pub fn subcols_mut(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows();
        self.submatrix_mut(0, col_start, nrows, ncols)
    }

    #[inline(always)]
    #[track_caller]
    pub fn row_mut(self, row_idx: usize) -> Self {
        self.subrows_mut(row_idx, 1)
    }

    #[inline(always)]
    #[track_caller]
    pub fn col_mut(self, col_idx: usize) -> Self {
        self.subcols_mut(col_idx, 1)
    }

    /// Splits the matrix horizontally and vertically at the given indices into four disjoint
    /// corners, in the following order:
    /// * top left.
    /// * top right.
    /// * bottom left.
    /// * bottom right.
    ///
    /// # Panics
    /// Panics if `row > self.nrows()` or `col > self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn split_at_mut(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        let (tl, tr, bl, br) = self.into_const().split_at(row, col);
        (
            Self::from_inner(tl.inner),
            Self::from_inner(tr.inner),
            Self::from_inner(bl.inner),
            Self::from_inner(br.inner),
        )
    }

    #[inline(always)]
    #[track_caller]
    pub fn split_at_row_mut(self, row: usize) -> (Self, Self) {
        let (top, bot) = self.into_const().split_at_row(row);
        (Self::from_inner(top.inner), Self::from_inner(bot.inner))
    }

    #[inline(always)]
    #[track_caller]
    pub fn split_at_col_mut(self, col: usize) -> (Self, Self) {
        let (left, right) = self.into_const().split_at_col(col);
        (Self::from_inner(left.inner), Self::from_inner(right.inner))
    }

    /// Fills every element with `value`.
    #[inline]
    pub fn fill(&mut self, value: E) {
        let (m, n) = self.shape();
        for j in 0..n {
            for i in 0..m {
                unsafe { self.write_unchecked(i, j, value) };
            }
        }
    }

    /// Copies the values from `src` into `self`.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    #[track_caller]
    pub fn copy_from(&mut self, src: MatRef<'_, E>) {
        assert!(all(self.nrows() == src.nrows(), self.ncols() == src.ncols()));
        let (m, n) = self.shape();
        for j in 0..n {
            for i in 0..m {
                unsafe { self.write_unchecked(i, j, src.read_unchecked(i, j)) };
            }
        }
    }

    /// Swaps the rows `a` and `b`.
    #[track_caller]
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        assert!(all(a < self.nrows(), b < self.nrows()));
        if a == b {
            return;
        }
        for j in 0..self.ncols() {
            unsafe {
                let tmp = self.read_unchecked(a, j);
                let other = self.read_unchecked(b, j);
                self.write_unchecked(a, j, other);
                self.write_unchecked(b, j, tmp);
            }
        }
    }

    /// Swaps the columns `a` and `b`.
    #[track_caller]
    pub fn swap_cols(&mut self, a: usize, b: usize) {
        self.rb_mut().transpose_mut().swap_rows(a, b);
    }

    /// Reads the value of the element at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn read_unchecked(&self, row: usize, col: usize) -> E {
        self.rb().read_unchecked(row, col)
    }
}

impl<'a, E: ComplexField> MatMut<'a, E> {
    #[inline]
    pub fn fill_zero(&mut self) {
        self.fill(E::zero());
    }

    /// Multiplies every element by `alpha`.
    pub fn scale(&mut self, alpha: E) {
        let (m, n) = self.shape();
        for j in 0..n {
            for i in 0..m {
                unsafe {
                    let v = self.read_unchecked(i, j);
                    self.write_unchecked(i, j, alpha * v);
                }
            }
        }
    }

    /// Sets the entries strictly above (`UpLo::Lower`) or strictly below (`UpLo::Upper`) the
    /// diagonal of index `offset` to zero, so that `self` becomes trapezoidal.
    ///
    /// Diagonal `offset` is `j - i`: `0` is the main diagonal, `1` the first superdiagonal.
    pub fn make_trapezoidal(&mut self, uplo: crate::UpLo, offset: isize) {
        let (m, n) = self.shape();
        for j in 0..n {
            for i in 0..m {
                let d = j as isize - i as isize;
                let zero = match uplo {
                    crate::UpLo::Lower => d > offset,
                    crate::UpLo::Upper => d < offset,
                };
                if zero {
                    unsafe { self.write_unchecked(i, j, E::zero()) };
                }
            }
        }
    }
}

impl<E: Entity> core::ops::Index<(usize, usize)> for MatMut<'_, E> {
    type Output = E;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &E {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &*self.inner.overflowing_ptr_at(row, col) }
    }
}

impl<E: Entity> core::ops::IndexMut<(usize, usize)> for MatMut<'_, E> {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut E {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &mut *self.inner.overflowing_ptr_at(row, col) }
    }
}

impl<E: Entity> core::fmt::Debug for MatMut<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.rb(), f)
    }
}
