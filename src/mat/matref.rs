use super::*;
use crate::{assert, debug_assert};

/// Immutable view over a matrix, similar to an immutable reference to a 2D strided [prim@slice].
pub struct MatRef<'a, E: Entity> {
    pub(super) inner: MatImpl<E>,
    pub(super) __marker: PhantomData<&'a E>,
}

impl<E: Entity> Clone for MatRef<'_, E> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Entity> Copy for MatRef<'_, E> {}

unsafe impl<E: Entity> Send for MatRef<'_, E> {}
unsafe impl<E: Entity> Sync for MatRef<'_, E> {}

impl<'short, E: Entity> Reborrow<'short> for MatRef<'_, E> {
    type Target = MatRef<'short, E>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short, E: Entity> ReborrowMut<'short> for MatRef<'_, E> {
    type Target = MatRef<'short, E>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl<E: Entity> IntoConst for MatRef<'_, E> {
    type Target = Self;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'a, E: Entity> MatRef<'a, E> {
    #[inline]
    pub(super) fn from_inner(inner: MatImpl<E>) -> Self {
        Self {
            inner,
            __marker: PhantomData,
        }
    }

    /// Creates a `MatRef` from a pointer to the matrix data, dimensions and strides.
    ///
    /// # Safety
    /// For the lifetime `'a`, every element `(i, j)` with `i < nrows` and `j < ncols` must be
    /// readable at `ptr + i * row_stride + j * col_stride`, and must not be written through any
    /// other path.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *const E,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self::from_inner(MatImpl {
            ptr: NonNull::new(ptr as *mut E).unwrap_or(NonNull::dangling()),
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
    pub fn from_column_major_slice(slice: &'a [E], nrows: usize, ncols: usize) -> Self {
        assert!(slice.len() == column_major_len(nrows, ncols));
        unsafe { Self::from_raw_parts(slice.as_ptr(), nrows, ncols, 1, nrows as isize) }
    }

    /// Returns a pointer to the matrix data.
    #[inline(always)]
    pub fn as_ptr(self) -> *const E {
        self.inner.ptr.as_ptr()
    }

    /// Returns the number of rows of the matrix.
    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.inner.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.inner.ncols
    }

    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Returns the offset between the first elements of two successive rows in the matrix.
    #[inline(always)]
    pub fn row_stride(&self) -> isize {
        self.inner.row_stride
    }

    /// Returns the offset between the first elements of two successive columns in the matrix.
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
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { *self.inner.overflowing_ptr_at(row, col) }
    }

    /// Reads the value of the element at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn read_unchecked(&self, row: usize, col: usize) -> E {
        debug_assert!(all(row < self.nrows(), col < self.ncols()));
        *self.inner.overflowing_ptr_at(row, col)
    }

    /// Returns a reference to the element at the given indices.
    #[inline(always)]
    #[track_caller]
    pub fn get(self, row: usize, col: usize) -> &'a E {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &*self.inner.overflowing_ptr_at(row, col) }
    }

    /// Returns the transpose of `self`.
    #[inline(always)]
    #[must_use]
    pub fn transpose(self) -> Self {
        Self::from_inner(self.inner.transpose())
    }

    /// Returns a view over `self` with its rows in reverse order.
    #[inline(always)]
    #[must_use]
    pub fn reverse_rows(self) -> Self {
        Self::from_inner(self.inner.reverse_rows())
    }

    #[inline(always)]
    #[must_use]
    pub fn reverse_cols(self) -> Self {
        self.transpose().reverse_rows().transpose()
    }

    #[inline(always)]
    #[must_use]
    pub fn reverse_rows_and_cols(self) -> Self {
        self.reverse_rows().reverse_cols()
    }

    /// Returns a view over the submatrix starting at `(row_start, col_start)` with dimensions
    /// `(nrows, ncols)`.
    ///
    /// # Panics
    /// Panics if the submatrix does not fit inside `self`.
    #[inline(always)]
    #[track_caller]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        Self::from_inner(self.inner.submatrix(row_start, col_start, nrows, ncols))
    }

    #[inline(always)]
    #[track_caller]
    pub fn subrows(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols();
        self.submatrix(row_start, 0, nrows, ncols)
    }

    #[inline(always)]
    #[track_caller]
    pub fn subcols(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows();
        self.submatrix(0, col_start, nrows, ncols)
    }

    /// Returns the row at `row_idx`, as a `1 x ncols` view.
    #[inline(always)]
    #[track_caller]
    pub fn row(self, row_idx: usize) -> Self {
        self.subrows(row_idx, 1)
    }

    /// Returns the column at `col_idx`, as a `nrows x 1` view.
    #[inline(always)]
    #[track_caller]
    pub fn col(self, col_idx: usize) -> Self {
        self.subcols(col_idx, 1)
    }

    /// Splits the matrix horizontally and vertically at the given indices into four corners and
    /// returns an array of each submatrix, in the following order:
    /// * top left.
    /// * top right.
    /// * bottom left.
    /// * bottom right.
    ///
    /// # Panics
    /// Panics if `row > self.nrows()` or `col > self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn split_at(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        assert!(all(row <= self.nrows(), col <= self.ncols()));
        let (m, n) = self.shape();
        (
            self.submatrix(0, 0, row, col),
            self.submatrix(0, col, row, n - col),
            self.submatrix(row, 0, m - row, col),
            self.submatrix(row, col, m - row, n - col),
        )
    }

    /// Splits the matrix horizontally at the given row into the top and bottom parts.
    #[inline(always)]
    #[track_caller]
    pub fn split_at_row(self, row: usize) -> (Self, Self) {
        assert!(row <= self.nrows());
        let m = self.nrows();
        (self.subrows(0, row), self.subrows(row, m - row))
    }

    /// Splits the matrix vertically at the given column into the left and right parts.
    #[inline(always)]
    #[track_caller]
    pub fn split_at_col(self, col: usize) -> (Self, Self) {
        assert!(col <= self.ncols());
        let n = self.ncols();
        (self.subcols(0, col), self.subcols(col, n - col))
    }

    /// Returns an owning [`Mat`] of the data.
    #[inline]
    pub fn to_owned(&self) -> Mat<E> {
        Mat::from_fn(self.nrows(), self.ncols(), |i, j| unsafe {
            self.read_unchecked(i, j)
        })
    }
}

impl<'a, E: ComplexField> MatRef<'a, E> {
    /// Returns an owning [`Mat`] holding the conjugate transpose of `self`.
    #[inline]
    pub fn adjoint_to_owned(&self) -> Mat<E> {
        Mat::from_fn(self.ncols(), self.nrows(), |i, j| unsafe {
            self.read_unchecked(j, i).conj()
        })
    }
}

impl<E: Entity> core::ops::Index<(usize, usize)> for MatRef<'_, E> {
    type Output = E;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &E {
        self.get(row, col)
    }
}

impl<E: Entity> core::fmt::Debug for MatRef<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct DebugRow<'a, T: Entity>(MatRef<'a, T>);

        impl<T: Entity> core::fmt::Debug for DebugRow<'_, T> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut j = 0;
                f.debug_list()
                    .entries(core::iter::from_fn(|| {
                        let ret = if j < self.0.ncols() {
                            Some(self.0.read(0, j))
                        } else {
                            None
                        };
                        j += 1;
                        ret
                    }))
                    .finish()
            }
        }

        writeln!(f, "[")?;
        for i in 0..self.nrows() {
            let row = self.subrows(i, 1);
            core::fmt::Debug::fmt(&DebugRow(row), f)?;
            f.write_str(",\n")?;
        }
        write!(f, "]")
    }
}
