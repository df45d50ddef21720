use super::*;
use crate::{assert, debug_assert};
use crate::{linalg::matmul::matmul, Parallelism};

/// Heap allocated, column-major matrix.
#[derive(Clone)]
pub struct Mat<E: Entity> {
    data: Vec<E>,
    nrows: usize,
    ncols: usize,
}

impl<E: Entity> Default for Mat<E> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Mat<E> {
    /// Returns an empty matrix of dimension `0×0`.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            nrows: 0,
            ncols: 0,
        }
    }

    /// Returns a matrix of dimension `nrows×ncols` filled with `E::default()`.
    #[track_caller]
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![E::default(); column_major_len(nrows, ncols)],
            nrows,
            ncols,
        }
    }

    /// Returns a new matrix with dimensions `(nrows, ncols)`, filled with the provided function.
    #[track_caller]
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> E) -> Self {
        let mut data = Vec::with_capacity(column_major_len(nrows, ncols));
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Takes ownership of a column-major buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != nrows * ncols`.
    #[track_caller]
    pub fn from_column_major_vec(data: Vec<E>, nrows: usize, ncols: usize) -> Self {
        assert!(data.len() == column_major_len(nrows, ncols));
        Self { data, nrows, ncols }
    }

    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Resizes the matrix to `nrows×ncols`, discarding its contents.
    pub fn resize_zeroed(&mut self, nrows: usize, ncols: usize) {
        let len = column_major_len(nrows, ncols);
        self.data.clear();
        self.data.resize(len, E::default());
        self.nrows = nrows;
        self.ncols = ncols;
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, E> {
        unsafe {
            MatRef::from_raw_parts(
                self.data.as_ptr(),
                self.nrows,
                self.ncols,
                1,
                self.nrows as isize,
            )
        }
    }

    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_, E> {
        unsafe {
            MatMut::from_raw_parts_mut(
                self.data.as_mut_ptr(),
                self.nrows,
                self.ncols,
                1,
                self.nrows as isize,
            )
        }
    }

    /// Returns the column-major storage.
    #[inline]
    pub fn as_slice(&self) -> &[E] {
        &self.data
    }

    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [E] {
        &mut self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<E> {
        self.data
    }

    #[inline]
    #[track_caller]
    pub fn col_as_slice(&self, col: usize) -> &[E] {
        assert!(col < self.ncols);
        &self.data[col * self.nrows..(col + 1) * self.nrows]
    }

    #[inline]
    #[track_caller]
    pub fn col_as_slice_mut(&mut self, col: usize) -> &mut [E] {
        assert!(col < self.ncols);
        let m = self.nrows;
        &mut self.data[col * m..(col + 1) * m]
    }

    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> E {
        assert!(all(row < self.nrows, col < self.ncols));
        self.data[row + col * self.nrows]
    }

    #[inline(always)]
    #[track_caller]
    pub fn write(&mut self, row: usize, col: usize, value: E) {
        assert!(all(row < self.nrows, col < self.ncols));
        self.data[row + col * self.nrows] = value;
    }

    /// Returns a view over the transpose of `self`.
    #[inline]
    pub fn transpose(&self) -> MatRef<'_, E> {
        self.as_ref().transpose()
    }
}

impl<E: ComplexField> Mat<E> {
    /// Returns the identity matrix of dimension `nrows×ncols` (ones on the main diagonal).
    pub fn identity(nrows: usize, ncols: usize) -> Self {
        Self::from_fn(nrows, ncols, |i, j| if i == j { E::one() } else { E::zero() })
    }

    /// Returns the conjugate transpose of `self`.
    #[inline]
    pub fn adjoint(&self) -> Self {
        self.as_ref().adjoint_to_owned()
    }
}

impl<E: Entity> PartialEq for Mat<E> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.data == other.data
    }
}

impl<E: Entity> core::fmt::Debug for Mat<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.as_ref(), f)
    }
}

impl<E: Entity> core::ops::Index<(usize, usize)> for Mat<E> {
    type Output = E;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &E {
        assert!(all(row < self.nrows, col < self.ncols));
        &self.data[row + col * self.nrows]
    }
}

impl<E: Entity> core::ops::IndexMut<(usize, usize)> for Mat<E> {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut E {
        assert!(all(row < self.nrows, col < self.ncols));
        &mut self.data[row + col * self.nrows]
    }
}

impl<E: ComplexField> core::ops::Mul<&Mat<E>> for &Mat<E> {
    type Output = Mat<E>;

    #[track_caller]
    fn mul(self, rhs: &Mat<E>) -> Mat<E> {
        let mut out = Mat::zeros(self.nrows(), rhs.ncols());
        matmul(
            out.as_mut(),
            self.as_ref(),
            rhs.as_ref(),
            None,
            E::one(),
            Parallelism::None,
        );
        out
    }
}

impl<E: ComplexField> core::ops::Add<&Mat<E>> for &Mat<E> {
    type Output = Mat<E>;

    #[track_caller]
    fn add(self, rhs: &Mat<E>) -> Mat<E> {
        assert!(self.shape() == rhs.shape());
        Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.read(i, j) + rhs.read(i, j)
        })
    }
}

impl<E: ComplexField> core::ops::Sub<&Mat<E>> for &Mat<E> {
    type Output = Mat<E>;

    #[track_caller]
    fn sub(self, rhs: &Mat<E>) -> Mat<E> {
        assert!(self.shape() == rhs.shape());
        Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.read(i, j) - rhs.read(i, j)
        })
    }
}
