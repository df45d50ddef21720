use super::{local_len, owner, shift, Dist, Distribution};
use crate::{
    assert, debug_assert,
    error::{check_same_grid, check_shape},
    grid::Grid,
    ComplexField, Entity, Mat, MatMut, MatRef, Result, UpLo,
};
use core::marker::PhantomData;
use reborrow::*;

/// Owning distributed matrix.
///
/// Every process of the grid holds a `DistMatrix` value describing the same global matrix, and
/// owns the local block selected by `D` and the alignments. The matrix keeps a handle to the
/// grid it lives on; views borrow it from their parent.
#[derive(Clone)]
pub struct DistMatrix<E: Entity, D: Distribution> {
    pub(crate) grid: Grid,
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) col_align: usize,
    pub(crate) row_align: usize,
    pub(crate) local: Mat<E>,
    pub(crate) __marker: PhantomData<D>,
}

/// Immutable view over a distributed matrix.
pub struct DistMatRef<'a, E: Entity, D: Distribution> {
    pub(crate) grid: &'a Grid,
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) col_align: usize,
    pub(crate) row_align: usize,
    pub(crate) local: MatRef<'a, E>,
    pub(crate) __marker: PhantomData<D>,
}

/// Mutable view over a distributed matrix.
pub struct DistMatMut<'a, E: Entity, D: Distribution> {
    pub(crate) grid: &'a Grid,
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) col_align: usize,
    pub(crate) row_align: usize,
    pub(crate) local: MatMut<'a, E>,
    pub(crate) __marker: PhantomData<D>,
}

impl<E: Entity, D: Distribution> Clone for DistMatRef<'_, E, D> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Entity, D: Distribution> Copy for DistMatRef<'_, E, D> {}

impl<'short, E: Entity, D: Distribution> Reborrow<'short> for DistMatRef<'_, E, D> {
    type Target = DistMatRef<'short, E, D>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short, E: Entity, D: Distribution> ReborrowMut<'short> for DistMatRef<'_, E, D> {
    type Target = DistMatRef<'short, E, D>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl<E: Entity, D: Distribution> IntoConst for DistMatRef<'_, E, D> {
    type Target = Self;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'short, E: Entity, D: Distribution> Reborrow<'short> for DistMatMut<'_, E, D> {
    type Target = DistMatRef<'short, E, D>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        DistMatRef {
            grid: self.grid,
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.rb(),
            __marker: PhantomData,
        }
    }
}

impl<'short, E: Entity, D: Distribution> ReborrowMut<'short> for DistMatMut<'_, E, D> {
    type Target = DistMatMut<'short, E, D>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        DistMatMut {
            grid: self.grid,
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.rb_mut(),
            __marker: PhantomData,
        }
    }
}

impl<'a, E: Entity, D: Distribution> IntoConst for DistMatMut<'a, E, D> {
    type Target = DistMatRef<'a, E, D>;

    #[inline]
    fn into_const(self) -> Self::Target {
        DistMatRef {
            grid: self.grid,
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.into_const(),
            __marker: PhantomData,
        }
    }
}

/// Position of a contiguous range of global indices inside the local storage of an axis.
#[derive(Copy, Clone, Debug)]
struct SubAxis {
    align: usize,
    local_start: usize,
    local_len: usize,
}

#[inline]
fn sub_axis(dist: Dist, grid: &Grid, align: usize, start: usize, len: usize) -> SubAxis {
    let stride = dist.stride(grid);
    let rank = dist.rank(grid);
    let parent_shift = shift(rank, align, stride);
    let new_align = (align + start) % stride;
    SubAxis {
        align: new_align,
        local_start: local_len(start, parent_shift, stride),
        local_len: local_len(len, shift(rank, new_align, stride), stride),
    }
}

macro_rules! axis_accessors {
    () => {
        #[inline]
        pub fn grid(&self) -> &'a Grid {
            self.grid
        }

        #[inline]
        pub fn nrows(&self) -> usize {
            self.nrows
        }

        #[inline]
        pub fn ncols(&self) -> usize {
            self.ncols
        }

        #[inline]
        pub fn shape(&self) -> (usize, usize) {
            (self.nrows, self.ncols)
        }

        /// Alignment of the row indices.
        #[inline]
        pub fn col_align(&self) -> usize {
            self.col_align
        }

        /// Alignment of the column indices.
        #[inline]
        pub fn row_align(&self) -> usize {
            self.row_align
        }

        #[inline]
        pub fn col_stride(&self) -> usize {
            D::COL.stride(self.grid)
        }

        #[inline]
        pub fn row_stride(&self) -> usize {
            D::ROW.stride(self.grid)
        }

        /// First global row owned by the calling process.
        #[inline]
        pub fn col_shift(&self) -> usize {
            shift(D::COL.rank(self.grid), self.col_align, self.col_stride())
        }

        /// First global column owned by the calling process.
        #[inline]
        pub fn row_shift(&self) -> usize {
            shift(D::ROW.rank(self.grid), self.row_align, self.row_stride())
        }

        /// Global row index of local row `i`.
        #[inline]
        pub fn global_row(&self, i: usize) -> usize {
            self.col_shift() + i * self.col_stride()
        }

        /// Global column index of local column `j`.
        #[inline]
        pub fn global_col(&self, j: usize) -> usize {
            self.row_shift() + j * self.row_stride()
        }

        /// Local row index of global row `i`, if the calling process owns it.
        #[inline]
        pub fn local_row(&self, i: usize) -> Option<usize> {
            let stride = self.col_stride();
            if owner(i, self.col_align, stride) == D::COL.rank(self.grid) {
                Some(i / stride)
            } else {
                None
            }
        }

        /// Local column index of global column `j`, if the calling process owns it.
        #[inline]
        pub fn local_col(&self, j: usize) -> Option<usize> {
            let stride = self.row_stride();
            if owner(j, self.row_align, stride) == D::ROW.rank(self.grid) {
                Some(j / stride)
            } else {
                None
            }
        }

        /// Distribution rank owning global row `i`.
        #[inline]
        pub fn row_owner(&self, i: usize) -> usize {
            owner(i, self.col_align, self.col_stride())
        }

        /// Distribution rank owning global column `j`.
        #[inline]
        pub fn col_owner(&self, j: usize) -> usize {
            owner(j, self.row_align, self.row_stride())
        }
    };
}

impl<'a, E: Entity, D: Distribution> DistMatRef<'a, E, D> {
    axis_accessors!();

    /// Local block of the calling process.
    #[inline]
    pub fn local(&self) -> MatRef<'a, E> {
        self.local
    }

    /// Returns a view over the submatrix starting at `(row_start, col_start)` with dimensions
    /// `(nrows, ncols)`.
    ///
    /// # Panics
    /// Panics if the submatrix does not fit inside `self`.
    #[track_caller]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        assert!(all(
            row_start <= self.nrows,
            col_start <= self.ncols,
            nrows <= self.nrows - row_start,
            ncols <= self.ncols - col_start
        ));
        let rows = sub_axis(D::COL, self.grid, self.col_align, row_start, nrows);
        let cols = sub_axis(D::ROW, self.grid, self.row_align, col_start, ncols);
        Self {
            grid: self.grid,
            nrows,
            ncols,
            col_align: rows.align,
            row_align: cols.align,
            local: self.local.submatrix(
                rows.local_start,
                cols.local_start,
                rows.local_len,
                cols.local_len,
            ),
            __marker: PhantomData,
        }
    }

    #[inline]
    #[track_caller]
    pub fn subrows(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols;
        self.submatrix(row_start, 0, nrows, ncols)
    }

    #[inline]
    #[track_caller]
    pub fn subcols(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows;
        self.submatrix(0, col_start, nrows, ncols)
    }

    #[inline]
    #[track_caller]
    pub fn row(self, i: usize) -> Self {
        self.subrows(i, 1)
    }

    #[inline]
    #[track_caller]
    pub fn col(self, j: usize) -> Self {
        self.subcols(j, 1)
    }

    /// Splits the matrix into top left, top right, bottom left and bottom right corners.
    #[track_caller]
    pub fn split_at(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        assert!(all(row <= self.nrows, col <= self.ncols));
        let (m, n) = self.shape();
        (
            self.submatrix(0, 0, row, col),
            self.submatrix(0, col, row, n - col),
            self.submatrix(row, 0, m - row, col),
            self.submatrix(row, col, m - row, n - col),
        )
    }

    #[track_caller]
    pub fn split_at_row(self, row: usize) -> (Self, Self) {
        assert!(row <= self.nrows);
        let m = self.nrows;
        (self.subrows(0, row), self.subrows(row, m - row))
    }

    #[track_caller]
    pub fn split_at_col(self, col: usize) -> (Self, Self) {
        assert!(col <= self.ncols);
        let n = self.ncols;
        (self.subcols(0, col), self.subcols(col, n - col))
    }

    /// Returns a new matrix with the same layout and alignments, holding a copy of the data.
    pub fn to_owned(&self) -> DistMatrix<E, D> {
        DistMatrix {
            grid: self.grid.clone(),
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.to_owned(),
            __marker: PhantomData,
        }
    }

    /// Reads the global element `(i, j)` on every process.
    ///
    /// This is a collective over the whole grid.
    #[track_caller]
    pub fn read_global(&self, i: usize, j: usize) -> E {
        assert!(all(i < self.nrows, j < self.ncols));
        let mine = match (self.local_row(i), self.local_col(j)) {
            (Some(il), Some(jl)) => Some(self.local.read(il, jl)),
            _ => None,
        };
        let all = self.grid.vc_comm().all_gather(mine);
        match all.into_iter().flatten().next() {
            Some(value) => value,
            None => unreachable!(),
        }
    }
}

impl<'a, E: ComplexField, D: Distribution> DistMatRef<'a, E, D> {
    /// Returns the adjoint of `self`, laid out with the swapped distribution `D2`.
    ///
    /// The local block of the result is the adjoint of the local block of `self`, so no
    /// communication takes place.
    ///
    /// # Panics
    /// Panics if `D2` is not `D` with its two axes swapped.
    #[track_caller]
    pub fn local_adjoint<D2: Distribution>(&self) -> DistMatrix<E, D2> {
        assert!(all(D2::COL == D::ROW, D2::ROW == D::COL));
        DistMatrix {
            grid: self.grid.clone(),
            nrows: self.ncols,
            ncols: self.nrows,
            col_align: self.row_align,
            row_align: self.col_align,
            local: self.local.adjoint_to_owned(),
            __marker: PhantomData,
        }
    }
}

impl<'a, E: Entity, D: Distribution> DistMatMut<'a, E, D> {
    axis_accessors!();

    /// Local block of the calling process.
    #[inline]
    pub fn local(&self) -> MatRef<'_, E> {
        self.local.rb()
    }

    #[inline]
    pub fn local_mut(&mut self) -> MatMut<'_, E> {
        self.local.rb_mut()
    }

    #[inline]
    pub fn into_local(self) -> MatMut<'a, E> {
        self.local
    }

    #[inline]
    fn from_const(view: DistMatRef<'a, E, D>) -> Self {
        // the view was created from a mutable view by `into_const`
        let local = unsafe {
            MatMut::from_raw_parts_mut(
                view.local.as_ptr() as *mut E,
                view.local.nrows(),
                view.local.ncols(),
                view.local.row_stride(),
                view.local.col_stride(),
            )
        };
        Self {
            grid: view.grid,
            nrows: view.nrows,
            ncols: view.ncols,
            col_align: view.col_align,
            row_align: view.row_align,
            local,
            __marker: PhantomData,
        }
    }

    #[track_caller]
    pub fn submatrix_mut(
        self,
        row_start: usize,
        col_start: usize,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        Self::from_const(self.into_const().submatrix(row_start, col_start, nrows, ncols))
    }

    #[inline]
    #[track_caller]
    pub fn subrows_mut(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols;
        self.submatrix_mut(row_start, 0, nrows, ncols)
    }

    #[inline]
    #[track_caller]
    pub fn subcols_mut(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows;
        self.submatrix_mut(0, col_start, nrows, ncols)
    }

    #[inline]
    #[track_caller]
    pub fn row_mut(self, i: usize) -> Self {
        self.subrows_mut(i, 1)
    }

    #[inline]
    #[track_caller]
    pub fn col_mut(self, j: usize) -> Self {
        self.subcols_mut(j, 1)
    }

    /// Splits the matrix into four disjoint corners: top left, top right, bottom left and bottom
    /// right.
    #[track_caller]
    pub fn split_at_mut(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        let (tl, tr, bl, br) = self.into_const().split_at(row, col);
        (
            Self::from_const(tl),
            Self::from_const(tr),
            Self::from_const(bl),
            Self::from_const(br),
        )
    }

    #[track_caller]
    pub fn split_at_row_mut(self, row: usize) -> (Self, Self) {
        let (top, bot) = self.into_const().split_at_row(row);
        (Self::from_const(top), Self::from_const(bot))
    }

    #[track_caller]
    pub fn split_at_col_mut(self, col: usize) -> (Self, Self) {
        let (left, right) = self.into_const().split_at_col(col);
        (Self::from_const(left), Self::from_const(right))
    }

    /// Copies `src` into `self`, redistributing it to the layout and alignments of `self`.
    ///
    /// This is a collective over the whole grid.
    pub fn copy_from<D2: Distribution>(&mut self, src: DistMatRef<'_, E, D2>) -> Result<()> {
        check_same_grid("copy_from", self.grid, src.grid)?;
        check_shape("copy_from", self.shape(), src.shape())?;
        super::redist::redistribute(src, self.rb_mut(), false, |x| x);
        Ok(())
    }

    /// Copies the transpose of `src` into `self`.
    pub fn copy_transpose_from<D2: Distribution>(
        &mut self,
        src: DistMatRef<'_, E, D2>,
    ) -> Result<()> {
        check_same_grid("copy_transpose_from", self.grid, src.grid)?;
        check_shape("copy_transpose_from", self.shape(), (src.ncols, src.nrows))?;
        super::redist::redistribute(src, self.rb_mut(), true, |x| x);
        Ok(())
    }

    /// Sets every locally owned element to `f(i, j, value)`, where `(i, j)` are its global
    /// indices.
    pub fn update_local(&mut self, mut f: impl FnMut(usize, usize, E) -> E) {
        let (m, n) = self.local.shape();
        let (col_shift, col_stride) = (self.col_shift(), self.col_stride());
        let (row_shift, row_stride) = (self.row_shift(), self.row_stride());
        for jl in 0..n {
            let j = row_shift + jl * row_stride;
            for il in 0..m {
                let i = col_shift + il * col_stride;
                unsafe {
                    let v = self.local.read_unchecked(il, jl);
                    self.local.write_unchecked(il, jl, f(i, j, v));
                }
            }
        }
    }

    #[inline]
    pub fn fill(&mut self, value: E) {
        self.local.fill(value);
    }
}

impl<'a, E: ComplexField, D: Distribution> DistMatMut<'a, E, D> {
    /// Copies the adjoint of `src` into `self`.
    pub fn copy_adjoint_from<D2: Distribution>(
        &mut self,
        src: DistMatRef<'_, E, D2>,
    ) -> Result<()> {
        check_same_grid("copy_adjoint_from", self.grid, src.grid)?;
        check_shape("copy_adjoint_from", self.shape(), (src.ncols, src.nrows))?;
        super::redist::redistribute(src, self.rb_mut(), true, |x: E| x.conj());
        Ok(())
    }

    #[inline]
    pub fn fill_zero(&mut self) {
        self.local.fill_zero();
    }

    /// Multiplies every element by `alpha`.
    #[inline]
    pub fn scale(&mut self, alpha: E) {
        self.local.scale(alpha);
    }

    /// Sets the entries strictly above (`UpLo::Lower`) or strictly below (`UpLo::Upper`) the
    /// diagonal of index `offset` to zero. Diagonal `offset` is `j - i`.
    pub fn make_trapezoidal(&mut self, uplo: UpLo, offset: isize) {
        self.update_local(|i, j, v| {
            let d = j as isize - i as isize;
            let zero = match uplo {
                UpLo::Lower => d > offset,
                UpLo::Upper => d < offset,
            };
            if zero {
                E::zero()
            } else {
                v
            }
        });
    }

    /// Overwrites `self` with the identity matrix.
    pub fn fill_identity(&mut self) {
        self.update_local(|i, j, _| if i == j { E::one() } else { E::zero() });
    }

    /// Adds `value` to every diagonal element.
    pub fn shift_diagonal(&mut self, value: E) {
        self.update_local(|i, j, v| if i == j { v + value } else { v });
    }

    /// Replaces the local block of every member of `comm` by the sum of all their local blocks.
    ///
    /// Used after a local product whose inner dimension is split over `comm`.
    ///
    /// # Panics
    /// Panics if the local blocks of the members have different shapes.
    pub fn sum_over(&mut self, comm: &crate::Comm) {
        if comm.size() == 1 {
            return;
        }
        let (m, n) = self.local.shape();
        let mut packed = Vec::with_capacity(m * n);
        for j in 0..n {
            for i in 0..m {
                packed.push(unsafe { self.local.read_unchecked(i, j) });
            }
        }
        let summed = comm.all_reduce(packed, |mut acc, rhs| {
            assert!(acc.len() == rhs.len());
            for (a, b) in acc.iter_mut().zip(rhs) {
                *a += b;
            }
            acc
        });
        for j in 0..n {
            for i in 0..m {
                unsafe { self.local.write_unchecked(i, j, summed[i + j * m]) };
            }
        }
    }
}

impl<E: Entity, D: Distribution> DistMatrix<E, D> {
    /// Returns an empty `0×0` matrix on `grid`.
    pub fn new(grid: &Grid) -> Self {
        Self::with_alignments(grid, 0, 0, 0, 0)
    }

    /// Returns an `nrows×ncols` matrix filled with `E::default()`, with zero alignments.
    pub fn zeros(grid: &Grid, nrows: usize, ncols: usize) -> Self {
        Self::with_alignments(grid, nrows, ncols, 0, 0)
    }

    /// Returns an `nrows×ncols` matrix filled with `E::default()`, with the given alignments.
    ///
    /// # Panics
    /// Panics if an alignment is not smaller than the stride of its axis.
    #[track_caller]
    pub fn with_alignments(
        grid: &Grid,
        nrows: usize,
        ncols: usize,
        col_align: usize,
        row_align: usize,
    ) -> Self {
        let (col_stride, row_stride) = (D::COL.stride(grid), D::ROW.stride(grid));
        assert!(all(col_align < col_stride, row_align < row_stride));
        let col_shift = shift(D::COL.rank(grid), col_align, col_stride);
        let row_shift = shift(D::ROW.rank(grid), row_align, row_stride);
        let local_nrows = local_len(nrows, col_shift, col_stride);
        let local_ncols = local_len(ncols, row_shift, row_stride);
        Self {
            grid: grid.clone(),
            nrows,
            ncols,
            col_align,
            row_align,
            local: Mat::zeros(local_nrows, local_ncols),
            __marker: PhantomData,
        }
    }

    /// Returns a matrix with zero alignments whose element `(i, j)` is `f(i, j)`.
    ///
    /// `f` is only called for the elements owned by the calling process.
    pub fn from_fn(
        grid: &Grid,
        nrows: usize,
        ncols: usize,
        mut f: impl FnMut(usize, usize) -> E,
    ) -> Self {
        let mut mat = Self::zeros(grid, nrows, ncols);
        mat.as_mut().update_local(|i, j, _| f(i, j));
        mat
    }

    /// Returns a matrix with zero alignments, built from the matrix `mat` known by every process.
    pub fn from_replicated(grid: &Grid, mat: MatRef<'_, E>) -> Self {
        Self::from_fn(grid, mat.nrows(), mat.ncols(), |i, j| mat.read(i, j))
    }

    /// Returns a matrix with the same shape as `other` and the alignments `D` shares with it.
    ///
    /// An axis of `self` takes the alignment of the axis of `other` with the same distribution,
    /// and zero if there is none.
    pub fn aligned_with<D2: Distribution, E2: Entity>(
        other: DistMatRef<'_, E2, D2>,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        let align = |dist: Dist| {
            if dist == D2::COL {
                other.col_align
            } else if dist == D2::ROW {
                other.row_align
            } else {
                0
            }
        };
        let col_align = if D::COL == Dist::Star { 0 } else { align(D::COL) };
        let row_align = if D::ROW == Dist::Star { 0 } else { align(D::ROW) };
        Self::with_alignments(other.grid, nrows, ncols, col_align, row_align)
    }

    #[inline]
    pub fn as_ref(&self) -> DistMatRef<'_, E, D> {
        DistMatRef {
            grid: &self.grid,
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.as_ref(),
            __marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_mut(&mut self) -> DistMatMut<'_, E, D> {
        DistMatMut {
            grid: &self.grid,
            nrows: self.nrows,
            ncols: self.ncols,
            col_align: self.col_align,
            row_align: self.row_align,
            local: self.local.as_mut(),
            __marker: PhantomData,
        }
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    #[inline]
    pub fn col_align(&self) -> usize {
        self.col_align
    }

    #[inline]
    pub fn row_align(&self) -> usize {
        self.row_align
    }

    /// Local block of the calling process.
    #[inline]
    pub fn local(&self) -> &Mat<E> {
        &self.local
    }

    #[inline]
    pub fn local_mut(&mut self) -> &mut Mat<E> {
        &mut self.local
    }

    #[inline]
    pub fn into_local(self) -> Mat<E> {
        self.local
    }
}

impl<E: ComplexField, D: Distribution> DistMatrix<E, D> {
    /// Returns the `nrows×ncols` identity matrix.
    pub fn identity(grid: &Grid, nrows: usize, ncols: usize) -> Self {
        let mut mat = Self::zeros(grid, nrows, ncols);
        mat.as_mut().fill_identity();
        mat
    }
}

impl<E: Entity, D: Distribution> core::fmt::Debug for DistMatrix<E, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistMatrix")
            .field("distribution", &(D::COL, D::ROW))
            .field("shape", &self.shape())
            .field("align", &(self.col_align, self.row_align))
            .field("local", &self.local)
            .finish()
    }
}

#[inline]
pub(crate) fn debug_assert_aligned<E1: Entity, E2: Entity, D1: Distribution, D2: Distribution>(
    a: DistMatRef<'_, E1, D1>,
    b: DistMatRef<'_, E2, D2>,
) {
    let cols_aligned = D1::COL != D2::COL || D1::COL == Dist::Star || a.col_align == b.col_align;
    let rows_aligned = D1::ROW != D2::ROW || D1::ROW == Dist::Star || a.row_align == b.row_align;
    debug_assert!(all(cols_aligned, rows_aligned));
}
