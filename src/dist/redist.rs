//! Redistribution between arbitrary layouts.
//!
//! Every element travels at most once to each of its destination owners, through a single
//! personalized all-to-all exchange over the whole grid. A destination that already owns an
//! element in the source layout takes it from its own local block; otherwise the element is
//! sent by the source owner with the smallest world rank.

use super::{
    matrix::{DistMatMut, DistMatRef, DistMatrix},
    shift, Dist, Distribution,
};
use crate::{grid::Grid, ComplexField, Entity, Mat};
use reborrow::*;

/// Distribution ranks, for every world rank, of the two axes of a layout.
fn ranks_of<D: Distribution>(grid: &Grid) -> Vec<(usize, usize)> {
    (0..grid.size())
        .map(|w| (D::COL.rank_of(grid, w), D::ROW.rank_of(grid, w)))
        .collect()
}

/// Copies `src` (or its transpose) into `dst`, applying `map` to every element.
///
/// This is a collective over the whole grid. Shapes and grids are expected to be checked by the
/// caller.
pub(crate) fn redistribute<E: Entity, D1: Distribution, D2: Distribution>(
    src: DistMatRef<'_, E, D1>,
    mut dst: DistMatMut<'_, E, D2>,
    transpose: bool,
    map: impl Fn(E) -> E,
) {
    let grid = src.grid;

    let same_layout = !transpose
        && D1::COL == D2::COL
        && D1::ROW == D2::ROW
        && (D1::COL == Dist::Star || src.col_align == dst.col_align)
        && (D1::ROW == Dist::Star || src.row_align == dst.row_align);
    if same_layout {
        let (m, n) = src.local.shape();
        for j in 0..n {
            for i in 0..m {
                dst.local.write(i, j, map(src.local.read(i, j)));
            }
        }
        return;
    }

    let p = grid.size();
    let me = grid.vc_rank();

    let src_ranks = ranks_of::<D1>(grid);
    let dst_ranks = ranks_of::<D2>(grid);

    let (src_col_stride, src_row_stride) = (src.col_stride(), src.row_stride());
    let (dst_col_stride, dst_row_stride) = (dst.col_stride(), dst.row_stride());

    // smallest world rank owning each (col rank, row rank) pair of the source layout
    let mut min_owner = vec![usize::MAX; src_col_stride * src_row_stride];
    for w in (0..p).rev() {
        let (c, r) = src_ranks[w];
        min_owner[c + r * src_col_stride] = w;
    }

    // world ranks owning each (col rank, row rank) pair of the destination layout
    let mut dst_owners = vec![Vec::new(); dst_col_stride * dst_row_stride];
    for w in 0..p {
        let (c, r) = dst_ranks[w];
        dst_owners[c + r * dst_col_stride].push(w);
    }

    let my_src = src_ranks[me];
    let i_am_min_owner = min_owner[my_src.0 + my_src.1 * src_col_stride] == me;

    let mut send: Vec<Vec<(usize, usize, E)>> = (0..p).map(|_| Vec::new()).collect();

    let (m, n) = src.local.shape();
    let (col_shift, row_shift) = (src.col_shift(), src.row_shift());
    for jl in 0..n {
        let j = row_shift + jl * src_row_stride;
        for il in 0..m {
            let i = col_shift + il * src_col_stride;
            let (di, dj) = if transpose { (j, i) } else { (i, j) };
            let target = (
                (di + dst.col_align) % dst_col_stride,
                (dj + dst.row_align) % dst_row_stride,
            );
            let value = map(unsafe { src.local.read_unchecked(il, jl) });
            for &w in &dst_owners[target.0 + target.1 * dst_col_stride] {
                let w_owns = src_ranks[w] == my_src;
                if (w_owns && w == me) || (!w_owns && i_am_min_owner) {
                    send[w].push((di, dj, value));
                }
            }
        }
    }

    let recv = grid.vc_comm().all_to_all_v(send);

    let dst_col_shift = shift(dst_ranks[me].0, dst.col_align, dst_col_stride);
    let dst_row_shift = shift(dst_ranks[me].1, dst.row_align, dst_row_stride);
    for (di, dj, value) in recv.into_iter().flatten() {
        let il = (di - dst_col_shift) / dst_col_stride;
        let jl = (dj - dst_row_shift) / dst_row_stride;
        dst.local.write(il, jl, value);
    }
}

impl<'a, E: Entity, D: Distribution> DistMatRef<'a, E, D> {
    /// Returns a copy of `self` laid out with the distribution `D2` and zero alignments.
    ///
    /// This is a collective over the whole grid.
    pub fn redistribute<D2: Distribution>(&self) -> DistMatrix<E, D2> {
        self.redistribute_aligned(0, 0)
    }

    /// Returns a copy of `self` laid out with the distribution `D2` and the given alignments.
    #[track_caller]
    pub fn redistribute_aligned<D2: Distribution>(
        &self,
        col_align: usize,
        row_align: usize,
    ) -> DistMatrix<E, D2> {
        let (m, n) = self.shape();
        let mut out = DistMatrix::<E, D2>::with_alignments(self.grid, m, n, col_align, row_align);
        redistribute(*self, out.as_mut(), false, |x| x);
        out
    }

    /// Returns a copy of the transpose of `self`, laid out with the distribution `D2`.
    pub fn transpose_into<D2: Distribution>(&self) -> DistMatrix<E, D2> {
        self.transpose_into_aligned(0, 0)
    }

    /// Returns a copy of the transpose of `self`, laid out with the distribution `D2` and the
    /// given alignments.
    pub fn transpose_into_aligned<D2: Distribution>(
        &self,
        col_align: usize,
        row_align: usize,
    ) -> DistMatrix<E, D2> {
        let (m, n) = self.shape();
        let mut out = DistMatrix::<E, D2>::with_alignments(self.grid, n, m, col_align, row_align);
        redistribute(*self, out.as_mut(), true, |x| x);
        out
    }

    /// Returns the whole matrix on every process.
    ///
    /// This is a collective over the whole grid.
    pub fn gather(&self) -> Mat<E> {
        self.redistribute::<super::StarStar>().into_local()
    }
}

impl<'a, E: ComplexField, D: Distribution> DistMatRef<'a, E, D> {
    /// Returns a copy of the adjoint of `self`, laid out with the distribution `D2`.
    pub fn adjoint_into<D2: Distribution>(&self) -> DistMatrix<E, D2> {
        self.adjoint_into_aligned(0, 0)
    }

    /// Returns a copy of the adjoint of `self`, laid out with the distribution `D2` and the given
    /// alignments.
    pub fn adjoint_into_aligned<D2: Distribution>(
        &self,
        col_align: usize,
        row_align: usize,
    ) -> DistMatrix<E, D2> {
        let (m, n) = self.shape();
        let mut out = DistMatrix::<E, D2>::with_alignments(self.grid, n, m, col_align, row_align);
        redistribute(*self, out.as_mut(), true, |x: E| x.conj());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert,
        c64,
        dist::{McMr, McStar, MrMc, StarMr, StarStar, StarVr, VcStar, VrStar},
    };

    fn value(i: usize, j: usize) -> f64 {
        (i * 100 + j) as f64
    }

    fn check<D1: Distribution, D2: Distribution>(grid: &Grid, m: usize, n: usize) {
        let a = DistMatrix::<f64, D1>::from_fn(grid, m, n, value);
        let h = D2::COL.stride(grid);
        let w = D2::ROW.stride(grid);
        let b = a
            .as_ref()
            .redistribute_aligned::<D2>((m + 1) % h, (n + 2) % w);
        let mut c = DistMatrix::<f64, D1>::zeros(grid, m, n);
        c.as_mut().copy_from(b.as_ref()).unwrap();
        let g = c.as_ref().gather();
        for j in 0..n {
            for i in 0..m {
                assert!(g.read(i, j) == value(i, j));
            }
        }
        let bl = b.local();
        for jl in 0..bl.ncols() {
            for il in 0..bl.nrows() {
                let (i, j) = (b.as_ref().global_row(il), b.as_ref().global_col(jl));
                assert!(bl.read(il, jl) == value(i, j));
            }
        }
    }

    #[test]
    fn round_trips() {
        for (h, w) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(h, w, |grid| {
                for (m, n) in [(0, 3), (5, 7), (8, 1)] {
                    check::<McMr, McStar>(grid, m, n);
                    check::<McMr, StarMr>(grid, m, n);
                    check::<McMr, MrMc>(grid, m, n);
                    check::<McMr, VcStar>(grid, m, n);
                    check::<VrStar, StarVr>(grid, m, n);
                    check::<StarStar, McMr>(grid, m, n);
                    check::<VcStar, VrStar>(grid, m, n);
                }
            });
        }
    }

    #[test]
    fn views_and_adjoint() {
        Grid::run(2, 3, |grid| {
            let (m, n) = (7, 5);
            let f = |i: usize, j: usize| c64::new(i as f64, j as f64);
            let a = DistMatrix::<c64, McMr>::from_fn(grid, m, n, f);
            let sub = a.as_ref().submatrix(2, 1, 4, 3);
            let g = sub.gather();
            for j in 0..3 {
                for i in 0..4 {
                    assert!(g.read(i, j) == f(i + 2, j + 1));
                }
            }
            let adj = sub.adjoint_into::<McMr>();
            let g = adj.as_ref().gather();
            for j in 0..4 {
                for i in 0..3 {
                    assert!(g.read(i, j) == f(j + 2, i + 1).conj());
                }
            }
            assert!(a.as_ref().read_global(6, 4) == f(6, 4));

            let star_mc = sub.redistribute::<crate::dist::StarMc>();
            let mc_star = star_mc.as_ref().local_adjoint::<McStar>();
            let g = mc_star.as_ref().gather();
            assert!(g.read(2, 3) == f(3 + 2, 2 + 1).conj());
        });
    }
}
