//! Matrices distributed over a process grid.
//!
//! A [`DistMatrix`] is tagged at compile time with a [`Distribution`]: a pair of [`Dist`], one for
//! the rows (the *column distribution*, since it says how each column is split) and one for the
//! columns (the *row distribution*). Each [`Dist`] partitions indices cyclically over the
//! processes of one communicator of the grid:
//!
//! | [`Dist`]      | communicator | stride  | rank of `(row, col)`  |
//! |---------------|--------------|---------|-----------------------|
//! | [`Dist::Mc`]  | `col_comm`   | `r`     | `row`                 |
//! | [`Dist::Mr`]  | `row_comm`   | `c`     | `col`                 |
//! | [`Dist::Vc`]  | `vc_comm`    | `r * c` | `row + col * r`       |
//! | [`Dist::Vr`]  | `vr_comm`    | `r * c` | `col + row * c`       |
//! | [`Dist::Star`]| `self_comm`  | `1`     | `0`                   |
//!
//! Global index `i` is owned by distribution rank `(i + align) % stride`, where `align` is the
//! alignment of the matrix along that axis. The local block of a process holds, in order, every
//! row and column it owns.
//!
//! The layout of a matrix never changes implicitly: moving data between distributions goes
//! through [`DistMatRef::redistribute`], [`DistMatMut::copy_from`] and their adjoint and
//! transpose counterparts.

use crate::{grid::Grid, Comm};

pub(crate) mod level3;
mod matrix;
mod permute;
mod redist;
mod reductions;

pub use level3::{
    dist_local_matmul, dist_matmul, dist_matmul_with_orientation,
    dist_solve_triangular_in_place,
};
pub use matrix::{DistMatMut, DistMatRef, DistMatrix};
pub use permute::{
    dist_image_to_permutation, dist_permute_cols, dist_permute_rows, dist_permute_rows_with,
};
pub use reductions::{dist_norm_frobenius, dist_norm_inf, dist_norm_max, dist_norm_one};

/// How the indices of one axis of a matrix are split over the grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dist {
    /// Cyclic over the processes of a grid column.
    Mc,
    /// Cyclic over the processes of a grid row.
    Mr,
    /// Cyclic over all processes, in column-major order.
    Vc,
    /// Cyclic over all processes, in row-major order.
    Vr,
    /// Replicated on every process.
    Star,
}

impl Dist {
    /// Communicator over which the axis is split.
    #[inline]
    pub fn comm(self, grid: &Grid) -> &Comm {
        match self {
            Dist::Mc => grid.col_comm(),
            Dist::Mr => grid.row_comm(),
            Dist::Vc => grid.vc_comm(),
            Dist::Vr => grid.vr_comm(),
            Dist::Star => grid.self_comm(),
        }
    }

    #[inline]
    pub fn stride(self, grid: &Grid) -> usize {
        match self {
            Dist::Mc => grid.height(),
            Dist::Mr => grid.width(),
            Dist::Vc | Dist::Vr => grid.size(),
            Dist::Star => 1,
        }
    }

    /// Distribution rank of the calling process.
    #[inline]
    pub fn rank(self, grid: &Grid) -> usize {
        self.rank_of(grid, grid.vc_rank())
    }

    /// Distribution rank of the process with world rank `world_rank`.
    #[inline]
    pub fn rank_of(self, grid: &Grid, world_rank: usize) -> usize {
        let (row, col) = (world_rank % grid.height(), world_rank / grid.height());
        match self {
            Dist::Mc => row,
            Dist::Mr => col,
            Dist::Vc => world_rank,
            Dist::Vr => col + row * grid.width(),
            Dist::Star => 0,
        }
    }
}

/// Compile-time pair of [`Dist`] describing the layout of a [`DistMatrix`].
pub trait Distribution: Copy + Default + core::fmt::Debug + Send + Sync + 'static {
    /// Distribution of the row indices.
    const COL: Dist;
    /// Distribution of the column indices.
    const ROW: Dist;

    /// `[COL, STAR]`: holds a column vector spread like the rows of `Self`.
    type ColStar: Distribution;
    /// `[ROW, STAR]`: holds a column vector spread like the columns of `Self`.
    type RowStar: Distribution;
}

macro_rules! distribution {
    (
        $(#[$attr: meta])* $name: ident,
        $col: ident,
        $row: ident,
        $col_star: ident,
        $row_star: ident
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
        pub struct $name;

        impl Distribution for $name {
            const COL: Dist = Dist::$col;
            const ROW: Dist = Dist::$row;

            type ColStar = $col_star;
            type RowStar = $row_star;
        }
    };
}

distribution!(
    /// `[MC, MR]`, the default two-dimensional layout.
    McMr,
    Mc,
    Mr,
    McStar,
    MrStar
);
distribution!(
    /// `[MC, STAR]`: rows split over the grid column, columns replicated.
    McStar,
    Mc,
    Star,
    McStar,
    StarStar
);
distribution!(
    /// `[STAR, MR]`: rows replicated, columns split over the grid row.
    StarMr,
    Star,
    Mr,
    StarStar,
    MrStar
);
distribution!(
    /// `[MR, MC]`.
    MrMc,
    Mr,
    Mc,
    MrStar,
    McStar
);
distribution!(
    /// `[MR, STAR]`.
    MrStar,
    Mr,
    Star,
    MrStar,
    StarStar
);
distribution!(
    /// `[STAR, MC]`.
    StarMc,
    Star,
    Mc,
    StarStar,
    McStar
);
distribution!(
    /// `[VC, STAR]`: rows split over the whole grid in column-major order.
    VcStar,
    Vc,
    Star,
    VcStar,
    StarStar
);
distribution!(
    /// `[STAR, VC]`.
    StarVc,
    Star,
    Vc,
    StarStar,
    VcStar
);
distribution!(
    /// `[VR, STAR]`: rows split over the whole grid in row-major order.
    VrStar,
    Vr,
    Star,
    VrStar,
    StarStar
);
distribution!(
    /// `[STAR, VR]`.
    StarVr,
    Star,
    Vr,
    StarStar,
    VrStar
);
distribution!(
    /// `[STAR, STAR]`: every process holds the whole matrix.
    StarStar,
    Star,
    Star,
    StarStar,
    StarStar
);

/// First global index owned by a process of distribution rank `rank`.
#[inline]
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    (rank + stride - align % stride) % stride
}

/// Number of indices among `0..n` owned by a process whose first owned index is `shift`.
#[inline]
pub fn local_len(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift - 1) / stride + 1
    } else {
        0
    }
}

/// Distribution rank owning global index `index`.
#[inline]
pub fn owner(index: usize, align: usize, stride: usize) -> usize {
    (index + align) % stride
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn index_math() {
        // stride 3, align 1: index 0 -> rank 1, index 2 -> rank 0.
        assert!(owner(0, 1, 3) == 1);
        assert!(owner(2, 1, 3) == 0);
        assert!(shift(0, 1, 3) == 2);
        assert!(shift(1, 1, 3) == 0);
        assert!(shift(2, 1, 3) == 1);
        for n in 0..10 {
            let total: usize = (0..3).map(|r| local_len(n, shift(r, 1, 3), 3)).sum();
            assert!(total == n);
        }
        assert!(local_len(0, 0, 1) == 0);
        assert!(local_len(5, 4, 2) == 1);
    }

    #[test]
    fn ranks() {
        Grid::run(2, 3, |grid| {
            assert!(Dist::Mc.rank(grid) == grid.row());
            assert!(Dist::Mr.rank(grid) == grid.col());
            assert!(Dist::Vr.rank(grid) == grid.vr_comm().rank());
            assert!(Dist::Vc.rank(grid) == grid.vc_comm().rank());
            assert!(Dist::Star.stride(grid) == 1);
            for d in [Dist::Mc, Dist::Mr, Dist::Vc, Dist::Vr, Dist::Star] {
                assert!(d.comm(grid).size() == d.stride(grid));
                assert!(d.comm(grid).rank() == d.rank(grid));
            }
        });
    }
}
