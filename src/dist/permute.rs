//! Row permutations of distributed matrices.

use super::{
    matrix::{DistMatMut, DistMatRef},
    owner, Distribution,
};
use crate::{
    assert,
    perm::{PartialPerm, Perm},
    Entity,
};

/// Applies `perm` to the rows of `a`, whose row `0` is index `0` of the permutation.
///
/// Rows are exchanged over the communicator that distributes them, each process sending the
/// locally owned part of every moved row it holds to the owner of its destination. Processes
/// holding different columns of the rows work independently.
///
/// This is a collective over the communicator distributing the rows of `a`.
///
/// # Panics
/// Panics if `a` has fewer rows than the extent of the permutation.
#[track_caller]
pub fn dist_permute_rows<E: Entity, D: Distribution>(
    mut a: DistMatMut<'_, E, D>,
    perm: &PartialPerm,
) {
    assert!(perm.extent() <= a.nrows());
    if perm.is_identity() {
        return;
    }

    let grid = a.grid;
    let comm = D::COL.comm(grid);
    let (stride, align) = (a.col_stride(), a.col_align());
    let me = comm.rank();
    let n = a.local.ncols();

    let mut send: Vec<Vec<(usize, Vec<E>)>> = (0..comm.size()).map(|_| Vec::new()).collect();
    for &(dst, src) in perm.pairs() {
        if owner(src, align, stride) != me {
            continue;
        }
        let il = src / stride;
        let row = (0..n).map(|j| a.local.read(il, j)).collect();
        send[owner(dst, align, stride)].push((dst, row));
    }

    let recv = comm.all_to_all_v(send);
    for (dst, row) in recv.into_iter().flatten() {
        let il = dst / stride;
        for (j, value) in row.into_iter().enumerate() {
            a.local.write(il, j, value);
        }
    }
}

/// Applies the full permutation `perm` to the rows of `a`.
///
/// # Panics
/// Panics if the size of the permutation is not the number of rows of `a`.
#[track_caller]
pub fn dist_permute_rows_with<E: Entity, D: Distribution>(a: DistMatMut<'_, E, D>, perm: &Perm) {
    assert!(perm.len() == a.nrows());
    dist_permute_rows(a, &PartialPerm::from(perm));
}

/// Applies `perm` to the columns of `a`, so that `a[:, dst] = a_old[:, src]` for every moved
/// pair.
///
/// This is a collective over the communicator distributing the columns of `a`.
///
/// # Panics
/// Panics if `a` has fewer columns than the extent of the permutation.
#[track_caller]
pub fn dist_permute_cols<E: Entity, D: Distribution>(
    mut a: DistMatMut<'_, E, D>,
    perm: &PartialPerm,
) {
    assert!(perm.extent() <= a.ncols());
    if perm.is_identity() {
        return;
    }

    let grid = a.grid;
    let comm = D::ROW.comm(grid);
    let (stride, align) = (a.row_stride(), a.row_align());
    let me = comm.rank();
    let m = a.local.nrows();

    let mut send: Vec<Vec<(usize, Vec<E>)>> = (0..comm.size()).map(|_| Vec::new()).collect();
    for &(dst, src) in perm.pairs() {
        if owner(src, align, stride) != me {
            continue;
        }
        let jl = src / stride;
        let col = (0..m).map(|i| a.local.read(i, jl)).collect();
        send[owner(dst, align, stride)].push((dst, col));
    }

    let recv = comm.all_to_all_v(send);
    for (dst, col) in recv.into_iter().flatten() {
        let jl = dst / stride;
        for (i, value) in col.into_iter().enumerate() {
            a.local.write(i, jl, value);
        }
    }
}

/// Returns the permutation whose image is the distributed column vector `image`.
///
/// This is a collective over the whole grid.
///
/// # Panics
/// Panics if `image` is not a column vector holding a permutation of `0..image.nrows()`.
#[track_caller]
pub fn dist_image_to_permutation<D: Distribution>(image: DistMatRef<'_, usize, D>) -> Perm {
    assert!(image.ncols() == 1);
    let image = image.gather();
    Perm::from_forward(image.col_as_slice(0).to_vec())
}
