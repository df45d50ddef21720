//! Distributed level 3 kernels.

use super::{
    matrix::{debug_assert_aligned, DistMatMut, DistMatRef, DistMatrix},
    Dist, Distribution, McMr, McStar, StarMr, StarStar, StarVr,
};
use crate::{
    assert,
    error::{check_same_grid, check_shape, check_square},
    get_global_parallelism,
    linalg::{
        matmul::{matmul, matmul_with_conj},
        triangular_solve as solve,
    },
    BlockParams, Comm, ComplexField, Conj, Diag, Mat, Orientation, Result, UpLo,
};
use reborrow::*;

/// Copies `op(src)` into a new matrix with layout `D2` and the given alignments.
pub(crate) fn op_into_aligned<E: ComplexField, D1: Distribution, D2: Distribution>(
    src: DistMatRef<'_, E, D1>,
    orientation: Orientation,
    col_align: usize,
    row_align: usize,
) -> DistMatrix<E, D2> {
    match orientation {
        Orientation::Normal => src.redistribute_aligned(col_align, row_align),
        Orientation::Transpose => src.transpose_into_aligned(col_align, row_align),
        Orientation::Adjoint => src.adjoint_into_aligned(col_align, row_align),
    }
}

/// Computes `acc = [alpha * acc] + beta * lhs * rhs` where the inner dimension of the product is
/// replicated, so that it reduces to a product of the local blocks.
///
/// `lhs` must be laid out as `[X, STAR]`, `rhs` as `[STAR, Y]` and `acc` as `[X, Y]`, with `lhs`
/// and `rhs` aligned with `acc`.
///
/// # Panics
/// Panics if the distributions are not compatible.
#[track_caller]
pub fn dist_local_matmul<E: ComplexField, DC: Distribution, DA: Distribution, DB: Distribution>(
    mut acc: DistMatMut<'_, E, DC>,
    lhs: DistMatRef<'_, E, DA>,
    rhs: DistMatRef<'_, E, DB>,
    alpha: Option<E>,
    beta: E,
) -> Result<()> {
    assert!(all(
        DA::ROW == Dist::Star,
        DB::COL == Dist::Star,
        DA::COL == DC::COL,
        DB::ROW == DC::ROW,
    ));
    check_same_grid("dist_local_matmul", acc.grid, lhs.grid)?;
    check_same_grid("dist_local_matmul", acc.grid, rhs.grid)?;
    check_shape("dist_local_matmul", acc.shape(), (lhs.nrows, rhs.ncols))?;
    check_shape("dist_local_matmul", (lhs.ncols, rhs.ncols), rhs.shape())?;
    debug_assert_aligned(acc.rb(), lhs);
    debug_assert_aligned(acc.rb(), rhs);

    matmul(
        acc.local_mut(),
        lhs.local,
        rhs.local,
        alpha,
        beta,
        get_global_parallelism(),
    );
    Ok(())
}

/// Computes `acc = [alpha * acc] + beta * op_lhs(lhs) * op_rhs(rhs)`.
///
/// Uses the stationary-output formulation: for each block of the inner dimension, the block
/// column of `op_lhs(lhs)` is spread along the grid rows (`[MC, STAR]`), the block row of
/// `op_rhs(rhs)` along the grid columns (`[STAR, MR]`), and every process updates its local block
/// of `acc`.
pub fn dist_matmul_with_orientation<E: ComplexField>(
    mut acc: DistMatMut<'_, E, McMr>,
    lhs: DistMatRef<'_, E, McMr>,
    lhs_orientation: Orientation,
    rhs: DistMatRef<'_, E, McMr>,
    rhs_orientation: Orientation,
    alpha: Option<E>,
    beta: E,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("dist_matmul", acc.grid, lhs.grid)?;
    check_same_grid("dist_matmul", acc.grid, rhs.grid)?;

    let op_shape = |shape: (usize, usize), orientation| match orientation {
        Orientation::Normal => shape,
        _ => (shape.1, shape.0),
    };
    let (m, k) = op_shape(lhs.shape(), lhs_orientation);
    let (k_rhs, n) = op_shape(rhs.shape(), rhs_orientation);
    check_shape("dist_matmul", acc.shape(), (m, n))?;
    check_shape("dist_matmul", (k, n), (k_rhs, n))?;

    match alpha {
        None => acc.fill_zero(),
        Some(alpha) => acc.scale(alpha),
    }

    let blocksize = params.resolve();
    let mut kb = 0;
    while kb < k {
        let bs = Ord::min(blocksize, k - kb);

        let a1 = match lhs_orientation {
            Orientation::Normal => lhs.subcols(kb, bs),
            _ => lhs.subrows(kb, bs),
        };
        let b1 = match rhs_orientation {
            Orientation::Normal => rhs.subrows(kb, bs),
            _ => rhs.subcols(kb, bs),
        };
        let a1 = op_into_aligned::<E, McMr, McStar>(a1, lhs_orientation, acc.col_align, 0);
        let b1 = op_into_aligned::<E, McMr, StarMr>(b1, rhs_orientation, 0, acc.row_align);

        matmul(
            acc.local_mut(),
            a1.local().as_ref(),
            b1.local().as_ref(),
            Some(E::one()),
            beta,
            get_global_parallelism(),
        );
        kb += bs;
    }
    Ok(())
}

/// Computes `acc = [alpha * acc] + beta * lhs * rhs`.
///
/// See [`dist_matmul_with_orientation`].
pub fn dist_matmul<E: ComplexField>(
    acc: DistMatMut<'_, E, McMr>,
    lhs: DistMatRef<'_, E, McMr>,
    rhs: DistMatRef<'_, E, McMr>,
    alpha: Option<E>,
    beta: E,
) -> Result<()> {
    dist_matmul_with_orientation(
        acc,
        lhs,
        Orientation::Normal,
        rhs,
        Orientation::Normal,
        alpha,
        beta,
        BlockParams::default(),
    )
}

fn local_triangular_solve<E: ComplexField>(
    uplo: UpLo,
    orientation: Orientation,
    diag: Diag,
    tri: crate::MatRef<'_, E>,
    rhs: crate::MatMut<'_, E>,
) {
    let parallelism = get_global_parallelism();
    let conj = orientation.conj();
    let (tri, lower) = match orientation {
        Orientation::Normal => (tri, uplo == UpLo::Lower),
        _ => (tri.transpose(), uplo == UpLo::Upper),
    };
    match (lower, diag) {
        (true, Diag::NonUnit) => {
            solve::solve_lower_triangular_in_place_with_conj(tri, conj, rhs, parallelism)
        }
        (true, Diag::Unit) => {
            solve::solve_unit_lower_triangular_in_place_with_conj(tri, conj, rhs, parallelism)
        }
        (false, Diag::NonUnit) => {
            solve::solve_upper_triangular_in_place_with_conj(tri, conj, rhs, parallelism)
        }
        (false, Diag::Unit) => {
            solve::solve_unit_upper_triangular_in_place_with_conj(tri, conj, rhs, parallelism)
        }
    }
}

/// Solves `op(tri) * X = rhs` in place, where `tri` is triangular.
///
/// Only the `uplo` triangle of `tri` is accessed, and its diagonal is not accessed when `diag` is
/// [`Diag::Unit`]. Each diagonal block is replicated and solved against the corresponding block
/// row of `rhs`, spread over the whole grid (`[STAR, VR]`); the solved block row is then used to
/// update the rows that remain with a local product.
pub fn dist_solve_triangular_in_place<E: ComplexField>(
    uplo: UpLo,
    orientation: Orientation,
    diag: Diag,
    tri: DistMatRef<'_, E, McMr>,
    mut rhs: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("dist_solve_triangular_in_place", tri.grid, rhs.grid)?;
    check_square("dist_solve_triangular_in_place", tri.shape())?;
    check_shape(
        "dist_solve_triangular_in_place",
        (tri.nrows, rhs.ncols),
        rhs.shape(),
    )?;

    let n = tri.nrows;
    let blocksize = params.resolve();
    let forward = (uplo == UpLo::Lower) == (orientation == Orientation::Normal);

    let mut blocks = Vec::new();
    let mut k = 0;
    while k < n {
        let bs = Ord::min(blocksize, n - k);
        blocks.push((k, bs));
        k += bs;
    }
    if !forward {
        blocks.reverse();
    }

    for (k, bs) in blocks {
        let a11 = tri.submatrix(k, k, bs, bs).redistribute::<StarStar>();

        let mut x1 = rhs.rb().subrows(k, bs).redistribute::<StarVr>();
        local_triangular_solve(
            uplo,
            orientation,
            diag,
            a11.local().as_ref(),
            x1.local_mut().as_mut(),
        );
        let x1 = x1.as_ref().redistribute_aligned::<StarMr>(0, rhs.row_align);
        rhs.rb_mut().subrows_mut(k, bs).copy_from(x1.as_ref())?;

        let (rest_start, rest_len) = if forward { (k + bs, n - k - bs) } else { (0, k) };
        if rest_len == 0 {
            continue;
        }

        let mut rhs_rest = rhs.rb_mut().subrows_mut(rest_start, rest_len);
        let a_rest = match orientation {
            Orientation::Normal => tri.submatrix(rest_start, k, rest_len, bs),
            _ => tri.submatrix(k, rest_start, bs, rest_len),
        };
        let a_rest =
            op_into_aligned::<E, McMr, McStar>(a_rest, orientation, rhs_rest.col_align, 0);

        matmul(
            rhs_rest.local_mut(),
            a_rest.local().as_ref(),
            x1.local().as_ref(),
            Some(E::one()),
            -E::one(),
            get_global_parallelism(),
        );
    }
    Ok(())
}

/// Returns `lhs^H * rhs` on every process, for two matrices whose columns are replicated.
///
/// The local products are summed over the communicator distributing the rows.
pub(crate) fn dist_adjoint_product<E: ComplexField, D: Distribution>(
    lhs: DistMatRef<'_, E, D>,
    rhs: DistMatRef<'_, E, D>,
) -> Mat<E> {
    assert!(D::ROW == Dist::Star);
    debug_assert_aligned(lhs, rhs);
    let mut prod = Mat::<E>::zeros(lhs.ncols, rhs.ncols);
    matmul_with_conj(
        prod.as_mut(),
        lhs.local.transpose(),
        Conj::Yes,
        rhs.local,
        Conj::No,
        Some(E::one()),
        E::one(),
        get_global_parallelism(),
    );
    sum_mat_over(prod, D::COL.comm(lhs.grid))
}

/// Replaces `mat` by the sum of the `mat` of every member of `comm`.
pub(crate) fn sum_mat_over<E: ComplexField>(mat: Mat<E>, comm: &Comm) -> Mat<E> {
    if comm.size() == 1 {
        return mat;
    }
    let (m, n) = mat.shape();
    let summed = comm.all_reduce(mat.into_vec(), |mut acc, rhs| {
        for (a, b) in acc.iter_mut().zip(rhs) {
            *a += b;
        }
        acc
    });
    Mat::from_column_major_vec(summed, m, n)
}
