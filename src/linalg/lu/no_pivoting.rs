//! The LU decomposition without pivoting is such that:
//! $$A = LU,$$
//! where $L$ is a unit lower triangular matrix, and $U$ is an upper triangular matrix.
//!
//! It exists when every leading principal minor of $A$ is nonzero, which is the case for
//! diagonally dominant matrices. A zero pivot is not reported: the multipliers below it are left
//! unscaled.

use super::{eliminate, recursion_blocksize, RECURSION_THRESHOLD};
use crate::{
    dist::{
        dist_local_matmul, dist_solve_triangular_in_place, McMr, McStar, StarMr, StarStar, StarVr,
    },
    error::{check_same_grid, check_shape, check_square},
    get_global_parallelism,
    linalg::{
        matmul::matmul,
        triangular_solve::{
            solve_lower_triangular_in_place, solve_unit_lower_triangular_in_place,
            solve_upper_triangular_in_place,
        },
    },
    BlockParams, ComplexField, Diag, DistMatMut, DistMatRef, MatMut, MatRef, Orientation,
    Parallelism, Result, UpLo,
};
use reborrow::*;

fn lu_unblocked<E: ComplexField>(mut matrix: MatMut<'_, E>) {
    let size = Ord::min(matrix.nrows(), matrix.ncols());
    for j in 0..size {
        eliminate(matrix.rb_mut(), j, Parallelism::None);
    }
}

fn lu_recursive<E: ComplexField>(mut matrix: MatMut<'_, E>, parallelism: Parallelism) {
    let size = Ord::min(matrix.nrows(), matrix.ncols());
    if size <= RECURSION_THRESHOLD {
        lu_unblocked(matrix);
        return;
    }

    let bs = recursion_blocksize(size);
    lu_recursive(matrix.rb_mut().subcols_mut(0, bs), parallelism);

    let (a00, mut a01, a10, mut a11) = matrix.split_at_mut(bs, bs);
    solve_unit_lower_triangular_in_place(a00.rb(), a01.rb_mut(), parallelism);
    matmul(
        a11.rb_mut(),
        a10.rb(),
        a01.rb(),
        Some(E::one()),
        -E::one(),
        parallelism,
    );
    lu_recursive(a11, parallelism);
}

/// Computes the LU factors of `matrix` without pivoting, and stores them in place.
pub fn lu_in_place<E: ComplexField>(matrix: MatMut<'_, E>, parallelism: Parallelism) {
    lu_recursive(matrix, parallelism);
}

/// Solves `A * X = rhs` in place, given the LU factors of the square matrix `A`.
///
/// # Panics
/// Panics if `lu` is not square or if `rhs` does not have as many rows as `lu`.
#[track_caller]
pub fn solve_in_place<E: ComplexField>(
    lu: MatRef<'_, E>,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    let mut rhs = rhs;
    solve_unit_lower_triangular_in_place(lu, rhs.rb_mut(), parallelism);
    solve_upper_triangular_in_place(lu, rhs.rb_mut(), parallelism);
}

/// Computes the LU factors of the distributed matrix `a` without pivoting, and stores them in
/// place.
///
/// For each panel, the diagonal block is factored redundantly on every process, the block
/// below it is solved against `U11` in `[MC, STAR]`, the block to its right against `L11` in
/// `[STAR, VR]`, and the trailing matrix receives the local product of both.
///
/// This is a collective over the whole grid.
pub fn dist_lu_in_place<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    let mut a = a;
    let (m, n) = a.shape();
    let size = Ord::min(m, n);
    let blocksize = params.resolve();
    let parallelism = get_global_parallelism();

    let mut k = 0;
    while k < size {
        let nb = Ord::min(blocksize, size - k);
        log::trace!(target: "plaid_lu", "no pivoting panel {}..{} of {}", k, k + nb, size);

        let (mut a11, mut a12, mut a21, a22) = a
            .rb_mut()
            .submatrix_mut(k, k, m - k, n - k)
            .split_at_mut(nb, nb);

        let mut a11_star = a11.rb().redistribute::<StarStar>();
        lu_in_place(a11_star.local_mut().as_mut(), parallelism);
        a11.copy_from(a11_star.as_ref())?;
        let a11_local = a11_star.local().as_ref();

        // A21 := A21 * U11^-1
        let mut a21_mc = a21
            .rb()
            .redistribute_aligned::<McStar>(a22.col_align(), 0);
        solve_lower_triangular_in_place(
            a11_local.transpose(),
            a21_mc.local_mut().as_mut().transpose_mut(),
            parallelism,
        );
        a21.copy_from(a21_mc.as_ref())?;

        // A12 := L11^-1 * A12
        let mut a12_vr = a12.rb().redistribute::<StarVr>();
        solve_unit_lower_triangular_in_place(
            a11_local,
            a12_vr.local_mut().as_mut(),
            parallelism,
        );
        let a12_mr = a12_vr
            .as_ref()
            .redistribute_aligned::<StarMr>(0, a22.row_align());
        a12.copy_from(a12_mr.as_ref())?;

        dist_local_matmul(a22, a21_mc.as_ref(), a12_mr.as_ref(), Some(E::one()), -E::one())?;
        k += nb;
    }
    Ok(())
}

/// Solves `A * X = rhs` in place, given the distributed LU factors of the square matrix `A`.
///
/// This is a collective over the whole grid.
pub fn dist_solve_in_place<E: ComplexField>(
    lu: DistMatRef<'_, E, McMr>,
    rhs: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("no_pivoting::dist_solve_in_place", lu.grid(), rhs.grid())?;
    check_square("no_pivoting::dist_solve_in_place", lu.shape())?;
    check_shape(
        "no_pivoting::dist_solve_in_place",
        (lu.nrows(), rhs.ncols()),
        rhs.shape(),
    )?;
    let mut rhs = rhs;
    dist_solve_triangular_in_place(
        UpLo::Lower,
        Orientation::Normal,
        Diag::Unit,
        lu,
        rhs.rb_mut(),
        params,
    )?;
    dist_solve_triangular_in_place(
        UpLo::Upper,
        Orientation::Normal,
        Diag::NonUnit,
        lu,
        rhs.rb_mut(),
        params,
    )
}
