use crate::{
    assert,
    linalg::{
        matmul::triangular::{matmul, BlockStructure},
        temp_mat_req, temp_mat_uninit,
    },
    perm::{permute_rows_into, Perm},
    ComplexField, MatMut, MatRef, Parallelism,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Computes the matrix `A` from its LU factors and the permutation `P` such that $PA = LU$, and
/// stores the result in `dst`.
///
/// # Panics
/// Panics if `dst` and `lu` have different shapes, or if the permutation does not have as many
/// indices as `lu` has rows.
#[track_caller]
pub fn reconstruct<E: ComplexField>(
    dst: MatMut<'_, E>,
    lu: MatRef<'_, E>,
    perm: &Perm,
    parallelism: Parallelism,
    stack: PodStack<'_>,
) {
    let (m, n) = lu.shape();
    assert!(all(dst.nrows() == m, dst.ncols() == n, perm.len() == m));
    let size = Ord::min(m, n);

    let (mut prod, _) = temp_mat_uninit::<E>(m, n, stack);

    let (l_top, _, l_bot, _) = lu.split_at(size, size);
    let (u_left, u_right) = lu.subrows(0, size).split_at_col(size);

    let (mut prod_top_left, mut prod_top_right, mut prod_bot_left, mut prod_bot_right) =
        prod.rb_mut().split_at_mut(size, size);

    matmul(
        prod_top_left.rb_mut(),
        BlockStructure::Rectangular,
        l_top,
        BlockStructure::UnitTriangularLower,
        u_left,
        BlockStructure::TriangularUpper,
        None,
        E::one(),
        parallelism,
    );
    matmul(
        prod_top_right.rb_mut(),
        BlockStructure::Rectangular,
        l_top,
        BlockStructure::UnitTriangularLower,
        u_right,
        BlockStructure::Rectangular,
        None,
        E::one(),
        parallelism,
    );
    matmul(
        prod_bot_left.rb_mut(),
        BlockStructure::Rectangular,
        l_bot,
        BlockStructure::Rectangular,
        u_left,
        BlockStructure::TriangularUpper,
        None,
        E::one(),
        parallelism,
    );
    matmul(
        prod_bot_right.rb_mut(),
        BlockStructure::Rectangular,
        l_bot,
        BlockStructure::Rectangular,
        u_right,
        BlockStructure::Rectangular,
        None,
        E::one(),
        parallelism,
    );

    permute_rows_into(dst, prod.rb(), &perm.inverse());
}

/// Computes the size and alignment of required workspace for reconstructing a matrix from its
/// LU factors.
pub fn reconstruct_req<E: ComplexField>(
    nrows: usize,
    ncols: usize,
) -> Result<StackReq, SizeOverflow> {
    temp_mat_req::<E>(nrows, ncols)
}
