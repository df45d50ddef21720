use super::{
    compute::apply_pivots,
    solve::{dist_solve_in_place, solve_in_place},
};
use crate::{
    assert,
    dist::{McMr, VcStar},
    error::{check_same_grid, check_shape},
    linalg::triangular_solve::{
        solve_unit_lower_triangular_in_place, solve_upper_triangular_in_place,
    },
    perm::Perm,
    BlockParams, ComplexField, DistMatMut, DistMatRef, DistMatrix, Mat, MatMut, MatRef,
    Orientation, Parallelism, Result,
};
use reborrow::*;

/// Computes the inverse of `A`, given its LU factors and the permutation `P` such that
/// $PA = LU$.
///
/// # Panics
/// Panics if `lu` is not square.
#[track_caller]
pub fn inverse<E: ComplexField>(
    lu: MatRef<'_, E>,
    perm: &Perm,
    parallelism: Parallelism,
) -> Mat<E> {
    let n = lu.nrows();
    assert!(lu.ncols() == n);
    let mut inv = Mat::identity(n, n);
    solve_in_place(Orientation::Normal, lu, perm, inv.as_mut(), parallelism);
    inv
}

/// Writes the inverse of `A` into `dst`, given its LU factors and the row exchanges `pivots`
/// returned by [`lu_in_place`](super::lu_in_place).
///
/// Does not allocate.
///
/// # Panics
/// Panics if `lu` is not square, or if `dst` or `pivots` do not match its dimension.
#[track_caller]
pub fn inverse_into<E: ComplexField>(
    dst: MatMut<'_, E>,
    lu: MatRef<'_, E>,
    pivots: &[usize],
    parallelism: Parallelism,
) {
    let n = lu.nrows();
    assert!(all(lu.ncols() == n, dst.shape() == (n, n), pivots.len() == n));
    let mut dst = dst;
    dst.fill_zero();
    for i in 0..n {
        dst.write(i, i, E::one());
    }
    apply_pivots(dst.rb_mut(), pivots);
    solve_unit_lower_triangular_in_place(lu, dst.rb_mut(), parallelism);
    solve_upper_triangular_in_place(lu, dst, parallelism);
}

/// Computes the inverse of the distributed matrix `A`, given its LU factors and the image `p` of
/// its row permutation.
///
/// The identity is permuted by `P`, then solved against `L` and `U`.
///
/// This is a collective over the whole grid.
pub fn dist_inverse<E: ComplexField>(
    lu: DistMatRef<'_, E, McMr>,
    p: DistMatRef<'_, usize, VcStar>,
    params: BlockParams,
) -> Result<DistMatrix<E, McMr>> {
    let n = lu.nrows();
    let mut inv = DistMatrix::<E, McMr>::zeros(lu.grid(), n, n);
    dist_inverse_into(inv.as_mut(), lu, p, params)?;
    Ok(inv)
}

/// Distributed counterpart of [`inverse_into`], writing the inverse into the existing matrix
/// `dst`.
///
/// This is a collective over the whole grid.
pub fn dist_inverse_into<E: ComplexField>(
    dst: DistMatMut<'_, E, McMr>,
    lu: DistMatRef<'_, E, McMr>,
    p: DistMatRef<'_, usize, VcStar>,
    params: BlockParams,
) -> Result<()> {
    const OP: &str = "partial_pivoting::dist_inverse_into";
    check_same_grid(OP, lu.grid(), dst.grid())?;
    check_shape(OP, lu.shape(), dst.shape())?;
    let mut dst = dst;
    dst.fill_identity();
    dist_solve_in_place(Orientation::Normal, lu, p, dst, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{
        c64,
        linalg::lu::partial_pivoting::{dist_lu_in_place, lu_in_place},
        perm::pivots_to_permutation,
        Grid,
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;

    fn assert_identity(prod: &Mat<c64>) {
        let n = prod.nrows();
        for j in 0..n {
            for i in 0..n {
                let target = if i == j { c64::one() } else { c64::zero() };
                assert_approx_eq!(prod.read(i, j), target, 1e-9);
            }
        }
    }

    #[test]
    fn local() {
        let mut rng = StdRng::seed_from_u64(0);
        for n in [1, 2, 9, 40] {
            let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
            let mut lu = a.clone();
            let mut pivots = vec![0; n];
            lu_in_place(lu.as_mut(), &mut pivots, Parallelism::None);
            let inv = inverse(lu.as_ref(), &pivots_to_permutation(&pivots, n), Parallelism::None);
            assert_identity(&(&a * &inv));

            let mut dst = Mat::from_fn(n, n, |_, _| c64::new(7.0, -7.0));
            inverse_into(dst.as_mut(), lu.as_ref(), &pivots, Parallelism::None);
            assert_identity(&(&a * &dst));
        }
    }

    #[test]
    fn dist() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 10;
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        for (h, w) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(h, w, |grid| {
                let mut lu = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let params = BlockParams::with_blocksize(3);
                let p = dist_lu_in_place(lu.as_mut(), params).unwrap();
                let inv = dist_inverse(lu.as_ref(), p.as_ref(), params).unwrap();
                assert_identity(&(&a * &inv.as_ref().gather()));

                let mut dst = DistMatrix::<c64, McMr>::from_fn(grid, n, n, |i, j| {
                    c64::new(i as f64, j as f64)
                });
                dist_inverse_into(dst.as_mut(), lu.as_ref(), p.as_ref(), params).unwrap();
                assert_identity(&(&a * &dst.as_ref().gather()));
            });
        }
    }
}
