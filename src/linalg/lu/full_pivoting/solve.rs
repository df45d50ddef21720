use crate::{
    assert,
    dist::{
        dist_image_to_permutation, dist_permute_rows_with, dist_solve_triangular_in_place, McMr,
        VcStar,
    },
    error::{check_same_grid, check_shape, check_square},
    linalg::triangular_solve::{
        solve_lower_triangular_in_place_with_conj, solve_unit_lower_triangular_in_place,
        solve_unit_upper_triangular_in_place_with_conj, solve_upper_triangular_in_place,
    },
    perm::{permute_rows_in_place, Perm},
    BlockParams, ComplexField, Diag, DistMatMut, DistMatRef, MatMut, MatRef, Orientation,
    Parallelism, Result, UpLo,
};
use reborrow::*;

/// Solves `op(A) * X = rhs` in place, where `op` is selected by `orientation`, given the LU
/// factors of `A` and the permutations `P` and `Q` such that $PAQ^\top = LU$.
///
/// # Panics
/// Panics if `lu` is not square, or if `rhs` or either permutation do not match its dimension.
#[track_caller]
pub fn solve_in_place<E: ComplexField>(
    orientation: Orientation,
    lu: MatRef<'_, E>,
    row_perm: &Perm,
    col_perm: &Perm,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    let n = lu.nrows();
    assert!(all(
        lu.ncols() == n,
        rhs.nrows() == n,
        row_perm.len() == n,
        col_perm.len() == n,
    ));
    let mut rhs = rhs;
    match orientation {
        Orientation::Normal => {
            // A = P^T L U Q
            permute_rows_in_place(rhs.rb_mut(), row_perm);
            solve_unit_lower_triangular_in_place(lu, rhs.rb_mut(), parallelism);
            solve_upper_triangular_in_place(lu, rhs.rb_mut(), parallelism);
            permute_rows_in_place(rhs, &col_perm.inverse());
        }
        Orientation::Transpose | Orientation::Adjoint => {
            // op(A) = Q^T op(U) op(L) P
            let conj = orientation.conj();
            permute_rows_in_place(rhs.rb_mut(), col_perm);
            solve_lower_triangular_in_place_with_conj(
                lu.transpose(),
                conj,
                rhs.rb_mut(),
                parallelism,
            );
            solve_unit_upper_triangular_in_place_with_conj(
                lu.transpose(),
                conj,
                rhs.rb_mut(),
                parallelism,
            );
            permute_rows_in_place(rhs, &row_perm.inverse());
        }
    }
}

/// Solves `op(A) * X = rhs` in place, given the distributed LU factors of `A` and the images `p`
/// and `q` returned by [`dist_lu_in_place`](super::dist_lu_in_place).
///
/// This is a collective over the whole grid.
pub fn dist_solve_in_place<E: ComplexField>(
    orientation: Orientation,
    lu: DistMatRef<'_, E, McMr>,
    p: DistMatRef<'_, usize, VcStar>,
    q: DistMatRef<'_, usize, VcStar>,
    rhs: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    const OP: &str = "full_pivoting::dist_solve_in_place";
    check_same_grid(OP, lu.grid(), rhs.grid())?;
    check_same_grid(OP, lu.grid(), p.grid())?;
    check_same_grid(OP, lu.grid(), q.grid())?;
    check_square(OP, lu.shape())?;
    check_shape(OP, (lu.nrows(), 1), p.shape())?;
    check_shape(OP, (lu.nrows(), 1), q.shape())?;
    check_shape(OP, (lu.nrows(), rhs.ncols()), rhs.shape())?;

    let row_perm = dist_image_to_permutation(p);
    let col_perm = dist_image_to_permutation(q);
    let mut rhs = rhs;
    match orientation {
        Orientation::Normal => {
            dist_permute_rows_with(rhs.rb_mut(), &row_perm);
            dist_solve_triangular_in_place(
                UpLo::Lower,
                orientation,
                Diag::Unit,
                lu,
                rhs.rb_mut(),
                params,
            )?;
            dist_solve_triangular_in_place(
                UpLo::Upper,
                orientation,
                Diag::NonUnit,
                lu,
                rhs.rb_mut(),
                params,
            )?;
            dist_permute_rows_with(rhs, &col_perm.inverse());
        }
        Orientation::Transpose | Orientation::Adjoint => {
            dist_permute_rows_with(rhs.rb_mut(), &col_perm);
            dist_solve_triangular_in_place(
                UpLo::Upper,
                orientation,
                Diag::NonUnit,
                lu,
                rhs.rb_mut(),
                params,
            )?;
            dist_solve_triangular_in_place(
                UpLo::Lower,
                orientation,
                Diag::Unit,
                lu,
                rhs.rb_mut(),
                params,
            )?;
            dist_permute_rows_with(rhs, &row_perm.inverse());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert,
        c64,
        linalg::lu::full_pivoting::{dist_lu_in_place, lu_in_place},
        mat,
        perm::pivots_to_permutation,
        DistMatrix, Grid, Mat,
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;

    const ORIENTATIONS: [Orientation; 3] =
        [Orientation::Normal, Orientation::Transpose, Orientation::Adjoint];

    fn op(a: &Mat<c64>, orientation: Orientation) -> Mat<c64> {
        match orientation {
            Orientation::Normal => a.clone(),
            Orientation::Transpose => a.transpose().to_owned(),
            Orientation::Adjoint => a.adjoint(),
        }
    }

    fn factor(a: &Mat<c64>) -> (Mat<c64>, Perm, Perm) {
        let n = a.nrows();
        let mut lu = a.clone();
        let mut row_pivots = vec![0; n];
        let mut col_pivots = vec![0; n];
        lu_in_place(lu.as_mut(), &mut row_pivots, &mut col_pivots, Parallelism::None);
        (
            lu,
            pivots_to_permutation(&row_pivots, n),
            pivots_to_permutation(&col_pivots, n),
        )
    }

    #[test]
    fn column_exchange_is_undone() {
        // the pivot of the first step sits off the diagonal, so both permutations are nontrivial
        let a = mat![[1.0, 2.0], [3.0, 8.0f64]];
        let mut lu = a.clone();
        let mut row_pivots = [0; 2];
        let mut col_pivots = [0; 2];
        lu_in_place(lu.as_mut(), &mut row_pivots, &mut col_pivots, Parallelism::None);
        let row_perm = pivots_to_permutation(&row_pivots, 2);
        let col_perm = pivots_to_permutation(&col_pivots, 2);

        let mut x = mat![[5.0], [19.0f64]];
        solve_in_place(
            Orientation::Normal,
            lu.as_ref(),
            &row_perm,
            &col_perm,
            x.as_mut(),
            Parallelism::None,
        );
        assert_approx_eq!(x.read(0, 0), 1.0, 1e-12);
        assert_approx_eq!(x.read(1, 0), 2.0, 1e-12);
    }

    #[test]
    fn solve() {
        let mut rng = StdRng::seed_from_u64(0);
        for n in [1, 4, 23, 40] {
            let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
            let b = Mat::from_fn(n, 3, |_, _| c64::new(rng.gen(), rng.gen()));
            let (lu, row_perm, col_perm) = factor(&a);

            for orientation in ORIENTATIONS {
                let mut x = b.clone();
                solve_in_place(
                    orientation,
                    lu.as_ref(),
                    &row_perm,
                    &col_perm,
                    x.as_mut(),
                    Parallelism::None,
                );
                let ax = &op(&a, orientation) * &x;
                for j in 0..3 {
                    for i in 0..n {
                        assert_approx_eq!(ax.read(i, j), b.read(i, j), 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn dist_solve() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 11;
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let b = Mat::from_fn(n, 4, |_, _| c64::new(rng.gen(), rng.gen()));

        for (h, w) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(h, w, |grid| {
                let mut lu = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let params = BlockParams::with_blocksize(4);
                let (p, q) = dist_lu_in_place(lu.as_mut()).unwrap();

                for orientation in ORIENTATIONS {
                    let mut x = DistMatrix::<c64, McMr>::from_replicated(grid, b.as_ref());
                    dist_solve_in_place(
                        orientation,
                        lu.as_ref(),
                        p.as_ref(),
                        q.as_ref(),
                        x.as_mut(),
                        params,
                    )
                    .unwrap();
                    let ax = &op(&a, orientation) * &x.as_ref().gather();
                    for j in 0..4 {
                        for i in 0..n {
                            assert_approx_eq!(ax.read(i, j), b.read(i, j), 1e-9);
                        }
                    }
                }
            });
        }
    }

    #[test]
    fn dist_shape_mismatch() {
        Grid::run(1, 2, |grid| {
            let mut lu = DistMatrix::<f64, McMr>::identity(grid, 3, 3);
            let (p, q) = dist_lu_in_place(lu.as_mut()).unwrap();
            let mut x = DistMatrix::<f64, McMr>::zeros(grid, 4, 2);
            let err = dist_solve_in_place(
                Orientation::Normal,
                lu.as_ref(),
                p.as_ref(),
                q.as_ref(),
                x.as_mut(),
                Default::default(),
            );
            assert!(err.is_err());
        });
    }
}
