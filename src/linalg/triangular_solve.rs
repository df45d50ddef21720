//! Triangular solve module.

use crate::{
    assert, debug_assert, linalg::matmul::matmul_with_conj, utils::thread::join_raw,
    ComplexField, Conj, MatMut, MatRef, Parallelism,
};
use reborrow::*;

#[inline]
fn blocksize(n: usize) -> usize {
    let base_rem = n / 2;
    n - if n >= 32 {
        (base_rem + 15) / 16 * 16
    } else if n >= 16 {
        (base_rem + 7) / 8 * 8
    } else {
        base_rem
    }
}

const RECURSION_THRESHOLD: usize = 8;

unsafe fn solve_lower_base_case<E: ComplexField>(
    tril: MatRef<'_, E>,
    conj_lhs: Conj,
    unit_diag: bool,
    mut rhs: MatMut<'_, E>,
) {
    let n = tril.nrows();
    for j in 0..rhs.ncols() {
        for i in 0..n {
            let mut acc = rhs.read_unchecked(i, j);
            for k in 0..i {
                acc -= conj_lhs.apply(tril.read_unchecked(i, k)) * rhs.read_unchecked(k, j);
            }
            if !unit_diag {
                acc = acc * conj_lhs.apply(tril.read_unchecked(i, i)).inv();
            }
            rhs.write_unchecked(i, j, acc);
        }
    }
}

unsafe fn solve_lower_triangular_in_place_unchecked<E: ComplexField>(
    tril: MatRef<'_, E>,
    conj_lhs: Conj,
    unit_diag: bool,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    let n = tril.nrows();
    let k = rhs.ncols();

    if k > 64 && n <= 128 {
        let (rhs_left, rhs_right) = rhs.split_at_col_mut(k / 2);
        join_raw(
            |_| {
                solve_lower_triangular_in_place_unchecked(
                    tril,
                    conj_lhs,
                    unit_diag,
                    rhs_left,
                    parallelism,
                )
            },
            |_| {
                solve_lower_triangular_in_place_unchecked(
                    tril,
                    conj_lhs,
                    unit_diag,
                    rhs_right,
                    parallelism,
                )
            },
            parallelism,
        );
        return;
    }

    debug_assert!(all(tril.nrows() == tril.ncols(), rhs.nrows() == tril.ncols()));

    if n <= RECURSION_THRESHOLD {
        solve_lower_base_case(tril, conj_lhs, unit_diag, rhs);
        return;
    }

    let bs = blocksize(n);

    let (tril_top_left, _, tril_bot_left, tril_bot_right) = tril.split_at(bs, bs);
    let (mut rhs_top, mut rhs_bot) = rhs.split_at_row_mut(bs);

    //       (A00    )   X0         (B0)
    // ConjA?(A10 A11)   X1 = ConjB?(B1)
    //
    // 1. ConjA?(A00) X0 = B0
    // 2. ConjA?(A11) X1 = B1 - ConjA?(A10) X0

    solve_lower_triangular_in_place_unchecked(
        tril_top_left,
        conj_lhs,
        unit_diag,
        rhs_top.rb_mut(),
        parallelism,
    );

    matmul_with_conj(
        rhs_bot.rb_mut(),
        tril_bot_left,
        conj_lhs,
        rhs_top.into_const(),
        Conj::No,
        Some(E::one()),
        -E::one(),
        parallelism,
    );

    solve_lower_triangular_in_place_unchecked(
        tril_bot_right,
        conj_lhs,
        unit_diag,
        rhs_bot,
        parallelism,
    );
}

/// Computes the solution of `Op_lhs(triangular_lower)×X = rhs`, and stores the result in
/// `rhs`.
///
/// `triangular_lower` is interpreted as a lower triangular matrix (diagonal included).
/// Its strictly upper triangular part is not accessed.
///
/// `Op_lhs` is the identity if `conj_lhs` is `Conj::No`, and the conjugation operation if it is
/// `Conj::Yes`.
///
/// # Panics
///
///  - Panics if `triangular_lower` is not a square matrix.
///  - Panics if `rhs.nrows() != triangular_lower.ncols()`
#[track_caller]
#[inline]
pub fn solve_lower_triangular_in_place_with_conj<E: ComplexField>(
    triangular_lower: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    assert!(all(
        triangular_lower.nrows() == triangular_lower.ncols(),
        rhs.nrows() == triangular_lower.ncols()
    ));
    unsafe {
        solve_lower_triangular_in_place_unchecked(
            triangular_lower,
            conj_lhs,
            false,
            rhs,
            parallelism,
        )
    }
}

/// Computes the solution of `Op_lhs(triangular_lower)×X = rhs`, and stores the result in
/// `rhs`.
///
/// `triangular_lower` is interpreted as a lower triangular matrix, and its diagonal elements are
/// implicitly considered to be `1.0`. Its diagonal and strictly upper triangular part are not
/// accessed.
#[track_caller]
#[inline]
pub fn solve_unit_lower_triangular_in_place_with_conj<E: ComplexField>(
    triangular_lower: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    assert!(all(
        triangular_lower.nrows() == triangular_lower.ncols(),
        rhs.nrows() == triangular_lower.ncols()
    ));
    unsafe {
        solve_lower_triangular_in_place_unchecked(
            triangular_lower,
            conj_lhs,
            true,
            rhs,
            parallelism,
        )
    }
}

/// Computes the solution of `Op_lhs(triangular_upper)×X = rhs`, and stores the result in
/// `rhs`.
///
/// `triangular_upper` is interpreted as an upper triangular matrix (diagonal included).
/// Its strictly lower triangular part is not accessed.
#[track_caller]
#[inline]
pub fn solve_upper_triangular_in_place_with_conj<E: ComplexField>(
    triangular_upper: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_lower_triangular_in_place_with_conj(
        triangular_upper.reverse_rows_and_cols(),
        conj_lhs,
        rhs.reverse_rows_mut(),
        parallelism,
    )
}

/// Computes the solution of `Op_lhs(triangular_upper)×X = rhs`, and stores the result in
/// `rhs`.
///
/// `triangular_upper` is interpreted as an upper triangular matrix, and its diagonal elements are
/// implicitly considered to be `1.0`.
#[track_caller]
#[inline]
pub fn solve_unit_upper_triangular_in_place_with_conj<E: ComplexField>(
    triangular_upper: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_unit_lower_triangular_in_place_with_conj(
        triangular_upper.reverse_rows_and_cols(),
        conj_lhs,
        rhs.reverse_rows_mut(),
        parallelism,
    )
}

#[track_caller]
#[inline]
pub fn solve_lower_triangular_in_place<E: ComplexField>(
    triangular_lower: MatRef<'_, E>,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_lower_triangular_in_place_with_conj(triangular_lower, Conj::No, rhs, parallelism)
}

#[track_caller]
#[inline]
pub fn solve_unit_lower_triangular_in_place<E: ComplexField>(
    triangular_lower: MatRef<'_, E>,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_unit_lower_triangular_in_place_with_conj(triangular_lower, Conj::No, rhs, parallelism)
}

#[track_caller]
#[inline]
pub fn solve_upper_triangular_in_place<E: ComplexField>(
    triangular_upper: MatRef<'_, E>,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_upper_triangular_in_place_with_conj(triangular_upper, Conj::No, rhs, parallelism)
}

#[track_caller]
#[inline]
pub fn solve_unit_upper_triangular_in_place<E: ComplexField>(
    triangular_upper: MatRef<'_, E>,
    rhs: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    solve_unit_upper_triangular_in_place_with_conj(triangular_upper, Conj::No, rhs, parallelism)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, c64, Mat};
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;

    #[test]
    fn lower_and_upper() {
        let mut rng = StdRng::seed_from_u64(0);
        for n in [0, 1, 3, 9, 40] {
            let k = 5;
            let tri = Mat::from_fn(n, n, |i, j| {
                if i == j {
                    2.0 + rng.gen::<f64>()
                } else {
                    rng.gen::<f64>() - 0.5
                }
            });
            let rhs = Mat::from_fn(n, k, |_, _| rng.gen::<f64>());

            for upper in [false, true] {
                for unit in [false, true] {
                    let mut sol = rhs.clone();
                    match (upper, unit) {
                        (false, false) => solve_lower_triangular_in_place(
                            tri.as_ref(),
                            sol.as_mut(),
                            Parallelism::None,
                        ),
                        (false, true) => solve_unit_lower_triangular_in_place(
                            tri.as_ref(),
                            sol.as_mut(),
                            Parallelism::None,
                        ),
                        (true, false) => solve_upper_triangular_in_place(
                            tri.as_ref(),
                            sol.as_mut(),
                            Parallelism::None,
                        ),
                        (true, true) => solve_unit_upper_triangular_in_place(
                            tri.as_ref(),
                            sol.as_mut(),
                            Parallelism::None,
                        ),
                    }
                    let t = Mat::from_fn(n, n, |i, j| {
                        if i == j && unit {
                            1.0
                        } else if (upper && i <= j) || (!upper && i >= j) {
                            tri.read(i, j)
                        } else {
                            0.0
                        }
                    });
                    let prod = &t * &sol;
                    for j in 0..k {
                        for i in 0..n {
                            assert_approx_eq!(prod.read(i, j), rhs.read(i, j), 1e-10);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn conjugated_lhs() {
        let n = 12;
        let tri = Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(3.0, 1.0)
            } else {
                c64::new(0.1 * i as f64, -0.2 * j as f64)
            }
        });
        let rhs = Mat::from_fn(n, 2, |i, j| c64::new(i as f64, j as f64));
        let mut sol = rhs.clone();
        solve_lower_triangular_in_place_with_conj(
            tri.as_ref(),
            Conj::Yes,
            sol.as_mut(),
            Parallelism::None,
        );
        let t = Mat::from_fn(n, n, |i, j| {
            if i >= j {
                tri.read(i, j).conj()
            } else {
                c64::new(0.0, 0.0)
            }
        });
        let prod = &t * &sol;
        for j in 0..2 {
            for i in 0..n {
                assert!((prod.read(i, j) - rhs.read(i, j)).norm() < 1e-10);
            }
        }
    }
}
