//! Matrix multiplication.

use crate::{
    assert, utils::thread::join_raw, ComplexField, Conj, MatMut, MatRef, Parallelism,
};
use reborrow::*;

pub mod triangular;

const PARALLEL_THRESHOLD: usize = 48 * 48 * 48;

#[inline]
fn to_gemm_parallelism(parallelism: Parallelism) -> gemm::Parallelism {
    match parallelism {
        Parallelism::None => gemm::Parallelism::None,
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(0) => gemm::Parallelism::Rayon(rayon::current_num_threads()),
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(n_threads) => gemm::Parallelism::Rayon(n_threads),
    }
}

macro_rules! real_gemm {
    (
        $ty: ty,
        $acc: ident,
        $lhs: ident,
        $rhs: ident,
        $alpha: ident,
        $beta: ident,
        $parallelism: ident
    ) => {{
        let (m, n) = $acc.shape();
        let k = $lhs.ncols();
        let alpha: Option<$ty> = coe::coerce_static($alpha);
        let beta: $ty = coe::coerce_static($beta);
        unsafe {
            gemm::gemm(
                m,
                n,
                k,
                $acc.rb_mut().as_ptr_mut() as *mut $ty,
                $acc.col_stride(),
                $acc.row_stride(),
                alpha.is_some(),
                $lhs.as_ptr() as *const $ty,
                $lhs.col_stride(),
                $lhs.row_stride(),
                $rhs.as_ptr() as *const $ty,
                $rhs.col_stride(),
                $rhs.row_stride(),
                alpha.unwrap_or(0.0),
                beta,
                false,
                false,
                false,
                to_gemm_parallelism($parallelism),
            )
        };
    }};
}

fn matmul_naive<E: ComplexField>(
    mut acc: MatMut<'_, E>,
    lhs: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatRef<'_, E>,
    conj_rhs: Conj,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    let (m, n) = acc.shape();
    let k = lhs.ncols();

    if n >= 2 && m.saturating_mul(n).saturating_mul(k) >= PARALLEL_THRESHOLD {
        if let Parallelism::None = parallelism {
        } else {
            let (acc_left, acc_right) = acc.split_at_col_mut(n / 2);
            let (rhs_left, rhs_right) = rhs.split_at_col(n / 2);
            join_raw(
                |parallelism| {
                    matmul_naive(
                        acc_left, lhs, conj_lhs, rhs_left, conj_rhs, alpha, beta, parallelism,
                    )
                },
                |parallelism| {
                    matmul_naive(
                        acc_right, lhs, conj_lhs, rhs_right, conj_rhs, alpha, beta, parallelism,
                    )
                },
                parallelism,
            );
            return;
        }
    }

    for j in 0..n {
        for i in 0..m {
            let v = match alpha {
                Some(alpha) => alpha * unsafe { acc.read_unchecked(i, j) },
                None => E::zero(),
            };
            unsafe { acc.write_unchecked(i, j, v) };
        }
        for depth in 0..k {
            let r = beta * conj_rhs.apply(unsafe { rhs.read_unchecked(depth, j) });
            if r == E::zero() {
                continue;
            }
            for i in 0..m {
                unsafe {
                    let l = conj_lhs.apply(lhs.read_unchecked(i, depth));
                    let v = acc.read_unchecked(i, j) + l * r;
                    acc.write_unchecked(i, j, v);
                }
            }
        }
    }
}

/// Computes the matrix product `[alpha * acc] + beta * op(lhs) * op(rhs)` and stores the result
/// in `acc`, where `op` optionally conjugates its argument.
///
/// Performs the operation:
/// - `acc = beta * op(lhs) * op(rhs)` if `alpha` is `None` (in this case, the preexisting values
///   in `acc` are not read, so it is allowed to be a view over uninitialized values).
/// - `acc = alpha * acc + beta * op(lhs) * op(rhs)` if `alpha` is `Some(_)`,
///
/// # Panics
///
/// Panics if the matrix dimensions are not compatible for matrix multiplication.
/// i.e.  
///  - `acc.nrows() == lhs.nrows()`
///  - `acc.ncols() == rhs.ncols()`
///  - `lhs.ncols() == rhs.nrows()`
#[track_caller]
pub fn matmul_with_conj<E: ComplexField>(
    mut acc: MatMut<'_, E>,
    lhs: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatRef<'_, E>,
    conj_rhs: Conj,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    assert!(all(
        acc.nrows() == lhs.nrows(),
        acc.ncols() == rhs.ncols(),
        lhs.ncols() == rhs.nrows()
    ));

    let (m, n) = acc.shape();
    if m == 0 || n == 0 {
        return;
    }
    if lhs.ncols() == 0 {
        match alpha {
            Some(alpha) => acc.scale(alpha),
            None => acc.fill_zero(),
        }
        return;
    }

    if coe::is_same::<E, f64>() {
        real_gemm!(f64, acc, lhs, rhs, alpha, beta, parallelism);
        return;
    }
    if coe::is_same::<E, f32>() {
        real_gemm!(f32, acc, lhs, rhs, alpha, beta, parallelism);
        return;
    }

    matmul_naive(acc, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
}

/// Computes the matrix product `[alpha * acc] + beta * lhs * rhs` and stores the result in
/// `acc`.
///
/// See [`matmul_with_conj`].
#[track_caller]
#[inline]
pub fn matmul<E: ComplexField>(
    acc: MatMut<'_, E>,
    lhs: MatRef<'_, E>,
    rhs: MatRef<'_, E>,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    matmul_with_conj(acc, lhs, Conj::No, rhs, Conj::No, alpha, beta, parallelism)
}
