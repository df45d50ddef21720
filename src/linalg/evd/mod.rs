//! Hermitian eigenvalue decomposition, used by the Hermitian sign function.
//!
//! The matrix is first reduced to a real symmetric tridiagonal matrix $T = Q^H A Q$ with
//! [`tridiag`](crate::linalg::condense::tridiag). The eigendecomposition $T = U \Lambda U^\top$ is
//! then computed with the implicit symmetric QR algorithm with Wilkinson shifts, and the
//! eigenvectors of `A` are $Z = QU$.
//!
//! In the distributed case the tridiagonal problem is small enough to be solved redundantly on
//! every process, so that only the reduction and the application of `Q` are distributed.

use crate::{
    dist::McMr,
    error::check_square,
    linalg::condense::tridiag,
    BlockParams, ComplexField, DistMatMut, DistMatrix, Mat, MatMut, RealField, Result, UpLo,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Parameters of the tridiagonal QR algorithm.
#[derive(Copy, Clone, Debug)]
pub struct HermitianEigParams {
    /// The iteration stops after `max_iters_factor * n` implicit QR steps, even if some
    /// off-diagonal entries have not converged.
    pub max_iters_factor: usize,
}

impl Default for HermitianEigParams {
    fn default() -> Self {
        Self {
            max_iters_factor: 30,
        }
    }
}

/// Plane rotation `[c, s; -s, c]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JacobiRotation<R> {
    pub c: R,
    pub s: R,
}

impl<R: RealField> JacobiRotation<R> {
    /// Returns the rotation `G` such that $G^\top (p, q)^\top = (r, 0)^\top$.
    pub fn make_givens(p: R, q: R) -> Self {
        if q == R::zero() {
            Self {
                c: if p < R::zero() { -R::one() } else { R::one() },
                s: R::zero(),
            }
        } else if p == R::zero() {
            Self {
                c: R::zero(),
                s: if q < R::zero() { R::one() } else { -R::one() },
            }
        } else if p.abs() > q.abs() {
            let t = q / p;
            let mut u = (R::one() + t * t).sqrt();
            if p < R::zero() {
                u = -u;
            }
            let c = u.inv();
            let s = -t * c;
            Self { c, s }
        } else {
            let t = p / q;
            let mut u = (R::one() + t * t).sqrt();
            if q < R::zero() {
                u = -u;
            }
            let s = -u.inv();
            let c = -t * s;
            Self { c, s }
        }
    }

    /// Applies the rotation to columns `a` and `b` of `mat` from the right.
    pub fn apply_on_the_right<E: ComplexField<Real = R>>(
        &self,
        mat: MatMut<'_, E>,
        a: usize,
        b: usize,
    ) {
        let Self { c, s } = *self;
        if c == R::one() && s == R::zero() {
            return;
        }
        let mut mat = mat;
        for i in 0..mat.nrows() {
            let x = mat.read(i, a);
            let y = mat.read(i, b);
            mat.write(i, a, x.scale_real(c) - y.scale_real(s));
            mat.write(i, b, x.scale_real(s) + y.scale_real(c));
        }
    }
}

/// Computes the eigendecomposition of the real symmetric tridiagonal matrix with diagonal `diag`
/// and off-diagonal `offdiag`, with the implicit QR algorithm.
///
/// On exit, `diag` holds the eigenvalues in increasing order and `offdiag` is overwritten. If
/// `u` is provided, it is overwritten with the orthogonal matrix of eigenvectors.
///
/// Returns the number of QR steps that were performed.
///
/// # Panics
/// Panics if `offdiag.len() + 1 != diag.len()` (for a nonempty `diag`), or if `u` is not
/// `n×n`.
#[track_caller]
pub fn tridiag_qr<R: RealField>(
    diag: &mut [R],
    offdiag: &mut [R],
    u: Option<MatMut<'_, R>>,
    params: HermitianEigParams,
) -> usize {
    let n = diag.len();
    crate::assert!(offdiag.len() == n.saturating_sub(1));
    let mut u = u;
    if let Some(u) = u.rb_mut() {
        crate::assert!(all(u.nrows() == n, u.ncols() == n));
        let mut u = u;
        for j in 0..n {
            for i in 0..n {
                u.write(i, j, if i == j { R::one() } else { R::zero() });
            }
        }
    }
    if n <= 1 {
        return 0;
    }

    let epsilon = R::epsilon();
    let consider_zero = R::safe_min();
    let max_iters = params.max_iters_factor.saturating_mul(n);
    let half = R::from_f64(0.5);

    let mut end = n - 1;
    let mut iter = 0;
    while end > 0 {
        for i in 0..end {
            let e = offdiag[i].abs();
            if e < consider_zero || e <= epsilon * (diag[i].abs() + diag[i + 1].abs()) {
                offdiag[i] = R::zero();
            }
        }
        while end > 0 && offdiag[end - 1] == R::zero() {
            end -= 1;
        }
        if end == 0 {
            break;
        }
        if iter == max_iters {
            log::warn!(
                target: "plaid_evd",
                "tridiagonal QR stopped after {} steps with {} unconverged entries",
                iter,
                end
            );
            break;
        }
        iter += 1;

        let mut start = end - 1;
        while start > 0 && offdiag[start - 1] != R::zero() {
            start -= 1;
        }

        // Wilkinson shift
        let td = (diag[end - 1] - diag[end]) * half;
        let e = offdiag[end - 1];
        let mut mu = diag[end];
        if td == R::zero() {
            mu -= e.abs();
        } else if e != R::zero() {
            let h = td.hypot(e);
            let h = if td > R::zero() { h } else { -h };
            let e2 = e * e;
            if e2 == R::zero() {
                mu -= e / ((td + h) / e);
            } else {
                mu -= e2 / (td + h);
            }
        }

        let mut x = diag[start] - mu;
        let mut z = offdiag[start];
        let mut k = start;
        while k < end && z != R::zero() {
            let rot = JacobiRotation::make_givens(x, z);
            let (c, s) = (rot.c, rot.s);

            // T = G^T T G
            let sdk = s * diag[k] + c * offdiag[k];
            let dkp1 = s * offdiag[k] + c * diag[k + 1];
            diag[k] = c * (c * diag[k] - s * offdiag[k]) - s * (c * offdiag[k] - s * diag[k + 1]);
            diag[k + 1] = s * sdk + c * dkp1;
            offdiag[k] = c * sdk - s * dkp1;
            if k > start {
                offdiag[k - 1] = c * offdiag[k - 1] - s * z;
            }

            x = offdiag[k];
            if k + 1 < end {
                z = -s * offdiag[k + 1];
                offdiag[k + 1] = c * offdiag[k + 1];
            }

            if let Some(u) = u.rb_mut() {
                rot.apply_on_the_right(u, k, k + 1);
            }
            k += 1;
        }
    }

    // selection sort, so that the eigenvectors are swapped along
    for i in 0..n - 1 {
        let mut min_idx = i;
        for k in i + 1..n {
            if diag[k] < diag[min_idx] {
                min_idx = k;
            }
        }
        if min_idx != i {
            diag.swap(i, min_idx);
            if let Some(mut u) = u.rb_mut() {
                u.swap_cols(i, min_idx);
            }
        }
    }
    iter
}

/// Returns the stack requirements for [`hermitian_evd`].
pub fn hermitian_evd_req<E: ComplexField>(
    n: usize,
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    tridiag::apply_q_req::<E>(crate::Side::Left, (n, n), params)
}

/// Computes the eigendecomposition $A = Z \Lambda Z^H$ of the Hermitian matrix `a`, whose `uplo`
/// triangle is referenced, and returns the eigenvalues in increasing order together with `Z`.
///
/// `a` is used as workspace and overwritten.
#[track_caller]
pub fn hermitian_evd<E: ComplexField>(
    uplo: UpLo,
    a: MatMut<'_, E>,
    params: BlockParams,
    eig_params: HermitianEigParams,
    stack: PodStack<'_>,
) -> (Vec<E::Real>, Mat<E>) {
    let n = a.nrows();
    let mut a = a;
    let mut t = vec![E::zero(); n.saturating_sub(1)];
    tridiag::reduce_in_place(uplo, a.rb_mut(), &mut t, params);

    let (mut diag, mut offdiag) = tridiag::diagonals(a.rb());
    let mut u = Mat::<E::Real>::zeros(n, n);
    tridiag_qr(&mut diag, &mut offdiag, Some(u.as_mut()), eig_params);

    let mut z = Mat::from_fn(n, n, |i, j| E::from_real(u.read(i, j)));
    tridiag::apply_q(
        crate::Side::Left,
        crate::Orientation::Normal,
        a.rb(),
        &t,
        z.as_mut(),
        params,
        stack,
    );
    (diag, z)
}

/// Distributed counterpart of [`hermitian_evd`]. The eigenvalues are replicated on every
/// process.
///
/// This is a collective over the whole grid.
pub fn dist_hermitian_evd<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
    eig_params: HermitianEigParams,
) -> Result<(Vec<E::Real>, DistMatrix<E, McMr>)> {
    check_square("dist_hermitian_evd", a.shape())?;
    let n = a.nrows();
    let mut a = a;
    let t = tridiag::dist_reduce_in_place(uplo, a.rb_mut(), params)?;

    // every process solves the same tridiagonal problem
    let (mut diag, mut offdiag) = tridiag::dist_diagonals(a.rb());
    let mut u = Mat::<E::Real>::zeros(n, n);
    tridiag_qr(&mut diag, &mut offdiag, Some(u.as_mut()), eig_params);

    let grid = a.grid();
    let mut z = DistMatrix::<E, McMr>::from_fn(grid, n, n, |i, j| E::from_real(u.read(i, j)));
    tridiag::dist_apply_q(
        crate::Side::Left,
        crate::Orientation::Normal,
        a.rb(),
        &t,
        z.as_mut(),
        params,
    )?;
    Ok((diag, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, c64, Grid};
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    #[track_caller]
    fn check_tridiag(diag: &[f64], offdiag: &[f64]) {
        let n = diag.len();
        let mut u = Mat::from_fn(n, n, |_, _| f64::NAN);
        let mut eigs = diag.to_vec();
        let mut e = offdiag.to_vec();
        tridiag_qr(&mut eigs, &mut e, Some(u.as_mut()), Default::default());

        for i in 1..n {
            assert!(eigs[i - 1] <= eigs[i]);
        }
        let s = Mat::from_fn(n, n, |i, j| if i == j { eigs[i] } else { 0.0 });
        let reconstructed = &(&u * &s) * &u.transpose().to_owned();
        for j in 0..n {
            for i in 0..n {
                let target = if i == j {
                    diag[j]
                } else if i == j + 1 {
                    offdiag[j]
                } else if j == i + 1 {
                    offdiag[i]
                } else {
                    0.0
                };
                assert_approx_eq!(reconstructed.read(i, j), target, 1e-13);
            }
        }
    }

    #[test]
    fn tridiag_2x2() {
        check_tridiag(&[1.0, 1.0], &[0.0]);
        check_tridiag(&[1.0, 1.0], &[0.5213289]);
    }

    #[test]
    fn tridiag_decoupled_blocks() {
        check_tridiag(&[1.79069356, 1.20930644, 1.0], &[-4.06813537e-01, 0.0]);
        check_tridiag(
            &[1.95069537, 2.44845332, 2.56957029, 3.03128102, 1.0],
            &[-7.02200909e-01, -1.11661820e+00, -6.81418803e-01, 0.0],
        );
    }

    #[test]
    fn tridiag_wilkinson() {
        check_tridiag(&[3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0], &[1.0; 6]);
    }

    #[test]
    fn tridiag_glued_wilkinson() {
        let x = 1e-6;
        check_tridiag(
            &[3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0],
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, x, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        );
    }

    #[test]
    fn tridiag_without_vectors() {
        let mut diag = [2.0, 2.0];
        let mut offdiag = [1.0];
        tridiag_qr(&mut diag, &mut offdiag, None, Default::default());
        assert_approx_eq!(diag[0], 1.0, 1e-14);
        assert_approx_eq!(diag[1], 3.0, 1e-14);
    }

    #[test]
    fn givens_zeroes_second_entry() {
        for (p, q) in [(3.0, 4.0), (-3.0, 4.0), (0.0, -2.0), (5.0, 0.0), (1e-3, -7.0)] {
            let rot = JacobiRotation::make_givens(p, q);
            // G^T (p, q)
            let second = rot.s * p + rot.c * q;
            assert_approx_eq!(second, 0.0, 1e-14);
            assert_approx_eq!(rot.c * rot.c + rot.s * rot.s, 1.0, 1e-14);
        }
    }

    fn hermitian(rng: &mut StdRng, n: usize) -> Mat<c64> {
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let ah = a.adjoint();
        Mat::from_fn(n, n, |i, j| a.read(i, j) + ah.read(i, j))
    }

    fn reconstruct(eigs: &[f64], z: &Mat<c64>) -> Mat<c64> {
        let n = eigs.len();
        let s = Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(eigs[i], 0.0)
            } else {
                c64::zero()
            }
        });
        &(z * &s) * &z.adjoint()
    }

    #[test]
    fn hermitian_reconstructs() {
        let mut rng = StdRng::seed_from_u64(0);
        for n in [0, 1, 2, 7, 20] {
            let a = hermitian(&mut rng, n);
            let params = BlockParams::with_blocksize(4);
            let mut work = a.clone();
            let (eigs, z) = hermitian_evd(
                UpLo::Lower,
                work.as_mut(),
                params,
                Default::default(),
                PodStack::new(&mut GlobalPodBuffer::new(
                    hermitian_evd_req::<c64>(n, params).unwrap(),
                )),
            );
            let r = reconstruct(&eigs, &z);
            for j in 0..n {
                for i in 0..n {
                    assert_approx_eq!(r.read(i, j), a.read(i, j), 1e-10);
                }
            }
        }
    }

    #[test]
    fn dist_matches_local() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 10;
        let a = hermitian(&mut rng, n);
        let params = BlockParams::with_blocksize(3);
        let mut work = a.clone();
        let (eigs, _) = hermitian_evd(
            UpLo::Upper,
            work.as_mut(),
            params,
            Default::default(),
            PodStack::new(&mut GlobalPodBuffer::new(
                hermitian_evd_req::<c64>(n, params).unwrap(),
            )),
        );

        for (r, c) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(r, c, |grid| {
                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let (d_eigs, z) =
                    dist_hermitian_evd(UpLo::Upper, d.as_mut(), params, Default::default())
                        .unwrap();
                for (x, y) in d_eigs.iter().zip(&eigs) {
                    assert_approx_eq!(*x, *y, 1e-10);
                }
                let rec = reconstruct(&d_eigs, &z.as_ref().gather());
                for j in 0..n {
                    for i in 0..n {
                        assert_approx_eq!(rec.read(i, j), a.read(i, j), 1e-10);
                    }
                }
            });
        }
    }
}
