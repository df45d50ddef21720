//! Matrix sign function and the associated polar decomposition.
//!
//! For a square matrix $A$ with no eigenvalue on the imaginary axis, $\operatorname{sgn}(A)$
//! is the matrix with the same invariant subspaces as $A$, acting as $+1$ on the subspace of the
//! eigenvalues with positive real part and as $-1$ on the other one. Writing $S =
//! \operatorname{sgn}(A)$, we have $S^2 = I$, and $A = SN$ with $N = SA$.
//!
//! General matrices go through the scaled Newton iteration
//! $$X_{k+1} = \frac{\mu_k}{2} X_k + \frac{1}{2 \mu_k} X_k^{-1},$$
//! whose inverse is computed from a partial pivoting LU decomposition.
//!
//! Hermitian matrices go through their eigendecomposition $A = Z \Lambda Z^H$, which gives
//! $S = Z \operatorname{sgn}(\Lambda) Z^H$ and $N = Z |\Lambda| Z^H$. The sign of a zero
//! eigenvalue is taken to be $+1$.

use crate::{
    assert,
    dist::{dist_matmul, dist_matmul_with_orientation, dist_norm_frobenius, dist_norm_one, McMr},
    error::{check_same_grid, check_shape, check_square},
    get_global_parallelism,
    linalg::{
        evd::{dist_hermitian_evd, hermitian_evd, hermitian_evd_req, HermitianEigParams},
        lu::partial_pivoting::{
            determinant::{determinant_from_transpositions, dist_determinant},
            dist_lu_in_place,
            inverse::{dist_inverse_into, inverse_into},
            lu_in_place,
        },
        matmul::{matmul, matmul_with_conj},
        reductions::{norm_frobenius, norm_one},
    },
    BlockParams, ComplexField, Conj, DistMatMut, DistMatRef, DistMatrix, Mat, MatMut, MatRef,
    Orientation, Parallelism, RealField, Result, UpLo,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Scaling of the Newton iterates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SignScaling {
    /// $\mu = \sqrt{\|X^{-1}\|_F / \|X\|_F}$.
    #[default]
    Frobenius,
    /// $\mu = |\det X|^{-1/n}$.
    Determinant,
    /// $\mu = 1$.
    None,
}

/// Parameters of the Newton iteration.
#[derive(Copy, Clone, Debug)]
pub struct SignCtrl<R> {
    /// Maximum number of iterations. Reaching it is not an error.
    pub max_iters: usize,
    /// Convergence tolerance. Zero selects `n * epsilon`.
    pub tol: R,
    /// The iteration stops once
    /// $\|X_k - X_{k+1}\|_1 \le \|X_{k+1}\|_1^{1 + \text{power}} \cdot \text{tol}$.
    pub power: R,
    /// Scaling applied to every iterate before the Newton update.
    pub scaling: SignScaling,
    /// Logs the convergence of every iteration at the `info` level.
    pub progress: bool,
}

impl<R: RealField> Default for SignCtrl<R> {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tol: R::zero(),
            power: R::one(),
            scaling: SignScaling::Frobenius,
            progress: false,
        }
    }
}

impl<R: RealField> SignCtrl<R> {
    fn tolerance(&self, n: usize) -> R {
        if self.tol == R::zero() {
            R::from_f64(n as f64) * R::epsilon()
        } else {
            self.tol
        }
    }

    fn converged(&self, one_diff: R, one_new: R, tol: R) -> bool {
        one_diff / one_new <= one_new.powf(self.power) * tol
    }
}

// the first element is the current iterate
fn split_buffer<T>(buffer: &mut [T; 2], current: usize) -> (&T, &mut T) {
    let [first, second] = buffer;
    if current == 0 {
        (&*first, second)
    } else {
        (&*second, first)
    }
}

#[inline]
fn sgn<R: RealField>(value: R) -> R {
    if value >= R::zero() {
        R::one()
    } else {
        -R::one()
    }
}

/// Overwrites `x_new` with `mu / 2 * x + 1 / (2 mu) * inv`.
fn combine<E: ComplexField>(
    x: MatRef<'_, E>,
    inv: MatRef<'_, E>,
    mu: E::Real,
    x_new: MatMut<'_, E>,
) {
    let half = E::Real::from_f64(0.5);
    let (alpha, beta) = (mu * half, (mu + mu).inv());
    let mut x_new = x_new;
    for j in 0..x.ncols() {
        for i in 0..x.nrows() {
            let value = x.read(i, j).scale_real(alpha) + inv.read(i, j).scale_real(beta);
            x_new.write(i, j, value);
        }
    }
}

/// Overwrites `old` with `old - new`.
fn sub_in_place<E: ComplexField>(old: MatMut<'_, E>, new: MatRef<'_, E>) {
    let mut old = old;
    for j in 0..new.ncols() {
        for i in 0..new.nrows() {
            let value = old.read(i, j) - new.read(i, j);
            old.write(i, j, value);
        }
    }
}

/// Performs one scaled Newton step, writing the next iterate into `x_new`.
///
/// `x_new` first receives the LU factors of `x`, and `inv` the inverse of `x`.
fn newton_step<E: ComplexField>(
    x: MatRef<'_, E>,
    x_new: MatMut<'_, E>,
    inv: MatMut<'_, E>,
    pivots: &mut [usize],
    scaling: SignScaling,
) {
    let parallelism = get_global_parallelism();
    let (mut lu, mut inv) = (x_new, inv);
    lu.copy_from(x);
    let n_transpositions = lu_in_place(lu.rb_mut(), pivots, parallelism);
    inverse_into(inv.rb_mut(), lu.rb(), pivots, parallelism);

    let mu = match scaling {
        SignScaling::Frobenius => (norm_frobenius(inv.rb()) / norm_frobenius(x)).sqrt(),
        SignScaling::Determinant => {
            (-determinant_from_transpositions(lu.rb(), n_transpositions).kappa).exp()
        }
        SignScaling::None => E::Real::one(),
    };
    combine(x, inv.rb(), mu, lu);
}

fn newton<E: ComplexField>(a: MatRef<'_, E>, ctrl: SignCtrl<E::Real>) -> (Mat<E>, usize) {
    let n = a.nrows();
    if n == 0 {
        return (Mat::zeros(0, 0), 0);
    }
    let tol = ctrl.tolerance(n);

    // the iterates and the workspace are allocated once, outside of the loop
    let mut x = [a.to_owned(), Mat::zeros(n, n)];
    let mut inv = Mat::zeros(n, n);
    let mut pivots = vec![0usize; n];
    let mut current = 0;
    let mut iters = 0;
    while iters < ctrl.max_iters {
        iters += 1;
        let (old, new) = split_buffer(&mut x, current);
        newton_step(old.as_ref(), new.as_mut(), inv.as_mut(), &mut pivots, ctrl.scaling);
        current = 1 - current;

        // the previous iterate is not needed anymore, so it receives the difference
        let (new, old) = split_buffer(&mut x, current);
        sub_in_place(old.as_mut(), new.as_ref());
        let one_diff = norm_one(old.as_ref());
        let one_new = norm_one(new.as_ref());
        if ctrl.progress {
            log::info!(
                target: "plaid_sign",
                "after {} Newton iterations: one_diff={:?}, one_new={:?}, tol={:?}",
                iters,
                one_diff,
                one_new,
                tol
            );
        }
        if ctrl.converged(one_diff, one_new, tol) {
            break;
        }
    }

    let [first, second] = x;
    (if current == 0 { first } else { second }, iters)
}

/// Overwrites the square matrix `a` with its sign, and returns the number of Newton iterations
/// that were performed.
///
/// # Panics
/// Panics if `a` is not square.
#[track_caller]
pub fn sign<E: ComplexField>(a: MatMut<'_, E>, ctrl: SignCtrl<E::Real>) -> usize {
    assert!(a.nrows() == a.ncols());
    let mut a = a;
    let (s, iters) = newton(a.rb(), ctrl);
    a.copy_from(s.as_ref());
    iters
}

/// Overwrites the square matrix `a` with its sign `S`, and `n` with `S * a`, so that the original
/// matrix equals `S * n`. Returns the number of Newton iterations that were performed.
///
/// # Panics
/// Panics if `a` is not square or if `n` does not have the same shape.
#[track_caller]
pub fn sign_with_polar<E: ComplexField>(
    a: MatMut<'_, E>,
    n: MatMut<'_, E>,
    ctrl: SignCtrl<E::Real>,
) -> usize {
    assert!(all(a.nrows() == a.ncols(), n.shape() == a.shape()));
    let mut a = a;
    let (s, iters) = newton(a.rb(), ctrl);
    matmul(n, s.as_ref(), a.rb(), None, E::one(), get_global_parallelism());
    a.copy_from(s.as_ref());
    iters
}

/// Performs one step of the Newton-Schulz iteration: `x_tmp` is overwritten with $3I - X^2$ and
/// `x_new` with $\frac{1}{2} X (3I - X^2)$.
///
/// The iteration converges to the sign of `x` when $\|I - X^2\| < 1$.
#[track_caller]
pub fn newton_schulz_step<E: ComplexField>(
    x: MatRef<'_, E>,
    x_tmp: MatMut<'_, E>,
    x_new: MatMut<'_, E>,
    parallelism: Parallelism,
) {
    let n = x.nrows();
    assert!(all(x.ncols() == n, x_tmp.shape() == x.shape(), x_new.shape() == x.shape()));
    let mut x_tmp = x_tmp;
    matmul(x_tmp.rb_mut(), x, x, None, -E::one(), parallelism);
    let three = E::from_f64(3.0);
    for i in 0..n {
        let value = x_tmp.read(i, i) + three;
        x_tmp.write(i, i, value);
    }
    matmul(x_new, x, x_tmp.rb(), None, E::from_f64(0.5), parallelism);
}

fn dist_newton_step<E: ComplexField>(
    x: DistMatRef<'_, E, McMr>,
    x_new: DistMatMut<'_, E, McMr>,
    inv: DistMatMut<'_, E, McMr>,
    scaling: SignScaling,
    params: BlockParams,
) -> Result<()> {
    let (mut lu, mut inv) = (x_new, inv);
    lu.copy_from(x)?;
    let p = dist_lu_in_place(lu.rb_mut(), params)?;
    dist_inverse_into(inv.rb_mut(), lu.rb(), p.as_ref(), params)?;

    let mu = match scaling {
        SignScaling::Frobenius => {
            (dist_norm_frobenius(inv.rb()) / dist_norm_frobenius(x)).sqrt()
        }
        SignScaling::Determinant => (-dist_determinant(lu.rb(), p.as_ref())?.kappa).exp(),
        SignScaling::None => E::Real::one(),
    };

    // all three matrices have zero alignments
    combine(x.local(), inv.local(), mu, lu.local_mut());
    Ok(())
}

fn dist_newton<E: ComplexField>(
    a: DistMatRef<'_, E, McMr>,
    ctrl: SignCtrl<E::Real>,
    params: BlockParams,
) -> Result<(DistMatrix<E, McMr>, usize)> {
    let grid = a.grid();
    let n = a.nrows();
    if n == 0 {
        return Ok((DistMatrix::zeros(grid, 0, 0), 0));
    }
    let tol = ctrl.tolerance(n);
    let log_progress = ctrl.progress && grid.rank() == 0;

    let mut x = [a.redistribute::<McMr>(), DistMatrix::zeros(grid, n, n)];
    let mut inv = DistMatrix::<E, McMr>::zeros(grid, n, n);
    let mut current = 0;
    let mut iters = 0;
    while iters < ctrl.max_iters {
        iters += 1;
        let (old, new) = split_buffer(&mut x, current);
        dist_newton_step(old.as_ref(), new.as_mut(), inv.as_mut(), ctrl.scaling, params)?;
        current = 1 - current;

        let (new, old) = split_buffer(&mut x, current);
        sub_in_place(old.local_mut().as_mut(), new.local().as_ref());
        let one_diff = dist_norm_one(old.as_ref());
        let one_new = dist_norm_one(new.as_ref());
        if log_progress {
            log::info!(
                target: "plaid_sign",
                "after {} Newton iterations: one_diff={:?}, one_new={:?}, tol={:?}",
                iters,
                one_diff,
                one_new,
                tol
            );
        }
        // every process holds the same norms, so they all leave the loop together
        if ctrl.converged(one_diff, one_new, tol) {
            break;
        }
    }

    let [first, second] = x;
    Ok((if current == 0 { first } else { second }, iters))
}

/// Distributed counterpart of [`sign`].
///
/// This is a collective over the whole grid.
pub fn dist_sign<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    ctrl: SignCtrl<E::Real>,
    params: BlockParams,
) -> Result<usize> {
    check_square("dist_sign", a.shape())?;
    let mut a = a;
    let (s, iters) = dist_newton(a.rb(), ctrl, params)?;
    a.copy_from(s.as_ref())?;
    Ok(iters)
}

/// Distributed counterpart of [`sign_with_polar`].
///
/// This is a collective over the whole grid.
pub fn dist_sign_with_polar<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    n: DistMatMut<'_, E, McMr>,
    ctrl: SignCtrl<E::Real>,
    params: BlockParams,
) -> Result<usize> {
    const OP: &str = "dist_sign_with_polar";
    check_same_grid(OP, a.grid(), n.grid())?;
    check_square(OP, a.shape())?;
    check_shape(OP, a.shape(), n.shape())?;
    let mut a = a;
    let (s, iters) = dist_newton(a.rb(), ctrl, params)?;
    dist_matmul(n, s.as_ref(), a.rb(), None, E::one())?;
    a.copy_from(s.as_ref())?;
    Ok(iters)
}

/// Distributed counterpart of [`newton_schulz_step`].
///
/// This is a collective over the whole grid.
pub fn dist_newton_schulz_step<E: ComplexField>(
    x: DistMatRef<'_, E, McMr>,
    x_tmp: DistMatMut<'_, E, McMr>,
    x_new: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    const OP: &str = "dist_newton_schulz_step";
    check_square(OP, x.shape())?;
    let mut x_tmp = x_tmp;
    dist_matmul_with_orientation(
        x_tmp.rb_mut(),
        x,
        Orientation::Normal,
        x,
        Orientation::Normal,
        None,
        -E::one(),
        params,
    )?;
    x_tmp.shift_diagonal(E::from_f64(3.0));
    dist_matmul_with_orientation(
        x_new,
        x,
        Orientation::Normal,
        x_tmp.rb(),
        Orientation::Normal,
        None,
        E::from_f64(0.5),
        params,
    )
}

/// Returns the stack requirements for [`hermitian_sign`] and [`hermitian_sign_with_polar`].
pub fn hermitian_sign_req<E: ComplexField>(
    n: usize,
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    hermitian_evd_req::<E>(n, params)
}

fn scaled_cols<E: ComplexField>(z: &Mat<E>, scale: &[E::Real]) -> Mat<E> {
    Mat::from_fn(z.nrows(), z.ncols(), |i, j| z.read(i, j).scale_real(scale[j]))
}

fn hermitian_sign_impl<E: ComplexField>(
    uplo: UpLo,
    a: MatMut<'_, E>,
    n: Option<MatMut<'_, E>>,
    params: BlockParams,
    eig_params: HermitianEigParams,
    stack: PodStack<'_>,
) {
    let mut a = a;
    let parallelism = get_global_parallelism();
    let (eigs, z) = hermitian_evd(uplo, a.rb_mut(), params, eig_params, stack);

    let signs: Vec<E::Real> = eigs.iter().map(|&w| sgn(w)).collect();
    let zs = scaled_cols(&z, &signs);
    matmul_with_conj(
        a,
        zs.as_ref(),
        Conj::No,
        z.as_ref().transpose(),
        Conj::Yes,
        None,
        E::one(),
        parallelism,
    );

    if let Some(n) = n {
        let moduli: Vec<E::Real> = eigs.iter().map(|&w| w.abs()).collect();
        let za = scaled_cols(&z, &moduli);
        matmul_with_conj(
            n,
            za.as_ref(),
            Conj::No,
            z.as_ref().transpose(),
            Conj::Yes,
            None,
            E::one(),
            parallelism,
        );
    }
}

/// Overwrites the Hermitian matrix `a`, whose `uplo` triangle is referenced, with its sign. The
/// whole matrix is written.
///
/// # Panics
/// Panics if `a` is not square.
#[track_caller]
pub fn hermitian_sign<E: ComplexField>(
    uplo: UpLo,
    a: MatMut<'_, E>,
    params: BlockParams,
    eig_params: HermitianEigParams,
    stack: PodStack<'_>,
) {
    assert!(a.nrows() == a.ncols());
    hermitian_sign_impl(uplo, a, None, params, eig_params, stack);
}

/// Overwrites the Hermitian matrix `a`, whose `uplo` triangle is referenced, with its sign `S`,
/// and `n` with the positive semidefinite factor $N = Z |\Lambda| Z^H$, so that the original
/// matrix equals `S * n`.
///
/// # Panics
/// Panics if `a` is not square or if `n` does not have the same shape.
#[track_caller]
pub fn hermitian_sign_with_polar<E: ComplexField>(
    uplo: UpLo,
    a: MatMut<'_, E>,
    n: MatMut<'_, E>,
    params: BlockParams,
    eig_params: HermitianEigParams,
    stack: PodStack<'_>,
) {
    assert!(all(a.nrows() == a.ncols(), n.shape() == a.shape()));
    hermitian_sign_impl(uplo, a, Some(n), params, eig_params, stack);
}

fn dist_hermitian_sign_impl<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    n: Option<DistMatMut<'_, E, McMr>>,
    params: BlockParams,
    eig_params: HermitianEigParams,
) -> Result<()> {
    let mut a = a;
    let (eigs, z) = dist_hermitian_evd(uplo, a.rb_mut(), params, eig_params)?;

    let mut zs = z.clone();
    zs.as_mut().update_local(|_, j, value| value.scale_real(sgn(eigs[j])));
    dist_matmul_with_orientation(
        a,
        zs.as_ref(),
        Orientation::Normal,
        z.as_ref(),
        Orientation::Adjoint,
        None,
        E::one(),
        params,
    )?;

    if let Some(n) = n {
        let mut za = z.clone();
        za.as_mut().update_local(|_, j, value| value.scale_real(eigs[j].abs()));
        dist_matmul_with_orientation(
            n,
            za.as_ref(),
            Orientation::Normal,
            z.as_ref(),
            Orientation::Adjoint,
            None,
            E::one(),
            params,
        )?;
    }
    Ok(())
}

/// Distributed counterpart of [`hermitian_sign`].
///
/// This is a collective over the whole grid.
pub fn dist_hermitian_sign<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
    eig_params: HermitianEigParams,
) -> Result<()> {
    check_square("dist_hermitian_sign", a.shape())?;
    dist_hermitian_sign_impl(uplo, a, None, params, eig_params)
}

/// Distributed counterpart of [`hermitian_sign_with_polar`].
///
/// This is a collective over the whole grid.
pub fn dist_hermitian_sign_with_polar<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    n: DistMatMut<'_, E, McMr>,
    params: BlockParams,
    eig_params: HermitianEigParams,
) -> Result<()> {
    const OP: &str = "dist_hermitian_sign_with_polar";
    check_same_grid(OP, a.grid(), n.grid())?;
    check_square(OP, a.shape())?;
    check_shape(OP, a.shape(), n.shape())?;
    dist_hermitian_sign_impl(uplo, a, Some(n), params, eig_params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert, c64, linalg::lu::partial_pivoting::inverse::inverse,
        perm::pivots_to_permutation, Grid,
    };
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    fn assert_close(lhs: &Mat<c64>, rhs: &Mat<c64>, tol: f64) {
        assert!(lhs.shape() == rhs.shape());
        for j in 0..lhs.ncols() {
            for i in 0..lhs.nrows() {
                assert_approx_eq!(lhs.read(i, j), rhs.read(i, j), tol);
            }
        }
    }

    /// Returns `V * diag(eigs) * V^-1` and `V * diag(sgn(Re eigs)) * V^-1`.
    fn with_spectrum(rng: &mut StdRng, eigs: &[c64]) -> (Mat<c64>, Mat<c64>) {
        let n = eigs.len();
        let v = Mat::from_fn(n, n, |i, j| {
            let noise = c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5) * 0.2;
            if i == j {
                c64::one() + noise
            } else {
                noise
            }
        });
        let mut lu = v.clone();
        let mut pivots = vec![0; n];
        lu_in_place(lu.as_mut(), &mut pivots, Parallelism::None);
        let v_inv = inverse(lu.as_ref(), &pivots_to_permutation(&pivots, n), Parallelism::None);

        let diag = |f: &dyn Fn(c64) -> c64| Mat::from_fn(n, n, |i, j| {
            if i == j {
                f(eigs[i])
            } else {
                c64::zero()
            }
        });
        let a = &(&v * &diag(&|w| w)) * &v_inv;
        let s = &(&v * &diag(&|w| c64::new(sgn(w.re), 0.0))) * &v_inv;
        (a, s)
    }

    fn spectrum() -> Vec<c64> {
        vec![
            c64::new(3.0, 1.0),
            c64::new(-2.0, 0.5),
            c64::new(0.7, -2.0),
            c64::new(-0.4, 0.0),
            c64::new(5.0, 0.0),
            c64::new(-1.5, -1.0),
            c64::new(1.0, 0.0),
        ]
    }

    #[test]
    fn newton_converges() {
        let mut rng = StdRng::seed_from_u64(0);
        let (a, expected) = with_spectrum(&mut rng, &spectrum());
        let n = a.nrows();

        for scaling in [SignScaling::Frobenius, SignScaling::Determinant, SignScaling::None] {
            let ctrl = SignCtrl {
                scaling,
                ..Default::default()
            };
            let mut s = a.clone();
            let iters = sign(s.as_mut(), ctrl);
            assert!(iters > 0);
            assert_close(&s, &expected, 1e-8);
            assert_close(&(&s * &s), &Mat::identity(n, n), 1e-8);
            assert_close(&(&s * &a), &(&a * &s), 1e-8);
        }
    }

    #[test]
    fn polar_factor() {
        let mut rng = StdRng::seed_from_u64(1);
        let (a, expected) = with_spectrum(&mut rng, &spectrum());
        let n = a.nrows();
        let mut s = a.clone();
        let mut polar = Mat::zeros(n, n);
        sign_with_polar(s.as_mut(), polar.as_mut(), Default::default());
        assert_close(&s, &expected, 1e-8);
        assert_close(&(&s * &polar), &a, 1e-8);
    }

    #[test]
    fn iteration_cap_is_not_an_error() {
        let mut rng = StdRng::seed_from_u64(2);
        let (a, _) = with_spectrum(&mut rng, &spectrum());
        let ctrl = SignCtrl {
            max_iters: 2,
            scaling: SignScaling::None,
            ..Default::default()
        };
        let mut s = a.clone();
        assert!(sign(s.as_mut(), ctrl) == 2);
    }

    #[test]
    fn empty() {
        let mut a = Mat::<f64>::zeros(0, 0);
        assert!(sign(a.as_mut(), Default::default()) == 0);
    }

    #[test]
    fn newton_schulz() {
        let x = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 0.9,
            (1, 1) => -0.8,
            _ => 0.0,
        });
        let mut tmp = Mat::zeros(2, 2);
        let mut new = Mat::zeros(2, 2);
        newton_schulz_step(x.as_ref(), tmp.as_mut(), new.as_mut(), Parallelism::None);
        assert_approx_eq!(tmp.read(0, 0), 3.0 - 0.81, 1e-14);
        assert_approx_eq!(new.read(0, 0), 0.5 * 0.9 * (3.0 - 0.81), 1e-14);
        assert_approx_eq!(new.read(1, 1), 0.5 * -0.8 * (3.0 - 0.64), 1e-14);
        assert!(all(new.read(0, 1) == 0.0, new.read(1, 0) == 0.0));

        // fixed point
        let eye = Mat::<f64>::identity(3, 3);
        let mut tmp = Mat::zeros(3, 3);
        let mut new = Mat::zeros(3, 3);
        newton_schulz_step(eye.as_ref(), tmp.as_mut(), new.as_mut(), Parallelism::None);
        assert!(new == eye);
    }

    fn hermitian(rng: &mut StdRng, n: usize) -> Mat<c64> {
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let ah = a.adjoint();
        Mat::from_fn(n, n, |i, j| a.read(i, j) + ah.read(i, j))
    }

    #[test]
    fn hermitian_matches_newton() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 9;
        let a = hermitian(&mut rng, n);
        let params = BlockParams::with_blocksize(4);

        let mut newton_s = a.clone();
        sign(newton_s.as_mut(), Default::default());

        for uplo in [UpLo::Lower, UpLo::Upper] {
            let mut s = a.clone();
            let mut polar = Mat::zeros(n, n);
            hermitian_sign_with_polar(
                uplo,
                s.as_mut(),
                polar.as_mut(),
                params,
                Default::default(),
                PodStack::new(&mut GlobalPodBuffer::new(
                    hermitian_sign_req::<c64>(n, params).unwrap(),
                )),
            );
            assert_close(&s, &newton_s, 1e-8);
            assert_close(&s, &s.adjoint(), 1e-10);
            assert_close(&(&s * &polar), &a, 1e-10);
            assert_close(&polar, &polar.adjoint(), 1e-10);
        }
    }

    #[test]
    fn hermitian_zero_eigenvalue_is_positive() {
        let mut a = Mat::<f64>::zeros(3, 3);
        a.write(2, 2, -4.0);
        let params = BlockParams::default();
        hermitian_sign(
            UpLo::Lower,
            a.as_mut(),
            params,
            Default::default(),
            PodStack::new(&mut GlobalPodBuffer::new(
                hermitian_sign_req::<f64>(3, params).unwrap(),
            )),
        );
        for j in 0..3 {
            for i in 0..3 {
                let expected = match (i, j) {
                    (2, 2) => -1.0,
                    (i, j) if i == j => 1.0,
                    _ => 0.0,
                };
                assert_approx_eq!(a.read(i, j), expected, 1e-14);
            }
        }
    }

    #[test]
    fn dist_matches_local() {
        let mut rng = StdRng::seed_from_u64(4);
        let (a, _) = with_spectrum(&mut rng, &spectrum());
        let h = hermitian(&mut rng, 8);
        let x = Mat::from_fn(5, 5, |i, j| {
            let noise = c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5) * 0.1;
            if i == j {
                c64::one() + noise
            } else {
                noise
            }
        });
        let n = a.nrows();
        let params = BlockParams::with_blocksize(3);

        let mut s = a.clone();
        let mut polar = Mat::zeros(n, n);
        let iters = sign_with_polar(s.as_mut(), polar.as_mut(), Default::default());

        let mut hs = h.clone();
        let mut hpolar = Mat::zeros(8, 8);
        hermitian_sign_with_polar(
            UpLo::Upper,
            hs.as_mut(),
            hpolar.as_mut(),
            params,
            Default::default(),
            PodStack::new(&mut GlobalPodBuffer::new(
                hermitian_sign_req::<c64>(8, params).unwrap(),
            )),
        );

        let mut tmp = Mat::zeros(5, 5);
        let mut x_new = Mat::zeros(5, 5);
        newton_schulz_step(x.as_ref(), tmp.as_mut(), x_new.as_mut(), Parallelism::None);

        for (r, c) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(r, c, |grid| {
                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let mut d_polar = DistMatrix::<c64, McMr>::zeros(grid, n, n);
                let d_iters =
                    dist_sign_with_polar(d.as_mut(), d_polar.as_mut(), Default::default(), params)
                        .unwrap();
                assert!(d_iters.abs_diff(iters) <= 1);
                assert_close(&d.as_ref().gather(), &s, 1e-8);
                assert_close(&d_polar.as_ref().gather(), &polar, 1e-8);

                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let ctrl = SignCtrl {
                    scaling: SignScaling::Determinant,
                    progress: true,
                    ..Default::default()
                };
                dist_sign(d.as_mut(), ctrl, params).unwrap();
                assert_close(&d.as_ref().gather(), &s, 1e-8);

                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, h.as_ref());
                let mut d_polar = DistMatrix::<c64, McMr>::zeros(grid, 8, 8);
                dist_hermitian_sign_with_polar(
                    UpLo::Upper,
                    d.as_mut(),
                    d_polar.as_mut(),
                    params,
                    Default::default(),
                )
                .unwrap();
                assert_close(&d.as_ref().gather(), &hs, 1e-9);
                assert_close(&d_polar.as_ref().gather(), &hpolar, 1e-9);

                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, h.as_ref());
                dist_hermitian_sign(UpLo::Upper, d.as_mut(), params, Default::default())
                    .unwrap();
                assert_close(&d.as_ref().gather(), &hs, 1e-9);

                let d_x = DistMatrix::<c64, McMr>::from_replicated(grid, x.as_ref());
                let mut d_tmp = DistMatrix::<c64, McMr>::zeros(grid, 5, 5);
                let mut d_new = DistMatrix::<c64, McMr>::zeros(grid, 5, 5);
                dist_newton_schulz_step(d_x.as_ref(), d_tmp.as_mut(), d_new.as_mut(), params)
                    .unwrap();
                assert_close(&d_tmp.as_ref().gather(), &tmp, 1e-12);
                assert_close(&d_new.as_ref().gather(), &x_new, 1e-12);
            });
        }
    }
}
