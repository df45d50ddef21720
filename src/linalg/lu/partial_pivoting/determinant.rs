use crate::{
    assert,
    dist::{dist_image_to_permutation, McMr, VcStar},
    error::{check_same_grid, check_shape, check_square},
    perm::Perm,
    ComplexField, DistMatRef, MatRef, RealField, Result,
};

/// Product of `n` values kept in a form that does not overflow: the value is
/// `rho * exp(kappa * n)`, where `rho` has unit modulus (or is zero) and `kappa` is the mean of
/// the logarithms of the moduli.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SafeProduct<E: ComplexField> {
    pub rho: E,
    pub kappa: E::Real,
    pub n: usize,
}

impl<E: ComplexField> SafeProduct<E> {
    /// Evaluates the product, which may overflow or underflow.
    pub fn value(&self) -> E {
        let n = E::Real::from_f64(self.n as f64);
        self.rho.scale_real((self.kappa * n).exp())
    }

    fn from_parts(log_sum: E::Real, phase: E, singular: bool, odd: bool, n: usize) -> Self {
        if singular {
            return Self {
                rho: E::zero(),
                kappa: E::Real::zero(),
                n,
            };
        }
        let rho = if odd { -phase } else { phase };
        let kappa = if n == 0 {
            E::Real::zero()
        } else {
            log_sum * E::Real::from_f64(n as f64).inv()
        };
        Self { rho, kappa, n }
    }
}

fn accumulate<E: ComplexField>(
    (log_sum, phase, singular): (E::Real, E, bool),
    u: E,
) -> (E::Real, E, bool) {
    if singular || u == E::zero() {
        return (log_sum, phase, true);
    }
    let abs = u.abs();
    (log_sum + abs.ln(), phase * u.scale_real(abs.inv()), false)
}

/// Computes the determinant of `A` as a [`SafeProduct`], given its LU factors and the
/// permutation `P` such that $PA = LU$.
///
/// # Panics
/// Panics if `lu` is not square.
#[track_caller]
pub fn determinant<E: ComplexField>(lu: MatRef<'_, E>, perm: &Perm) -> SafeProduct<E> {
    assert!(perm.len() == lu.nrows());
    diagonal_product(lu, perm.is_odd())
}

/// Computes the determinant of `A` as a [`SafeProduct`], given its LU factors and the number of
/// row exchanges returned by [`lu_in_place`](super::lu_in_place).
///
/// # Panics
/// Panics if `lu` is not square.
#[track_caller]
pub fn determinant_from_transpositions<E: ComplexField>(
    lu: MatRef<'_, E>,
    n_transpositions: usize,
) -> SafeProduct<E> {
    diagonal_product(lu, n_transpositions % 2 == 1)
}

#[track_caller]
fn diagonal_product<E: ComplexField>(lu: MatRef<'_, E>, odd: bool) -> SafeProduct<E> {
    let n = lu.nrows();
    assert!(lu.ncols() == n);
    let (log_sum, phase, singular) = (0..n).fold(
        (E::Real::zero(), E::one(), false),
        |acc, i| accumulate(acc, lu.read(i, i)),
    );
    SafeProduct::from_parts(log_sum, phase, singular, odd, n)
}

/// Computes the determinant of the distributed matrix `A` as a [`SafeProduct`], given its LU
/// factors and the image `p` of its row permutation.
///
/// Each process accumulates the diagonal entries it owns, and the partial products are combined
/// over the whole grid.
pub fn dist_determinant<E: ComplexField>(
    lu: DistMatRef<'_, E, McMr>,
    p: DistMatRef<'_, usize, VcStar>,
) -> Result<SafeProduct<E>> {
    const OP: &str = "partial_pivoting::dist_determinant";
    check_same_grid(OP, lu.grid(), p.grid())?;
    check_square(OP, lu.shape())?;
    check_shape(OP, (lu.nrows(), 1), p.shape())?;

    let n = lu.nrows();
    let local = lu.local();
    let mut partial = (E::Real::zero(), E::one(), false);
    for jl in 0..local.ncols() {
        let j = lu.global_col(jl);
        if let Some(il) = lu.local_row(j) {
            partial = accumulate(partial, local.read(il, jl));
        }
    }
    let (log_sum, phase, singular) =
        lu.grid()
            .vc_comm()
            .all_reduce(partial, |(l0, p0, s0), (l1, p1, s1)| {
                (l0 + l1, p0 * p1, s0 || s1)
            });
    let odd = dist_image_to_permutation(p).is_odd();
    Ok(SafeProduct::from_parts(log_sum, phase, singular, odd, n))
}
