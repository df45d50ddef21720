//! Reduction to Hessenberg form: $A = QHQ^H$.
//!
//! In the upper case, $H$ is upper Hessenberg and reflector `i` is stored below the subdiagonal
//! in column `i`, with its implicit unit entry at row `i + 1`. The lower case reduces $A^H$ and
//! stores the result transposed: $H$ is lower Hessenberg, and the conjugate of reflector `i` is
//! stored right of the superdiagonal in row `i`, with its implicit unit entry at column `i + 1`.
//!
//! For an `n×n` matrix, `n - 1` reflectors are produced.

use super::{col_mat, dot, Block, Condense};
use crate::{
    assert,
    dist::McMr,
    error::{check_same_grid, check_square},
    linalg::householder::{
        apply_packed_reflectors, apply_packed_reflectors_req, dist::dist_apply_packed_reflectors,
        make_reflector, Direction,
    },
    BlockParams, ComplexField, DistMatMut, DistMatRef, Mat, MatMut, MatRef, Orientation, Result,
    Side, UpLo,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Reduces the square matrix `a` to upper Hessenberg form in place, one panel of `blocksize`
/// reflectors at a time.
///
/// For each panel, the reflectors are accumulated as $Q_p = I - VTV^H$ together with
/// $Y = A V T$, so that column `j` of the panel is brought up to date with $Y$ and $Q_p^H$ just
/// before its reflector is built. The trailing columns then receive $A := A - YV^H$ followed by
/// $A := Q_p^H A$.
pub(crate) fn reduce_upper<E: ComplexField, A: Condense<E>>(
    a: &mut A,
    t: &mut [E],
    blocksize: usize,
) {
    let (n, _) = a.dims();
    let count = n.saturating_sub(1);
    assert!(t.len() == count);

    let mut k = 0;
    while k < count {
        let nb = Ord::min(blocksize, count - k);
        log::trace!(target: "plaid_condense", "hessenberg panel {}..{} of {}", k, k + nb, count);

        let mut v = Mat::<E>::zeros(n, nb);
        let mut tf = Mat::<E>::zeros(nb, nb);
        let mut y = Mat::<E>::zeros(n, nb);

        for c in 0..nb {
            let j = k + c;
            let mut col = a.read_col(j, 0, n);
            if c > 0 {
                // col := Q_p^H * (col - Y * V[j, :]^H)
                for l in 0..c {
                    let s = v[(j, l)].conj();
                    for (i, x) in col.iter_mut().enumerate() {
                        *x -= y[(i, l)] * s;
                    }
                }
                let mut w: Vec<E> = (0..c).map(|l| dot(v.col_as_slice(l), &col)).collect();
                for l in (0..c).rev() {
                    let mut acc = E::zero();
                    for (r, &wr) in w.iter().enumerate().take(l + 1) {
                        acc += tf[(r, l)].conj() * wr;
                    }
                    w[l] = acc;
                }
                for (l, &wl) in w.iter().enumerate() {
                    for (i, x) in col.iter_mut().enumerate() {
                        *x -= v[(i, l)] * wl;
                    }
                }
            }

            let tau = {
                let (head, tail) = col[j + 1..].split_at_mut(1);
                let len = tail.len();
                make_reflector(&mut head[0], MatMut::from_column_major_slice_mut(tail, len, 1))
            };
            t[j] = tau;
            a.write_col(j, 0, &col);

            let mut vc = vec![E::zero(); n];
            vc[j + 1] = E::one();
            vc[j + 2..].copy_from_slice(&col[j + 2..]);

            // T[:c, c] = -tau * T[:c, :c] * V[:, :c]^H * v
            let s: Vec<E> = (0..c).map(|l| dot(v.col_as_slice(l), &vc)).collect();
            for r in 0..c {
                let mut acc = E::zero();
                for (l, &sl) in s.iter().enumerate().skip(r) {
                    acc += tf[(r, l)] * sl;
                }
                tf[(r, c)] = -tau * acc;
            }
            tf[(c, c)] = tau;

            // Y[:, c] = tau * (A * v - Y[:, :c] * V[:, :c]^H * v)
            let av = a.mul(
                Block::new(0, j + 1, n, n - j - 1),
                col_mat(&vc[j + 1..]).as_ref(),
            );
            for i in 0..n {
                let mut acc = av.read(i, 0);
                for (l, &sl) in s.iter().enumerate() {
                    acc -= y[(i, l)] * sl;
                }
                y[(i, c)] = tau * acc;
            }
            v.col_as_slice_mut(c).copy_from_slice(&vc);
        }

        let rest = n - k - nb;
        let right = Block::new(0, k + nb, n, rest);
        a.sub_outer(right, y.as_ref(), v.as_ref().subrows(k + nb, rest));

        let below = Block::new(k + 1, k + nb, n - k - 1, rest);
        let vb = v.as_ref().subrows(k + 1, n - k - 1);
        let z = &a.adjoint_mul(below, vb) * &tf;
        a.sub_outer(below, vb, z.as_ref());

        k += nb;
    }
}

/// Reduces the square matrix `a` to Hessenberg form in place, and stores the reflector
/// coefficients in `t`.
///
/// # Panics
/// Panics if `a` is not square or if `t.len() != n - 1` (or `0` for an empty matrix).
#[track_caller]
pub fn reduce_in_place<E: ComplexField>(
    uplo: UpLo,
    a: MatMut<'_, E>,
    t: &mut [E],
    params: BlockParams,
) {
    assert!(a.nrows() == a.ncols());
    let blocksize = params.resolve();
    let mut a = a;
    match uplo {
        UpLo::Upper => reduce_upper(&mut a, t, blocksize),
        UpLo::Lower => {
            let mut adjoint = a.rb().adjoint_to_owned();
            reduce_upper(&mut adjoint.as_mut(), t, blocksize);
            a.copy_from(adjoint.adjoint().as_ref());
        }
    }
}

/// Reduces the distributed square matrix `a` to Hessenberg form in place, and returns the
/// reflector coefficients, replicated on every process.
///
/// This is a collective over the whole grid.
pub fn dist_reduce_in_place<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<Vec<E>> {
    check_square("hessenberg::dist_reduce_in_place", a.shape())?;
    let blocksize = params.resolve();
    let mut t = vec![E::zero(); a.nrows().saturating_sub(1)];
    let mut a = a;
    match uplo {
        UpLo::Upper => reduce_upper(&mut a, &mut t, blocksize),
        UpLo::Lower => {
            let mut adjoint = a.rb().adjoint_into::<McMr>();
            reduce_upper(&mut adjoint.as_mut(), &mut t, blocksize);
            a.copy_adjoint_from(adjoint.as_ref())?;
        }
    }
    Ok(t)
}

fn storage(uplo: UpLo) -> (Direction, isize) {
    match uplo {
        UpLo::Upper => (Direction::Vertical, -1),
        UpLo::Lower => (Direction::Horizontal, 1),
    }
}

/// Returns the stack requirements for [`apply_q`].
pub fn apply_q_req<E: ComplexField>(
    side: Side,
    b_shape: (usize, usize),
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    apply_packed_reflectors_req::<E>(side, b_shape, params)
}

/// Applies `op(Q)` to `b` from the given side, where `a` and `t` hold the Hessenberg reduction
/// of a matrix as computed by [`reduce_in_place`].
#[track_caller]
pub fn apply_q<E: ComplexField>(
    side: Side,
    uplo: UpLo,
    orientation: Orientation,
    a: MatRef<'_, E>,
    t: &[E],
    b: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) {
    let (direction, offset) = storage(uplo);
    apply_packed_reflectors(side, direction, orientation, offset, a, t, b, params, stack);
}

/// Distributed counterpart of [`apply_q`].
///
/// This is a collective over the whole grid.
pub fn dist_apply_q<E: ComplexField>(
    side: Side,
    uplo: UpLo,
    orientation: Orientation,
    a: DistMatRef<'_, E, McMr>,
    t: &[E],
    b: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("hessenberg::dist_apply_q", a.grid(), b.grid())?;
    let (direction, offset) = storage(uplo);
    dist_apply_packed_reflectors(side, direction, orientation, offset, a, t, b, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{c64, DistMatrix, Grid};
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    fn explicit_q(uplo: UpLo, h: &Mat<c64>, t: &[c64]) -> Mat<c64> {
        let n = h.nrows();
        let mut q = Mat::identity(n, n);
        let params = BlockParams::with_blocksize(4);
        apply_q(
            Side::Left,
            uplo,
            Orientation::Normal,
            h.as_ref(),
            t,
            q.as_mut(),
            params,
            PodStack::new(&mut GlobalPodBuffer::new(
                apply_q_req::<c64>(Side::Left, (n, n), params).unwrap(),
            )),
        );
        q
    }

    fn condensed(uplo: UpLo, h: &Mat<c64>) -> Mat<c64> {
        let n = h.nrows();
        Mat::from_fn(n, n, |i, j| {
            let keep = match uplo {
                UpLo::Upper => i <= j + 1,
                UpLo::Lower => j <= i + 1,
            };
            if keep {
                h.read(i, j)
            } else {
                c64::zero()
            }
        })
    }

    fn check(uplo: UpLo, a: &Mat<c64>, h: &Mat<c64>, t: &[c64]) {
        let n = a.nrows();
        let q = explicit_q(uplo, h, t);
        let qhqh = &(&q * &condensed(uplo, h)) * &q.adjoint();
        for j in 0..n {
            for i in 0..n {
                assert_approx_eq!(qhqh.read(i, j), a.read(i, j), 1e-10);
            }
        }
        let qhq = &q.adjoint() * &q;
        for j in 0..n {
            for i in 0..n {
                let target = if i == j { c64::one() } else { c64::zero() };
                assert_approx_eq!(qhq.read(i, j), target, 1e-10);
            }
        }
    }

    #[test]
    fn reconstructs() {
        let mut rng = StdRng::seed_from_u64(0);
        for uplo in [UpLo::Upper, UpLo::Lower] {
            for n in [0, 1, 2, 3, 10, 23] {
                let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
                for blocksize in [1, 4, 32] {
                    let mut h = a.clone();
                    let mut t = vec![c64::zero(); n.saturating_sub(1)];
                    let params = BlockParams::with_blocksize(blocksize);
                    reduce_in_place(uplo, h.as_mut(), &mut t, params);
                    check(uplo, &a, &h, &t);
                }
            }
        }
    }

    #[test]
    fn blocked_matches_unblocked() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 17;
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let mut h1 = a.clone();
        let mut t1 = vec![c64::zero(); n - 1];
        reduce_in_place(UpLo::Upper, h1.as_mut(), &mut t1, BlockParams::with_blocksize(1));
        let mut h5 = a.clone();
        let mut t5 = vec![c64::zero(); n - 1];
        reduce_in_place(UpLo::Upper, h5.as_mut(), &mut t5, BlockParams::with_blocksize(5));
        for j in 0..n {
            for i in 0..n {
                assert_approx_eq!(h1.read(i, j), h5.read(i, j), 1e-10);
            }
        }
        for (x, y) in t1.iter().zip(&t5) {
            assert_approx_eq!(*x, *y, 1e-10);
        }
    }

    #[test]
    fn dist_matches_local() {
        let mut rng = StdRng::seed_from_u64(2);
        let n = 11;
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let b = Mat::from_fn(n, 3, |_, _| c64::new(rng.gen(), rng.gen()));
        let params = BlockParams::with_blocksize(3);

        for uplo in [UpLo::Upper, UpLo::Lower] {
            let mut h = a.clone();
            let mut t = vec![c64::zero(); n - 1];
            reduce_in_place(uplo, h.as_mut(), &mut t, params);
            let mut qb = b.clone();
            apply_q(
                Side::Left,
                uplo,
                Orientation::Adjoint,
                h.as_ref(),
                &t,
                qb.as_mut(),
                params,
                PodStack::new(&mut GlobalPodBuffer::new(
                    apply_q_req::<c64>(Side::Left, (n, 3), params).unwrap(),
                )),
            );

            for (r, c) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
                Grid::run(r, c, |grid| {
                    let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                    let d_t = dist_reduce_in_place(uplo, d.as_mut(), params).unwrap();
                    let g = d.as_ref().gather();
                    for j in 0..n {
                        for i in 0..n {
                            assert_approx_eq!(g.read(i, j), h.read(i, j), 1e-10);
                        }
                    }
                    for (x, y) in d_t.iter().zip(&t) {
                        assert_approx_eq!(*x, *y, 1e-10);
                    }

                    let mut d_b = DistMatrix::<c64, McMr>::from_replicated(grid, b.as_ref());
                    dist_apply_q(
                        Side::Left,
                        uplo,
                        Orientation::Adjoint,
                        d.as_ref(),
                        &d_t,
                        d_b.as_mut(),
                        params,
                    )
                    .unwrap();
                    let g = d_b.as_ref().gather();
                    for j in 0..3 {
                        for i in 0..n {
                            assert_approx_eq!(g.read(i, j), qb.read(i, j), 1e-10);
                        }
                    }
                });
            }
        }
    }
}
