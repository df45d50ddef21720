//! Reduction of a Hermitian matrix to real symmetric tridiagonal form: $A = QTQ^H$.
//!
//! Only one triangle of the input is referenced. The output is always stored in the lower
//! triangle: the diagonal and subdiagonal of $T$ (both real), and reflector `i` below the
//! subdiagonal in column `i`, with its implicit unit entry at row `i + 1`. The strict upper
//! triangle is unspecified on exit.

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

#[inline]
fn mirrored(uplo: UpLo, i: usize, j: usize) -> bool {
    match uplo {
        UpLo::Lower => i < j,
        UpLo::Upper => i > j,
    }
}

/// Reduces the Hermitian matrix `a`, stored in full, to tridiagonal form.
///
/// Each panel accumulates its reflectors in $V$ together with $W$, such that the trailing matrix
/// equals $A - VW^H - WV^H$. Column `j` is brought up to date with the previous columns of the
/// panel just before its reflector is built, and the trailing matrix is updated once per panel.
pub(crate) fn reduce_lower<E: ComplexField, A: Condense<E>>(
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
        log::trace!(target: "plaid_condense", "tridiag panel {}..{} of {}", k, k + nb, count);

        let mut v = Mat::<E>::zeros(n, nb);
        let mut w = Mat::<E>::zeros(n, nb);

        for c in 0..nb {
            let j = k + c;
            let mut col = a.read_col(j, j, n - j);
            for l in 0..c {
                let (vj, wj) = (v[(j, l)].conj(), w[(j, l)].conj());
                for (r, x) in col.iter_mut().enumerate() {
                    let i = j + r;
                    *x -= v[(i, l)] * wj + w[(i, l)] * vj;
                }
            }
            col[0] = E::from_real(col[0].real());

            let tau = {
                let (head, tail) = col[1..].split_at_mut(1);
                let len = tail.len();
                make_reflector(&mut head[0], MatMut::from_column_major_slice_mut(tail, len, 1))
            };
            t[j] = tau;
            a.write_col(j, j, &col);

            let len = n - j - 1;
            let mut vc = vec![E::zero(); len];
            vc[0] = E::one();
            vc[1..].copy_from_slice(&col[2..]);

            // p = tau * (A - V W^H - W V^H) v
            let av = a.mul(Block::new(j + 1, j + 1, len, len), col_mat(&vc).as_ref());
            let mut p: Vec<E> = (0..len).map(|r| av.read(r, 0)).collect();
            for l in 0..c {
                let wv = dot(&w.col_as_slice(l)[j + 1..], &vc);
                let vv = dot(&v.col_as_slice(l)[j + 1..], &vc);
                for (r, x) in p.iter_mut().enumerate() {
                    let i = j + 1 + r;
                    *x -= v[(i, l)] * wv + w[(i, l)] * vv;
                }
            }
            for x in p.iter_mut() {
                *x = tau * *x;
            }

            // w = p - (conj(tau) / 2) (v^H p) v
            let half = E::from_f64(0.5);
            let alpha = half * tau.conj() * dot(&vc, &p);
            for (x, &y) in p.iter_mut().zip(&vc) {
                *x -= alpha * y;
            }

            v.col_as_slice_mut(c)[j + 1..].copy_from_slice(&vc);
            w.col_as_slice_mut(c)[j + 1..].copy_from_slice(&p);
        }

        let rest = n - k - nb;
        let trailing = Block::new(k + nb, k + nb, rest, rest);
        let (vt, wt) = (v.as_ref().subrows(k + nb, rest), w.as_ref().subrows(k + nb, rest));
        a.sub_outer(trailing, vt, wt);
        a.sub_outer(trailing, wt, vt);

        k += nb;
    }

    if n > 0 {
        let last = a.read_col(n - 1, n - 1, 1);
        a.write_col(n - 1, n - 1, &[E::from_real(last[0].real())]);
    }
}

/// Reduces the Hermitian matrix `a`, whose `uplo` triangle is referenced, to tridiagonal form in
/// place, and stores the reflector coefficients in `t`.
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
    let n = a.nrows();
    assert!(a.ncols() == n);
    let mut a = a;
    for j in 0..n {
        for i in 0..n {
            if mirrored(uplo, i, j) {
                let value = a.read(j, i).conj();
                a.write(i, j, value);
            } else if i == j {
                let value = a.read(i, i).real();
                a.write(i, i, E::from_real(value));
            }
        }
    }
    reduce_lower(&mut a, t, params.resolve());
}

/// Reduces the distributed Hermitian matrix `a`, whose `uplo` triangle is referenced, to
/// tridiagonal form in place, and returns the reflector coefficients, replicated on every
/// process.
///
/// This is a collective over the whole grid.
pub fn dist_reduce_in_place<E: ComplexField>(
    uplo: UpLo,
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<Vec<E>> {
    check_square("tridiag::dist_reduce_in_place", a.shape())?;
    let mut a = a;

    let adjoint = a
        .rb()
        .adjoint_into_aligned::<McMr>(a.col_align(), a.row_align());
    let adjoint = adjoint.local();
    let (col_stride, row_stride) = (a.col_stride(), a.row_stride());
    a.update_local(|i, j, value| {
        if mirrored(uplo, i, j) {
            adjoint.read(i / col_stride, j / row_stride)
        } else if i == j {
            E::from_real(value.real())
        } else {
            value
        }
    });

    let mut t = vec![E::zero(); a.nrows().saturating_sub(1)];
    reduce_lower(&mut a, &mut t, params.resolve());
    Ok(t)
}

/// Returns the diagonal and the subdiagonal of the tridiagonal matrix stored in `a` by
/// [`reduce_in_place`].
pub fn diagonals<E: ComplexField>(a: MatRef<'_, E>) -> (Vec<E::Real>, Vec<E::Real>) {
    let n = a.nrows();
    let diag = (0..n).map(|i| a.read(i, i).real()).collect();
    let subdiag = (0..n.saturating_sub(1))
        .map(|i| a.read(i + 1, i).real())
        .collect();
    (diag, subdiag)
}

/// Distributed counterpart of [`diagonals`]. The result is replicated on every process.
///
/// This is a collective over the whole grid.
pub fn dist_diagonals<E: ComplexField>(
    a: DistMatRef<'_, E, McMr>,
) -> (Vec<E::Real>, Vec<E::Real>) {
    let n = a.nrows();
    let local = a.local();
    let mut owned = Vec::new();
    for jl in 0..local.ncols() {
        let j = a.global_col(jl);
        for il in 0..local.nrows() {
            let i = a.global_row(il);
            if i == j || i == j + 1 {
                owned.push((i, j, local.read(il, jl).real()));
            }
        }
    }

    let mut diag = vec![E::Real::zero(); n];
    let mut subdiag = vec![E::Real::zero(); n.saturating_sub(1)];
    for (i, j, value) in a.grid().vc_comm().all_gather(owned).into_iter().flatten() {
        if i == j {
            diag[i] = value;
        } else {
            subdiag[j] = value;
        }
    }
    (diag, subdiag)
}

/// Returns the stack requirements for [`apply_q`].
pub fn apply_q_req<E: ComplexField>(
    side: Side,
    b_shape: (usize, usize),
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    apply_packed_reflectors_req::<E>(side, b_shape, params)
}

/// Applies `op(Q)` to `b` from the given side, where `a` and `t` hold the tridiagonal reduction
/// of a matrix as computed by [`reduce_in_place`].
#[track_caller]
pub fn apply_q<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: MatRef<'_, E>,
    t: &[E],
    b: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) {
    apply_packed_reflectors(
        side,
        Direction::Vertical,
        orientation,
        -1,
        a,
        t,
        b,
        params,
        stack,
    );
}

/// Distributed counterpart of [`apply_q`].
///
/// This is a collective over the whole grid.
pub fn dist_apply_q<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: DistMatRef<'_, E, McMr>,
    t: &[E],
    b: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("tridiag::dist_apply_q", a.grid(), b.grid())?;
    dist_apply_packed_reflectors(side, Direction::Vertical, orientation, -1, a, t, b, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{c64, DistMatrix, Grid};
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    fn hermitian(rng: &mut StdRng, n: usize) -> Mat<c64> {
        let a = Mat::from_fn(n, n, |_, _| c64::new(rng.gen(), rng.gen()));
        let ah = a.adjoint();
        Mat::from_fn(n, n, |i, j| a.read(i, j) + ah.read(i, j))
    }

    // keeps the `uplo` triangle of `a` and fills the other one with garbage
    fn with_garbage(uplo: UpLo, a: &Mat<c64>) -> Mat<c64> {
        let n = a.nrows();
        Mat::from_fn(n, n, |i, j| {
            if mirrored(uplo, i, j) {
                c64::new(1e3, -7.0)
            } else {
                a.read(i, j)
            }
        })
    }

    fn explicit_q(h: &Mat<c64>, t: &[c64]) -> Mat<c64> {
        let n = h.nrows();
        let mut q = Mat::identity(n, n);
        let params = BlockParams::with_blocksize(4);
        apply_q(
            Side::Left,
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

    fn tridiagonal(h: &Mat<c64>) -> Mat<c64> {
        let (diag, subdiag) = diagonals(h.as_ref());
        let n = diag.len();
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(diag[i], 0.0)
            } else if i == j + 1 {
                c64::new(subdiag[j], 0.0)
            } else if j == i + 1 {
                c64::new(subdiag[i], 0.0)
            } else {
                c64::zero()
            }
        })
    }

    #[test]
    fn reconstructs() {
        let mut rng = StdRng::seed_from_u64(0);
        for uplo in [UpLo::Lower, UpLo::Upper] {
            for n in [0, 1, 2, 3, 9, 20] {
                let a = hermitian(&mut rng, n);
                for blocksize in [1, 3, 32] {
                    let mut h = with_garbage(uplo, &a);
                    let mut t = vec![c64::zero(); n.saturating_sub(1)];
                    let params = BlockParams::with_blocksize(blocksize);
                    reduce_in_place(uplo, h.as_mut(), &mut t, params);

                    for j in 0..n.saturating_sub(1) {
                        assert_approx_eq!(h.read(j + 1, j).im, 0.0, 1e-12);
                    }
                    let q = explicit_q(&h, &t);
                    let qtqh = &(&q * &tridiagonal(&h)) * &q.adjoint();
                    for j in 0..n {
                        for i in 0..n {
                            assert_approx_eq!(qtqh.read(i, j), a.read(i, j), 1e-10);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn real_symmetric() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 12;
        let b = Mat::from_fn(n, n, |_, _| rng.gen::<f64>());
        let a = Mat::from_fn(n, n, |i, j| b.read(i, j) + b.read(j, i));
        let mut h = a.clone();
        let mut t = vec![0.0; n - 1];
        reduce_in_place(UpLo::Lower, h.as_mut(), &mut t, BlockParams::with_blocksize(5));

        let (diag, subdiag) = diagonals(h.as_ref());
        // the trace and the Frobenius norm are invariant
        let trace: f64 = diag.iter().sum();
        let expected: f64 = (0..n).map(|i| a.read(i, i)).sum();
        assert_approx_eq!(trace, expected, 1e-10);
        let norm2 = diag.iter().map(|x| x * x).sum::<f64>()
            + 2.0 * subdiag.iter().map(|x| x * x).sum::<f64>();
        let expected: f64 = (0..n)
            .flat_map(|j| (0..n).map(move |i| (i, j)))
            .map(|(i, j)| a.read(i, j) * a.read(i, j))
            .sum();
        assert_approx_eq!(norm2, expected, 1e-9);
    }

    #[test]
    fn dist_matches_local() {
        let mut rng = StdRng::seed_from_u64(2);
        let n = 13;
        let a = hermitian(&mut rng, n);
        let b = Mat::from_fn(n, 2, |_, _| c64::new(rng.gen(), rng.gen()));
        let params = BlockParams::with_blocksize(4);

        for uplo in [UpLo::Lower, UpLo::Upper] {
            let input = with_garbage(uplo, &a);
            let mut h = input.clone();
            let mut t = vec![c64::zero(); n - 1];
            reduce_in_place(uplo, h.as_mut(), &mut t, params);
            let (diag, subdiag) = diagonals(h.as_ref());
            let mut qb = b.clone();
            apply_q(
                Side::Left,
                Orientation::Normal,
                h.as_ref(),
                &t,
                qb.as_mut(),
                params,
                PodStack::new(&mut GlobalPodBuffer::new(
                    apply_q_req::<c64>(Side::Left, (n, 2), params).unwrap(),
                )),
            );

            for (r, c) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
                Grid::run(r, c, |grid| {
                    let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, input.as_ref());
                    let d_t = dist_reduce_in_place(uplo, d.as_mut(), params).unwrap();
                    for (x, y) in d_t.iter().zip(&t) {
                        assert_approx_eq!(*x, *y, 1e-10);
                    }
                    let (d_diag, d_subdiag) = dist_diagonals(d.as_ref());
                    for (x, y) in d_diag.iter().zip(&diag) {
                        assert_approx_eq!(*x, *y, 1e-10);
                    }
                    for (x, y) in d_subdiag.iter().zip(&subdiag) {
                        assert_approx_eq!(*x, *y, 1e-10);
                    }

                    let mut d_b = DistMatrix::<c64, McMr>::from_replicated(grid, b.as_ref());
                    dist_apply_q(
                        Side::Left,
                        Orientation::Normal,
                        d.as_ref(),
                        &d_t,
                        d_b.as_mut(),
                        params,
                    )
                    .unwrap();
                    let g = d_b.as_ref().gather();
                    for j in 0..2 {
                        for i in 0..n {
                            assert_approx_eq!(g.read(i, j), qb.read(i, j), 1e-10);
                        }
                    }
                });
            }
        }
    }
}
