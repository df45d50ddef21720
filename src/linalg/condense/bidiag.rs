//! Reduction to bidiagonal form: $A = QBP^H$.
//!
//! If `A` is `m×n` with `m >= n`, $B$ is upper bidiagonal. Reflector `i` of `Q` is stored below
//! the diagonal in column `i`, with its implicit unit entry at row `i`, and the conjugate of
//! reflector `i` of `P` is stored right of the superdiagonal in row `i`, with its implicit unit
//! entry at column `i + 1`. `Q` is made of `n` reflectors and `P` of `n - 1`.
//!
//! If `m < n`, $B$ is lower bidiagonal and the roles are swapped: reflector `i` of `Q` is stored
//! below the subdiagonal in column `i` with its unit entry at row `i + 1`, and the conjugate of
//! reflector `i` of `P` is stored right of the diagonal in row `i` with its unit entry at column
//! `i`. `Q` is made of `m - 1` reflectors and `P` of `m`.
//!
//! The entries of $B$ are real.

use super::{col_mat, dot, Block, Condense};
use crate::{
    assert,
    dist::McMr,
    error::check_same_grid,
    linalg::householder::{
        apply_packed_reflectors, apply_packed_reflectors_req, dist::dist_apply_packed_reflectors,
        make_reflector, make_row_reflector, Direction,
    },
    BlockParams, ComplexField, DistMatMut, DistMatRef, DistMatrix, Mat, MatMut, MatRef,
    Orientation, Result, Side,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Number of reflectors making up `Q` and `P` for an `m×n` matrix.
#[inline]
pub fn reflector_counts(nrows: usize, ncols: usize) -> (usize, usize) {
    if nrows >= ncols {
        (ncols, ncols.saturating_sub(1))
    } else {
        (nrows.saturating_sub(1), nrows)
    }
}

#[inline]
fn q_storage(nrows: usize, ncols: usize) -> (Direction, isize) {
    if nrows >= ncols {
        (Direction::Vertical, 0)
    } else {
        (Direction::Vertical, -1)
    }
}

#[inline]
fn p_storage(nrows: usize, ncols: usize) -> (Direction, isize) {
    if nrows >= ncols {
        (Direction::Horizontal, 1)
    } else {
        (Direction::Horizontal, 0)
    }
}

/// Reduces the `m×n` matrix `a`, with `m >= n`, to upper bidiagonal form.
///
/// Each panel accumulates the column reflectors in $U$ and the row reflectors in $V$, together
/// with $Y$ and $X$ such that the trailing matrix equals $A - UY^H - XV^H$. The trailing matrix
/// is updated once per panel.
pub(crate) fn reduce_upper<E: ComplexField, A: Condense<E>>(
    a: &mut A,
    tq: &mut [E],
    tp: &mut [E],
    blocksize: usize,
) {
    let (m, n) = a.dims();
    assert!(all(m >= n, tq.len() == n, tp.len() == n.saturating_sub(1)));

    let mut k = 0;
    while k < n {
        let nb = Ord::min(blocksize, n - k);
        log::trace!(target: "plaid_condense", "bidiag panel {}..{} of {}", k, k + nb, n);

        let mut u = Mat::<E>::zeros(m, nb);
        let mut y = Mat::<E>::zeros(n, nb);
        let mut v = Mat::<E>::zeros(n, nb);
        let mut x = Mat::<E>::zeros(m, nb);

        for c in 0..nb {
            let j = k + c;

            // column j, rows j..
            let mut col = a.read_col(j, j, m - j);
            for l in 0..c {
                let (yj, vj) = (y[(j, l)].conj(), v[(j, l)].conj());
                for (r, value) in col.iter_mut().enumerate() {
                    let i = j + r;
                    *value -= u[(i, l)] * yj + x[(i, l)] * vj;
                }
            }
            let tau_q = {
                let (head, tail) = col.split_at_mut(1);
                let len = tail.len();
                make_reflector(&mut head[0], MatMut::from_column_major_slice_mut(tail, len, 1))
            };
            tq[j] = tau_q;
            a.write_col(j, j, &col);

            let mut uc = col;
            uc[0] = E::one();
            u.col_as_slice_mut(c)[j..].copy_from_slice(&uc);

            let rest = n - j - 1;
            if rest == 0 {
                continue;
            }

            // y = tau_q * (A - U Y^H - X V^H)^H u, over the columns j + 1..
            let au = a.adjoint_mul(Block::new(j, j + 1, m - j, rest), col_mat(&uc).as_ref());
            let mut yc: Vec<E> = (0..rest).map(|r| au.read(r, 0)).collect();
            for l in 0..c {
                let uu = dot(&u.col_as_slice(l)[j..], &uc);
                let xu = dot(&x.col_as_slice(l)[j..], &uc);
                for (r, value) in yc.iter_mut().enumerate() {
                    let i = j + 1 + r;
                    *value -= y[(i, l)] * uu + v[(i, l)] * xu;
                }
            }
            for value in yc.iter_mut() {
                *value = tau_q * *value;
            }
            y.col_as_slice_mut(c)[j + 1..].copy_from_slice(&yc);

            // row j, columns j + 1..
            let mut row = a.read_row(j, j + 1, rest);
            for l in 0..=c {
                let uj = u[(j, l)];
                for (r, value) in row.iter_mut().enumerate() {
                    *value -= uj * y[(j + 1 + r, l)].conj();
                }
            }
            for l in 0..c {
                let xj = x[(j, l)];
                for (r, value) in row.iter_mut().enumerate() {
                    *value -= xj * v[(j + 1 + r, l)].conj();
                }
            }
            let tau_p = {
                let (head, tail) = row.split_at_mut(1);
                let len = tail.len();
                make_row_reflector(&mut head[0], MatMut::from_column_major_slice_mut(tail, 1, len))
            };
            tp[j] = tau_p;
            a.write_row(j, j + 1, &row);

            let mut vc: Vec<E> = row.iter().map(|value| value.conj()).collect();
            vc[0] = E::one();
            v.col_as_slice_mut(c)[j + 1..].copy_from_slice(&vc);

            // x = tau_p * (A - U Y^H - X V^H) v, over the rows j + 1..
            let below = m - j - 1;
            let av = a.mul(Block::new(j + 1, j + 1, below, rest), col_mat(&vc).as_ref());
            let mut xc: Vec<E> = (0..below).map(|r| av.read(r, 0)).collect();
            for l in 0..=c {
                let yv = dot(&y.col_as_slice(l)[j + 1..], &vc);
                for (r, value) in xc.iter_mut().enumerate() {
                    *value -= u[(j + 1 + r, l)] * yv;
                }
            }
            for l in 0..c {
                let vv = dot(&v.col_as_slice(l)[j + 1..], &vc);
                for (r, value) in xc.iter_mut().enumerate() {
                    *value -= x[(j + 1 + r, l)] * vv;
                }
            }
            for value in xc.iter_mut() {
                *value = tau_p * *value;
            }
            x.col_as_slice_mut(c)[j + 1..].copy_from_slice(&xc);
        }

        let (rows, cols) = (m - k - nb, n - k - nb);
        let trailing = Block::new(k + nb, k + nb, rows, cols);
        a.sub_outer(
            trailing,
            u.as_ref().subrows(k + nb, rows),
            y.as_ref().subrows(k + nb, cols),
        );
        a.sub_outer(
            trailing,
            x.as_ref().subrows(k + nb, rows),
            v.as_ref().subrows(k + nb, cols),
        );

        k += nb;
    }
}

/// Reduces `a` to bidiagonal form in place, and stores the reflector coefficients of `Q` in `tq`
/// and those of `P` in `tp`.
///
/// # Panics
/// Panics if the lengths of `tq` and `tp` differ from [`reflector_counts`].
#[track_caller]
pub fn reduce_in_place<E: ComplexField>(
    a: MatMut<'_, E>,
    tq: &mut [E],
    tp: &mut [E],
    params: BlockParams,
) {
    let (m, n) = a.shape();
    let blocksize = params.resolve();
    let mut a = a;
    if m >= n {
        reduce_upper(&mut a, tq, tp, blocksize);
    } else {
        let mut adjoint = a.rb().adjoint_to_owned();
        reduce_upper(&mut adjoint.as_mut(), tp, tq, blocksize);
        a.copy_from(adjoint.adjoint().as_ref());
    }
}

/// Reduces the distributed matrix `a` to bidiagonal form in place, and returns the reflector
/// coefficients of `Q` and `P`, replicated on every process.
///
/// This is a collective over the whole grid.
pub fn dist_reduce_in_place<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<(Vec<E>, Vec<E>)> {
    let (m, n) = a.shape();
    let (kq, kp) = reflector_counts(m, n);
    let mut tq = vec![E::zero(); kq];
    let mut tp = vec![E::zero(); kp];
    let blocksize = params.resolve();
    let mut a = a;
    if m >= n {
        reduce_upper(&mut a, &mut tq, &mut tp, blocksize);
    } else {
        let mut adjoint = a.rb().adjoint_into::<McMr>();
        reduce_upper(&mut adjoint.as_mut(), &mut tp, &mut tq, blocksize);
        a.copy_adjoint_from(adjoint.as_ref())?;
    }
    Ok((tq, tp))
}

#[inline]
fn is_bidiagonal_entry(m: usize, n: usize, i: usize, j: usize) -> bool {
    if m >= n {
        i == j || j == i + 1
    } else {
        i == j || i == j + 1
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

/// Returns the stack requirements for [`apply_p`].
pub fn apply_p_req<E: ComplexField>(
    side: Side,
    b_shape: (usize, usize),
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    apply_packed_reflectors_req::<E>(side, b_shape, params)
}

/// Applies `op(Q)` to `b` from the given side, where `a` and `tq` hold the bidiagonal reduction
/// of a matrix as computed by [`reduce_in_place`].
#[track_caller]
pub fn apply_q<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: MatRef<'_, E>,
    tq: &[E],
    b: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) {
    let (direction, offset) = q_storage(a.nrows(), a.ncols());
    apply_packed_reflectors(side, direction, orientation, offset, a, tq, b, params, stack);
}

/// Applies `op(P)` to `b` from the given side, where `a` and `tp` hold the bidiagonal reduction
/// of a matrix as computed by [`reduce_in_place`].
#[track_caller]
pub fn apply_p<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: MatRef<'_, E>,
    tp: &[E],
    b: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) {
    let (direction, offset) = p_storage(a.nrows(), a.ncols());
    apply_packed_reflectors(side, direction, orientation, offset, a, tp, b, params, stack);
}

/// Distributed counterpart of [`apply_q`].
///
/// This is a collective over the whole grid.
pub fn dist_apply_q<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: DistMatRef<'_, E, McMr>,
    tq: &[E],
    b: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("bidiag::dist_apply_q", a.grid(), b.grid())?;
    let (direction, offset) = q_storage(a.nrows(), a.ncols());
    dist_apply_packed_reflectors(side, direction, orientation, offset, a, tq, b, params)
}

/// Distributed counterpart of [`apply_p`].
///
/// This is a collective over the whole grid.
pub fn dist_apply_p<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    a: DistMatRef<'_, E, McMr>,
    tp: &[E],
    b: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    check_same_grid("bidiag::dist_apply_p", a.grid(), b.grid())?;
    let (direction, offset) = p_storage(a.nrows(), a.ncols());
    dist_apply_packed_reflectors(side, direction, orientation, offset, a, tp, b, params)
}

/// Returns the stack requirements for [`explicit`] on an `m×n` matrix.
pub fn explicit_req<E: ComplexField>(
    nrows: usize,
    ncols: usize,
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    let size = Ord::min(nrows, ncols);
    StackReq::try_any_of([
        apply_q_req::<E>(Side::Left, (nrows, size), params)?,
        apply_p_req::<E>(Side::Left, (ncols, size), params)?,
    ])
}

/// Overwrites `a` with the bidiagonal matrix `B` of its reduction, setting every other entry to
/// zero, and returns the thin factors `Q` (`m×r`) and `P` (`n×r`), with `r = min(m, n)`, such
/// that $A = Q B_r P^H$, where $B_r$ is the leading `r×r` block of `B`.
#[track_caller]
pub fn explicit<E: ComplexField>(
    a: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) -> (Mat<E>, Mat<E>) {
    let (m, n) = a.shape();
    let size = Ord::min(m, n);
    let (kq, kp) = reflector_counts(m, n);
    let mut tq = vec![E::zero(); kq];
    let mut tp = vec![E::zero(); kp];
    let mut a = a;
    reduce_in_place(a.rb_mut(), &mut tq, &mut tp, params);

    let mut stack = stack;
    let mut q = Mat::<E>::identity(m, size);
    apply_q(
        Side::Left,
        Orientation::Normal,
        a.rb(),
        &tq,
        q.as_mut(),
        params,
        stack.rb_mut(),
    );
    let mut p = Mat::<E>::identity(n, size);
    apply_p(
        Side::Left,
        Orientation::Normal,
        a.rb(),
        &tp,
        p.as_mut(),
        params,
        stack.rb_mut(),
    );

    zero_off_bidiagonal(a);
    (q, p)
}

/// Overwrites `a` with the bidiagonal matrix `B` of its reduction, setting every other entry to
/// zero.
#[track_caller]
pub fn explicit_condensed<E: ComplexField>(a: MatMut<'_, E>, params: BlockParams) {
    let (m, n) = a.shape();
    let (kq, kp) = reflector_counts(m, n);
    let mut tq = vec![E::zero(); kq];
    let mut tp = vec![E::zero(); kp];
    let mut a = a;
    reduce_in_place(a.rb_mut(), &mut tq, &mut tp, params);
    zero_off_bidiagonal(a);
}

fn zero_off_bidiagonal<E: ComplexField>(a: MatMut<'_, E>) {
    let (m, n) = a.shape();
    let mut a = a;
    for j in 0..n {
        for i in 0..m {
            if !is_bidiagonal_entry(m, n, i, j) {
                a.write(i, j, E::zero());
            }
        }
    }
}

/// Distributed counterpart of [`explicit`].
///
/// This is a collective over the whole grid.
pub fn dist_explicit<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<(DistMatrix<E, McMr>, DistMatrix<E, McMr>)> {
    let (m, n) = a.shape();
    let size = Ord::min(m, n);
    let mut a = a;
    let (tq, tp) = dist_reduce_in_place(a.rb_mut(), params)?;

    let grid = a.grid();
    let mut q = DistMatrix::<E, McMr>::identity(grid, m, size);
    dist_apply_q(Side::Left, Orientation::Normal, a.rb(), &tq, q.as_mut(), params)?;
    let mut p = DistMatrix::<E, McMr>::identity(grid, n, size);
    dist_apply_p(Side::Left, Orientation::Normal, a.rb(), &tp, p.as_mut(), params)?;

    a.update_local(|i, j, value| {
        if is_bidiagonal_entry(m, n, i, j) {
            value
        } else {
            E::zero()
        }
    });
    Ok((q, p))
}

/// Distributed counterpart of [`explicit_condensed`].
///
/// This is a collective over the whole grid.
pub fn dist_explicit_condensed<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    let (m, n) = a.shape();
    let mut a = a;
    dist_reduce_in_place(a.rb_mut(), params)?;
    a.update_local(|i, j, value| {
        if is_bidiagonal_entry(m, n, i, j) {
            value
        } else {
            E::zero()
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, c64, Grid};
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    const SHAPES: [(usize, usize); 9] = [
        (0, 0),
        (1, 1),
        (2, 1),
        (1, 2),
        (5, 5),
        (9, 4),
        (4, 9),
        (17, 12),
        (12, 17),
    ];

    fn random(rng: &mut StdRng, m: usize, n: usize) -> Mat<c64> {
        Mat::from_fn(m, n, |_, _| c64::new(rng.gen(), rng.gen()))
    }

    fn assert_close(lhs: &Mat<c64>, rhs: &Mat<c64>) {
        assert!(lhs.shape() == rhs.shape());
        for j in 0..lhs.ncols() {
            for i in 0..lhs.nrows() {
                assert_approx_eq!(lhs.read(i, j), rhs.read(i, j), 1e-10);
            }
        }
    }

    #[test]
    fn explicit_reconstructs() {
        let mut rng = StdRng::seed_from_u64(0);
        for (m, n) in SHAPES {
            let a = random(&mut rng, m, n);
            for blocksize in [1, 3, 32] {
                let params = BlockParams::with_blocksize(blocksize);
                let mut b = a.clone();
                let (q, p) = explicit(
                    b.as_mut(),
                    params,
                    PodStack::new(&mut GlobalPodBuffer::new(
                        explicit_req::<c64>(m, n, params).unwrap(),
                    )),
                );
                let r = Ord::min(m, n);
                for j in 0..n {
                    for i in 0..m {
                        if is_bidiagonal_entry(m, n, i, j) {
                            assert_approx_eq!(b.read(i, j).im, 0.0, 1e-12);
                        } else {
                            assert!(b.read(i, j) == c64::zero());
                        }
                    }
                }
                let br = b.as_ref().submatrix(0, 0, r, r).to_owned();
                assert_close(&(&(&q * &br) * &p.adjoint()), &a);
                assert_close(&(&q.adjoint() * &q), &Mat::identity(r, r));
                assert_close(&(&p.adjoint() * &p), &Mat::identity(r, r));
            }
        }
    }

    #[test]
    fn apply_full_factors() {
        let mut rng = StdRng::seed_from_u64(1);
        for (m, n) in [(7, 4), (4, 7), (6, 6)] {
            let a = random(&mut rng, m, n);
            let mut h = a.clone();
            let (kq, kp) = reflector_counts(m, n);
            let mut tq = vec![c64::zero(); kq];
            let mut tp = vec![c64::zero(); kp];
            let params = BlockParams::with_blocksize(2);
            reduce_in_place(h.as_mut(), &mut tq, &mut tp, params);

            // Q^H A P = B
            let mut b = a.clone();
            apply_q(
                Side::Left,
                Orientation::Adjoint,
                h.as_ref(),
                &tq,
                b.as_mut(),
                params,
                PodStack::new(&mut GlobalPodBuffer::new(
                    apply_q_req::<c64>(Side::Left, (m, n), params).unwrap(),
                )),
            );
            apply_p(
                Side::Right,
                Orientation::Normal,
                h.as_ref(),
                &tp,
                b.as_mut(),
                params,
                PodStack::new(&mut GlobalPodBuffer::new(
                    apply_p_req::<c64>(Side::Right, (m, n), params).unwrap(),
                )),
            );
            for j in 0..n {
                for i in 0..m {
                    if is_bidiagonal_entry(m, n, i, j) {
                        assert_approx_eq!(b.read(i, j), h.read(i, j), 1e-10);
                    } else {
                        assert_approx_eq!(b.read(i, j), c64::zero(), 1e-10);
                    }
                }
            }
        }
    }

    #[test]
    fn dist_matches_local() {
        let mut rng = StdRng::seed_from_u64(2);
        let params = BlockParams::with_blocksize(3);
        for (m, n) in [(10, 7), (7, 10)] {
            let a = random(&mut rng, m, n);
            let mut h = a.clone();
            let (kq, kp) = reflector_counts(m, n);
            let mut tq = vec![c64::zero(); kq];
            let mut tp = vec![c64::zero(); kp];
            reduce_in_place(h.as_mut(), &mut tq, &mut tp, params);

            let mut condensed = a.clone();
            explicit_condensed(condensed.as_mut(), params);

            for (r, c) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
                Grid::run(r, c, |grid| {
                    let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                    let (d_tq, d_tp) = dist_reduce_in_place(d.as_mut(), params).unwrap();
                    assert_close(&d.as_ref().gather(), &h);
                    for (x, y) in d_tq.iter().zip(&tq).chain(d_tp.iter().zip(&tp)) {
                        assert_approx_eq!(*x, *y, 1e-10);
                    }

                    let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                    let (q, p) = dist_explicit(d.as_mut(), params).unwrap();
                    let b = d.as_ref().gather();
                    assert_close(&b, &condensed);
                    let size = Ord::min(m, n);
                    let br = b.as_ref().submatrix(0, 0, size, size).to_owned();
                    let q = q.as_ref().gather();
                    let p = p.as_ref().gather();
                    assert_close(&(&(&q * &br) * &p.adjoint()), &a);

                    let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                    dist_explicit_condensed(d.as_mut(), params).unwrap();
                    assert_close(&d.as_ref().gather(), &condensed);
                });
            }
        }
    }
}
