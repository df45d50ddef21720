//! Householder reflectors.
//!
//! A reflector is the unitary matrix $H = I - \tau u u^H$, where $u = [1; v]$. The vector $v$ is
//! called the essential part of $u$ and is stored in place of the entries the reflector zeroes,
//! while $\tau$ is stored separately.
//!
//! Reflectors are built following the FLAME convention: given $\chi$ and $x$, [`make_reflector`]
//! returns $\tau$ and overwrites $\chi$ with $\beta$ and $x$ with $v$, such that
//! $$H^H \begin{bmatrix}\chi \\ x\end{bmatrix} = \begin{bmatrix}\beta \\ 0\end{bmatrix},$$
//! with $\beta$ real and $|\tau| \le 2$. When $x = 0$ and $\chi$ is real, the reflector degenerates
//! to $\tau = 2$, $v = 0$, which negates $\chi$.
//!
//! A sequence of reflectors $Q = H_0 H_1 \dots H_{k-1}$ is stored packed in a matrix, either by
//! columns ([`Direction::Vertical`]) or by rows ([`Direction::Horizontal`]), and applied by blocks
//! in compact WY form: a block of $b$ consecutive reflectors equals $I - U T U^H$, where
//! $U = [u_0, \dots, u_{b-1}]$ and $T$ is a $b \times b$ upper triangular matrix built from
//! $U^H U$ and the $\tau_i$.

use crate::{
    assert, get_global_parallelism,
    linalg::{
        matmul::{matmul, matmul_with_conj},
        reductions::norm_frobenius,
        temp_mat_req, temp_mat_uninit, temp_mat_zeroed,
    },
    BlockParams, ComplexField, Conj, MatMut, MatRef, Orientation, RealField, Side,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

pub mod dist;

/// Maximum number of rescaling steps of a tiny reflector.
const MAX_RESCALES: usize = 20;

/// Storage of a packed sequence of reflectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Reflector `i` is stored in column `i`, its implicit unit entry at row `i - offset`.
    Vertical,
    /// The conjugate of reflector `i` is stored in row `i`, its implicit unit entry at column
    /// `i + offset`.
    Horizontal,
}

/// Tail `x` of the vector a reflector is built from.
pub(crate) trait ReflectorTail<E: ComplexField> {
    fn norm(&mut self) -> E::Real;
    fn scale(&mut self, factor: E);
}

impl<E: ComplexField> ReflectorTail<E> for MatMut<'_, E> {
    #[inline]
    fn norm(&mut self) -> E::Real {
        norm_frobenius((*self).rb())
    }

    #[inline]
    fn scale(&mut self, factor: E) {
        MatMut::scale(self, factor)
    }
}

/// `beta = -sign(re(alpha)) * |[alpha; norm]|`, with a non positive real part giving a non
/// negative `beta`.
#[inline]
fn signed_norm<E: ComplexField>(alpha: E, norm: E::Real) -> E::Real {
    let abs = alpha.abs().hypot(norm);
    if alpha.real() <= E::Real::zero() {
        abs
    } else {
        -abs
    }
}

/// Builds a reflector from its head `alpha` and its tail, returning `(tau, beta)`.
///
/// The tail is overwritten by the essential part of the reflector.
pub(crate) fn make_reflector_impl<E: ComplexField>(
    alpha: E,
    tail: &mut impl ReflectorTail<E>,
) -> (E, E::Real) {
    let mut norm = tail.norm();
    if norm == E::Real::zero() && alpha.imag() == E::Real::zero() {
        return (E::from_f64(2.0), -alpha.real());
    }

    let mut alpha = alpha;
    let mut beta = signed_norm(alpha, norm);

    let safe_min = E::Real::safe_min() / E::Real::epsilon();
    let mut count = 0;
    if beta.abs() < safe_min {
        let inv = safe_min.inv();
        while beta.abs() < safe_min && count < MAX_RESCALES {
            tail.scale(E::from_real(inv));
            alpha = alpha.scale_real(inv);
            beta = beta * inv;
            count += 1;
        }
        norm = tail.norm();
        beta = signed_norm(alpha, norm);
    }

    let beta_e = E::from_real(beta);
    let tau = (beta_e - alpha) / beta_e;
    tail.scale((alpha - beta_e).inv());

    for _ in 0..count {
        beta = beta * safe_min;
    }
    (tau, beta)
}

/// Builds the reflector annihilating `x` against `chi`.
///
/// Overwrites `chi` with `beta` and `x` (a column vector) with the essential part `v`, and returns
/// `tau`. See the [module level documentation](self).
///
/// # Panics
/// Panics if `x` is not a column vector.
#[track_caller]
pub fn make_reflector<E: ComplexField>(chi: &mut E, x: MatMut<'_, E>) -> E {
    assert!(x.ncols() == 1);
    let mut x = x;
    let (tau, beta) = make_reflector_impl(*chi, &mut x);
    *chi = E::from_real(beta);
    tau
}

/// Builds the reflector annihilating the row `x` against `chi`, so that
/// `[chi, x] * H = [beta, 0]`.
///
/// Overwrites `chi` with `beta` and `x` (a row vector) with the conjugate of the essential part,
/// and returns `tau`.
///
/// # Panics
/// Panics if `x` is not a row vector.
#[track_caller]
pub fn make_row_reflector<E: ComplexField>(chi: &mut E, x: MatMut<'_, E>) -> E {
    assert!(x.nrows() == 1);
    let mut x = x.transpose_mut();
    conj_in_place(x.rb_mut());
    let mut alpha = chi.conj();
    let tau = make_reflector(&mut alpha, x.rb_mut());
    conj_in_place(x);
    *chi = alpha.conj();
    tau
}

#[inline]
pub(crate) fn conj_in_place<E: ComplexField>(mut mat: MatMut<'_, E>) {
    if E::IS_REAL {
        return;
    }
    let (m, n) = mat.shape();
    for j in 0..n {
        for i in 0..m {
            unsafe {
                let v = mat.read_unchecked(i, j);
                mat.write_unchecked(i, j, v.conj());
            }
        }
    }
}

/// Applies the reflector `H = I - tau * u * u^H`, `u = [1; essential]`, to `mat`.
///
/// With `Side::Left`, computes `H * mat`, and `mat` must have `1 + essential.nrows()` rows. With
/// `Side::Right`, computes `mat * H`, and `mat` must have `1 + essential.nrows()` columns. `H^H` is
/// applied by passing `conj(tau)`.
#[track_caller]
pub fn apply_reflector<E: ComplexField>(
    side: Side,
    tau: E,
    essential: MatRef<'_, E>,
    mat: MatMut<'_, E>,
) {
    assert!(essential.ncols() == 1);
    match side {
        Side::Left => {
            assert!(mat.nrows() == 1 + essential.nrows());
            let (head, tail) = mat.split_at_row_mut(1);
            apply_left(tau, essential, head, tail);
        }
        Side::Right => {
            assert!(mat.ncols() == 1 + essential.nrows());
            // (mat * H)^T = H^T * mat^T, and H^T is the reflector of conj(u) with the same tau
            let mut mat = mat.transpose_mut();
            let (head, tail) = mat.rb_mut().split_at_row_mut(1);
            let mut head = head;
            let mut tail = tail;
            let n = head.ncols();
            let mut w = crate::Mat::from_fn(1, n, |_, j| head.read(0, j));
            matmul_with_conj(
                w.as_mut(),
                essential.transpose(),
                Conj::No,
                tail.rb(),
                Conj::No,
                Some(E::one()),
                E::one(),
                get_global_parallelism(),
            );
            for j in 0..n {
                let v = head.read(0, j);
                head.write(0, j, v - tau * w.read(0, j));
            }
            matmul_with_conj(
                tail.rb_mut(),
                essential,
                Conj::Yes,
                w.as_ref(),
                Conj::No,
                Some(E::one()),
                -tau,
                get_global_parallelism(),
            );
        }
    }
}

fn apply_left<E: ComplexField>(
    tau: E,
    essential: MatRef<'_, E>,
    mut head: MatMut<'_, E>,
    mut tail: MatMut<'_, E>,
) {
    let n = head.ncols();
    // w = u^H * mat
    let mut w = crate::Mat::from_fn(1, n, |_, j| head.read(0, j));
    matmul_with_conj(
        w.as_mut(),
        essential.transpose(),
        Conj::Yes,
        tail.rb(),
        Conj::No,
        Some(E::one()),
        E::one(),
        get_global_parallelism(),
    );
    for j in 0..n {
        let v = head.read(0, j);
        head.write(0, j, v - tau * w.read(0, j));
    }
    matmul(
        tail.rb_mut(),
        essential,
        w.as_ref(),
        Some(E::one()),
        -tau,
        get_global_parallelism(),
    );
}

/// Position of the implicit unit entry of reflector `i`, in the space it acts on.
#[inline]
pub(crate) fn unit_position(direction: Direction, offset: isize, i: usize) -> usize {
    match direction {
        Direction::Vertical => {
            assert!(offset <= 0);
            i + offset.unsigned_abs()
        }
        Direction::Horizontal => {
            assert!(offset >= 0);
            i + offset as usize
        }
    }
}

/// Builds the upper triangular factor `T` of a block of reflectors from `s = U^H * U` and their
/// coefficients, so that `H_0 * ... * H_{b-1} = I - U * T * U^H`.
pub(crate) fn block_factor<E: ComplexField>(mut t: MatMut<'_, E>, s: MatRef<'_, E>, tau: &[E]) {
    let b = tau.len();
    assert!(all(t.nrows() == b, t.ncols() == b, s.nrows() == b, s.ncols() == b));
    t.fill_zero();
    for i in 0..b {
        t.write(i, i, tau[i]);
        // T[:i, i] = -tau_i * T[:i, :i] * S[:i, i]
        for r in 0..i {
            let mut acc = E::zero();
            for c in r..i {
                acc += t.read(r, c) * s.read(c, i);
            }
            t.write(r, i, -tau[i] * acc);
        }
    }
}

/// Writes into `u` the explicit reflector vectors `first..first + u.ncols()`, restricted to the
/// rows `row_start..` of the space they act on.
fn unpack_block<E: ComplexField>(
    mut u: MatMut<'_, E>,
    direction: Direction,
    offset: isize,
    h: MatRef<'_, E>,
    first: usize,
    row_start: usize,
) {
    let (len, b) = u.shape();
    for j in 0..b {
        let pos = unit_position(direction, offset, first + j);
        for i in 0..len {
            let r = row_start + i;
            let value = if r < pos {
                E::zero()
            } else if r == pos {
                E::one()
            } else {
                match direction {
                    Direction::Vertical => h.read(r, first + j),
                    Direction::Horizontal => h.read(first + j, r).conj(),
                }
            };
            u.write(i, j, value);
        }
    }
}

/// Order in which the blocks of a reflector sequence are applied, and whether `T` or `T^H` is
/// used.
#[inline]
pub(crate) fn block_schedule(side: Side, adjoint: bool) -> (bool, bool) {
    // (reverse order, use T^H)
    match (side, adjoint) {
        (Side::Left, false) => (true, false),
        (Side::Left, true) => (false, true),
        (Side::Right, false) => (false, false),
        (Side::Right, true) => (true, true),
    }
}

/// Start of every block of `k` reflectors, in the order they are applied.
pub(crate) fn block_starts(k: usize, blocksize: usize, reverse: bool) -> Vec<usize> {
    let mut starts: Vec<usize> = (0..k).step_by(blocksize).collect();
    if reverse {
        starts.reverse();
    }
    starts
}

/// Returns the stack requirements for [`apply_packed_reflectors`].
pub fn apply_packed_reflectors_req<E: ComplexField>(
    side: Side,
    b_shape: (usize, usize),
    params: BlockParams,
) -> Result<StackReq, SizeOverflow> {
    let bs = params.resolve();
    let (dim, other) = match side {
        Side::Left => b_shape,
        Side::Right => (b_shape.1, b_shape.0),
    };
    StackReq::try_all_of([
        temp_mat_req::<E>(dim, bs)?,
        temp_mat_req::<E>(bs, bs)?,
        temp_mat_req::<E>(bs, bs)?,
        temp_mat_req::<E>(bs, other)?,
    ])
}

/// Applies the packed reflector sequence `Q = H_0 * ... * H_{k-1}` to `b`, where `k = t.len()`.
///
/// Depending on `side` and `orientation`, `b` is overwritten by `op(Q) * b` or `b * op(Q)`.
/// The reflectors are read from `h` as described by `direction` and `offset`; `h` spans the
/// whole space `Q` acts on along its storage axis.
///
/// # Panics
/// Panics if the dimensions are not compatible, or if `offset` has the wrong sign for
/// `direction`.
#[track_caller]
pub fn apply_packed_reflectors<E: ComplexField>(
    side: Side,
    direction: Direction,
    orientation: Orientation,
    offset: isize,
    h: MatRef<'_, E>,
    t: &[E],
    b: MatMut<'_, E>,
    params: BlockParams,
    stack: PodStack<'_>,
) {
    let mut b = b;
    let k = t.len();
    let dim = match side {
        Side::Left => b.nrows(),
        Side::Right => b.ncols(),
    };
    match direction {
        Direction::Vertical => assert!(all(h.nrows() == dim, h.ncols() >= k)),
        Direction::Horizontal => assert!(all(h.ncols() == dim, h.nrows() >= k)),
    }
    if k == 0 {
        return;
    }
    assert!(unit_position(direction, offset, k - 1) < dim);

    if orientation == Orientation::Transpose {
        // Q^T * B = conj(Q^H * conj(B))
        conj_in_place(b.rb_mut());
        apply_packed_reflectors(
            side,
            direction,
            Orientation::Adjoint,
            offset,
            h,
            t,
            b.rb_mut(),
            params,
            stack,
        );
        conj_in_place(b);
        return;
    }

    // work on `B` from the left
    let mut b = match side {
        Side::Left => b,
        Side::Right => b.transpose_mut(),
    };
    let other = b.ncols();
    let blocksize = params.resolve();
    let (reverse, use_adjoint) = block_schedule(side, orientation == Orientation::Adjoint);
    let parallelism = get_global_parallelism();

    let mut stack = stack;
    for first in block_starts(k, blocksize, reverse) {
        let bs = Ord::min(blocksize, k - first);
        let row_start = unit_position(direction, offset, first);
        let len = dim - row_start;

        let (mut u, stack) = temp_mat_uninit::<E>(len, bs, stack.rb_mut());
        unpack_block(u.rb_mut(), direction, offset, h, first, row_start);

        let (mut s, stack) = temp_mat_zeroed::<E>(bs, bs, stack);
        matmul_with_conj(
            s.rb_mut(),
            u.rb().transpose(),
            Conj::Yes,
            u.rb(),
            Conj::No,
            None,
            E::one(),
            parallelism,
        );
        let (mut tf, stack) = temp_mat_uninit::<E>(bs, bs, stack);
        block_factor(tf.rb_mut(), s.rb(), &t[first..first + bs]);

        let mut target = b.rb_mut().subrows_mut(row_start, len);
        match side {
            Side::Left => {
                // B -= U * (op(T) * (U^H * B))
                let (mut w, _) = temp_mat_zeroed::<E>(bs, other, stack);
                matmul_with_conj(
                    w.rb_mut(),
                    u.rb().transpose(),
                    Conj::Yes,
                    target.rb(),
                    Conj::No,
                    None,
                    E::one(),
                    parallelism,
                );
                apply_triangular_factor(tf.rb(), use_adjoint, w.rb_mut());
                matmul(
                    target.rb_mut(),
                    u.rb(),
                    w.rb(),
                    Some(E::one()),
                    -E::one(),
                    parallelism,
                );
            }
            Side::Right => {
                // B^T -= conj(U) * (op(T)^T * (U^T * B^T))
                let (mut w, _) = temp_mat_zeroed::<E>(bs, other, stack);
                matmul_with_conj(
                    w.rb_mut(),
                    u.rb().transpose(),
                    Conj::No,
                    target.rb(),
                    Conj::No,
                    None,
                    E::one(),
                    parallelism,
                );
                conj_in_place(w.rb_mut());
                apply_triangular_factor(tf.rb(), !use_adjoint, w.rb_mut());
                conj_in_place(w.rb_mut());
                matmul_with_conj(
                    target.rb_mut(),
                    u.rb(),
                    Conj::Yes,
                    w.rb(),
                    Conj::No,
                    Some(E::one()),
                    -E::one(),
                    parallelism,
                );
            }
        }
    }
}

/// Computes `w = T * w` or `w = T^H * w`, with `T` upper triangular.
pub(crate) fn apply_triangular_factor<E: ComplexField>(
    t: MatRef<'_, E>,
    adjoint: bool,
    mut w: MatMut<'_, E>,
) {
    let b = t.nrows();
    let n = w.ncols();
    for j in 0..n {
        if adjoint {
            // (T^H w)_i = sum_{r <= i} conj(T[r, i]) w_r, computed from the bottom
            for i in (0..b).rev() {
                let mut acc = E::zero();
                for r in 0..=i {
                    acc += t.read(r, i).conj() * w.read(r, j);
                }
                w.write(i, j, acc);
            }
        } else {
            // (T w)_i = sum_{c >= i} T[i, c] w_c, computed from the top
            for i in 0..b {
                let mut acc = E::zero();
                for c in i..b {
                    acc += t.read(i, c) * w.read(c, j);
                }
                w.write(i, j, acc);
            }
        }
    }
}
