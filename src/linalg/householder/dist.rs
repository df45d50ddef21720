//! Householder reflectors over distributed vectors and matrices.

use super::{
    apply_triangular_factor, block_factor, block_schedule, block_starts, make_reflector_impl,
    unit_position, Direction, ReflectorTail,
};
use crate::{
    assert,
    dist::{
        dist_local_matmul, level3::dist_adjoint_product, DistMatMut, DistMatRef, DistMatrix,
        Distribution, McMr, McStar, MrStar, StarMr,
    },
    error::{check_same_grid, Error},
    get_global_parallelism,
    linalg::{
        matmul::{matmul, matmul_with_conj},
        reductions::{norm_max, scaled_sum_of_squares},
    },
    BlockParams, Comm, ComplexField, Conj, MatMut, Orientation, RealField, Result, Side,
};
use reborrow::*;

/// Locally owned part of a distributed reflector tail, split over `comm`.
struct DistTail<'a, E: ComplexField> {
    local: MatMut<'a, E>,
    comm: &'a Comm,
}

impl<E: ComplexField> ReflectorTail<E> for DistTail<'_, E> {
    fn norm(&mut self) -> E::Real {
        let scale = self
            .comm
            .all_reduce(norm_max(self.local.rb()), |x: E::Real, y| x.max(y));
        if scale == E::Real::zero() || !scale.is_finite() {
            return scale;
        }
        let ssq = scaled_sum_of_squares(self.local.rb(), scale);
        let ssq = self.comm.all_reduce(ssq, |x, y| x + y);
        scale * ssq.sqrt()
    }

    fn scale(&mut self, factor: E) {
        self.local.scale(factor);
    }
}

/// Builds the reflector of the vector `[head; tail]` spread over `along`, on the processes that
/// own part of it, then shares `tau` over `across`.
fn make_reflector_along<E: ComplexField>(
    owns: bool,
    mut head: MatMut<'_, E>,
    tail: MatMut<'_, E>,
    along: &Comm,
    head_owner: usize,
    across: &Comm,
    line_owner: usize,
) -> E {
    let mut tau = E::zero();
    if owns {
        let has_head = head.nrows() * head.ncols() == 1;
        let mut alpha = if has_head { head.read(0, 0) } else { E::zero() };
        along.broadcast(head_owner, &mut alpha);

        let mut tail = DistTail { local: tail, comm: along };
        let (t, beta) = make_reflector_impl(alpha, &mut tail);
        if has_head {
            head.write(0, 0, E::from_real(beta));
        }
        tau = t;
    }
    across.broadcast(line_owner, &mut tau);
    tau
}

/// Builds the reflector of the distributed column vector `a = [chi; x]` in place.
///
/// The norm of `x` is reduced over the communicator distributing the rows of `a`, `chi` is
/// broadcast from its owner over the same communicator, and `tau` is broadcast over the
/// communicator distributing the columns, so that every process of the grid returns it.
///
/// # Panics
/// Panics if `a` is not a nonempty column vector.
#[track_caller]
pub fn dist_make_reflector_col<E: ComplexField, D: Distribution>(a: DistMatMut<'_, E, D>) -> E {
    assert!(all(a.ncols() == 1, a.nrows() >= 1));
    let grid = a.grid();
    let owns = a.local().ncols() == 1;
    let (head_owner, line_owner) = (a.row_owner(0), a.col_owner(0));
    let (head, tail) = a.split_at_row_mut(1);
    make_reflector_along(
        owns,
        head.into_local(),
        tail.into_local(),
        D::COL.comm(grid),
        head_owner,
        D::ROW.comm(grid),
        line_owner,
    )
}

/// Builds the reflector of the distributed row vector `a = [chi, x]` in place, so that
/// `a * H = [beta, 0]`. The row stores the conjugate of the essential part.
///
/// # Panics
/// Panics if `a` is not a nonempty row vector.
#[track_caller]
pub fn dist_make_reflector_row<E: ComplexField, D: Distribution>(a: DistMatMut<'_, E, D>) -> E {
    assert!(all(a.nrows() == 1, a.ncols() >= 1));
    let grid = a.grid();
    let owns = a.local().nrows() == 1;
    let (head_owner, line_owner) = (a.col_owner(0), a.row_owner(0));
    let mut a = a;
    super::conj_in_place(a.local_mut());
    let (head, tail) = a.rb_mut().split_at_col_mut(1);
    let tau = make_reflector_along(
        owns,
        head.into_local(),
        tail.into_local(),
        D::ROW.comm(grid),
        head_owner,
        D::COL.comm(grid),
        line_owner,
    );
    super::conj_in_place(a.local_mut());
    tau
}

/// Sets the entries of the explicit reflector block `u` that are implied by the packed storage:
/// zero above the unit entry of each reflector, one at the unit entry.
fn fix_block_structure<E: ComplexField, D: Distribution>(
    u: &mut DistMatrix<E, D>,
    direction: Direction,
    offset: isize,
    first: usize,
    row_start: usize,
) {
    u.as_mut().update_local(|i, j, v| {
        let pos = unit_position(direction, offset, first + j);
        let r = row_start + i;
        if r < pos {
            E::zero()
        } else if r == pos {
            E::one()
        } else {
            v
        }
    });
}

/// Computes `w = w * T` or `w = w * T^H`, with `T` upper triangular.
fn apply_triangular_factor_on_the_right<E: ComplexField>(
    t: crate::MatRef<'_, E>,
    adjoint: bool,
    mut w: MatMut<'_, E>,
) {
    let b = t.nrows();
    for i in 0..w.nrows() {
        if adjoint {
            // (w T^H)_j = sum_{c >= j} w_c conj(T[j, c])
            for j in 0..b {
                let mut acc = E::zero();
                for c in j..b {
                    acc += w.read(i, c) * t.read(j, c).conj();
                }
                w.write(i, j, acc);
            }
        } else {
            // (w T)_j = sum_{c <= j} w_c T[c, j]
            for j in (0..b).rev() {
                let mut acc = E::zero();
                for c in 0..=j {
                    acc += w.read(i, c) * t.read(c, j);
                }
                w.write(i, j, acc);
            }
        }
    }
}

/// Applies the packed reflector sequence `Q = H_0 * ... * H_{k-1}` stored in the distributed
/// matrix `h` to `b`, where `k = t.len()`.
///
/// This is the distributed counterpart of
/// [`apply_packed_reflectors`](super::apply_packed_reflectors). For each block of reflectors, the
/// explicit vectors are spread along the grid rows (`[MC, STAR]`, left application) or the grid
/// columns (`[MR, STAR]`, right application), and the block is applied with local products
/// followed by a sum over the orthogonal communicator.
///
/// This is a collective over the whole grid.
pub fn dist_apply_packed_reflectors<E: ComplexField>(
    side: Side,
    direction: Direction,
    orientation: Orientation,
    offset: isize,
    h: DistMatRef<'_, E, McMr>,
    t: &[E],
    mut b: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<()> {
    const OP: &str = "dist_apply_packed_reflectors";
    check_same_grid(OP, h.grid(), b.grid())?;
    let k = t.len();
    let dim = match side {
        Side::Left => b.nrows(),
        Side::Right => b.ncols(),
    };
    let fits = match direction {
        Direction::Vertical => h.nrows() == dim && h.ncols() >= k,
        Direction::Horizontal => h.ncols() == dim && h.nrows() >= k,
    };
    if !fits {
        let expected = match direction {
            Direction::Vertical => (dim, Ord::max(k, h.ncols())),
            Direction::Horizontal => (Ord::max(k, h.nrows()), dim),
        };
        return Err(Error::ShapeMismatch {
            op: OP,
            expected,
            found: h.shape(),
        });
    }
    if k == 0 {
        return Ok(());
    }
    assert!(unit_position(direction, offset, k - 1) < dim);

    if orientation == Orientation::Transpose {
        super::conj_in_place(b.local_mut());
        dist_apply_packed_reflectors(
            side,
            direction,
            Orientation::Adjoint,
            offset,
            h,
            t,
            b.rb_mut(),
            params,
        )?;
        super::conj_in_place(b.local_mut());
        return Ok(());
    }

    let grid = b.grid();
    let blocksize = params.resolve();
    let (reverse, use_adjoint) = block_schedule(side, orientation == Orientation::Adjoint);

    for first in block_starts(k, blocksize, reverse) {
        let bs = Ord::min(blocksize, k - first);
        let row_start = unit_position(direction, offset, first);
        let len = dim - row_start;
        log::trace!(target: "plaid_householder", "applying reflectors {first}..{}", first + bs);

        match side {
            Side::Left => {
                let mut target = b.rb_mut().subrows_mut(row_start, len);
                let mut u: DistMatrix<E, McStar> = match direction {
                    Direction::Vertical => h
                        .submatrix(row_start, first, len, bs)
                        .redistribute_aligned(target.col_align(), 0),
                    Direction::Horizontal => h
                        .submatrix(first, row_start, bs, len)
                        .adjoint_into_aligned(target.col_align(), 0),
                };
                fix_block_structure(&mut u, direction, offset, first, row_start);

                let s = dist_adjoint_product(u.as_ref(), u.as_ref());
                let mut tf = crate::Mat::zeros(bs, bs);
                block_factor(tf.as_mut(), s.as_ref(), &t[first..first + bs]);

                // W = op(T) * U^H * B, laid out as [STAR, MR]
                let mut w = DistMatrix::<E, StarMr>::with_alignments(
                    grid,
                    bs,
                    target.ncols(),
                    0,
                    target.row_align(),
                );
                matmul_with_conj(
                    w.local_mut().as_mut(),
                    u.local().as_ref().transpose(),
                    Conj::Yes,
                    target.local(),
                    Conj::No,
                    Some(E::one()),
                    E::one(),
                    get_global_parallelism(),
                );
                w.as_mut().sum_over(grid.col_comm());
                apply_triangular_factor(tf.as_ref(), use_adjoint, w.local_mut().as_mut());

                dist_local_matmul(
                    target.rb_mut(),
                    u.as_ref(),
                    w.as_ref(),
                    Some(E::one()),
                    -E::one(),
                )?;
            }
            Side::Right => {
                let mut target = b.rb_mut().subcols_mut(row_start, len);
                let mut u: DistMatrix<E, MrStar> = match direction {
                    Direction::Vertical => h
                        .submatrix(row_start, first, len, bs)
                        .redistribute_aligned(target.row_align(), 0),
                    Direction::Horizontal => h
                        .submatrix(first, row_start, bs, len)
                        .adjoint_into_aligned(target.row_align(), 0),
                };
                fix_block_structure(&mut u, direction, offset, first, row_start);

                let s = dist_adjoint_product(u.as_ref(), u.as_ref());
                let mut tf = crate::Mat::zeros(bs, bs);
                block_factor(tf.as_mut(), s.as_ref(), &t[first..first + bs]);

                // W = B * U * op(T), laid out as [MC, STAR]
                let mut w = DistMatrix::<E, McStar>::with_alignments(
                    grid,
                    target.nrows(),
                    bs,
                    target.col_align(),
                    0,
                );
                matmul(
                    w.local_mut().as_mut(),
                    target.local(),
                    u.local().as_ref(),
                    Some(E::one()),
                    E::one(),
                    get_global_parallelism(),
                );
                w.as_mut().sum_over(grid.row_comm());
                apply_triangular_factor_on_the_right(
                    tf.as_ref(),
                    use_adjoint,
                    w.local_mut().as_mut(),
                );

                let uh = u.as_ref().local_adjoint::<StarMr>();
                dist_local_matmul(
                    target.rb_mut(),
                    w.as_ref(),
                    uh.as_ref(),
                    Some(E::one()),
                    -E::one(),
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{
        c64,
        dist::{StarStar, VcStar},
        linalg::householder::{
            apply_packed_reflectors, apply_packed_reflectors_req, make_reflector,
        },
        Grid, Mat,
    };
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::{GlobalPodBuffer, PodStack};
    use rand::prelude::*;

    fn random(seed: u64, m: usize, n: usize) -> Mat<c64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(m, n, |_, _| c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
    }

    #[test]
    fn reflector_matches_local() {
        for (h, w) in [(1, 1), (2, 1), (1, 3), (2, 3)] {
            Grid::run(h, w, |grid| {
                let a = random(0, 8, 4);

                // column 2, rows 1..
                let mut chi = a.read(1, 2);
                let mut x = Mat::from_fn(6, 1, |i, _| a.read(i + 2, 2));
                let tau = make_reflector(&mut chi, x.as_mut());

                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let dtau = dist_make_reflector_col(d.as_mut().submatrix_mut(1, 2, 7, 1));
                assert_approx_eq!((dtau - tau).norm(), 0.0);
                let g = d.as_ref().gather();
                assert_approx_eq!((g.read(1, 2) - chi).norm(), 0.0);
                for i in 0..6 {
                    assert_approx_eq!((g.read(i + 2, 2) - x.read(i, 0)).norm(), 0.0);
                }

                let mut v = DistMatrix::<c64, VcStar>::from_replicated(grid, a.as_ref().col(2));
                let vtau = dist_make_reflector_col(v.as_mut().subrows_mut(1, 7));
                assert_approx_eq!((vtau - tau).norm(), 0.0);

                // row 3, columns 0..
                let mut d = DistMatrix::<c64, McMr>::from_replicated(grid, a.as_ref());
                let mut chi = a.read(3, 0).conj();
                let mut x = Mat::from_fn(3, 1, |i, _| a.read(3, i + 1).conj());
                let tau = make_reflector(&mut chi, x.as_mut());
                let rtau = dist_make_reflector_row(d.as_mut().row_mut(3));
                assert_approx_eq!((rtau - tau).norm(), 0.0);
                let g = d.as_ref().gather();
                assert_approx_eq!((g.read(3, 0) - chi).norm(), 0.0);
                for j in 0..3 {
                    assert_approx_eq!((g.read(3, j + 1) - x.read(j, 0).conj()).norm(), 0.0);
                }
            });
        }
    }

    #[test]
    fn packed_matches_local() {
        for (gh, gw) in [(1, 1), (2, 1), (1, 3), (2, 2), (2, 3)] {
            Grid::run(gh, gw, |grid| {
                let dim = 9;
                let other = 5;
                let mut seed = 10;
                for (direction, offset, k) in [
                    (Direction::Vertical, 0isize, 7usize),
                    (Direction::Vertical, -1, 8),
                    (Direction::Horizontal, 1, 8),
                ] {
                    let h = match direction {
                        Direction::Vertical => random(seed, dim, k),
                        Direction::Horizontal => random(seed, k, dim),
                    };
                    let t: Vec<c64> =
                        (0..k).map(|i| c64::new(1.0 + 0.1 * i as f64, -0.2)).collect();
                    let orientations =
                        [Orientation::Normal, Orientation::Adjoint, Orientation::Transpose];
                    for side in [Side::Left, Side::Right] {
                        for orientation in orientations {
                            seed += 1;
                            let shape = match side {
                                Side::Left => (dim, other),
                                Side::Right => (other, dim),
                            };
                            let b0 = random(seed, shape.0, shape.1);
                            let params = BlockParams::with_blocksize(3);

                            let mut expected = b0.clone();
                            let mut mem = GlobalPodBuffer::new(
                                apply_packed_reflectors_req::<c64>(side, shape, params).unwrap(),
                            );
                            apply_packed_reflectors(
                                side,
                                direction,
                                orientation,
                                offset,
                                h.as_ref(),
                                &t,
                                expected.as_mut(),
                                params,
                                PodStack::new(&mut mem),
                            );

                            let dh = DistMatrix::<c64, McMr>::from_replicated(grid, h.as_ref());
                            let mut db =
                                DistMatrix::<c64, McMr>::from_replicated(grid, b0.as_ref());
                            dist_apply_packed_reflectors(
                                side,
                                direction,
                                orientation,
                                offset,
                                dh.as_ref(),
                                &t,
                                db.as_mut(),
                                params,
                            )
                            .unwrap();
                            let got = db.as_ref().redistribute::<StarStar>().into_local();
                            for j in 0..shape.1 {
                                for i in 0..shape.0 {
                                    let diff = got.read(i, j) - expected.read(i, j);
                                    assert_approx_eq!(diff.norm(), 0.0);
                                }
                            }
                        }
                    }
                }
            });
        }
    }
}
