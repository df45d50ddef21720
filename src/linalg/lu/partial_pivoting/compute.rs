use crate::{
    assert,
    dist::{
        dist_local_matmul, dist_permute_rows, McMr, McStar, StarMr, StarStar, StarVr, VcStar,
    },
    get_global_parallelism,
    linalg::{
        lu::{best_in_col, better_pivot, eliminate, recursion_blocksize, RECURSION_THRESHOLD},
        matmul::matmul,
        triangular_solve::solve_unit_lower_triangular_in_place,
    },
    perm::pivots_to_partial_permutation,
    BlockParams, ComplexField, DistMatMut, DistMatRef, DistMatrix, MatMut, Parallelism, Result,
};
use reborrow::*;

/// Exchanges row `i` and row `pivots[i]` of `matrix`, for every `i` in order.
pub(crate) fn apply_pivots<E: ComplexField>(mut matrix: MatMut<'_, E>, pivots: &[usize]) {
    for (i, &p) in pivots.iter().enumerate() {
        if p != i {
            matrix.swap_rows(i, p);
        }
    }
}

fn lu_unblocked<E: ComplexField>(mut matrix: MatMut<'_, E>, pivots: &mut [usize]) -> usize {
    let mut n_transpositions = 0;
    for j in 0..pivots.len() {
        let (imax, _) = best_in_col(matrix.rb().col(j), j);
        pivots[j] = imax;
        if imax != j {
            n_transpositions += 1;
            matrix.swap_rows(j, imax);
        }
        eliminate(matrix.rb_mut(), j, Parallelism::None);
    }
    n_transpositions
}

fn lu_recursive<E: ComplexField>(
    mut matrix: MatMut<'_, E>,
    pivots: &mut [usize],
    parallelism: Parallelism,
) -> usize {
    let n = pivots.len();
    if n <= RECURSION_THRESHOLD {
        return lu_unblocked(matrix, pivots);
    }

    let m = matrix.nrows();
    let bs = recursion_blocksize(n);
    let (left_pivots, right_pivots) = pivots.split_at_mut(bs);

    let mut n_transpositions =
        lu_recursive(matrix.rb_mut().subcols_mut(0, bs), left_pivots, parallelism);
    apply_pivots(matrix.rb_mut().subcols_mut(bs, n - bs), left_pivots);

    {
        let (a00, mut a01, a10, mut a11) = matrix.rb_mut().split_at_mut(bs, bs);
        solve_unit_lower_triangular_in_place(a00.rb(), a01.rb_mut(), parallelism);
        matmul(
            a11.rb_mut(),
            a10.rb(),
            a01.rb(),
            Some(E::one()),
            -E::one(),
            parallelism,
        );
        n_transpositions += lu_recursive(a11, right_pivots, parallelism);
    }

    apply_pivots(
        matrix.rb_mut().submatrix_mut(bs, 0, m - bs, bs),
        right_pivots,
    );
    for p in right_pivots.iter_mut() {
        *p += bs;
    }
    n_transpositions
}

/// Computes the LU factors of `matrix` with partial pivoting, and stores them in place.
///
/// `pivots[i]` receives the row exchanged with row `i` at step `i`, which can be turned into the
/// permutation `P` with [`pivots_to_permutation`](crate::perm::pivots_to_permutation). Returns
/// the number of actual exchanges.
///
/// # Panics
/// Panics if `pivots.len() != min(matrix.nrows(), matrix.ncols())`.
#[track_caller]
pub fn lu_in_place<E: ComplexField>(
    matrix: MatMut<'_, E>,
    pivots: &mut [usize],
    parallelism: Parallelism,
) -> usize {
    let (m, n) = matrix.shape();
    let size = Ord::min(m, n);
    assert!(pivots.len() == size);

    let mut matrix = matrix;
    let n_transpositions = lu_recursive(matrix.rb_mut().subcols_mut(0, size), pivots, parallelism);

    if n > size {
        let (left, mut right) = matrix.split_at_col_mut(size);
        apply_pivots(right.rb_mut(), pivots);
        solve_unit_lower_triangular_in_place(left.rb(), right, parallelism);
    }
    n_transpositions
}

/// Returns the locally owned row `i` of `panel`, or an empty row if it is not owned.
fn read_row<E: ComplexField>(panel: DistMatRef<'_, E, McStar>, i: usize) -> Vec<E> {
    match panel.local_row(i) {
        Some(il) => (0..panel.ncols()).map(|c| panel.local().read(il, c)).collect(),
        None => Vec::new(),
    }
}

/// Factors the panel `panel` in place, with rows spread over the grid column and columns
/// replicated.
///
/// At each column, the candidate of largest modulus is reduced over the grid column as a
/// `(modulus, row)` pair, the winning row is broadcast by its owner and exchanged with the
/// current row, and the rows below are eliminated. Every process of a grid row holds the same
/// panel and does the same work.
fn dist_panel_lu<E: ComplexField>(mut panel: DistMatMut<'_, E, McStar>, pivots: &mut [usize]) {
    let nb = panel.ncols();
    let comm = panel.grid().col_comm();
    let local_nrows = panel.local().nrows();

    for j in 0..nb {
        let mut candidate = None;
        for il in 0..local_nrows {
            let i = panel.global_row(il);
            if i >= j {
                let abs = panel.local().read(il, j).abs();
                candidate = better_pivot(candidate, Some((abs, i)));
            }
        }
        let piv = match comm.all_reduce(candidate, better_pivot) {
            Some((_, i)) => i,
            None => j,
        };
        pivots[j] = piv;

        let mut pivot_row = read_row(panel.rb(), piv);
        comm.broadcast(panel.row_owner(piv), &mut pivot_row);
        if piv != j {
            let mut current_row = read_row(panel.rb(), j);
            comm.broadcast(panel.row_owner(j), &mut current_row);
            let (piv_local, j_local) = (panel.local_row(piv), panel.local_row(j));
            let mut local = panel.local_mut();
            if let Some(il) = piv_local {
                for (c, &value) in current_row.iter().enumerate() {
                    local.write(il, c, value);
                }
            }
            if let Some(il) = j_local {
                for (c, &value) in pivot_row.iter().enumerate() {
                    local.write(il, c, value);
                }
            }
        }

        let pivot = pivot_row[j];
        let inv = if pivot == E::zero() {
            None
        } else {
            Some(pivot.inv())
        };
        for il in 0..local_nrows {
            if panel.global_row(il) <= j {
                continue;
            }
            let mut local = panel.local_mut();
            let mut l = local.read(il, j);
            if let Some(inv) = inv {
                l = l * inv;
                local.write(il, j, l);
            }
            for c in j + 1..nb {
                let v = local.read(il, c);
                local.write(il, c, v - l * pivot_row[c]);
            }
        }
    }
}

/// Computes the LU factors of the distributed matrix `a` with partial pivoting, and stores them
/// in place.
///
/// Returns the image `p` of the row permutation: row `i` of $PA$ is row `p[i]` of $A$.
///
/// For each panel, the panel columns are staged in `[MC, STAR]` and factored by
/// [`dist_panel_lu`], the row exchanges are applied to the columns on both sides of the panel
/// and to `p`, then the block row to the right of the panel is solved against `L11` in
/// `[STAR, VR]` and the trailing matrix receives the local product of the panel and the solved
/// block row.
///
/// This is a collective over the whole grid.
pub fn dist_lu_in_place<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
    params: BlockParams,
) -> Result<DistMatrix<usize, VcStar>> {
    let mut a = a;
    let (m, n) = a.shape();
    let size = Ord::min(m, n);
    let blocksize = params.resolve();
    let parallelism = get_global_parallelism();

    let mut p = DistMatrix::<usize, VcStar>::from_fn(a.grid(), m, 1, |i, _| i);
    let mut pivots = vec![0usize; Ord::min(blocksize, size)];

    let mut k = 0;
    while k < size {
        let nb = Ord::min(blocksize, size - k);
        log::trace!(target: "plaid_lu", "partial pivoting panel {}..{} of {}", k, k + nb, size);
        let pivots = &mut pivots[..nb];

        let panel_view = a.rb().submatrix(k, k, m - k, nb);
        let mut panel = panel_view.redistribute_aligned::<McStar>(panel_view.col_align(), 0);
        dist_panel_lu(panel.as_mut(), pivots);
        a.rb_mut()
            .submatrix_mut(k, k, m - k, nb)
            .copy_from(panel.as_ref())?;

        let perm = pivots_to_partial_permutation(pivots);
        dist_permute_rows(a.rb_mut().submatrix_mut(k, 0, m - k, k), &perm);
        dist_permute_rows(
            a.rb_mut().submatrix_mut(k, k + nb, m - k, n - k - nb),
            &perm,
        );
        dist_permute_rows(p.as_mut().subrows_mut(k, m - k), &perm);

        if k + nb < n {
            let rest = n - k - nb;
            let a11 = panel.as_ref().subrows(0, nb).redistribute::<StarStar>();

            let a12_view = a.rb().submatrix(k, k + nb, nb, rest);
            let row_align = a12_view.row_align();
            let mut a12 = a12_view.redistribute::<StarVr>();
            solve_unit_lower_triangular_in_place(
                a11.local().as_ref(),
                a12.local_mut().as_mut(),
                parallelism,
            );
            let a12 = a12.as_ref().redistribute_aligned::<StarMr>(0, row_align);
            a.rb_mut()
                .submatrix_mut(k, k + nb, nb, rest)
                .copy_from(a12.as_ref())?;

            if k + nb < m {
                let a21 = panel.as_ref().subrows(nb, m - k - nb);
                let a22 = a.rb_mut().submatrix_mut(k + nb, k + nb, m - k - nb, rest);
                dist_local_matmul(a22, a21, a12.as_ref(), Some(E::one()), -E::one())?;
            }
        }
        k += nb;
    }
    Ok(p)
}
