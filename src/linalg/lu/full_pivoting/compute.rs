use crate::{
    assert,
    dist::{dist_local_matmul, dist_permute_cols, dist_permute_rows, McMr, McStar, StarMr, VcStar},
    linalg::lu::{better_pivot, eliminate},
    perm::pivots_to_partial_permutation,
    ComplexField, DistMatMut, DistMatrix, MatMut, Parallelism, Result,
};
use reborrow::*;

/// Returns the position of the entry of largest modulus in `matrix[start.., start..]`, scanning
/// column by column.
fn best_in_block<E: ComplexField>(matrix: MatMut<'_, E>, start: usize) -> (usize, usize) {
    let mut best = E::Real::zero();
    let mut best_pos = (start, start);
    for j in start..matrix.ncols() {
        for i in start..matrix.nrows() {
            let abs = matrix.read(i, j).abs();
            if abs > best {
                best = abs;
                best_pos = (i, j);
            }
        }
    }
    best_pos
}

/// Computes the LU factors of `matrix` with full pivoting, and stores them in place.
///
/// `row_pivots[j]` and `col_pivots[j]` receive the row and column exchanged with row and column
/// `j` at step `j`. Returns the total number of actual exchanges.
///
/// # Panics
/// Panics if either pivot slice does not have length `min(matrix.nrows(), matrix.ncols())`.
#[track_caller]
pub fn lu_in_place<E: ComplexField>(
    matrix: MatMut<'_, E>,
    row_pivots: &mut [usize],
    col_pivots: &mut [usize],
    parallelism: Parallelism,
) -> usize {
    let size = Ord::min(matrix.nrows(), matrix.ncols());
    assert!(all(row_pivots.len() == size, col_pivots.len() == size));

    let mut matrix = matrix;
    let mut n_transpositions = 0;
    for j in 0..size {
        let (pi, pc) = best_in_block(matrix.rb_mut(), j);
        row_pivots[j] = pi;
        col_pivots[j] = pc;
        if pi != j {
            n_transpositions += 1;
            matrix.swap_rows(j, pi);
        }
        if pc != j {
            n_transpositions += 1;
            matrix.swap_cols(j, pc);
        }
        eliminate(matrix.rb_mut(), j, parallelism);
    }
    n_transpositions
}

/// Computes the LU factors of the distributed matrix `a` with full pivoting, and stores them in
/// place.
///
/// Returns the images `(p, q)` of the row and column permutations. Every step reduces the
/// pivot candidates over the whole grid, exchanges one row and one column, then applies a rank
/// one update to the trailing matrix from `[MC, STAR]` and `[STAR, MR]` copies of the pivot
/// column and row.
///
/// This is a collective over the whole grid.
pub fn dist_lu_in_place<E: ComplexField>(
    a: DistMatMut<'_, E, McMr>,
) -> Result<(DistMatrix<usize, VcStar>, DistMatrix<usize, VcStar>)> {
    let mut a = a;
    let (m, n) = a.shape();
    let size = Ord::min(m, n);
    let grid = a.grid();

    let mut p = DistMatrix::<usize, VcStar>::from_fn(grid, m, 1, |i, _| i);
    let mut q = DistMatrix::<usize, VcStar>::from_fn(grid, n, 1, |i, _| i);

    for j in 0..size {
        log::trace!(target: "plaid_lu", "full pivoting step {} of {}", j, size);

        let mut candidate = None;
        {
            let local = a.local();
            for jl in 0..local.ncols() {
                let col = a.global_col(jl);
                if col < j {
                    continue;
                }
                for il in 0..local.nrows() {
                    let row = a.global_row(il);
                    if row >= j {
                        let abs = local.read(il, jl).abs();
                        candidate = better_pivot(candidate, Some((abs, (col, row))));
                    }
                }
            }
        }
        let (pc, pi) = match grid.vc_comm().all_reduce(candidate, better_pivot) {
            Some((_, pos)) => pos,
            None => (j, j),
        };

        let row_perm = pivots_to_partial_permutation(&[pi - j]);
        let col_perm = pivots_to_partial_permutation(&[pc - j]);
        dist_permute_rows(a.rb_mut().subrows_mut(j, m - j), &row_perm);
        dist_permute_cols(a.rb_mut().subcols_mut(j, n - j), &col_perm);
        dist_permute_rows(p.as_mut().subrows_mut(j, m - j), &row_perm);
        dist_permute_rows(q.as_mut().subrows_mut(j, n - j), &col_perm);

        let pivot = a.rb().read_global(j, j);
        if pivot != E::zero() {
            let inv = pivot.inv();
            a.rb_mut()
                .submatrix_mut(j + 1, j, m - j - 1, 1)
                .update_local(|_, _, v| v * inv);
        }

        if j + 1 < m && j + 1 < n {
            let a22 = a.rb().submatrix(j + 1, j + 1, m - j - 1, n - j - 1);
            let (col_align, row_align) = (a22.col_align(), a22.row_align());
            let col = a
                .rb()
                .submatrix(j + 1, j, m - j - 1, 1)
                .redistribute_aligned::<McStar>(col_align, 0);
            let row = a
                .rb()
                .submatrix(j, j + 1, 1, n - j - 1)
                .redistribute_aligned::<StarMr>(0, row_align);
            let a22 = a.rb_mut().submatrix_mut(j + 1, j + 1, m - j - 1, n - j - 1);
            dist_local_matmul(a22, col.as_ref(), row.as_ref(), Some(E::one()), -E::one())?;
        }
    }
    Ok((p, q))
}
