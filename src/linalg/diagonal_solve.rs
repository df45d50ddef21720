//! Solves with diagonal matrices.
//!
//! The diagonal `d` is given as a column vector. [`diagonal_solve`] overwrites `A` with
//! $\operatorname{op}(D)^{-1} A$ or $A \operatorname{op}(D)^{-1}$, and
//! [`symmetric_diagonal_solve`] overwrites it with $D^{-1} A D^{-1}$.

use crate::{
    dist::Distribution,
    error::{check_same_grid, check_shape},
    ComplexField, DistMatMut, DistMatRef, Error, MatMut, MatRef, Orientation, Result, Side,
};

#[inline]
fn divisor<E: ComplexField>(orientation: Orientation, value: E) -> E {
    match orientation {
        Orientation::Adjoint => value.conj(),
        Orientation::Normal | Orientation::Transpose => value,
    }
}

/// Overwrites `a` with `op(D)^-1 * a` (left side) or `a * op(D)^-1` (right side), where `D` is
/// the diagonal matrix whose diagonal is the column vector `d`.
///
/// If `check_singular` is set and `d` has a zero entry, `a` is left untouched and
/// [`Error::SingularMatrix`] is returned.
pub fn diagonal_solve<E: ComplexField>(
    side: Side,
    orientation: Orientation,
    d: MatRef<'_, E>,
    a: MatMut<'_, E>,
    check_singular: bool,
) -> Result<()> {
    let n = match side {
        Side::Left => a.nrows(),
        Side::Right => a.ncols(),
    };
    check_shape("diagonal_solve", (n, 1), d.shape())?;
    if check_singular && (0..n).any(|i| d.read(i, 0) == E::zero()) {
        return Err(Error::SingularMatrix);
    }

    let mut a = a;
    let (m, ncols) = a.shape();
    for j in 0..ncols {
        for i in 0..m {
            let k = match side {
                Side::Left => i,
                Side::Right => j,
            };
            let value = a.read(i, j) / divisor(orientation, d.read(k, 0));
            a.write(i, j, value);
        }
    }
    Ok(())
}

/// Distributed counterpart of [`diagonal_solve`]. `d` may have any distribution.
///
/// `d` is first redistributed so that every process holds the entries matching its local rows
/// (left side) or columns (right side) of `a`. Every process returns the same result.
///
/// This is a collective over the whole grid.
pub fn dist_diagonal_solve<E: ComplexField, DD: Distribution, D: Distribution>(
    side: Side,
    orientation: Orientation,
    d: DistMatRef<'_, E, DD>,
    a: DistMatMut<'_, E, D>,
    check_singular: bool,
) -> Result<()> {
    const OP: &str = "dist_diagonal_solve";
    check_same_grid(OP, d.grid(), a.grid())?;
    let n = match side {
        Side::Left => a.nrows(),
        Side::Right => a.ncols(),
    };
    check_shape(OP, (n, 1), d.shape())?;

    let staged = match side {
        Side::Left => d
            .redistribute_aligned::<D::ColStar>(a.col_align(), 0)
            .into_local(),
        Side::Right => d
            .redistribute_aligned::<D::RowStar>(a.row_align(), 0)
            .into_local(),
    };

    if check_singular {
        let any_zero = (0..staged.nrows()).any(|i| staged.read(i, 0) == E::zero());
        let singular = a.grid().vc_comm().all_reduce(any_zero, |x, y| x || y);
        if singular {
            return Err(Error::SingularMatrix);
        }
    }

    let mut a = a;
    let mut local = a.local_mut();
    let (m, ncols) = local.shape();
    for jl in 0..ncols {
        for il in 0..m {
            let k = match side {
                Side::Left => il,
                Side::Right => jl,
            };
            let value = local.read(il, jl) / divisor(orientation, staged.read(k, 0));
            local.write(il, jl, value);
        }
    }
    Ok(())
}

/// Overwrites the square matrix `a` with `D^-1 * a * D^-1`, where `D` is the diagonal matrix
/// whose diagonal is the column vector `d`.
pub fn symmetric_diagonal_solve<E: ComplexField>(d: MatRef<'_, E>, a: MatMut<'_, E>) -> Result<()> {
    let n = a.nrows();
    check_shape("symmetric_diagonal_solve", (n, n), a.shape())?;
    check_shape("symmetric_diagonal_solve", (n, 1), d.shape())?;
    let mut a = a;
    for j in 0..n {
        for i in 0..n {
            let value = a.read(i, j) / (d.read(i, 0) * d.read(j, 0));
            a.write(i, j, value);
        }
    }
    Ok(())
}

/// Distributed counterpart of [`symmetric_diagonal_solve`].
///
/// This is a collective over the whole grid.
pub fn dist_symmetric_diagonal_solve<E: ComplexField, DD: Distribution, D: Distribution>(
    d: DistMatRef<'_, E, DD>,
    a: DistMatMut<'_, E, D>,
) -> Result<()> {
    const OP: &str = "dist_symmetric_diagonal_solve";
    check_same_grid(OP, d.grid(), a.grid())?;
    let n = a.nrows();
    check_shape(OP, (n, n), a.shape())?;
    check_shape(OP, (n, 1), d.shape())?;

    let rows = d
        .redistribute_aligned::<D::ColStar>(a.col_align(), 0)
        .into_local();
    let cols = d
        .redistribute_aligned::<D::RowStar>(a.row_align(), 0)
        .into_local();

    let mut a = a;
    let mut local = a.local_mut();
    let (m, ncols) = local.shape();
    for jl in 0..ncols {
        for il in 0..m {
            let value = local.read(il, jl) / (rows.read(il, 0) * cols.read(jl, 0));
            local.write(il, jl, value);
        }
    }
    Ok(())
}
