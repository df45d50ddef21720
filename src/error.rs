//! Errors reported by exposed operations.
//!
//! Conditions that a caller can trigger through its inputs (mismatched shapes, operands on
//! different grids, a zero divisor in a checked diagonal solve) are reported through [`Error`].
//! Internal invariants are checked with debug assertions only.

use crate::grid::Grid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The dimensions of an operand do not match what the operation requires.
    #[error("{op}: shape mismatch, expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Distributed operands of one operation live on different process grids.
    #[error("{op}: operands are distributed over different grids")]
    GridMismatch { op: &'static str },
    /// A zero divisor was met while the caller asked for singularity checks.
    #[error("singular matrix")]
    SingularMatrix,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[inline]
pub(crate) fn check_shape(
    op: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            op,
            expected,
            found,
        })
    }
}

#[inline]
pub(crate) fn check_square(op: &'static str, shape: (usize, usize)) -> Result<()> {
    check_shape(op, (shape.0, shape.0), shape)
}

#[inline]
pub(crate) fn check_same_grid(op: &'static str, a: &Grid, b: &Grid) -> Result<()> {
    if a.same_as(b) {
        Ok(())
    } else {
        Err(Error::GridMismatch { op })
    }
}
