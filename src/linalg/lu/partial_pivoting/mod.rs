//! The partial pivoting LU decomposition is such that:
//! $$PA = LU,$$
//! where $P$ is a permutation matrix, $L$ is a unit lower triangular matrix, and $U$ is
//! an upper triangular matrix.
//!
//! The local factorization records its row exchanges as pivots (see [`crate::perm`]); the
//! distributed one returns the image of $P$ as a `[VC, STAR]` column vector, so that row `i` of
//! $PA$ is row `p[i]` of $A$.

pub mod compute;
pub mod determinant;
pub mod inverse;
pub mod reconstruct;
pub mod solve;

pub use compute::{dist_lu_in_place, lu_in_place};
