//! The LU decomposition with full pivoting is such that:
//! $$PAQ^\top = LU,$$
//! where $P$ and $Q$ are permutation matrices, $L$ is a unit lower triangular matrix, and $U$ is
//! an upper triangular matrix.
//!
//! At step `j`, the entry of largest modulus in the trailing block `A[j.., j..]` is moved to
//! position `(j, j)` by one row exchange and one column exchange. Ties are resolved in favor of
//! the smallest column, then the smallest row.
//!
//! The distributed factorization returns the images of both permutations, as `[VC, STAR]`
//! column vectors: row `i` of $PA$ is row `p[i]` of $A$, and column `j` of $AQ^\top$ is column
//! `q[j]` of $A$.

pub mod compute;
pub mod solve;

pub use compute::{dist_lu_in_place, lu_in_place};
