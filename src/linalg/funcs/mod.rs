//! Matrix functions.
//!
//! - [`sign`]: the matrix sign function, through the scaled Newton iteration for general
//!   matrices and through an eigendecomposition for Hermitian ones, together with the associated
//!   polar decompositions.

pub mod sign;
