//! Helpers shared by the local kernels.

pub mod thread;
