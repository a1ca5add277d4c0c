//! Built-in residual models.
//!
//! Ready-made [`crate::Problem`] implementations for common fitting tasks,
//! together with starting-point estimates and synthetic data generators.

mod gaussian2d;

pub use gaussian2d::{synthetic_batch, Gaussian2d, Gaussian2dProblem, SyntheticImage};
