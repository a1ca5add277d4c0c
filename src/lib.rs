//! # lmdif-batch
//!
//! `lmdif-batch` is a Rust implementation of the MINPACK `lmdif`
//! Levenberg-Marquardt method for nonlinear least squares, built for fitting
//! many small independent problems at once.
//!
//! The library provides:
//! - The `lmdif` trust region iteration with a forward-difference Jacobian,
//!   pivoted Householder QR and the `lmpar` damping search
//! - Allocation-free solving inside caller-owned [`lm::Workspace`] buffers
//! - A Rayon batch driver that gives every problem its own worker slot
//! - Parameter covariance from the final factored Jacobian
//! - A 2D Gaussian spot model with synthetic data for demos and tests
//!
//! ## Basic Usage
//!
//! ```
//! use lmdif_batch::{LevenbergMarquardt, Problem, Result};
//! use ndarray::{array, ArrayView1, ArrayViewMut1};
//!
//! // y = a * t + b
//! struct Line;
//!
//! impl Problem for Line {
//!     fn eval(&self, p: ArrayView1<'_, f64>, mut r: ArrayViewMut1<'_, f64>) -> Result<()> {
//!         for i in 0..4 {
//!             let t = i as f64;
//!             r[i] = (2.0 * t + 1.0) - (p[0] * t + p[1]);
//!         }
//!         Ok(())
//!     }
//!     fn parameter_count(&self) -> usize { 2 }
//!     fn residual_count(&self) -> usize { 4 }
//! }
//!
//! let result = LevenbergMarquardt::default().minimize(&Line, array![0.0, 0.0]);
//! assert!(result.success());
//! assert!((result.params[0] - 2.0).abs() < 1e-6);
//! ```

pub mod error;
pub mod lm;
pub mod models;
pub mod problem;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use error::{LmError, Result};
pub use lm::{
    BatchStorage, LevenbergMarquardt, LmConfig, LmResult, ParallelLevenbergMarquardt, Scaling,
    Termination,
};
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
