//! Levenberg-Marquardt algorithm implementation.
//!
//! The MINPACK `lmdif` iteration for nonlinear least squares with a
//! forward-difference Jacobian, plus a batch driver that runs many
//! independent solves of the same shape in parallel.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod parallel;
pub mod step;
pub mod trust_region;
pub mod workspace;

// Re-export key types
pub use algorithm::{lmdif, LevenbergMarquardt, LmResult, Outcome};
pub use config::{LmConfig, Scaling};
pub use convergence::Termination;
pub use parallel::{BatchStorage, BatchSummary, ParallelLevenbergMarquardt, WorkerView};
pub use step::{lmpar, StepResult};
pub use trust_region::{Reduction, TrustRegion};
pub use workspace::Workspace;
