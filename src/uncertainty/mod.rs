//! # Uncertainty Calculation
//!
//! Parameter uncertainties from the factored Jacobian a solve leaves behind:
//!
//! - Covariance matrix estimation from the `R` factor
//! - Standard error calculation for parameter estimates
//! - Correlation matrices

mod covariance;

pub use covariance::{
    calculate_correlation, covar, covariance_from_r, standard_errors_from_covariance,
};
