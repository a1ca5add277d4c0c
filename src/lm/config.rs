//! Configuration options for the Levenberg-Marquardt solver.
//!
//! This module defines the tolerances, evaluation budget and scaling mode
//! shared by every problem solved with one configuration.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{LmError, Result};

/// How the variables are scaled when measuring step lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Scaling {
    /// Derive the scaling from the Jacobian column norms and never let it
    /// decrease afterwards.
    #[default]
    Auto,

    /// Use the caller-supplied `diag` as is. Every entry must be positive.
    Explicit,
}

/// Configuration options for the Levenberg-Marquardt solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Relative tolerance on the reduction of the sum of squares. Default: sqrt(eps)
    pub ftol: f64,

    /// Relative tolerance on the scaled step length. Default: sqrt(eps)
    pub xtol: f64,

    /// Tolerance on the cosine between the residuals and the Jacobian columns. Default: 0
    pub gtol: f64,

    /// Maximum number of residual evaluations. Default: `200 * (n + 1)`
    pub maxfev: Option<usize>,

    /// Expected relative error of the residuals, used for the forward-difference
    /// step. Default: 0 (machine precision)
    pub epsfcn: f64,

    /// Initial trust region radius as a multiple of the scaled starting point. Default: 100
    pub factor: f64,

    /// Variable scaling mode. Default: Auto
    pub scaling: Scaling,

    /// Whether to attach the parameter covariance to the result. Default: false
    pub calc_covariance: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        let tol = f64::EPSILON.sqrt();
        Self {
            ftol: tol,
            xtol: tol,
            gtol: 0.0,
            maxfev: None,
            epsfcn: 0.0,
            factor: 100.0,
            scaling: Scaling::default(),
            calc_covariance: false,
        }
    }
}

impl LmConfig {
    /// Set the tolerance on the relative reduction of the sum of squares.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Set the tolerance on the relative step length.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set the tolerance on the gradient cosine.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Set the maximum number of residual evaluations.
    pub fn with_maxfev(mut self, maxfev: usize) -> Self {
        self.maxfev = Some(maxfev);
        self
    }

    /// Set the expected relative error of the residuals.
    pub fn with_epsfcn(mut self, epsfcn: f64) -> Self {
        self.epsfcn = epsfcn;
        self
    }

    /// Set the initial trust region factor.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Set the variable scaling mode.
    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }

    /// Set whether the single-problem driver attaches the covariance.
    pub fn with_calc_covariance(mut self, calc_covariance: bool) -> Self {
        self.calc_covariance = calc_covariance;
        self
    }

    /// The evaluation budget for a problem with `n` parameters.
    pub fn maxfev_for(&self, n: usize) -> usize {
        self.maxfev.unwrap_or(200 * (n + 1))
    }

    /// Check the preconditions for solving an `m x n` problem.
    ///
    /// `diag` is only inspected under [`Scaling::Explicit`].
    pub fn validate(&self, m: usize, n: usize, diag: ArrayView1<'_, f64>) -> Result<()> {
        if n == 0 {
            return Err(LmError::InvalidInput("no parameters to fit".to_string()));
        }
        if m < n {
            return Err(LmError::InvalidInput(format!(
                "{} residuals cannot determine {} parameters",
                m, n
            )));
        }
        // negated comparisons also reject NaN
        if !(self.ftol >= 0.0) || !(self.xtol >= 0.0) || !(self.gtol >= 0.0) {
            return Err(LmError::InvalidInput(format!(
                "tolerances must be nonnegative (ftol={}, xtol={}, gtol={})",
                self.ftol, self.xtol, self.gtol
            )));
        }
        if self.maxfev_for(n) == 0 {
            return Err(LmError::InvalidInput("maxfev must be positive".to_string()));
        }
        if !(self.factor > 0.0) {
            return Err(LmError::InvalidInput(format!(
                "factor must be positive, got {}",
                self.factor
            )));
        }
        if self.scaling == Scaling::Explicit {
            if diag.len() != n {
                return Err(LmError::DimensionMismatch(format!(
                    "expected {} scaling entries, got {}",
                    n,
                    diag.len()
                )));
            }
            if let Some(j) = diag.iter().position(|&d| !(d > 0.0)) {
                return Err(LmError::InvalidInput(format!(
                    "diag[{}] = {} is not positive",
                    j, diag[j]
                )));
            }
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::aview1;

    #[test]
    fn test_defaults() {
        let config = LmConfig::default();
        assert_eq!(config.ftol, f64::EPSILON.sqrt());
        assert_eq!(config.gtol, 0.0);
        assert_eq!(config.maxfev_for(5), 1200);
        assert_eq!(config.with_maxfev(10).maxfev_for(5), 10);
    }

    #[test]
    fn test_validate() {
        let config = LmConfig::default();
        let none = aview1::<f64>(&[]);
        assert!(config.validate(10, 3, none).is_ok());
        assert!(config.validate(2, 3, none).is_err());
        assert!(config.validate(2, 0, none).is_err());
        assert!(config.clone().with_ftol(-1.0).validate(10, 3, none).is_err());
        assert!(config.clone().with_factor(0.0).validate(10, 3, none).is_err());
        assert!(config.clone().with_maxfev(0).validate(10, 3, none).is_err());

        let explicit = config.with_scaling(Scaling::Explicit);
        assert!(explicit.validate(10, 2, aview1(&[1.0, 2.0])).is_ok());
        assert!(explicit.validate(10, 2, aview1(&[1.0, 0.0])).is_err());
        assert!(explicit.validate(10, 2, aview1(&[1.0, -3.0])).is_err());
        assert!(explicit.validate(10, 2, aview1(&[1.0])).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = LmConfig::default()
            .with_maxfev(500)
            .with_scaling(Scaling::Explicit);
        let json = config.to_json().unwrap();
        assert_eq!(LmConfig::from_json(&json).unwrap(), config);

        let partial = LmConfig::from_json(r#"{ "ftol": 1e-10 }"#).unwrap();
        assert_eq!(partial.ftol, 1e-10);
        assert_eq!(partial.factor, 100.0);
        assert!(LmConfig::from_json("not json").is_err());
    }
}
