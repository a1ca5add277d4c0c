//! Problem definition trait.
//!
//! This module defines the `Problem` trait, the residual-evaluation callback
//! the solver drives. One value implementing `Problem` describes one fitting
//! problem together with its private dataset.

use crate::error::Result;
use ndarray::{ArrayView1, ArrayViewMut1};

/// A trait representing a nonlinear least squares problem.
///
/// The solver calls [`Problem::eval`] once for the starting point, once per
/// parameter for every forward-difference Jacobian, and once per trial step.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// Writes `observed - model(params)` into `residuals`, which always has
    /// length [`Problem::residual_count`]. The buffer belongs to the solver and
    /// is reused between calls, so implementations must overwrite every entry.
    ///
    /// Returning an error stops this problem's solve immediately with a
    /// negative termination code (see [`crate::LmError::abort_status`]).
    fn eval(&self, params: ArrayView1<'_, f64>, residuals: ArrayViewMut1<'_, f64>) -> Result<()>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: ArrayView1<'_, f64>) -> Result<f64> {
        let mut residuals = ndarray::Array1::zeros(self.residual_count());
        self.eval(params, residuals.view_mut())?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

impl<P: Problem + ?Sized> Problem for &P {
    fn eval(&self, params: ArrayView1<'_, f64>, residuals: ArrayViewMut1<'_, f64>) -> Result<()> {
        (**self).eval(params, residuals)
    }

    fn parameter_count(&self) -> usize {
        (**self).parameter_count()
    }

    fn residual_count(&self) -> usize {
        (**self).residual_count()
    }
}
