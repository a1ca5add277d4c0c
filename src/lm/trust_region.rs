//! Trust region bookkeeping for the Levenberg-Marquardt solver.
//!
//! The radius `delta` and the damping parameter `par` are adapted from the
//! agreement between the actual and the predicted reduction of the sum of
//! squares.

use ndarray::{Array1, Array2};

use crate::utils::enorm;

const P1: f64 = 0.1;
const P5: f64 = 0.5;
const P25: f64 = 0.25;
const P75: f64 = 0.75;

/// Minimum ratio of actual to predicted reduction for a step to be accepted.
pub const ACCEPT_RATIO: f64 = 1e-4;

/// Relative reductions achieved and predicted by a trial step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    /// `1 - (fnorm1 / fnorm)^2`, or `-1` when the residuals grew by more than a factor of ten.
    pub actual: f64,

    /// Reduction predicted by the linearized model.
    pub predicted: f64,

    /// Scaled directional derivative along the step.
    pub dirder: f64,

    /// `actual / predicted`, zero when nothing was predicted.
    pub ratio: f64,
}

impl Reduction {
    /// Compare the residual norm `fnorm1` at the trial point with `fnorm` at the
    /// current iterate.
    ///
    /// `r` holds the factored Jacobian (its upper triangle is `R`), `ipvt` its
    /// column permutation, `step` the trial step in original variable order and
    /// `pnorm` the scaled step length. `wa` is scratch of length `n`.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        fnorm: f64,
        fnorm1: f64,
        r: &Array2<f64>,
        ipvt: &[usize],
        step: &Array1<f64>,
        pnorm: f64,
        par: f64,
        wa: &mut Array1<f64>,
    ) -> Self {
        let n = r.ncols();

        let actual = if P1 * fnorm1 < fnorm {
            1.0 - (fnorm1 / fnorm).powi(2)
        } else {
            -1.0
        };

        // |R Pᵀ step|
        for j in 0..n {
            wa[j] = 0.0;
            let temp = step[ipvt[j]];
            for i in 0..=j {
                wa[i] += r[[i, j]] * temp;
            }
        }
        let temp1 = enorm(wa.slice(ndarray::s![..n])) / fnorm;
        let temp2 = (par.sqrt() * pnorm) / fnorm;
        let predicted = temp1 * temp1 + temp2 * temp2 / P5;
        let dirder = -(temp1 * temp1 + temp2 * temp2);

        let ratio = if predicted != 0.0 {
            actual / predicted
        } else {
            0.0
        };

        Self {
            actual,
            predicted,
            dirder,
            ratio,
        }
    }

    /// Returns true if the step reduces the sum of squares enough to be kept.
    pub fn is_acceptable(&self) -> bool {
        self.ratio >= ACCEPT_RATIO
    }
}

/// Trust region radius and damping parameter of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustRegion {
    /// Bound on the scaled step length.
    pub delta: f64,

    /// Current damping parameter.
    pub par: f64,
}

impl TrustRegion {
    /// Start with radius `factor * xnorm`, or `factor` when the scaled
    /// starting point is zero.
    pub fn new(factor: f64, xnorm: f64) -> Self {
        let delta = factor * xnorm;
        Self {
            delta: if delta == 0.0 { factor } else { delta },
            par: 0.0,
        }
    }

    /// Limit the radius to the length of the first step.
    pub fn cap(&mut self, pnorm: f64) {
        self.delta = self.delta.min(pnorm);
    }

    /// Shrink or expand the region after a trial step.
    pub fn update(&mut self, reduction: &Reduction, fnorm: f64, fnorm1: f64, pnorm: f64) {
        if reduction.ratio <= P25 {
            // quadratic interpolation of the shrink factor
            let mut temp = if reduction.actual >= 0.0 {
                P5
            } else {
                P5 * reduction.dirder / (reduction.dirder + P5 * reduction.actual)
            };
            if P1 * fnorm1 >= fnorm || temp < P1 {
                temp = P1;
            }
            self.delta = temp * self.delta.min(pnorm / P1);
            self.par /= temp;
        } else if self.par == 0.0 || reduction.ratio >= P75 {
            self.delta = pnorm / P5;
            self.par *= P5;
        }
    }
}
