//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the trust region iteration itself ([`lmdif`]), which
//! works entirely inside caller-provided buffers, and the single-problem
//! driver [`LevenbergMarquardt`] that owns those buffers for one solve.

use log::{debug, trace, warn};
use ndarray::{Array1, Array2, ArrayViewMut1};
use std::fmt;

use crate::error::{LmError, Result};
use crate::problem::Problem;
use crate::uncertainty::covariance_from_r;
use crate::utils::{enorm, fdjac2, qrfac};

use super::config::{LmConfig, Scaling};
use super::convergence::Termination;
use super::step::lmpar;
use super::trust_region::{Reduction, TrustRegion};
use super::workspace::Workspace;

const P5: f64 = 0.5;

/// Counters and status of one [`lmdif`] run. The iterate, residuals and
/// scaling live in the buffers the caller passed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Why the solve stopped
    pub info: Termination,

    /// Number of residual evaluations
    pub nfev: usize,

    /// Number of accepted steps
    pub iterations: usize,

    /// Euclidean norm of the final residuals
    pub fnorm: f64,
}

impl Outcome {
    fn new(info: Termination, nfev: usize, iterations: usize, fnorm: f64) -> Self {
        Self {
            info,
            nfev,
            iterations,
            fnorm,
        }
    }
}

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Final variable scaling
    pub diag: Array1<f64>,

    /// Why the solve stopped
    pub info: Termination,

    /// Number of residual evaluations
    pub nfev: usize,

    /// Number of accepted steps
    pub iterations: usize,

    /// Euclidean norm of the residuals at the solution
    pub fnorm: f64,

    /// Parameter covariance (if requested), from the last Jacobian factorization
    pub covariance: Option<Array2<f64>>,
}

impl LmResult {
    /// Whether the solve ended with one of the convergence codes 1 to 4.
    pub fn success(&self) -> bool {
        self.info.is_converged()
    }

    /// Sum of squared residuals
    pub fn cost(&self) -> f64 {
        self.fnorm * self.fnorm
    }

    /// Turn bad input and aborts into errors, keep every other outcome.
    pub fn into_result(self) -> Result<Self> {
        match self.info {
            Termination::InvalidInput => Err(LmError::InvalidInput(self.info.description())),
            Termination::UserAbort(status) => Err(LmError::Aborted(status)),
            _ => Ok(self),
        }
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success())?;
        writeln!(f, "  Info: {}", self.info)?;
        writeln!(f, "  Cost: {:.6e}", self.cost())?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.nfev)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

fn check_shapes<P: Problem + ?Sized>(
    problem: &P,
    ws: &Workspace,
    m: usize,
    n: usize,
    diag_len: usize,
) -> Result<()> {
    if problem.parameter_count() != n || problem.residual_count() != m {
        return Err(LmError::DimensionMismatch(format!(
            "problem is {}x{}, buffers are {}x{}",
            problem.residual_count(),
            problem.parameter_count(),
            m,
            n
        )));
    }
    if diag_len != n {
        return Err(LmError::DimensionMismatch(format!(
            "expected {} scaling entries, got {}",
            n, diag_len
        )));
    }
    if !ws.fits(m, n) {
        return Err(LmError::DimensionMismatch(format!(
            "workspace is {}x{}, problem is {}x{}",
            ws.residual_count(),
            ws.parameter_count(),
            m,
            n
        )));
    }
    Ok(())
}

fn aborted(err: LmError, nfev: usize, iterations: usize, fnorm: f64) -> Outcome {
    let info = Termination::UserAbort(err.abort_status());
    warn!("lmdif aborted after {} evaluations: {}", nfev, err);
    Outcome::new(info, nfev, iterations, fnorm)
}

/// Minimize the sum of squared residuals of `problem` with the MINPACK
/// `lmdif` trust region iteration.
///
/// `x` holds the starting point on entry and the solution on return, `fvec`
/// (length `m`) receives the residuals, and `diag` (length `n`) holds the
/// variable scaling: read under [`Scaling::Explicit`], written under
/// [`Scaling::Auto`]. All scratch comes from `ws`, which must be sized for
/// this `m x n` problem.
///
/// Invalid input returns [`Termination::InvalidInput`] before any
/// evaluation, with `x` untouched. A callback error returns
/// [`Termination::UserAbort`], leaving the point being evaluated in `x` and
/// whatever the callback wrote in `fvec`.
pub fn lmdif<P: Problem + ?Sized>(
    problem: &P,
    config: &LmConfig,
    mut x: ArrayViewMut1<'_, f64>,
    mut fvec: ArrayViewMut1<'_, f64>,
    mut diag: ArrayViewMut1<'_, f64>,
    ws: &mut Workspace,
) -> Outcome {
    let n = x.len();
    let m = fvec.len();
    let epsmch = f64::EPSILON;

    if let Err(err) = check_shapes(problem, ws, m, n, diag.len())
        .and_then(|_| config.validate(m, n, diag.view()))
    {
        warn!("lmdif rejected its input: {}", err);
        return Outcome::new(Termination::InvalidInput, 0, 0, 0.0);
    }
    let maxfev = config.maxfev_for(n);

    let mut nfev = 1;
    let mut iterations = 0;
    if let Err(err) = problem.eval(x.view(), fvec.view_mut()) {
        return aborted(err, nfev, iterations, enorm(fvec.view()));
    }
    let mut fnorm = enorm(fvec.view());

    let Workspace {
        fjac,
        ipvt,
        qtf,
        wa1,
        wa2,
        wa3,
        wa4,
        ..
    } = ws;

    let mut region = TrustRegion::new(config.factor, 0.0);
    let mut xnorm = 0.0;

    loop {
        if let Err(err) = fdjac2(problem, &mut x, fvec.view(), fjac, config.epsfcn, wa4, &mut nfev) {
            fvec.assign(&*wa4);
            return aborted(err, nfev, iterations, enorm(fvec.view()));
        }

        // wa1: R diagonal, wa2: Jacobian column norms
        qrfac(fjac, true, ipvt, wa1, wa2, wa3);

        if iterations == 0 {
            if config.scaling == Scaling::Auto {
                for j in 0..n {
                    diag[j] = if wa2[j] == 0.0 { 1.0 } else { wa2[j] };
                }
            }
            for j in 0..n {
                wa3[j] = diag[j] * x[j];
            }
            xnorm = enorm(wa3.view());
            region = TrustRegion::new(config.factor, xnorm);
        }

        // Qᵀ fvec, keeping the first n components
        wa4.assign(&fvec);
        for j in 0..n {
            if fjac[[j, j]] != 0.0 {
                let mut sum = 0.0;
                for i in j..m {
                    sum += fjac[[i, j]] * wa4[i];
                }
                let temp = -sum / fjac[[j, j]];
                for i in j..m {
                    wa4[i] += fjac[[i, j]] * temp;
                }
            }
            fjac[[j, j]] = wa1[j];
            qtf[j] = wa4[j];
        }

        // norm of the scaled gradient
        let mut gnorm: f64 = 0.0;
        if fnorm != 0.0 {
            for j in 0..n {
                let l = ipvt[j];
                if wa2[l] != 0.0 {
                    let mut sum = 0.0;
                    for i in 0..=j {
                        sum += fjac[[i, j]] * (qtf[i] / fnorm);
                    }
                    gnorm = gnorm.max((sum / wa2[l]).abs());
                }
            }
        }
        if gnorm <= config.gtol {
            return finish(Termination::GtolReached, nfev, iterations, fnorm);
        }

        if config.scaling == Scaling::Auto {
            for j in 0..n {
                diag[j] = diag[j].max(wa2[j]);
            }
        }

        loop {
            let step = lmpar(
                fjac,
                ipvt,
                diag.view(),
                qtf,
                region.delta,
                region.par,
                wa1,
                wa2,
                wa3,
                wa4,
            );
            region.par = step.par;

            // wa1: step, wa2: trial point, wa3: scaled step
            for j in 0..n {
                wa1[j] = -wa1[j];
                wa2[j] = x[j] + wa1[j];
                wa3[j] = diag[j] * wa1[j];
            }
            let pnorm = enorm(wa3.view());

            if nfev <= n + 1 {
                region.cap(pnorm);
            }

            nfev += 1;
            if let Err(err) = problem.eval(wa2.view(), wa4.view_mut()) {
                x.assign(&*wa2);
                fvec.assign(&*wa4);
                return aborted(err, nfev, iterations, enorm(fvec.view()));
            }
            let fnorm1 = enorm(wa4.view());

            let reduction = Reduction::evaluate(fnorm, fnorm1, fjac, ipvt, wa1, pnorm, region.par, wa3);
            region.update(&reduction, fnorm, fnorm1, pnorm);
            trace!(
                "lmdif: nfev={} par={:.3e} delta={:.3e} ratio={:.3e} fnorm1={:.6e}",
                nfev,
                region.par,
                region.delta,
                reduction.ratio,
                fnorm1
            );

            let accepted = reduction.is_acceptable();
            if accepted {
                x.assign(&*wa2);
                for j in 0..n {
                    wa2[j] = diag[j] * x[j];
                }
                fvec.assign(&*wa4);
                xnorm = enorm(wa2.view());
                fnorm = fnorm1;
                iterations += 1;
            }

            let ftol_met = reduction.actual.abs() <= config.ftol
                && reduction.predicted <= config.ftol
                && P5 * reduction.ratio <= 1.0;
            let xtol_met = region.delta <= config.xtol * xnorm;
            let converged = match (ftol_met, xtol_met) {
                (true, true) => Some(Termination::FtolAndXtolReached),
                (true, false) => Some(Termination::FtolReached),
                (false, true) => Some(Termination::XtolReached),
                (false, false) => None,
            };
            if let Some(info) = converged {
                return finish(info, nfev, iterations, fnorm);
            }

            // later checks take precedence
            let mut stop = None;
            if nfev >= maxfev {
                stop = Some(Termination::MaxFevReached);
            }
            if reduction.actual.abs() <= epsmch
                && reduction.predicted <= epsmch
                && P5 * reduction.ratio <= 1.0
            {
                stop = Some(Termination::FtolTooSmall);
            }
            if region.delta <= epsmch * xnorm {
                stop = Some(Termination::XtolTooSmall);
            }
            if gnorm <= epsmch {
                stop = Some(Termination::GtolTooSmall);
            }
            if let Some(info) = stop {
                return finish(info, nfev, iterations, fnorm);
            }

            if accepted {
                break;
            }
        }
    }
}

fn finish(info: Termination, nfev: usize, iterations: usize, fnorm: f64) -> Outcome {
    debug!(
        "lmdif finished: {} after {} evaluations, {} steps, fnorm = {:.6e}",
        info, nfev, iterations, fnorm
    );
    Outcome::new(info, nfev, iterations, fnorm)
}

/// The Levenberg-Marquardt optimizer for a single problem.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn with_default_config() -> Self {
        Self::default()
    }

    /// The configuration used for every solve.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Under [`Scaling::Explicit`] every variable is given unit scale; use
    /// [`LevenbergMarquardt::minimize_with_diag`] to supply one.
    pub fn minimize<P: Problem + ?Sized>(&self, problem: &P, initial_params: Array1<f64>) -> LmResult {
        let diag = Array1::ones(initial_params.len());
        self.minimize_with_diag(problem, initial_params, diag)
    }

    /// Minimize with an explicit starting scale `diag`, used as is under
    /// [`Scaling::Explicit`] and overwritten under [`Scaling::Auto`].
    pub fn minimize_with_diag<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        diag: Array1<f64>,
    ) -> LmResult {
        let n = initial_params.len();
        let m = problem.residual_count();
        let mut ws = Workspace::new(m, n);
        let mut params = initial_params;
        let mut residuals = Array1::zeros(m);
        let mut diag = diag;

        let outcome = lmdif(
            problem,
            &self.config,
            params.view_mut(),
            residuals.view_mut(),
            diag.view_mut(),
            &mut ws,
        );

        let covariance = if self.config.calc_covariance && !outcome.info.is_error() {
            let dof = m.saturating_sub(n);
            let redchi = if dof > 0 {
                outcome.fnorm * outcome.fnorm / dof as f64
            } else {
                1.0
            };
            match covariance_from_r(&ws.r_factor(), ws.permutation(), redchi) {
                Ok(covar) => Some(covar),
                Err(err) => {
                    warn!("covariance unavailable: {}", err);
                    None
                }
            }
        } else {
            None
        };

        LmResult {
            params,
            residuals,
            diag,
            info: outcome.info,
            nfev: outcome.nfev,
            iterations: outcome.iterations,
            fnorm: outcome.fnorm,
            covariance,
        }
    }
}
