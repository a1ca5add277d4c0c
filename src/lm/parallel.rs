//! Batched Levenberg-Marquardt.
//!
//! Many independent problems of the same shape are solved concurrently, one
//! problem per worker. Workers share nothing but read-only configuration:
//! each one owns a disjoint stride of the pooled batch storage and its own
//! [`Workspace`], so the result for a problem does not depend on which other
//! problems were in the batch.

use log::info;
use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use rayon::prelude::*;

use crate::error::{LmError, Result};
use crate::problem::Problem;

use super::algorithm::{lmdif, LevenbergMarquardt, LmResult, Outcome};
use super::config::{LmConfig, Scaling};
use super::workspace::Workspace;

/// Pooled per-worker buffers for a batch of `count` problems with `m`
/// residuals and `n` parameters each.
///
/// Worker `i` owns `x[i*n..(i+1)*n]`, `fvec[i*m..(i+1)*m]` and
/// `diag[i*n..(i+1)*n]`; the strides are handed out by the storage itself.
#[derive(Debug, Clone)]
pub struct BatchStorage {
    m: usize,
    n: usize,
    x: Vec<f64>,
    fvec: Vec<f64>,
    diag: Vec<f64>,
    outcomes: Vec<Option<Outcome>>,
}

/// Read-only view of one worker's slot in a [`BatchStorage`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerView<'a> {
    /// Current (or final) parameters
    pub params: ArrayView1<'a, f64>,
    /// Residuals at `params`
    pub residuals: ArrayView1<'a, f64>,
    /// Variable scaling
    pub diag: ArrayView1<'a, f64>,
    /// Status of the last solve of this slot; `None` until the slot is solved
    pub outcome: Option<Outcome>,
}

impl BatchStorage {
    /// Allocate storage for `count` problems. Parameters start at zero and
    /// scaling at one.
    pub fn new(count: usize, m: usize, n: usize) -> Result<Self> {
        if m == 0 || n == 0 {
            return Err(LmError::InvalidInput(format!(
                "batch problems must have residuals and parameters, got {}x{}",
                m, n
            )));
        }
        Ok(Self {
            m,
            n,
            x: vec![0.0; count * n],
            fvec: vec![0.0; count * m],
            diag: vec![1.0; count * n],
            outcomes: vec![None; count],
        })
    }

    /// Allocate storage with one starting point per problem.
    pub fn from_initial(m: usize, initial: &[Array1<f64>]) -> Result<Self> {
        let n = initial.first().map_or(0, |x0| x0.len());
        let mut storage = Self::new(initial.len(), m, n)?;
        for (worker, x0) in initial.iter().enumerate() {
            storage.set_initial(worker, x0.view())?;
        }
        Ok(storage)
    }

    /// Number of problems in the batch
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if the batch holds no problems
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Residuals per problem
    pub fn residual_count(&self) -> usize {
        self.m
    }

    /// Parameters per problem
    pub fn parameter_count(&self) -> usize {
        self.n
    }

    fn check_slot(&self, worker: usize, len: usize) -> Result<()> {
        if worker >= self.len() {
            return Err(LmError::InvalidInput(format!(
                "worker {} out of range for a batch of {}",
                worker,
                self.len()
            )));
        }
        if len != self.n {
            return Err(LmError::DimensionMismatch(format!(
                "expected {} values, got {}",
                self.n, len
            )));
        }
        Ok(())
    }

    /// Set the starting point of one problem.
    pub fn set_initial(&mut self, worker: usize, params: ArrayView1<'_, f64>) -> Result<()> {
        self.check_slot(worker, params.len())?;
        let n = self.n;
        ArrayViewMut1::from(&mut self.x[worker * n..(worker + 1) * n]).assign(&params);
        Ok(())
    }

    /// Set the scaling of one problem, read under [`Scaling::Explicit`].
    pub fn set_diag(&mut self, worker: usize, diag: ArrayView1<'_, f64>) -> Result<()> {
        self.check_slot(worker, diag.len())?;
        let n = self.n;
        ArrayViewMut1::from(&mut self.diag[worker * n..(worker + 1) * n]).assign(&diag);
        Ok(())
    }

    /// View one worker's slot.
    pub fn worker(&self, worker: usize) -> Option<WorkerView<'_>> {
        let outcome = *self.outcomes.get(worker)?;
        let (m, n) = (self.m, self.n);
        Some(WorkerView {
            params: ArrayView1::from(&self.x[worker * n..(worker + 1) * n]),
            residuals: ArrayView1::from(&self.fvec[worker * m..(worker + 1) * m]),
            diag: ArrayView1::from(&self.diag[worker * n..(worker + 1) * n]),
            outcome,
        })
    }

    /// Copy one worker's slot out as an owned result. Returns `None` for a
    /// slot that has not been solved yet.
    pub fn result(&self, worker: usize) -> Option<LmResult> {
        let view = self.worker(worker)?;
        let outcome = view.outcome?;
        Some(LmResult {
            params: view.params.to_owned(),
            residuals: view.residuals.to_owned(),
            diag: view.diag.to_owned(),
            info: outcome.info,
            nfev: outcome.nfev,
            iterations: outcome.iterations,
            fnorm: outcome.fnorm,
            covariance: None,
        })
    }

    /// Copy every solved slot out as owned results, in slot order.
    pub fn results(&self) -> Vec<LmResult> {
        (0..self.len()).filter_map(|worker| self.result(worker)).collect()
    }
}

/// Aggregate counts over one batch solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Problems that ended with a convergence code (1 to 4)
    pub converged: usize,
    /// Problems rejected as invalid input or aborted by their callback
    pub failed: usize,
    /// Problems that ran out of budget or hit a tolerance floor (5 to 8)
    pub stopped: usize,
    /// Residual evaluations over the whole batch
    pub total_nfev: usize,
}

impl BatchSummary {
    fn from_outcomes(outcomes: &[Option<Outcome>]) -> Self {
        outcomes.iter().flatten().fold(Self::default(), |mut summary, outcome| {
            if outcome.info.is_converged() {
                summary.converged += 1;
            } else if outcome.info.is_error() {
                summary.failed += 1;
            } else {
                summary.stopped += 1;
            }
            summary.total_nfev += outcome.nfev;
            summary
        })
    }
}

/// The parallel Levenberg-Marquardt optimizer.
///
/// Uses Rayon to run one independent [`lmdif`] per problem. There is no
/// communication between workers and no way to cancel one worker from
/// another; only a problem's own callback can stop its solve early.
#[derive(Debug, Clone, Default)]
pub struct ParallelLevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl ParallelLevenbergMarquardt {
    /// Create a new parallel Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new parallel Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the tolerance on the relative reduction of the sum of squares.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance on the relative step length.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance on the gradient cosine.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the maximum number of residual evaluations per problem.
    pub fn with_maxfev(mut self, maxfev: usize) -> Self {
        self.config.maxfev = Some(maxfev);
        self
    }

    /// Set the variable scaling mode.
    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.config.scaling = scaling;
        self
    }

    /// The configuration shared by every worker.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Solve `problems[i]` in slot `i` of `storage`, all in parallel.
    ///
    /// Each slot's parameters are used as the starting point and overwritten
    /// with the result. Fails only when the number of problems does not match
    /// the storage; per-problem failures are reported in each slot's outcome.
    pub fn solve_batch<P: Problem + Sync>(
        &self,
        problems: &[P],
        storage: &mut BatchStorage,
    ) -> Result<BatchSummary> {
        if problems.len() != storage.len() {
            return Err(LmError::DimensionMismatch(format!(
                "{} problems for {} batch slots",
                problems.len(),
                storage.len()
            )));
        }

        let (m, n) = (storage.m, storage.n);
        let config = &self.config;

        storage
            .x
            .par_chunks_mut(n)
            .zip(storage.fvec.par_chunks_mut(m))
            .zip(storage.diag.par_chunks_mut(n))
            .zip(storage.outcomes.par_iter_mut())
            .zip(problems.par_iter())
            .for_each_init(
                || Workspace::new(m, n),
                |ws, ((((x, fvec), diag), outcome), problem)| {
                    *outcome = Some(lmdif(
                        problem,
                        config,
                        ArrayViewMut1::from(x),
                        ArrayViewMut1::from(fvec),
                        ArrayViewMut1::from(diag),
                        ws,
                    ));
                },
            );

        let summary = BatchSummary::from_outcomes(&storage.outcomes);
        info!(
            "batch of {} solved: {} converged, {} stopped, {} failed, {} evaluations",
            storage.len(),
            summary.converged,
            summary.stopped,
            summary.failed,
            summary.total_nfev
        );
        Ok(summary)
    }

    /// Minimize every problem from its own starting point in parallel.
    ///
    /// Problems may differ in shape; each gets its own buffers.
    pub fn minimize_all<P: Problem + Sync>(
        &self,
        problems: &[P],
        initial_params: &[Array1<f64>],
    ) -> Result<Vec<LmResult>> {
        if problems.len() != initial_params.len() {
            return Err(LmError::DimensionMismatch(format!(
                "{} problems with {} starting points",
                problems.len(),
                initial_params.len()
            )));
        }

        let solver = LevenbergMarquardt::new(self.config.clone());
        Ok(problems
            .par_iter()
            .zip(initial_params.par_iter())
            .map(|(problem, x0)| solver.minimize(problem, x0.clone()))
            .collect())
    }
}
