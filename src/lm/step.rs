//! Step calculation for the Levenberg-Marquardt solver.
//!
//! Given the QR factorization of the Jacobian, this module finds the damping
//! parameter whose step lands (approximately) on the trust region boundary.

use ndarray::{Array1, Array2, ArrayView1};

use crate::utils::{enorm, qrsolv};

/// Accept the damped step once its scaled length is within this fraction of `delta`.
const P1: f64 = 0.1;
const P001: f64 = 0.001;

/// Maximum number of damping parameter trials.
const MAX_ITERATIONS: usize = 10;

/// Result of a damping parameter search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// The damping parameter whose step was written to `x`.
    pub par: f64,

    /// Number of regularized solves performed (0 when the Gauss-Newton step was accepted).
    pub iterations: usize,
}

/// Find the damping parameter `par` for the trust region radius `delta`.
///
/// With `A P = Q R` the pivoted factorization of the Jacobian, `D = diag`
/// and `qtb` the first `n` components of `Qᵀ b`, the step `x` solves
///
/// ```text
///     A x = b,   sqrt(par) D x = 0
/// ```
///
/// in the least squares sense, with `par = 0` when the Gauss-Newton step
/// already satisfies `|D x| - delta <= 0.1 delta`, and otherwise
/// `| |D x| - delta | <= 0.1 delta` (or the best `par` after ten trials).
///
/// `par` is the previous estimate. On return `x` holds the step (in original
/// variable order), `sdiag` the diagonal of the triangular factor `S` and the
/// strict lower triangle of `r` the rest of `S`; the upper triangle of `r` is
/// preserved. `wa1` and `wa2` are scratch of length at least `n`.
#[allow(clippy::too_many_arguments)]
pub fn lmpar(
    r: &mut Array2<f64>,
    ipvt: &[usize],
    diag: ArrayView1<'_, f64>,
    qtb: &Array1<f64>,
    delta: f64,
    par: f64,
    x: &mut Array1<f64>,
    sdiag: &mut Array1<f64>,
    wa1: &mut Array1<f64>,
    wa2: &mut Array1<f64>,
) -> StepResult {
    let n = r.ncols();
    let dwarf = f64::MIN_POSITIVE;

    // Gauss-Newton direction; on rank deficiency a least-squares solution
    let mut nsing = n;
    for j in 0..n {
        wa1[j] = qtb[j];
        if r[[j, j]] == 0.0 && nsing == n {
            nsing = j;
        }
        if nsing < n {
            wa1[j] = 0.0;
        }
    }
    for j in (0..nsing).rev() {
        wa1[j] /= r[[j, j]];
        let temp = wa1[j];
        for i in 0..j {
            wa1[i] -= r[[i, j]] * temp;
        }
    }
    for j in 0..n {
        x[ipvt[j]] = wa1[j];
    }

    for j in 0..n {
        wa2[j] = diag[j] * x[j];
    }
    let mut dxnorm = enorm(wa2.slice(ndarray::s![..n]));
    let mut fp = dxnorm - delta;
    if fp <= P1 * delta {
        return StepResult {
            par: 0.0,
            iterations: 0,
        };
    }

    // lower bound from the Newton step, only available at full rank
    let mut parl = 0.0;
    if nsing >= n {
        for j in 0..n {
            let l = ipvt[j];
            wa1[j] = diag[l] * (wa2[l] / dxnorm);
        }
        for j in 0..n {
            let mut sum = 0.0;
            for i in 0..j {
                sum += r[[i, j]] * wa1[i];
            }
            wa1[j] = (wa1[j] - sum) / r[[j, j]];
        }
        let temp = enorm(wa1.slice(ndarray::s![..n]));
        parl = ((fp / delta) / temp) / temp;
    }

    // upper bound from the scaled gradient
    for j in 0..n {
        let mut sum = 0.0;
        for i in 0..=j {
            sum += r[[i, j]] * qtb[i];
        }
        wa1[j] = sum / diag[ipvt[j]];
    }
    let gnorm = enorm(wa1.slice(ndarray::s![..n]));
    let mut paru = gnorm / delta;
    if paru == 0.0 {
        paru = dwarf / delta.min(P1);
    }

    let mut par = par.max(parl).min(paru);
    if par == 0.0 {
        par = gnorm / dxnorm;
    }

    let mut iterations = 0;
    loop {
        iterations += 1;

        if par == 0.0 {
            par = dwarf.max(P001 * paru);
        }
        let scale = par.sqrt();
        for j in 0..n {
            wa1[j] = scale * diag[j];
        }
        qrsolv(r, ipvt, wa1, qtb, x, sdiag, wa2);
        for j in 0..n {
            wa2[j] = diag[j] * x[j];
        }
        dxnorm = enorm(wa2.slice(ndarray::s![..n]));
        let previous = fp;
        fp = dxnorm - delta;

        // converged, or the lower bound is zero and already optimal, or out of trials
        if fp.abs() <= P1 * delta
            || (parl == 0.0 && fp <= previous && previous < 0.0)
            || iterations == MAX_ITERATIONS
        {
            break;
        }

        // Newton correction
        for j in 0..n {
            let l = ipvt[j];
            wa1[j] = diag[l] * (wa2[l] / dxnorm);
        }
        for j in 0..n {
            wa1[j] /= sdiag[j];
            let temp = wa1[j];
            for i in (j + 1)..n {
                wa1[i] -= r[[i, j]] * temp;
            }
        }
        let temp = enorm(wa1.slice(ndarray::s![..n]));
        let parc = ((fp / delta) / temp) / temp;

        if fp > 0.0 {
            parl = parl.max(par);
        }
        if fp < 0.0 {
            paru = paru.min(par);
        }

        par = parl.max(par + parc);
    }

    StepResult { par, iterations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn scratch(n: usize) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        (
            Array1::zeros(n),
            Array1::zeros(n),
            Array1::zeros(n),
            Array1::zeros(n),
        )
    }

    #[test]
    fn test_gauss_newton_step_inside_region() {
        let mut r = array![[2.0, 0.5], [0.0, 1.0]];
        let ipvt = [0, 1];
        let diag = array![1.0, 1.0];
        let qtb = array![1.0, 1.0];
        let (mut x, mut sdiag, mut wa1, mut wa2) = scratch(2);

        let step = lmpar(&mut r, &ipvt, diag.view(), &qtb, 10.0, 0.5, &mut x, &mut sdiag, &mut wa1, &mut wa2);

        assert_eq!(step.par, 0.0);
        assert_eq!(step.iterations, 0);
        // R x = qtb
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-14);
        assert_relative_eq!(x[0], 0.25, epsilon = 1e-14);
    }

    #[test]
    fn test_step_lands_on_boundary() {
        let mut r = array![[2.0, 0.5, 0.1], [0.0, 1.0, 0.3], [0.0, 0.0, 0.5]];
        let ipvt = [2, 0, 1];
        let diag = array![1.0, 2.0, 0.5];
        let qtb = array![3.0, -1.0, 2.0];
        let delta = 0.5;
        let (mut x, mut sdiag, mut wa1, mut wa2) = scratch(3);

        let step = lmpar(&mut r, &ipvt, diag.view(), &qtb, delta, 0.0, &mut x, &mut sdiag, &mut wa1, &mut wa2);

        assert!(step.par > 0.0);
        let scaled = enorm((&diag * &x).view());
        assert!((scaled - delta).abs() <= 0.1 * delta);
        // upper triangle of R untouched
        assert_eq!(r[[0, 1]], 0.5);
        assert_eq!(r[[1, 2]], 0.3);
        assert_eq!(r[[2, 2]], 0.5);
    }

    #[test]
    fn test_rank_deficient_r() {
        let mut r = array![[1.0, 1.0], [0.0, 0.0]];
        let ipvt = [0, 1];
        let diag = array![1.0, 1.0];
        let qtb = array![100.0, 0.0];
        let delta = 1.0;
        let (mut x, mut sdiag, mut wa1, mut wa2) = scratch(2);

        let step = lmpar(&mut r, &ipvt, diag.view(), &qtb, delta, 0.0, &mut x, &mut sdiag, &mut wa1, &mut wa2);

        assert!(step.par > 0.0);
        let scaled = enorm((&diag * &x).view());
        assert!((scaled - delta).abs() <= 0.1 * delta + 1e-12);
    }
}
