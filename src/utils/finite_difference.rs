//! Forward-difference approximation of the Jacobian.

use crate::error::Result;
use crate::problem::Problem;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};

/// Fill `fjac` (`m x n`) with the forward-difference Jacobian of the
/// residuals at `x`.
///
/// `fvec` must already hold the residuals at `x`. Column `j` uses the step
/// `eps * |x_j|` (or `eps` when `x_j == 0`) with `eps = sqrt(max(epsfcn, machine eps))`.
/// Each column costs one residual evaluation, counted into `nfev`.
///
/// If the problem reports an error the function returns it immediately,
/// leaving `x` at the perturbed point that was being evaluated and `wa`
/// holding whatever the callback wrote.
pub fn fdjac2<P: Problem + ?Sized>(
    problem: &P,
    x: &mut ArrayViewMut1<'_, f64>,
    fvec: ArrayView1<'_, f64>,
    fjac: &mut Array2<f64>,
    epsfcn: f64,
    wa: &mut Array1<f64>,
    nfev: &mut usize,
) -> Result<()> {
    let eps = epsfcn.max(f64::EPSILON).sqrt();

    for j in 0..x.len() {
        let temp = x[j];
        let mut h = eps * temp.abs();
        if h == 0.0 {
            h = eps;
        }

        x[j] = temp + h;
        *nfev += 1;
        problem.eval(x.view(), wa.view_mut())?;
        x[j] = temp;

        let mut column = fjac.column_mut(j);
        for i in 0..fvec.len() {
            column[i] = (wa[i] - fvec[i]) / h;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LmError;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// r_i = y_i - (a * t_i^2 + b)
    struct Quadratic {
        t: Vec<f64>,
    }

    impl Problem for Quadratic {
        fn eval(&self, p: ArrayView1<'_, f64>, mut r: ArrayViewMut1<'_, f64>) -> Result<()> {
            for (i, t) in self.t.iter().enumerate() {
                r[i] = 1.0 - (p[0] * t * t + p[1]);
            }
            Ok(())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.t.len()
        }
    }

    #[test]
    fn test_forward_difference_matches_analytic() {
        let problem = Quadratic {
            t: vec![0.0, 1.0, 2.0],
        };
        let mut x = array![2.0, 0.0];
        let mut fvec = Array1::zeros(3);
        problem.eval(x.view(), fvec.view_mut()).unwrap();

        let mut fjac = Array2::zeros((3, 2));
        let mut wa = Array1::zeros(3);
        let mut nfev = 0;
        fdjac2(&problem, &mut x.view_mut(), fvec.view(), &mut fjac, 0.0, &mut wa, &mut nfev).unwrap();

        assert_eq!(nfev, 2);
        assert_eq!(x, array![2.0, 0.0]);
        for (i, t) in problem.t.iter().enumerate() {
            assert_relative_eq!(fjac[[i, 0]], -t * t, epsilon = 1e-6);
            assert_relative_eq!(fjac[[i, 1]], -1.0, epsilon = 1e-6);
        }
    }

    struct Failing;

    impl Problem for Failing {
        fn eval(&self, p: ArrayView1<'_, f64>, _r: ArrayViewMut1<'_, f64>) -> Result<()> {
            if p[1] != 0.0 {
                return Err(LmError::Aborted(-2));
            }
            Ok(())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_error_stops_at_perturbed_point() {
        let mut x = array![1.0, 0.0];
        let fvec = Array1::zeros(1);
        let mut fjac = Array2::zeros((1, 2));
        let mut wa = Array1::zeros(1);
        let mut nfev = 0;
        let result = fdjac2(&Failing, &mut x.view_mut(), fvec.view(), &mut fjac, 0.0, &mut wa, &mut nfev);

        assert!(matches!(result, Err(LmError::Aborted(-2))));
        assert_eq!(nfev, 2);
        assert_eq!(x[0], 1.0);
        assert!(x[1] > 0.0);
    }
}
