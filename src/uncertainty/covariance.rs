//! # Covariance Matrix Calculations
//!
//! Covariance of the fitted parameters from the triangular factor `R` of the
//! pivoted QR factorization of the Jacobian, `J P = Q R`:
//!
//! ```text
//!     covar = redchi * P (RᵀR)⁻¹ Pᵀ = redchi * (JᵀJ)⁻¹
//! ```

use ndarray::{Array1, Array2};

use crate::error::{LmError, Result};

/// Relative size below which a diagonal entry of `R` marks a dependent parameter.
const RANK_TOL: f64 = 1e-14;

/// Overwrite the upper `n x n` block of `r` with `(JᵀJ)⁻¹` in original
/// parameter order.
///
/// `R` is read from the upper triangle (including the diagonal) of `r`. The
/// rank is the number of leading diagonal entries with `|R_kk| > tol * |R_00|`;
/// rows and columns of the parameters beyond the rank are set to zero. Returns
/// the rank.
pub fn covar(r: &mut Array2<f64>, ipvt: &[usize], tol: f64) -> usize {
    let n = r.ncols();
    if n == 0 {
        return 0;
    }
    let tolr = tol * r[[0, 0]].abs();

    // inverse of R in the full upper triangle
    let mut rank = 0;
    for k in 0..n {
        if r[[k, k]].abs() <= tolr {
            break;
        }
        r[[k, k]] = 1.0 / r[[k, k]];
        for j in 0..k {
            let temp = r[[k, k]] * r[[j, k]];
            r[[j, k]] = 0.0;
            for i in 0..=j {
                r[[i, k]] -= temp * r[[i, j]];
            }
        }
        rank = k + 1;
    }

    // inverse of RᵀR in the full upper triangle
    for k in 0..rank {
        for j in 0..k {
            let temp = r[[j, k]];
            for i in 0..=j {
                r[[i, j]] += temp * r[[i, k]];
            }
        }
        let temp = r[[k, k]];
        for i in 0..=k {
            r[[i, k]] *= temp;
        }
    }

    // unpermute into the lower triangle, diagonal kept aside
    let mut diagonal = vec![0.0; n];
    for j in 0..n {
        let jj = ipvt[j];
        let singular = j >= rank;
        for i in 0..=j {
            if singular {
                r[[i, j]] = 0.0;
            }
            let ii = ipvt[i];
            if ii > jj {
                r[[ii, jj]] = r[[i, j]];
            }
            if ii < jj {
                r[[jj, ii]] = r[[i, j]];
            }
        }
        diagonal[jj] = r[[j, j]];
    }

    // symmetrize
    for j in 0..n {
        for i in 0..j {
            r[[i, j]] = r[[j, i]];
        }
        r[[j, j]] = diagonal[j];
    }

    rank
}

/// Covariance matrix of the parameters from the factor `R` (`n x n` upper
/// triangular, pivoted column order) and its permutation, scaled by the
/// reduced chi-square `redchi`.
pub fn covariance_from_r(r: &Array2<f64>, ipvt: &[usize], redchi: f64) -> Result<Array2<f64>> {
    let n = r.ncols();
    if r.nrows() < n || ipvt.len() != n {
        return Err(LmError::DimensionMismatch(format!(
            "R is {}x{} with {} pivots",
            r.nrows(),
            n,
            ipvt.len()
        )));
    }

    let mut covar_matrix = r.slice(ndarray::s![..n, ..]).to_owned();
    covar(&mut covar_matrix, ipvt, RANK_TOL);
    covar_matrix *= redchi;
    Ok(covar_matrix)
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|variance| if variance > 0.0 { variance.sqrt() } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::qrfac;
    use approx::assert_relative_eq;
    use ndarray::{array, ShapeBuilder};

    fn r_factor(a: &Array2<f64>) -> (Array2<f64>, Vec<usize>) {
        let (m, n) = a.dim();
        let mut qr = Array2::zeros((m, n).f());
        qr.assign(a);
        let mut ipvt = vec![0; n];
        let mut rdiag = Array1::zeros(n);
        let mut acnorm = Array1::zeros(n);
        let mut wa = Array1::zeros(n);
        qrfac(&mut qr, true, &mut ipvt, &mut rdiag, &mut acnorm, &mut wa);

        let mut r = Array2::zeros((n, n));
        for j in 0..n {
            for i in 0..j {
                r[[i, j]] = qr[[i, j]];
            }
            r[[j, j]] = rdiag[j];
        }
        (r, ipvt)
    }

    #[test]
    fn test_covariance_matches_normal_equations() {
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let (r, ipvt) = r_factor(&a);
        let covar_matrix = covariance_from_r(&r, &ipvt, 1.0).unwrap();

        // AᵀA = [[4, 6], [6, 14]], det = 20
        assert_relative_eq!(covar_matrix[[0, 0]], 14.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(covar_matrix[[1, 1]], 4.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(covar_matrix[[0, 1]], -6.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(covar_matrix[[1, 0]], -6.0 / 20.0, epsilon = 1e-12);

        let scaled = covariance_from_r(&r, &ipvt, 2.0).unwrap();
        assert_relative_eq!(scaled[[1, 1]], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_dependent_parameter_is_zeroed() {
        // second column duplicates the first
        let a = array![[1.0, 1.0, 0.0], [2.0, 2.0, 1.0], [3.0, 3.0, 0.0], [4.0, 4.0, 1.0]];
        let (mut r, ipvt) = r_factor(&a);
        let rank = covar(&mut r, &ipvt, 1e-10);
        assert_eq!(rank, 2);

        let zeroed = ipvt[2];
        for k in 0..3 {
            assert_eq!(r[[zeroed, k]], 0.0);
            assert_eq!(r[[k, zeroed]], 0.0);
        }
    }

    #[test]
    fn test_correlation_and_errors() {
        let covar_matrix = array![[4.0, 1.0], [1.0, 9.0]];
        let correl = calculate_correlation(&covar_matrix);
        assert_relative_eq!(correl[[0, 1]], 1.0 / 6.0);
        assert_eq!(correl[[1, 1]], 1.0);

        let errors = standard_errors_from_covariance(&covar_matrix);
        assert_eq!(errors, array![2.0, 3.0]);
    }
}
