//! Householder QR with column pivoting and the regularized triangular solve
//! built on top of it.
//!
//! Both routines work in place on dense column-major matrices so that a
//! worker can reuse the same Jacobian buffer for the whole solve.

use ndarray::{s, Array1, Array2};

use super::enorm::enorm;

/// Factor `a` (`m x n`) as `A P = Q R` using Householder reflections.
///
/// On return:
/// * the strict upper triangle of the leading `min(m, n)` rows of `a` holds
///   the strict upper triangle of `R`,
/// * column `j` of the lower trapezoid (rows `j..m`) holds the Householder
///   vector `v_j`, scaled so that `Q_j = I - v_j v_jᵀ / v_j[0]`,
/// * `rdiag[j]` holds the diagonal `R_jj`, whose magnitudes are nonincreasing
///   when `pivot` is set,
/// * `acnorm[j]` holds the norm of column `j` of the original matrix,
/// * `ipvt[j]` is the original index of the column now at position `j`
///   (untouched when `pivot` is false).
///
/// `wa` is scratch of length `n`.
pub fn qrfac(
    a: &mut Array2<f64>,
    pivot: bool,
    ipvt: &mut [usize],
    rdiag: &mut Array1<f64>,
    acnorm: &mut Array1<f64>,
    wa: &mut Array1<f64>,
) {
    let (m, n) = a.dim();
    let epsmch = f64::EPSILON;

    for j in 0..n {
        acnorm[j] = enorm(a.column(j));
        rdiag[j] = acnorm[j];
        wa[j] = rdiag[j];
        if pivot {
            ipvt[j] = j;
        }
    }

    for j in 0..m.min(n) {
        if pivot {
            // bring the column of largest remaining norm into the pivot position
            let mut kmax = j;
            for k in j..n {
                if rdiag[k] > rdiag[kmax] {
                    kmax = k;
                }
            }
            if kmax != j {
                for i in 0..m {
                    a.swap([i, j], [i, kmax]);
                }
                rdiag[kmax] = rdiag[j];
                wa[kmax] = wa[j];
                ipvt.swap(j, kmax);
            }
        }

        let mut ajnorm = enorm(a.slice(s![j.., j]));
        if ajnorm != 0.0 {
            if a[[j, j]] < 0.0 {
                ajnorm = -ajnorm;
            }
            for i in j..m {
                a[[i, j]] /= ajnorm;
            }
            a[[j, j]] += 1.0;

            // apply the reflector to the remaining columns and downdate their norms
            for k in (j + 1)..n {
                let mut sum = 0.0;
                for i in j..m {
                    sum += a[[i, j]] * a[[i, k]];
                }
                let temp = sum / a[[j, j]];
                for i in j..m {
                    a[[i, k]] -= temp * a[[i, j]];
                }

                if pivot && rdiag[k] != 0.0 {
                    let temp = a[[j, k]] / rdiag[k];
                    rdiag[k] *= (1.0 - temp * temp).max(0.0).sqrt();
                    let ratio = rdiag[k] / wa[k];
                    if 0.05 * ratio * ratio <= epsmch {
                        rdiag[k] = enorm(a.slice(s![(j + 1).., k]));
                        wa[k] = rdiag[k];
                    }
                }
            }
        }
        rdiag[j] = -ajnorm;
    }
}

/// Solve the damped least-squares system
///
/// ```text
///     A x = b,   D x = 0
/// ```
///
/// given the pivoted QR factorization `A P = Q R` of `A`, the diagonal `D`
/// (`diag`) and the first `n` components of `Qᵀ b` (`qtb`).
///
/// Givens rotations eliminate `D` against `R`, producing an upper triangular
/// `S` with `Pᵀ (AᵀA + DD) P = SᵀS`. The strict lower triangle of `r` receives
/// the strict upper triangle of `S` (transposed), `sdiag` receives its
/// diagonal; the upper triangle and diagonal of `r` are left unchanged.
///
/// When `S` is singular the unknowns at and after its first zero diagonal are
/// set to zero, giving a least-squares solution. `wa` is scratch of length `n`.
pub fn qrsolv(
    r: &mut Array2<f64>,
    ipvt: &[usize],
    diag: &Array1<f64>,
    qtb: &Array1<f64>,
    x: &mut Array1<f64>,
    sdiag: &mut Array1<f64>,
    wa: &mut Array1<f64>,
) {
    let n = r.ncols();

    // copy R into the lower triangle and save its diagonal in x
    for j in 0..n {
        for i in j..n {
            r[[i, j]] = r[[j, i]];
        }
        x[j] = r[[j, j]];
        wa[j] = qtb[j];
    }

    for j in 0..n {
        let l = ipvt[j];
        if diag[l] != 0.0 {
            for k in j..n {
                sdiag[k] = 0.0;
            }
            sdiag[j] = diag[l];

            // the extra component of the rotated right-hand side
            let mut qtbpj = 0.0;
            for k in j..n {
                if sdiag[k] == 0.0 {
                    continue;
                }
                let (sin, cos) = if r[[k, k]].abs() < sdiag[k].abs() {
                    let cotan = r[[k, k]] / sdiag[k];
                    let sin = 0.5 / (0.25 + 0.25 * cotan * cotan).sqrt();
                    (sin, sin * cotan)
                } else {
                    let tan = sdiag[k] / r[[k, k]];
                    let cos = 0.5 / (0.25 + 0.25 * tan * tan).sqrt();
                    (cos * tan, cos)
                };

                r[[k, k]] = cos * r[[k, k]] + sin * sdiag[k];
                let temp = cos * wa[k] + sin * qtbpj;
                qtbpj = -sin * wa[k] + cos * qtbpj;
                wa[k] = temp;

                for i in (k + 1)..n {
                    let temp = cos * r[[i, k]] + sin * sdiag[i];
                    sdiag[i] = -sin * r[[i, k]] + cos * sdiag[i];
                    r[[i, k]] = temp;
                }
            }
        }
        sdiag[j] = r[[j, j]];
        r[[j, j]] = x[j];
    }

    let nsing = (0..n).find(|&j| sdiag[j] == 0.0).unwrap_or(n);
    for j in nsing..n {
        wa[j] = 0.0;
    }

    for j in (0..nsing).rev() {
        let mut sum = 0.0;
        for i in (j + 1)..nsing {
            sum += r[[i, j]] * wa[i];
        }
        wa[j] = (wa[j] - sum) / sdiag[j];
    }

    for j in 0..n {
        x[ipvt[j]] = wa[j];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, ShapeBuilder};

    fn factor(a: &Array2<f64>, pivot: bool) -> (Array2<f64>, Vec<usize>, Array1<f64>, Array1<f64>) {
        let (m, n) = a.dim();
        let mut qr = Array2::zeros((m, n).f());
        qr.assign(a);
        let mut ipvt: Vec<usize> = (0..n).collect();
        let mut rdiag = Array1::zeros(n);
        let mut acnorm = Array1::zeros(n);
        let mut wa = Array1::zeros(n);
        qrfac(&mut qr, pivot, &mut ipvt, &mut rdiag, &mut acnorm, &mut wa);
        (qr, ipvt, rdiag, acnorm)
    }

    #[test]
    fn test_qrfac_diagonal_and_norms() {
        let a = array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0], [0.0, 0.0, 0.0], [0.0, 4.0, 0.0]];
        let (_, ipvt, rdiag, acnorm) = factor(&a, true);

        assert_relative_eq!(acnorm[0], 1.0);
        assert_relative_eq!(acnorm[1], 5.0);
        assert_relative_eq!(acnorm[2], 2.0);

        // largest column first, then the rest by remaining norm
        assert_eq!(ipvt, vec![1, 2, 0]);
        assert_relative_eq!(rdiag[0].abs(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(rdiag[1].abs(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(rdiag[2].abs(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qrfac_zero_column() {
        let a = array![[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]];
        let (_, ipvt, rdiag, _) = factor(&a, true);
        assert_eq!(ipvt, vec![1, 0]);
        assert_eq!(rdiag[1], 0.0);

        // without pivoting the zero column is skipped and row 0 keeps its entry
        let (_, _, rdiag, _) = factor(&a, false);
        assert_eq!(rdiag[0], 0.0);
        assert_relative_eq!(rdiag[1].abs(), 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_qrfac_tie_keeps_lowest_index() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let (_, ipvt, _, _) = factor(&a, true);
        assert_eq!(ipvt, vec![0, 1]);
    }

    #[test]
    fn test_qrsolv_without_damping_is_back_substitution() {
        // R = [[2, 1], [0, 4]], no pivoting, D = 0
        let mut r = array![[2.0, 1.0], [0.0, 4.0]];
        let ipvt = [0, 1];
        let diag = array![0.0, 0.0];
        let qtb = array![4.0, 8.0];
        let mut x = Array1::zeros(2);
        let mut sdiag = Array1::zeros(2);
        let mut wa = Array1::zeros(2);
        qrsolv(&mut r, &ipvt, &diag, &qtb, &mut x, &mut sdiag, &mut wa);

        assert_relative_eq!(x[1], 2.0, epsilon = 1e-14);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(sdiag[0], 2.0);
        assert_relative_eq!(sdiag[1], 4.0);
        // upper triangle preserved
        assert_eq!(r[[0, 1]], 1.0);
        assert_eq!(r[[0, 0]], 2.0);
    }

    #[test]
    fn test_qrsolv_matches_normal_equations() {
        // min |R x - c|² + |D x|² with R diagonal is separable
        let mut r = array![[3.0, 0.0], [0.0, 2.0]];
        let ipvt = [0, 1];
        let diag = array![4.0, 0.0];
        let qtb = array![3.0, 2.0];
        let mut x = Array1::zeros(2);
        let mut sdiag = Array1::zeros(2);
        let mut wa = Array1::zeros(2);
        qrsolv(&mut r, &ipvt, &diag, &qtb, &mut x, &mut sdiag, &mut wa);

        // (9 + 16) x0 = 9
        assert_relative_eq!(x[0], 9.0 / 25.0, epsilon = 1e-14);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-14);
        assert_relative_eq!(sdiag[0].abs(), 5.0, epsilon = 1e-14);
    }

    #[test]
    fn test_qrsolv_rank_deficient() {
        let mut r = array![[2.0, 1.0], [0.0, 0.0]];
        let ipvt = [0, 1];
        let diag = array![0.0, 0.0];
        let qtb = array![2.0, 5.0];
        let mut x = Array1::zeros(2);
        let mut sdiag = Array1::zeros(2);
        let mut wa = Array1::zeros(2);
        qrsolv(&mut r, &ipvt, &diag, &qtb, &mut x, &mut sdiag, &mut wa);

        assert_eq!(x[1], 0.0);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-14);
    }
}
