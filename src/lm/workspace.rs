//! Per-worker scratch storage.

use ndarray::{Array1, Array2, ShapeBuilder};

/// Scratch buffers for one `m x n` solve.
///
/// A workspace is owned by exactly one worker and can be reused for any
/// number of consecutive solves of the same shape; the solver never
/// allocates while iterating.
#[derive(Debug, Clone)]
pub struct Workspace {
    m: usize,
    n: usize,
    /// Column-major Jacobian; after factorization holds `R` above and the
    /// Householder vectors below the diagonal.
    pub(crate) fjac: Array2<f64>,
    pub(crate) ipvt: Vec<usize>,
    pub(crate) qtf: Array1<f64>,
    pub(crate) wa1: Array1<f64>,
    pub(crate) wa2: Array1<f64>,
    pub(crate) wa3: Array1<f64>,
    pub(crate) wa4: Array1<f64>,
}

impl Workspace {
    /// Allocate a workspace for problems with `m` residuals and `n` parameters.
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            fjac: Array2::zeros((m, n).f()),
            ipvt: (0..n).collect(),
            qtf: Array1::zeros(n),
            wa1: Array1::zeros(n),
            wa2: Array1::zeros(n),
            wa3: Array1::zeros(n),
            wa4: Array1::zeros(m),
        }
    }

    /// Number of residuals this workspace was sized for.
    pub fn residual_count(&self) -> usize {
        self.m
    }

    /// Number of parameters this workspace was sized for.
    pub fn parameter_count(&self) -> usize {
        self.n
    }

    /// Returns true if the workspace fits an `m x n` problem.
    pub fn fits(&self, m: usize, n: usize) -> bool {
        self.m == m && self.n == n
    }

    /// The upper triangular factor `R` of the last Jacobian factorization
    /// (`n x n`, in pivoted column order).
    pub fn r_factor(&self) -> Array2<f64> {
        let n = self.n.min(self.m);
        let mut r = Array2::zeros((n, n));
        for j in 0..n {
            for i in 0..=j {
                r[[i, j]] = self.fjac[[i, j]];
            }
        }
        r
    }

    /// The column permutation of the last factorization.
    pub fn permutation(&self) -> &[usize] {
        &self.ipvt
    }

    /// The first `n` components of `Qᵀ fvec` at the last accepted iterate's factorization.
    pub fn qtf(&self) -> &Array1<f64> {
        &self.qtf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_shapes() {
        let ws = Workspace::new(6, 3);
        assert!(ws.fits(6, 3));
        assert!(!ws.fits(3, 6));
        assert_eq!(ws.fjac.dim(), (6, 3));
        // column-major, so each Jacobian column is contiguous
        assert!(ws.fjac.column(1).as_slice().is_some());
        assert_eq!(ws.permutation(), &[0, 1, 2]);
        assert_eq!(ws.wa4.len(), 6);
        assert_eq!(ws.r_factor().dim(), (3, 3));
    }
}
