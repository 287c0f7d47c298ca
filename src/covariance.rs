//! Covariance evaluation bound to fixed kernel parameters.
//!
//! [`Covariance`] pairs a stationary [`CorrelationModel`] with the variance
//! scale `sigma2`, the inverse length scales `theta` and the relative diagonal
//! `nugget`. Self-covariance (one point set against itself) and
//! cross-covariance (two distinct point sets) are separate, explicitly named
//! entry points; the nugget is only ever added on the self-covariance
//! diagonal so that cross blocks stay exact.

use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::utils::{DiffMatrix, pairwise_differences};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A covariance function with fixed parameters
#[derive(Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Corr: Serialize",
        deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>"
    ))
)]
pub struct Covariance<F: Float, Corr: CorrelationModel<F>> {
    /// Correlation model giving r(x, x') over scaled distances
    corr: Corr,
    /// Inverse correlation length scales, one per input component
    theta: Array1<F>,
    /// Process variance, the covariance at zero distance
    sigma2: F,
    /// Diagonal term relative to `sigma2` restoring strict positive
    /// definiteness of self-covariance matrices
    nugget: F,
}

impl<F: Float, Corr: CorrelationModel<F>> Clone for Covariance<F, Corr> {
    fn clone(&self) -> Self {
        Covariance {
            corr: self.corr,
            theta: self.theta.to_owned(),
            sigma2: self.sigma2,
            nugget: self.nugget,
        }
    }
}

impl<F: Float, Corr: CorrelationModel<F>> fmt::Display for Covariance<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}(sigma2={}, theta={})",
            self.corr, self.sigma2, self.theta
        )
    }
}

impl<F: Float, Corr: CorrelationModel<F>> Covariance<F, Corr> {
    pub(crate) fn new(corr: Corr, theta: Array1<F>, sigma2: F, nugget: F) -> Self {
        Covariance {
            corr,
            theta,
            sigma2,
            nugget,
        }
    }

    /// Number of input components the bound length scales expect
    pub fn dim(&self) -> usize {
        self.theta.len()
    }

    /// Inverse correlation length scales
    pub fn theta(&self) -> &Array1<F> {
        &self.theta
    }

    /// Process variance
    pub fn sigma2(&self) -> F {
        self.sigma2
    }

    /// Relative nugget added on the self-covariance diagonal
    pub fn nugget(&self) -> F {
        self.nugget
    }

    fn check_dim(&self, ncols: usize) -> Result<()> {
        if ncols != self.theta.len() {
            return Err(GpError::DimensionMismatch(format!(
                "points have {} components, covariance expects {}",
                ncols,
                self.theta.len()
            )));
        }
        Ok(())
    }

    /// Full (n, n) covariance matrix of a point set against itself,
    /// with the nugget added on the diagonal.
    pub fn self_covariance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_dim(x.ncols())?;
        let dm = DiffMatrix::new(x);
        Ok(self.self_covariance_from(&dm))
    }

    /// Self-covariance assembled from a precomputed condensed distance matrix.
    pub(crate) fn self_covariance_from(&self, dm: &DiffMatrix<F>) -> Array2<F> {
        let diag = self.sigma2 * (F::one() + self.nugget);
        let mut k = Array2::<F>::eye(dm.n_obs).mapv(|v| v * diag);
        if dm.n_obs > 1 {
            let rxx = self.corr.value(&dm.d, &self.theta);
            for (i, ij) in dm.d_indices.outer_iter().enumerate() {
                let v = self.sigma2 * rxx[[i, 0]];
                k[[ij[0], ij[1]]] = v;
                k[[ij[1], ij[0]]] = v;
            }
        }
        k
    }

    /// Diagonal of the self-covariance as a length-n vector: the pointwise
    /// prior variance at each point, without nugget.
    pub fn self_variances(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.sigma2)
    }

    /// Full (n, m) covariance matrix between two distinct point sets.
    pub fn cross_covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        self.check_dim(x.ncols())?;
        self.check_dim(y.ncols())?;
        let d = pairwise_differences(x, y);
        let r = self.corr.value(&d, &self.theta);
        let k = r
            .into_shape((x.nrows(), y.nrows()))
            .unwrap()
            .mapv(|v| self.sigma2 * v);
        Ok(k)
    }

    /// Covariance between aligned pairs of two equally sized point sets,
    /// as a length-n vector.
    pub fn cross_pairwise(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array1<F>> {
        self.check_dim(x.ncols())?;
        self.check_dim(y.ncols())?;
        if x.nrows() != y.nrows() {
            return Err(GpError::DimensionMismatch(format!(
                "pairwise covariance needs equally sized point sets, got {} and {}",
                x.nrows(),
                y.nrows()
            )));
        }
        let d = x.to_owned() - y;
        let r = self.corr.value(&d, &self.theta);
        Ok(r.column(0).mapv(|v| self.sigma2 * v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::MaternPCorr;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array};

    fn matern_cov() -> Covariance<f64, MaternPCorr> {
        Covariance::new(MaternPCorr::new(2), arr1(&[1. / 0.7]), 0.25, 1e-10)
    }

    #[test]
    fn test_self_covariance_symmetric() {
        let x = array![[-0.5], [0.0], [0.3], [0.8]];
        let k = matern_cov().self_covariance(&x).unwrap();
        assert_abs_diff_eq!(k.clone(), k.t().to_owned(), epsilon = 1e-14);
    }

    #[test]
    fn test_self_covariance_diagonal() {
        let x = array![[-0.5], [0.0], [0.5]];
        let cov = matern_cov();
        let k = cov.self_covariance(&x).unwrap();
        for i in 0..x.nrows() {
            assert_abs_diff_eq!(k[[i, i]], 0.25 * (1. + 1e-10), epsilon = 1e-16);
        }
        assert_abs_diff_eq!(
            cov.self_variances(&x),
            arr1(&[0.25, 0.25, 0.25]),
            epsilon = 1e-16
        );
    }

    #[test]
    fn test_cross_matches_self_off_diagonal() {
        let x = array![[-0.5], [0.0], [0.5]];
        let cov = matern_cov();
        let k = cov.self_covariance(&x).unwrap();
        let c = cov.cross_covariance(&x, &x).unwrap();
        // off-diagonal entries agree, the diagonal differs by the nugget
        assert_abs_diff_eq!(k[[0, 1]], c[[0, 1]], epsilon = 1e-14);
        assert_abs_diff_eq!(k[[1, 2]], c[[2, 1]], epsilon = 1e-14);
        assert!(k[[0, 0]] > c[[0, 0]]);
    }

    #[test]
    fn test_cross_pairwise() {
        let x = array![[-0.5], [0.0], [0.5]];
        let y = array![[-0.5], [0.1], [0.9]];
        let cov = matern_cov();
        let v = cov.cross_pairwise(&x, &y).unwrap();
        let full = cov.cross_covariance(&x, &y).unwrap();
        assert_abs_diff_eq!(v[0], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], full[[1, 1]], epsilon = 1e-14);
        assert_abs_diff_eq!(v[2], full[[2, 2]], epsilon = 1e-14);
    }

    #[test]
    fn test_cross_pairwise_size_mismatch() {
        let x = array![[-0.5], [0.0], [0.5]];
        let y = array![[0.1], [0.2]];
        let err = matern_cov().cross_pairwise(&x, &y).unwrap_err();
        assert!(matches!(err, GpError::DimensionMismatch(_)));
    }

    #[test]
    fn test_dimension_check() {
        let x = array![[0., 1.], [1., 2.]];
        let err = matern_cov().self_covariance(&x).unwrap_err();
        assert!(matches!(err, GpError::DimensionMismatch(_)));
    }
}
