use crate::correlation_models::*;
use crate::covariance::Covariance;
use crate::errors::{GpError, Result};
use crate::mean_models::*;
use crate::parameters::{GpParams, GpValidParams, Trend};
use crate::utils::DiffMatrix;

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, eigh::*, qr::*, svd::*, triangular::*};
use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};

use ndarray_rand::RandomExt;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Normal;
use ndarray_stats::QuantileExt;

use log::{debug, warn};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Number of regularized factorization retries before giving up
pub const GP_JITTER_RETRIES: usize = 3;

/// Trend term state computed during fit and reused in predictions.
///
/// `Estimated` keeps the generalized least-squares byproducts needed by the
/// variance computation: `ft = L^-1 F` and the R factor of its QR
/// decomposition.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
enum TrendTerm<F: Float> {
    /// Zero prior mean
    Zero,
    /// Known coefficients given at model construction
    Fixed {
        beta: Array2<F>,
    },
    /// Coefficients estimated by generalized least squares
    Estimated {
        beta: Array2<F>,
        ft: Array2<F>,
        ft_qr_r: Array2<F>,
    },
}

impl<F: Float> TrendTerm<F> {
    fn beta(&self) -> Option<&Array2<F>> {
        match self {
            TrendTerm::Zero => None,
            TrendTerm::Fixed { beta } | TrendTerm::Estimated { beta, .. } => Some(beta),
        }
    }
}

/// A GP regression is an interpolation method where the
/// interpolated values are modeled by a Gaussian process with a mean and
/// governed by a prior covariance kernel.
///
/// The interpolated output is modeled as a stochastic process as follows:
///
/// `Z(x) = mu(x) + W(x)`
///
/// where:
/// * `mu(x)` is the trend i.e. the mean of the gaussian process
/// * `W(x)` the realization of a zero-mean stochastic gaussian process
///   with covariance `sigma^2 * corr(x, x')`
///
/// All covariance parameters (`sigma2`, inverse length scales `theta`,
/// `nugget`) are fixed values supplied at model construction; no parameter
/// estimation takes place. Depending on [`Trend`]:
/// * `Trend::Zero` / `Trend::Known`: simple kriging with zero/known mean;
/// * `Trend::Estimated`: the trend coefficients over the mean basis are
///   estimated by generalized least squares jointly with the prediction
///   (ordinary kriging for a constant basis, universal kriging beyond),
///   making the predictor unbiased under any true coefficients.
///
/// # Implementation
///
/// * Based on [ndarray](https://github.com/rust-ndarray/ndarray)
///   and [linfa](https://github.com/rust-ml/linfa) and strive to follow
///   [linfa guidelines](https://github.com/rust-ml/linfa/blob/master/CONTRIBUTE.md)
/// * GP mean basis can be constant, linear or quadratic
/// * GP correlation model can be built with the following kernels: squared
///   exponential, absolute exponential, matern 3/2, matern 5/2, matern with
///   half-integer smoothness p + 1/2
/// * The training covariance factorization is O(n^3) in time and O(n^2) in
///   memory where n is the number of training points, which is the scaling
///   bottleneck for large training sets.
///
/// A fitted model is immutable: prediction entry points take `&self` and
/// keep no mutable state, so independent predictions against the same model
/// may run concurrently.
///
/// # Features
///
/// ## serializable
///
/// The `serializable` feature enables the serialization of GP models using the [`serde crate`](https://serde.rs/).
///
/// ## persistent
///
/// The `persistent` feature enables saving and loading fitted GP models as JSON files.
///
/// # Example
///
/// ```no_run
/// use gpkrig::Kriging;
/// use linfa::prelude::*;
/// use ndarray::{arr1, arr2, Array, Axis};
///
/// // training data
/// let xt = arr2(&[[-0.5], [0.0], [0.5]]);
/// let zt = arr1(&[1.0, 2.0, 1.0]);
///
/// // Matern p=2 kernel with fixed variance and length scale,
/// // unknown constant mean, i.e. ordinary kriging
/// let gp = Kriging::params()
///     .sigma2(0.25)
///     .theta(arr1(&[1. / 0.7]))
///     .fit(&Dataset::new(xt, zt))
///     .expect("Kriging fitted");
///
/// // Use the model for prediction
/// let xplot = Array::linspace(-1., 1., 100).insert_axis(Axis(1));
/// let (zpm, zpv) = gp.predict_valvar(&xplot).expect("Kriging prediction");
/// ```
///
/// # Reference
///
/// Bect, Julien, and Emmanuel Vazquez. [STK: a Small (Matlab/Octave) Toolbox
/// for Kriging](https://github.com/stk-kriging/stk/)
#[derive(Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Mean: Serialize, Corr: Serialize",
        deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, Corr: Deserialize<'de>"
    ))
)]
pub struct GaussianProcess<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> {
    /// Covariance function bound to fixed parameters
    cov: Covariance<F, Corr>,
    /// Trend term state
    trend_term: TrendTerm<F>,
    /// Kriging weights: K^-1 (zi - mean term at training points)
    gamma: Array2<F>,
    /// Cholesky decomposition of the training covariance matrix K
    k_chol: Array2<F>,
    /// Diagonal jitter added when regularization was needed (zero otherwise)
    jitter: F,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<F, Mean, Corr>,
}

pub(crate) enum GpSamplingMethod {
    Cholesky,
    EigenValues,
}

/// Ordinary kriging as GP special case: constant mean basis with estimated
/// coefficient and half-integer Matern correlation
pub type Kriging<F> = GpParams<F, ConstantMean, MaternPCorr>;

impl<F: Float> Kriging<F> {
    /// Kriging parameters constructor
    pub fn params() -> GpParams<F, ConstantMean, MaternPCorr> {
        GpParams::new(ConstantMean(), MaternPCorr::default())
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> Clone
    for GaussianProcess<F, Mean, Corr>
{
    fn clone(&self) -> Self {
        Self {
            cov: self.cov.clone(),
            trend_term: self.trend_term.clone(),
            gamma: self.gamma.to_owned(),
            k_chol: self.k_chol.to_owned(),
            jitter: self.jitter,
            training_data: self.training_data.clone(),
            params: self.params.clone(),
        }
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> fmt::Display
    for GaussianProcess<F, Mean, Corr>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, corr={}, theta={}, sigma2={})",
            self.params.mean,
            self.params.corr,
            self.cov.theta(),
            self.cov.sigma2(),
        )
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> GaussianProcess<F, Mean, Corr> {
    /// Gp parameters constructor
    pub fn params<NewMean: RegressionModel<F>, NewCorr: CorrelationModel<F>>(
        mean: NewMean,
        corr: NewCorr,
    ) -> GpParams<F, NewMean, NewCorr> {
        GpParams::new(mean, corr)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    ///
    /// A non-finite prediction indicates non-finite covariance values, i.e. a
    /// misconfigured kernel; such values are propagated, not trapped.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        // Compute the covariance term at x against the training points
        let kx = self.cov.cross_covariance(x, &self.training_data.0)?;
        let mut y = kx.dot(&self.gamma);
        // Add the mean term at x
        if let Some(beta) = self.trend_term.beta() {
            y = y + self.params.mean.value(x).dot(beta);
        }
        Ok(y.remove_axis(Axis(1)))
    }

    /// Predict variance values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n variance values as a (n,) vector.
    ///
    /// Round-off negative values are clamped to zero; the underlying true
    /// variance is mathematically non-negative.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kx = self.cov.cross_covariance(x, &self.training_data.0)?;
        let (rt, u) = self._compute_rt_u(x, &kx)?;
        Ok(self._variances_from(x, &rt, u.as_ref()))
    }

    /// Predict both output values and variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let kx = self.cov.cross_covariance(x, &self.training_data.0)?;
        let mut y = kx.dot(&self.gamma);
        if let Some(beta) = self.trend_term.beta() {
            y = y + self.params.mean.value(x).dot(beta);
        }
        let yp = y.remove_axis(Axis(1));

        let (rt, u) = self._compute_rt_u(x, &kx)?;
        let vp = self._variances_from(x, &rt, u.as_ref());

        Ok((yp, vp))
    }

    /// Compute the posterior covariance matrix at the given x points
    /// specified as a (n, nx) matrix
    fn _compute_covariance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let kx = self.cov.cross_covariance(x, &self.training_data.0)?;
        let (rt, u) = self._compute_rt_u(x, &kx)?;

        let ktt = self.cov.cross_covariance(x, x)?;
        let mut cov_matrix = ktt - rt.t().to_owned().dot(&rt);
        if let Some(u) = u {
            cov_matrix = cov_matrix + u.t().dot(&u);
        }
        Ok(cov_matrix)
    }

    /// Compute `rt` and, for an estimated trend, `u`.
    /// This method factorizes computations done to get variances and covariance matrix:
    /// `rt = L^-1 k(x, xtrain)^T` and `u` solves `R_qr^T u = Ft^T rt - f(x)^T`.
    fn _compute_rt_u(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        kx: &Array2<F>,
    ) -> Result<(Array2<F>, Option<Array2<F>>)> {
        let kx_t = kx.t().to_owned();
        let rt = self.k_chol.solve_triangular(&kx_t, UPLO::Lower)?;

        let u = match &self.trend_term {
            TrendTerm::Estimated { ft, ft_qr_r, .. } => {
                let rhs = ft.t().dot(&rt) - self.params.mean.value(x).t();
                Some(ft_qr_r.t().solve_triangular(&rhs, UPLO::Lower)?)
            }
            _ => None,
        };
        Ok((rt, u))
    }

    /// Assemble predictive variances from the solved terms, clamping round-off
    /// negative values to zero.
    fn _variances_from(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        rt: &Array2<F>,
        u: Option<&Array2<F>>,
    ) -> Array1<F> {
        let mut var = self.cov.self_variances(x) - rt.mapv(|v| v * v).sum_axis(Axis(0));
        if let Some(u) = u {
            var = var + u.mapv(|v| v * v).sum_axis(Axis(0));
        }
        // variance might be slightly negative depending on machine precision:
        // set to zero in that case
        var.mapv(|v| if v < F::zero() { F::zero() } else { v })
    }

    /// Sample the gaussian process for `n_traj` trajectories at the given x
    /// points using cholesky decomposition of the posterior covariance
    pub fn sample_chol<R: Rng + ?Sized>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        self._sample(x, n_traj, GpSamplingMethod::Cholesky, rng)
    }

    /// Sample the gaussian process for `n_traj` trajectories at the given x
    /// points using eigenvalues decomposition of the posterior covariance
    pub fn sample_eig<R: Rng + ?Sized>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        self._sample(x, n_traj, GpSamplingMethod::EigenValues, rng)
    }

    /// Sample the gaussian process for `n_traj` trajectories (alias of
    /// `sample_eig`, recommended as cholesky decomposition suffers from
    /// ill-conditioned posterior covariance matrices when the number of x
    /// locations increases)
    pub fn sample<R: Rng + ?Sized>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        self.sample_eig(x, n_traj, rng)
    }

    fn _sample<R: Rng + ?Sized>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        method: GpSamplingMethod,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        let mean = self.predict(x)?;
        let cov = self._compute_covariance(x)?;
        let c = match method {
            GpSamplingMethod::Cholesky => cov.cholesky()?,
            GpSamplingMethod::EigenValues => {
                let (v, w) = cov.eigh_into()?;
                // eigenvalues are lower bounded to zero out round-off negatives
                let v = v.mapv(|x| {
                    if x < F::cast(1e-9) {
                        return F::zero();
                    }
                    x.sqrt()
                });
                w.dot(&Array2::from_diag(&v))
            }
        };
        let normal = Normal::new(0., 1.).unwrap();
        let ary = Array::random_using((x.nrows(), n_traj), normal, rng).mapv(|v| F::cast(v));
        Ok(c.dot(&ary) + mean.insert_axis(Axis(1)))
    }

    /// Retrieve the covariance function bound to its fixed parameters
    pub fn covariance(&self) -> &Covariance<F, Corr> {
        &self.cov
    }

    /// Inverse correlation length scales, broadcast to the input dimension
    pub fn theta(&self) -> &Array1<F> {
        self.cov.theta()
    }

    /// Process variance
    pub fn variance(&self) -> F {
        self.cov.sigma2()
    }

    /// Diagonal jitter added during factorization, zero when no
    /// regularization was needed
    pub fn jitter(&self) -> F {
        self.jitter
    }

    /// Trend coefficients: the known values for [`Trend::Known`], the
    /// generalized least-squares estimate for [`Trend::Estimated`],
    /// `None` for a zero trend
    pub fn trend_coefficients(&self) -> Option<Array1<F>> {
        self.trend_term
            .beta()
            .map(|beta| beta.column(0).to_owned())
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), 1)
    }
}

#[cfg(feature = "persistent")]
impl<F, Mean, Corr> GaussianProcess<F, Mean, Corr>
where
    F: Float + Serialize + serde::de::DeserializeOwned,
    Mean: RegressionModel<F> + Serialize + serde::de::DeserializeOwned,
    Corr: CorrelationModel<F> + Serialize + serde::de::DeserializeOwned,
{
    /// Save the fitted model as a JSON file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    /// Load a fitted model from a JSON file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file).map_err(GpError::PersistenceError)?)
    }
}

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GaussianProcess<F, Mean, Corr>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: RegressionModel<F>,
    Corr: CorrelationModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

/// Gausssian Process adaptator to implement `linfa::Predict` trait for variance prediction.
pub struct GpVariancePredictor<'a, F, Mean, Corr>(pub &'a GaussianProcess<F, Mean, Corr>)
where
    F: Float,
    Mean: RegressionModel<F>,
    Corr: CorrelationModel<F>;

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GpVariancePredictor<'_, F, Mean, Corr>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: RegressionModel<F>,
    Corr: CorrelationModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.0.predict_var(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, Mean, Corr>
{
    type Object = GaussianProcess<F, Mean, Corr>;

    /// Fit GP model given a training dataset (xi, zi).
    ///
    /// The covariance matrix of the training points is assembled and
    /// factorized once; the trend coefficients (when estimated) and the
    /// kriging weights are computed against that factorization.
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();

        // shape checks come first, before any linear algebra
        if x.nrows() == 0 {
            return Err(GpError::DimensionMismatch(
                "at least one training observation is required".to_string(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(GpError::DimensionMismatch(format!(
                "{} training points for {} output values",
                x.nrows(),
                y.len()
            )));
        }
        let dim = x.ncols();
        let theta = if self.theta().len() == 1 {
            Array1::from_elem(dim, self.theta()[0])
        } else if self.theta().len() == dim {
            self.theta().to_owned()
        } else {
            return Err(GpError::DimensionMismatch(format!(
                "theta has {} components for {}-dimensional training points",
                self.theta().len(),
                dim
            )));
        };
        let cov = Covariance::new(*self.corr(), theta, self.sigma2(), self.nugget());

        let x_distances = DiffMatrix::new(x);
        if x_distances.n_obs > 1 {
            let sums = x_distances
                .d
                .mapv(|v| num_traits::float::Float::abs(v))
                .sum_axis(Axis(1));
            if *sums.min().unwrap() == F::zero() {
                warn!(
                    "multiple x input features have the same value (at least same row twice)"
                );
            }
        }

        let now = Instant::now();
        let k = cov.self_covariance_from(&x_distances);
        let (k_chol, jitter) = cholesky_with_jitter(k, self.sigma2(), self.nugget())?;
        debug!("covariance factorization elapsed = {:?}", now.elapsed());

        let yc = y.to_owned().insert_axis(Axis(1));

        let (trend_term, gamma) = match self.trend() {
            Trend::Estimated => {
                let fx = self.mean().value(x);
                if fx.ncols() > x.nrows() {
                    return Err(GpError::IllConditioned(format!(
                        "trend basis has {} functions for only {} observations",
                        fx.ncols(),
                        x.nrows()
                    )));
                }
                // Solve the generalized least squares problem
                let ft = k_chol.solve_triangular(&fx, UPLO::Lower)?;
                let (ft_qr_q, ft_qr_r) = ft.qr()?.into_decomp();

                // Check whether we have an ill-conditioned problem
                let (_, sv_qr_r, _) = ft_qr_r.svd(false, false)?;
                let cond_ft = sv_qr_r[sv_qr_r.len() - 1] / sv_qr_r[0];
                if cond_ft < F::cast(1e-10) {
                    return Err(GpError::IllConditioned(
                        "trend basis is too ill conditioned. Poor combination \
                        of basis model and observations."
                            .to_string(),
                    ));
                }

                let yt = k_chol.solve_triangular(&yc, UPLO::Lower)?;
                let beta = ft_qr_r.solve_triangular_into(ft_qr_q.t().dot(&yt), UPLO::Upper)?;
                let rho = yt - ft.dot(&beta);
                let gamma = k_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
                (TrendTerm::Estimated { beta, ft, ft_qr_r }, gamma)
            }
            Trend::Known(coeffs) => {
                let fx = self.mean().value(x);
                if coeffs.len() != fx.ncols() {
                    return Err(GpError::DimensionMismatch(format!(
                        "{} trend coefficients for a basis of {} functions",
                        coeffs.len(),
                        fx.ncols()
                    )));
                }
                let beta = coeffs.to_owned().insert_axis(Axis(1));
                let resid = yc - fx.dot(&beta);
                let tmp = k_chol.solve_triangular(&resid, UPLO::Lower)?;
                let gamma = k_chol.t().solve_triangular_into(tmp, UPLO::Upper)?;
                (TrendTerm::Fixed { beta }, gamma)
            }
            Trend::Zero => {
                let tmp = k_chol.solve_triangular(&yc, UPLO::Lower)?;
                let gamma = k_chol.t().solve_triangular_into(tmp, UPLO::Upper)?;
                (TrendTerm::Zero, gamma)
            }
        };

        Ok(GaussianProcess {
            cov,
            trend_term,
            gamma,
            k_chol,
            jitter,
            training_data: (x.to_owned(), y.to_owned()),
            params: self.clone(),
        })
    }
}

/// Cholesky factorization with escalating diagonal regularization.
///
/// Mild ill-conditioning (near-duplicate points, vanishing nugget) is
/// recovered by adding jitter to the diagonal and retrying; each retry is
/// surfaced as a warning. Unrecoverable singularity surfaces as
/// [`GpError::SingularSystem`] with the matrix size and the last jitter tried.
fn cholesky_with_jitter<F: Float>(
    mut k: Array2<F>,
    sigma2: F,
    nugget: F,
) -> Result<(Array2<F>, F)> {
    let n = k.nrows();
    if let Ok(chol) = k.cholesky() {
        return Ok((chol, F::zero()));
    }

    let floor = F::cast(100.0) * F::epsilon();
    let mut jitter = sigma2 * if nugget > floor { nugget } else { floor };
    for _ in 0..GP_JITTER_RETRIES {
        warn!("covariance factorization failed, retrying with diagonal jitter {jitter}");
        let mut diag = k.diag_mut();
        diag += jitter;
        if let Ok(chol) = k.cholesky() {
            return Ok((chol, jitter));
        }
        jitter = jitter * F::cast(100.);
    }
    Err(GpError::SingularSystem {
        n,
        jitter: jitter.to_f64().unwrap_or(f64::NAN),
    })
}
