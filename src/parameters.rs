use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::mean_models::RegressionModel;
use linfa::{Float, ParamGuard};

use ndarray::{Array1, array};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// How the trend (mean) term of the model is obtained.
///
/// The basis functions themselves are given by the
/// [`RegressionModel`](crate::mean_models::RegressionModel); this tag says
/// whether their coefficients are zero, known, or estimated from the data.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Trend<F: Float> {
    /// Zero prior mean: simple kriging on the raw observations
    Zero,
    /// Known coefficients: simple kriging on the residuals
    /// `zi - basis(xi) . coeffs`
    Known(Array1<F>),
    /// Coefficients estimated by generalized least squares jointly with the
    /// prediction: ordinary kriging (constant basis) or universal kriging
    Estimated,
}

impl<F: Float> Default for Trend<F> {
    fn default() -> Self {
        Trend::Estimated
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Mean: Serialize, Corr: Serialize",
        deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, Corr: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> {
    /// Basis model representing the mean term
    pub(crate) mean: Mean,
    /// Correlation model representing the spatial correlation between errors at e(x) and e(x')
    pub(crate) corr: Corr,
    /// How the trend coefficients are obtained
    pub(crate) trend: Trend<F>,
    /// Inverse correlation length scales, either one per input component or a
    /// single value broadcast over all components at fit time
    pub(crate) theta: Array1<F>,
    /// Process variance
    pub(crate) sigma2: F,
    /// Relative diagonal term to improve numerical stability
    pub(crate) nugget: F,
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> Default
    for GpValidParams<F, Mean, Corr>
{
    fn default() -> GpValidParams<F, Mean, Corr> {
        GpValidParams {
            mean: Mean::default(),
            corr: Corr::default(),
            trend: Trend::default(),
            theta: array![F::one()],
            sigma2: F::one(),
            nugget: F::cast(100.0) * F::epsilon(),
        }
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> GpValidParams<F, Mean, Corr> {
    /// Get mean basis model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get correlation model k(x, x')
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Get trend specification
    pub fn trend(&self) -> &Trend<F> {
        &self.trend
    }

    /// Get inverse length scales
    pub fn theta(&self) -> &Array1<F> {
        &self.theta
    }

    /// Get process variance
    pub fn sigma2(&self) -> F {
        self.sigma2
    }

    /// Get nugget value
    pub fn nugget(&self) -> F {
        self.nugget
    }
}

#[derive(Clone, Debug)]
/// The set of parameters configuring a [GP model](crate::GaussianProcess) fit.
///
/// All covariance parameters are fixed values chosen by the caller; nothing
/// is estimated from the data except, for [`Trend::Estimated`], the trend
/// coefficients.
pub struct GpParams<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>>(
    pub(crate) GpValidParams<F, Mean, Corr>,
);

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> GpParams<F, Mean, Corr> {
    /// A constructor for GP parameters given mean and correlation models
    pub fn new(mean: Mean, corr: Corr) -> GpParams<F, Mean, Corr> {
        Self(GpValidParams {
            mean,
            corr,
            ..Default::default()
        })
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, Mean, Corr>) -> Self {
        Self(params.clone())
    }

    /// Set mean basis model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set correlation model.
    pub fn corr(mut self, corr: Corr) -> Self {
        self.0.corr = corr;
        self
    }

    /// Set trend specification.
    pub fn trend(mut self, trend: Trend<F>) -> Self {
        self.0.trend = trend;
        self
    }

    /// Set inverse correlation length scales.
    ///
    /// A single value is broadcast over all input components at fit time.
    pub fn theta(mut self, theta: Array1<F>) -> Self {
        self.0.theta = theta;
        self
    }

    /// Set process variance.
    pub fn sigma2(mut self, sigma2: F) -> Self {
        self.0.sigma2 = sigma2;
        self
    }

    /// Set nugget.
    ///
    /// Nugget is relative to `sigma2` and is used to improve numerical stability.
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>>
    From<GpValidParams<F, Mean, Corr>> for GpParams<F, Mean, Corr>
{
    fn from(valid: GpValidParams<F, Mean, Corr>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, Mean: RegressionModel<F>, Corr: CorrelationModel<F>> ParamGuard
    for GpParams<F, Mean, Corr>
{
    type Checked = GpValidParams<F, Mean, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.sigma2 > F::zero() && self.0.sigma2.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "`sigma2` must be positive and finite, got {}",
                self.0.sigma2
            )));
        }
        if !(self.0.nugget >= F::zero() && self.0.nugget.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "`nugget` must be non-negative and finite, got {}",
                self.0.nugget
            )));
        }
        if self.0.theta.is_empty() {
            return Err(GpError::InvalidValueError(
                "`theta` cannot be empty".to_string(),
            ));
        }
        for v in self.0.theta.iter() {
            if !(*v > F::zero() && v.is_finite()) {
                return Err(GpError::InvalidValueError(format!(
                    "`theta` values must be positive and finite, got {v}"
                )));
            }
        }
        if let Trend::Known(coeffs) = &self.0.trend {
            for v in coeffs.iter() {
                if !v.is_finite() {
                    return Err(GpError::InvalidValueError(format!(
                        "known trend coefficients must be finite, got {v}"
                    )));
                }
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
