//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! interpolation also known as [Kriging](https://en.wikipedia.org/wiki/Kriging)
//! prediction, for models whose covariance parameters are known and fixed.
//!
//! Given a small set of noiseless observations, a stationary correlation
//! kernel with its variance scale and length scales, and a trend
//! specification, the library computes the posterior predictive mean and
//! variance of the process at arbitrary target points. The trend can be
//! zero or known (simple kriging) or estimated from the data by generalized
//! least squares (ordinary/universal kriging, see [Trend]).
//!
//! No hyperparameter estimation is performed: a model is immutable once
//! fitted and a new one is created to change parameters. The cost of a fit is
//! dominated by the factorization of the training covariance matrix, O(n^3)
//! in time and O(n^2) in memory for n training points.
//!
//! GP models are implemented by [GaussianProcess] parameterized by [GpParams].
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod correlation_models;
mod covariance;
mod errors;
pub mod mean_models;
pub mod metrics;

mod parameters;
mod utils;

pub use algorithm::*;
pub use covariance::Covariance;
pub use errors::*;
pub use parameters::*;
pub use utils::DiffMatrix;
