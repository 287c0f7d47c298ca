use thiserror::Error;

/// A result type for GP prediction computations
pub type Result<T> = std::result::Result<T, GpError>;

/// An error raised when building or using a [`GaussianProcess`](crate::GaussianProcess) model
#[derive(Error, Debug)]
pub enum GpError {
    /// When input/output lengths or point dimensionalities disagree.
    /// Detected before any linear algebra is attempted.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When the covariance system cannot be factorized even after
    /// regularization of its diagonal
    #[error("Singular covariance system of size {n}, last jitter tried {jitter} (duplicate or near-duplicate training points?)")]
    SingularSystem {
        /// Size of the covariance matrix
        n: usize,
        /// Last diagonal jitter attempted before giving up
        jitter: f64,
    },
    /// When the trend basis is too ill-conditioned to estimate coefficients
    #[error("Ill-conditioned system: {0}")]
    IllConditioned(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error due to a bad parameter value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When a model cannot be saved or loaded
    #[cfg(feature = "persistent")]
    #[error("Persistence error: {0}")]
    PersistenceError(#[from] serde_json::Error),
    /// When a model file cannot be read or written
    #[cfg(feature = "persistent")]
    #[error("Persistence IO error")]
    IoError(#[from] std::io::Error),
}
