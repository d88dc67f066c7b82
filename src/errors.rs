use thiserror::Error;

/// A result type for GP regression operations
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using a [`GaussianProcess`](crate::GaussianProcess)
/// or a [`SparseGaussianProcess`](crate::SparseGaussianProcess) engine
#[derive(Error, Debug)]
pub enum GpError {
    /// When the engine configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// When prediction is requested from an engine that was never trained
    #[error("Model is not trained, train() must be called first")]
    NotTrained,
    /// When a required matrix inversion fails
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),
    /// When input/output shapes are inconsistent
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
