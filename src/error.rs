use thiserror::Error;

/// Result alias used by the likelihood kernel.
pub type Result<T> = std::result::Result<T, LikelihoodError>;

/// Errors raised by the likelihood kernel.
///
/// Configuration-time variants ([LikelihoodError::SingularCovariance],
/// [LikelihoodError::InvalidCovariance], [LikelihoodError::DimensionMismatch],
/// [LikelihoodError::InvalidData] and [LikelihoodError::InvalidSettings]) are
/// fatal and surface once, while loading. Evaluation-time variants
/// ([LikelihoodError::InvalidParameter] and
/// [LikelihoodError::MissingParameter]) never reach a sampler: the
/// [Likelihood](crate::likelihood::Likelihood) maps them to a log-likelihood of
/// negative infinity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LikelihoodError {
    #[error("covariance matrix is not positive definite (Cholesky decomposition failed at pivot {pivot})")]
    SingularCovariance { pivot: usize },
    #[error("invalid covariance matrix: {0}")]
    InvalidCovariance(String),
    #[error("dimension mismatch: {what} has {found} entries, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("parameter {name} = {value} is outside the physical domain: {reason}")]
    InvalidParameter {
        name: String,
        value: f64,
        reason: &'static str,
    },
    #[error("parameter {0} is required but was not provided")]
    MissingParameter(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl LikelihoodError {
    pub(crate) fn invalid(name: &str, value: f64, reason: &'static str) -> Self {
        LikelihoodError::InvalidParameter {
            name: name.to_string(),
            value,
            reason,
        }
    }

    /// Whether the error is a property of the evaluated parameter vector rather than of the loaded data
    pub fn is_evaluation_error(&self) -> bool {
        matches!(
            self,
            LikelihoodError::InvalidParameter { .. } | LikelihoodError::MissingParameter(_)
        )
    }
}
