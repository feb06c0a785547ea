use thiserror::Error;

/// Failure taxonomy shared by the query facade and sample ingestion.
///
/// Every variant is reported to the caller inside a `success = false`
/// envelope; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),

    /// Connectivity or constraint failures from the store. The inner error is
    /// logged, never shown to callers.
    #[error("storage failure")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for ServiceError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Message safe to hand to the presentation layer.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Storage(_) => {
                "The request could not be completed, please try again".to_owned()
            }
            other => other.to_string(),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
