use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] crate::broadcaster::BroadcastError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    /// 领域错误的便捷访问，供上层做 1:1 映射。
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ApplicationError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
