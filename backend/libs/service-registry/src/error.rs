use murmur_common::ServiceError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("invalid registration: {0}")]
    Validation(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(msg) => ServiceError::NotFound(msg),
            RegistryError::Validation(msg) => ServiceError::Validation(msg),
            RegistryError::Unavailable(msg) => ServiceError::ServiceUnavailable(msg),
        }
    }
}
