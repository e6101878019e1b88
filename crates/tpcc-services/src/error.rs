use thiserror::Error;
use tpcc_core::TpccError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Database(#[from] TpccError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::NotFound(_) => true,
            ServiceError::Database(e) => e.is_not_found(),
            ServiceError::InvalidInput(_) => false,
        }
    }
}
