//! Error types for the TPC-C connector

use thiserror::Error;

/// Core error type for connector operations
#[derive(Error, Debug)]
pub enum TpccError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No database connection available")]
    NoConnection,

    #[error("Query error: {message}")]
    Query {
        /// Backend diagnostic
        message: String,
        /// Statement text that failed
        statement: String,
        /// Rendered positional parameters
        params: Vec<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TpccError {
    /// Build a query error carrying the statement and its parameters.
    pub fn query(
        message: impl Into<String>,
        statement: &str,
        params: &[crate::Value],
    ) -> Self {
        TpccError::Query {
            message: message.into(),
            statement: statement.trim().to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Query error that is not tied to a particular statement (COMMIT, ROLLBACK, ...)
    pub fn session(message: impl Into<String>) -> Self {
        TpccError::Query {
            message: message.into(),
            statement: String::new(),
            params: Vec::new(),
        }
    }

    /// Statement text attached to a query error, if any.
    pub fn statement(&self) -> Option<&str> {
        match self {
            TpccError::Query { statement, .. } if !statement.is_empty() => Some(statement),
            _ => None,
        }
    }

    /// Rendered parameters attached to a query error.
    pub fn params(&self) -> &[String] {
        match self {
            TpccError::Query { params, .. } => params,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TpccError::NotFound(_))
    }
}

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, TpccError>;
