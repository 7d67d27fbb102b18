//! Error types for pgkit

use thiserror::Error;

/// Result type alias for pgkit operations
pub type KitResult<T> = Result<T, KitError>;

/// Errors raised while talking to the database or preparing a connection.
#[derive(Debug, Error)]
pub enum KitError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Refused to run a statement that would be unsafe or meaningless
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection string could not be parsed
    #[error("error parsing DSN: {0}")]
    Dsn(#[from] DsnError),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

/// Reasons a `key=value` connection string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsnError {
    #[error("DSN is empty")]
    Empty,

    /// No `key=value` pair could be read from the string.
    #[error("DSN is invalid")]
    Invalid,

    #[error("invalid host: {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unsupported sslmode: {0}")]
    InvalidSslMode(String),
}

impl KitError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error came from the connection string
    pub fn is_dsn(&self) -> bool {
        matches!(self, Self::Dsn(_))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for KitError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
