//! Error types
//!
//! Internal error taxonomy for the audit subsystem. Producers never see
//! these: the public surface converts storage failures into boolean/empty
//! returns and delivery failures into per-endpoint statistics.

use thiserror::Error;

/// Result type alias using the audit error
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for the audit subsystem
#[derive(Debug, Error)]
pub enum AuditError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Embedded store error (open, insert, query, rotation)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Delivery to a SIEM endpoint failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Endpoint configuration is unusable (missing URL, host, or port)
    #[error("Endpoint configuration: {0}")]
    Endpoint(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<figment::Error> for AuditError {
    fn from(err: figment::Error) -> Self {
        AuditError::Config(Box::new(err))
    }
}

impl From<libsql::Error> for AuditError {
    fn from(err: libsql::Error) -> Self {
        AuditError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::Delivery(err.to_string())
    }
}
