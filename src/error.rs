//! Error types for the davetjet application layer.

use crate::tasks::CatalogError;

/// Top-level error type for the task engine and its surroundings.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persistent key-value storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Task catalog failed validation.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Transport setup error.
    #[error("transport error: {0}")]
    Transport(#[from] davetjet_transport::TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AppError>;
