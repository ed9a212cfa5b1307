//! Cluster communication errors.

use thiserror::Error;

/// Result type alias for cluster handle operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised by any list/get/create/update/delete call.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("client configuration error: {0}")]
    Config(String),
}
