//! Reconciler error types.

use nodepin_cluster::ClusterError;
use thiserror::Error;

/// Errors a placement request can end with.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The request was rejected before any cluster call was made.
    #[error("invalid placement request: {0}")]
    Validation(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The cluster holds something nodepin cannot converge without an update path.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cluster communication error: {0}")]
    Cluster(#[from] ClusterError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
