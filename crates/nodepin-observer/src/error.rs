//! Observer error types.

use nodepin_cluster::ClusterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    /// A listing call failed under the `halt` policy.
    #[error("cluster observation failed: {0}")]
    Cluster(#[from] ClusterError),
}

pub type ObserverResult<T> = Result<T, ObserverError>;
