//! The cluster handle contract.

use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::types::{DeploymentInfo, DeploymentSpec, NodeInfo, PodInfo};

/// Read/write access to the cluster control plane.
///
/// Constructed once at startup and shared (`Arc<dyn ClusterHandle>`)
/// between the reconciler and the observer.
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// List every node in the cluster.
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>>;

    /// Write back a node's label set.
    ///
    /// `node.resource_version`, when present, is the version the caller
    /// read; implementations that support it reject stale writes with
    /// [`ClusterError::Conflict`](crate::ClusterError::Conflict).
    async fn update_node(&self, node: &NodeInfo) -> ClusterResult<()>;

    /// List deployments in a namespace.
    async fn list_deployments(&self, namespace: &str) -> ClusterResult<Vec<DeploymentInfo>>;

    /// Create a deployment. Fails with `AlreadyExists` on a name collision.
    async fn create_deployment(&self, namespace: &str, spec: &DeploymentSpec) -> ClusterResult<()>;

    /// Delete a deployment with foreground propagation.
    ///
    /// Returns `false` if the deployment did not exist.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> ClusterResult<bool>;

    /// List pods in a namespace.
    async fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodInfo>>;
}
