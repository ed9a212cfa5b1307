//! Node labeler — adds or removes one label on a named node.
//!
//! Each call lists nodes, picks the exact (case-sensitive) name match,
//! edits its label map and writes the node back. Only the requested key is
//! touched; every other label is written back as it was read.
//!
//! A node missing from the listing is reported as [`LabelChange::NodeNotFound`]
//! rather than an error: there is nothing to undo on a node that does not
//! exist. Read-then-write is not transactional. The Kubernetes handle turns a
//! concurrent edit into a conflict error; callers that need stronger
//! guarantees serialize per node.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nodepin_cluster::{ClusterHandle, ClusterResult, NodeInfo};

/// What a label operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelChange {
    /// The node was written.
    Applied,
    /// The node already had the desired shape; nothing was written.
    Unchanged,
    /// No node with that name exists; nothing was written.
    NodeNotFound,
    /// The key already holds a different value; nothing was written.
    HeldByOther,
}

/// Labels nodes through a shared cluster handle.
#[derive(Clone)]
pub struct NodeLabeler {
    cluster: Arc<dyn ClusterHandle>,
}

impl NodeLabeler {
    pub fn new(cluster: Arc<dyn ClusterHandle>) -> Self {
        Self { cluster }
    }

    async fn find_node(&self, node_name: &str) -> ClusterResult<Option<NodeInfo>> {
        let nodes = self.cluster.list_nodes().await?;
        Ok(nodes.into_iter().find(|n| n.name == node_name))
    }

    /// Set `key=value` on `node_name`.
    ///
    /// A key already set to another value is left as it is and reported as
    /// [`LabelChange::HeldByOther`]; that value pins a different workload.
    pub async fn set_node_label(
        &self,
        node_name: &str,
        key: &str,
        value: &str,
    ) -> ClusterResult<LabelChange> {
        let Some(mut node) = self.find_node(node_name).await? else {
            debug!(node = %node_name, %key, "node not found, label not set");
            return Ok(LabelChange::NodeNotFound);
        };

        match node.labels.get(key) {
            Some(current) if current == value => return Ok(LabelChange::Unchanged),
            Some(current) => {
                warn!(node = %node_name, %key, held = %current, %value, "label held by another value, not replaced");
                return Ok(LabelChange::HeldByOther);
            }
            None => {}
        }

        node.labels.insert(key.to_string(), value.to_string());
        self.cluster.update_node(&node).await?;
        info!(node = %node_name, %key, %value, "node labeled");
        Ok(LabelChange::Applied)
    }

    /// Remove `key` from `node_name`, whatever its value.
    pub async fn clear_node_label(&self, node_name: &str, key: &str) -> ClusterResult<LabelChange> {
        self.remove_if(node_name, key, |_| true).await
    }

    /// Remove `key` from `node_name` only if it is currently set to `value`.
    ///
    /// Used on teardown so that releasing one application never strips the
    /// label another application placed under the same key.
    pub async fn release_node_label(
        &self,
        node_name: &str,
        key: &str,
        value: &str,
    ) -> ClusterResult<LabelChange> {
        self.remove_if(node_name, key, |current| current == value).await
    }

    async fn remove_if(
        &self,
        node_name: &str,
        key: &str,
        owned: impl Fn(&str) -> bool,
    ) -> ClusterResult<LabelChange> {
        let Some(mut node) = self.find_node(node_name).await? else {
            debug!(node = %node_name, %key, "node not found, nothing to clear");
            return Ok(LabelChange::NodeNotFound);
        };

        match node.labels.get(key) {
            None => return Ok(LabelChange::Unchanged),
            Some(current) if !owned(current.as_str()) => {
                debug!(node = %node_name, %key, %current, "label held by another value, left in place");
                return Ok(LabelChange::Unchanged);
            }
            Some(_) => {}
        }

        node.labels.remove(key);
        self.cluster.update_node(&node).await?;
        info!(node = %node_name, %key, "node label removed");
        Ok(LabelChange::Applied)
    }
}
