//! Domain types exchanged with the cluster handle.
//!
//! These mirror the small subset of Kubernetes objects nodepin reads and
//! writes. Label maps are `BTreeMap`s so equality and rendering are
//! deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key → value.
pub type Labels = BTreeMap<String, String>;

/// Label set on every deployment nodepin creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "nodepin";

// ── Node ──────────────────────────────────────────────────────────

/// A cluster node as seen by nodepin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: Labels,
    /// Version observed when the node was listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl NodeInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: Labels::new(),
            resource_version: None,
        }
    }

    /// True if every entry of `selector` is present on this node.
    pub fn matches(&self, selector: &Labels) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|nv| nv == v))
    }
}

// ── Pod ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInfo {
    pub name: String,
    /// Node the pod is bound to, if scheduled.
    pub node_name: Option<String>,
    pub phase: Option<String>,
}

// ── Deployment ────────────────────────────────────────────────────

/// Desired deployment, as produced by the placement spec builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSpec {
    pub name: String,
    /// Metadata labels on the deployment object itself.
    pub labels: Labels,
    pub replicas: i32,
    /// Label selector; always equal to `template.labels`.
    pub selector: Labels,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodTemplate {
    pub labels: Labels,
    pub node_selector: Labels,
    pub containers: Vec<ContainerSpec>,
    pub volumes: Vec<HostPathVolume>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    /// `None` means "use the image derived for the application".
    pub image: Option<String>,
    pub ports: Vec<PortSpec>,
    pub privileged: bool,
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub container_port: i32,
    /// "TCP", "UDP" or "SCTP".
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// A volume exposing a path of the host node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostPathVolume {
    pub name: String,
    pub path: String,
}

/// Deployment as observed in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentInfo {
    pub name: String,
    pub labels: Labels,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub selector: Labels,
    pub node_selector: Labels,
}

impl DeploymentInfo {
    /// True if nodepin created this deployment.
    pub fn is_managed(&self) -> bool {
        self.labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE)
    }
}

impl From<&DeploymentSpec> for DeploymentInfo {
    fn from(spec: &DeploymentSpec) -> Self {
        Self {
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            replicas: spec.replicas,
            ready_replicas: 0,
            selector: spec.selector.clone(),
            node_selector: spec.template.node_selector.clone(),
        }
    }
}
