//! nodepin.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodepinConfig {
    pub cluster: ClusterConfig,
    pub image: ImageConfig,
    pub placement: PlacementConfig,
    pub container: ContainerConfig,
    pub volumes: Vec<VolumeConfig>,
    pub observer: ObserverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Namespace holding every managed deployment.
    pub namespace: String,
    /// Explicit kubeconfig. When unset the client config is inferred
    /// (in-cluster service account, then `$KUBECONFIG`, then `~/.kube/config`).
    pub kubeconfig: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    pub repository: String,
    pub tag: String,
    /// Use this image for every application instead of deriving one.
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// Node label key owned by nodepin. The value is always the application id.
    pub label_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContainerConfig {
    pub port_name: String,
    pub port: u16,
    pub protocol: String,
    pub privileged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeConfig {
    pub name: String,
    pub host_path: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObserverConfig {
    pub interval_secs: u64,
    pub failure_policy: FailurePolicy,
}

/// What the observer does when a listing call fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the loop and report the error to the daemon.
    #[default]
    Halt,
    /// Log the error and try again on the next tick.
    Continue,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "pi-system".to_string(),
            kubeconfig: None,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: "localhost:5000".to_string(),
            tag: "latest".to_string(),
            fixed: None,
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            label_key: "app".to_string(),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            port_name: "http".to_string(),
            port: 80,
            protocol: "TCP".to_string(),
            privileged: true,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            failure_policy: FailurePolicy::Halt,
        }
    }
}

impl ObserverConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl NodepinConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: NodepinConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.namespace.trim().is_empty() {
            anyhow::bail!("cluster.namespace must not be empty");
        }
        if self.placement.label_key.trim().is_empty() {
            anyhow::bail!("placement.label_key must not be empty");
        }
        if self.image.fixed.is_none() && self.image.repository.trim().is_empty() {
            anyhow::bail!("image.repository must be set unless image.fixed is given");
        }
        for volume in &self.volumes {
            if volume.name.is_empty() || volume.host_path.is_empty() || volume.mount_path.is_empty() {
                anyhow::bail!("volume entries need name, host_path and mount_path");
            }
        }
        Ok(())
    }
}
