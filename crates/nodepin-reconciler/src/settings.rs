//! Fixed placement inputs, resolved once from configuration.

use nodepin_cluster::{ContainerSpec, HostPathVolume, PortSpec, VolumeMount};
use nodepin_core::NodepinConfig;
use nodepin_placement::ImageRef;

/// A container to run for every application.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTemplate {
    /// `None` names the container after the application.
    pub name: Option<String>,
    /// `None` uses the image derived for the application.
    pub image: Option<String>,
    pub ports: Vec<PortSpec>,
    pub privileged: bool,
    pub volume_mounts: Vec<VolumeMount>,
}

/// Everything the reconciler needs that does not come with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSettings {
    pub namespace: String,
    pub image: ImageRef,
    /// Default node label key; requests may override it.
    pub label_key: String,
    pub containers: Vec<ContainerTemplate>,
    pub volumes: Vec<HostPathVolume>,
}

impl PlacementSettings {
    pub fn from_config(config: &NodepinConfig) -> Self {
        let image = match &config.image.fixed {
            Some(fixed) => ImageRef::Fixed(fixed.clone()),
            None => ImageRef::Derived {
                repository: config.image.repository.clone(),
                tag: config.image.tag.clone(),
            },
        };

        let volume_mounts = config
            .volumes
            .iter()
            .map(|v| VolumeMount {
                name: v.name.clone(),
                mount_path: v.mount_path.clone(),
            })
            .collect();

        let volumes = config
            .volumes
            .iter()
            .map(|v| HostPathVolume {
                name: v.name.clone(),
                path: v.host_path.clone(),
            })
            .collect();

        let container = ContainerTemplate {
            name: None,
            image: None,
            ports: vec![PortSpec {
                name: config.container.port_name.clone(),
                container_port: i32::from(config.container.port),
                protocol: config.container.protocol.clone(),
            }],
            privileged: config.container.privileged,
            volume_mounts,
        };

        Self {
            namespace: config.cluster.namespace.clone(),
            image,
            label_key: config.placement.label_key.clone(),
            containers: vec![container],
            volumes,
        }
    }

    /// Concrete container specs for `application_id`.
    pub fn containers_for(&self, application_id: &str) -> Vec<ContainerSpec> {
        self.containers
            .iter()
            .map(|t| ContainerSpec {
                name: t.name.clone().unwrap_or_else(|| application_id.to_string()),
                image: t.image.clone(),
                ports: t.ports.clone(),
                privileged: t.privileged,
                volume_mounts: t.volume_mounts.clone(),
            })
            .collect()
    }
}
