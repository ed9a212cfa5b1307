//! Placement spec builder — derives the deployment that pins an application.
//!
//! Pure and deterministic: the same inputs always yield the same spec, and
//! nothing here touches the cluster.

use nodepin_cluster::{
    ContainerSpec, DeploymentSpec, HostPathVolume, Labels, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    PodTemplate,
};

/// Replica count for every pinned workload.
pub const PINNED_REPLICAS: i32 = 1;

const DEPLOYMENT_SUFFIX: &str = "-deployment";

/// Name of the deployment owned by `application_id`.
pub fn deployment_name(application_id: &str) -> String {
    format!("{application_id}{DEPLOYMENT_SUFFIX}")
}

/// How the container image for an application is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// `<repository>/<application-id>:<tag>`
    Derived { repository: String, tag: String },
    /// The same image for every application.
    Fixed(String),
}

impl ImageRef {
    pub fn resolve(&self, application_id: &str) -> String {
        match self {
            ImageRef::Derived { repository, tag } => {
                let repository = repository.trim_end_matches('/');
                format!("{repository}/{application_id}:{tag}")
            }
            ImageRef::Fixed(image) => image.clone(),
        }
    }
}

/// The one label that ties a node to an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementLabel {
    pub key: String,
    pub value: String,
}

impl PlacementLabel {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn as_labels(&self) -> Labels {
        Labels::from([(self.key.clone(), self.value.clone())])
    }
}

/// Build the deployment spec pinning `application_id` to nodes carrying `label`.
///
/// Selector, pod labels and node selector are the same single-entry map.
/// Containers are taken as given, in order; any without an image get the
/// one resolved from `image`. An empty container list still produces a
/// spec, which the platform would reject, so callers validate first.
pub fn build_deployment_spec(
    application_id: &str,
    image: &ImageRef,
    label: &PlacementLabel,
    containers: &[ContainerSpec],
    volumes: &[HostPathVolume],
) -> DeploymentSpec {
    let pinned = label.as_labels();
    let resolved_image = image.resolve(application_id);

    let containers = containers
        .iter()
        .map(|c| ContainerSpec {
            image: Some(c.image.clone().unwrap_or_else(|| resolved_image.clone())),
            ..c.clone()
        })
        .collect();

    let mut labels = pinned.clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    DeploymentSpec {
        name: deployment_name(application_id),
        labels,
        replicas: PINNED_REPLICAS,
        selector: pinned.clone(),
        template: PodTemplate {
            labels: pinned.clone(),
            node_selector: pinned,
            containers,
            volumes: volumes.to_vec(),
        },
    }
}
