//! Type conversions between nodepin domain types and `k8s-openapi` objects.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec as K8sDeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HostPathVolumeSource, Node, Pod, PodSpec, PodTemplateSpec,
    SecurityContext, Volume, VolumeMount as K8sVolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::types::*;

fn non_empty(labels: &Labels) -> Option<Labels> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.clone())
    }
}

/// Convert a Kubernetes [`Node`] to a [`NodeInfo`].
pub fn node_from_k8s(node: &Node) -> NodeInfo {
    NodeInfo {
        name: node.metadata.name.clone().unwrap_or_default(),
        labels: node.metadata.labels.clone().unwrap_or_default(),
        resource_version: node.metadata.resource_version.clone(),
    }
}

/// Convert a Kubernetes [`Pod`] to a [`PodInfo`].
pub fn pod_from_k8s(pod: &Pod) -> PodInfo {
    PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
    }
}

/// Convert a Kubernetes [`Deployment`] to a [`DeploymentInfo`].
pub fn deployment_from_k8s(deployment: &Deployment) -> DeploymentInfo {
    let spec = deployment.spec.as_ref();
    DeploymentInfo {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        labels: deployment.metadata.labels.clone().unwrap_or_default(),
        // The API server defaults an unset replica count to 1.
        replicas: spec.and_then(|s| s.replicas).unwrap_or(1),
        ready_replicas: deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0),
        selector: spec
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default(),
        node_selector: spec
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.node_selector.clone())
            .unwrap_or_default(),
    }
}

fn container_to_k8s(container: &ContainerSpec) -> Container {
    Container {
        name: container.name.clone(),
        image: container.image.clone(),
        ports: Some(
            container
                .ports
                .iter()
                .map(|p| ContainerPort {
                    name: Some(p.name.clone()),
                    container_port: p.container_port,
                    protocol: Some(p.protocol.clone()),
                    ..Default::default()
                })
                .collect(),
        )
        .filter(|ports: &Vec<ContainerPort>| !ports.is_empty()),
        security_context: container.privileged.then(|| SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(
            container
                .volume_mounts
                .iter()
                .map(|m| K8sVolumeMount {
                    name: m.name.clone(),
                    mount_path: m.mount_path.clone(),
                    ..Default::default()
                })
                .collect(),
        )
        .filter(|mounts: &Vec<K8sVolumeMount>| !mounts.is_empty()),
        ..Default::default()
    }
}

fn volume_to_k8s(volume: &HostPathVolume) -> Volume {
    Volume {
        name: volume.name.clone(),
        host_path: Some(HostPathVolumeSource {
            path: volume.path.clone(),
            type_: None,
        }),
        ..Default::default()
    }
}

/// Convert a [`DeploymentSpec`] to a Kubernetes [`Deployment`] in `namespace`.
pub fn deployment_to_k8s(namespace: &str, spec: &DeploymentSpec) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: non_empty(&spec.labels),
            ..Default::default()
        },
        spec: Some(K8sDeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(spec.selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(spec.template.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: spec.template.containers.iter().map(container_to_k8s).collect(),
                    node_selector: non_empty(&spec.template.node_selector),
                    volumes: Some(spec.template.volumes.iter().map(volume_to_k8s).collect())
                        .filter(|v: &Vec<Volume>| !v.is_empty()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
