//! KubeCluster — the production [`ClusterHandle`] over `kube::Client`.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::convert::{deployment_from_k8s, deployment_to_k8s, node_from_k8s, pod_from_k8s};
use crate::error::{ClusterError, ClusterResult};
use crate::handle::ClusterHandle;
use crate::types::*;

/// Map a `kube::Error` to a [`ClusterError`], naming the object involved.
fn map_kube_error(err: kube::Error, what: &str) -> ClusterError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound(what.to_string()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            ClusterError::AlreadyExists(what.to_string())
        }
        kube::Error::Api(ae) if ae.code == 409 => {
            ClusterError::Conflict(format!("{what}: {}", ae.message))
        }
        kube::Error::Api(ae) => ClusterError::Api {
            code: ae.code,
            message: ae.message,
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

/// Kubernetes-backed cluster handle.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or infer one.
    ///
    /// Inference tries the in-cluster service account first, then
    /// `$KUBECONFIG` and `~/.kube/config`.
    pub async fn connect(kubeconfig: Option<&Path>) -> ClusterResult<Self> {
        let config = match kubeconfig {
            Some(path) => {
                info!(?path, "using kubeconfig file");
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| ClusterError::Config(e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?
            }
            None => {
                info!("inferring cluster client configuration");
                Config::infer()
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?
            }
        };
        let client = Client::try_from(config).map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterHandle for KubeCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, "nodes"))?;
        Ok(nodes.items.iter().map(node_from_k8s).collect())
    }

    async fn update_node(&self, node: &NodeInfo) -> ClusterResult<()> {
        let what = format!("node {}", node.name);
        let api: Api<Node> = Api::all(self.client.clone());
        let mut current = api
            .get(&node.name)
            .await
            .map_err(|e| map_kube_error(e, &what))?;

        // Pin the write to the version the caller read so a label change
        // made in between is rejected instead of overwritten.
        if node.resource_version.is_some() {
            current.metadata.resource_version = node.resource_version.clone();
        }
        current.metadata.labels = Some(node.labels.clone());

        api.replace(&node.name, &PostParams::default(), &current)
            .await
            .map_err(|e| map_kube_error(e, &what))?;
        debug!(node = %node.name, "node labels replaced");
        Ok(())
    }

    async fn list_deployments(&self, namespace: &str) -> ClusterResult<Vec<DeploymentInfo>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployments = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, &format!("deployments in {namespace}")))?;
        Ok(deployments.items.iter().map(deployment_from_k8s).collect())
    }

    async fn create_deployment(&self, namespace: &str, spec: &DeploymentSpec) -> ClusterResult<()> {
        let what = format!("deployment {namespace}/{}", spec.name);
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployment_to_k8s(namespace, spec);
        api.create(&PostParams::default(), &deployment)
            .await
            .map_err(|e| map_kube_error(e, &what))?;
        debug!(%namespace, name = %spec.name, "deployment created");
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        let what = format!("deployment {namespace}/{name}");
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => {
                debug!(%namespace, %name, "deployment deletion accepted");
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(map_kube_error(e, &what)),
        }
    }

    async fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodInfo>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, &format!("pods in {namespace}")))?;
        Ok(pods.items.iter().map(pod_from_k8s).collect())
    }
}
