//! InMemoryCluster — an in-process stand-in for the control plane.
//!
//! Holds nodes, deployments and pods in plain maps behind a mutex. Creating
//! a deployment also "schedules" its pods onto the first node matching the
//! pod template's node selector, so observers see a realistic picture.
//!
//! Every operation yields to the runtime before touching state, which lets
//! tests interleave concurrent callers between a read and a write. Faults
//! can be injected per [`Operation`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::handle::ClusterHandle;
use crate::types::*;

/// Handle operations, for fault injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListNodes,
    UpdateNode,
    ListDeployments,
    CreateDeployment,
    DeleteDeployment,
    ListPods,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, NodeInfo>,
    /// (namespace, name) → spec.
    deployments: BTreeMap<(String, String), DeploymentSpec>,
    /// (namespace, name) → pod.
    pods: BTreeMap<(String, String), PodInfo>,
    faults: HashSet<Operation>,
    calls: Vec<Operation>,
    version: u64,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn enter(&mut self, op: Operation) -> ClusterResult<()> {
        self.calls.push(op);
        if self.faults.contains(&op) {
            return Err(ClusterError::Transport(format!("injected fault on {op:?}")));
        }
        Ok(())
    }
}

/// Thread-safe fake cluster. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cluster with unlabeled nodes of the given names.
    pub fn with_nodes(names: &[&str]) -> Self {
        let cluster = Self::new();
        for name in names {
            cluster.add_node(name, Labels::new());
        }
        cluster
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge every other assertion.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_node(&self, name: &str, labels: Labels) {
        let mut inner = self.lock();
        let version = inner.next_version();
        inner.nodes.insert(
            name.to_string(),
            NodeInfo {
                name: name.to_string(),
                labels,
                resource_version: Some(version),
            },
        );
    }

    pub fn remove_node(&self, name: &str) {
        self.lock().nodes.remove(name);
    }

    pub fn node(&self, name: &str) -> Option<NodeInfo> {
        self.lock().nodes.get(name).cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<DeploymentSpec> {
        self.lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployments(&self, namespace: &str) -> Vec<DeploymentSpec> {
        self.lock()
            .deployments
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, spec)| spec.clone())
            .collect()
    }

    /// Insert a deployment directly, bypassing the handle (no pods, no accounting).
    pub fn insert_deployment(&self, namespace: &str, spec: DeploymentSpec) {
        self.lock()
            .deployments
            .insert((namespace.to_string(), spec.name.clone()), spec);
    }

    pub fn add_pod(&self, namespace: &str, pod: PodInfo) {
        self.lock()
            .pods
            .insert((namespace.to_string(), pod.name.clone()), pod);
    }

    /// Make every subsequent call of `op` fail with a transport error.
    pub fn fail(&self, op: Operation) {
        self.lock().faults.insert(op);
    }

    pub fn heal(&self, op: Operation) {
        self.lock().faults.remove(&op);
    }

    /// Every handle call made so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }
}

#[async_trait]
impl ClusterHandle for InMemoryCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::ListNodes)?;
        Ok(inner.nodes.values().cloned().collect())
    }

    async fn update_node(&self, node: &NodeInfo) -> ClusterResult<()> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::UpdateNode)?;
        if !inner.nodes.contains_key(&node.name) {
            return Err(ClusterError::NotFound(format!("node {}", node.name)));
        }
        let version = inner.next_version();
        let mut stored = node.clone();
        stored.resource_version = Some(version);
        inner.nodes.insert(node.name.clone(), stored);
        debug!(node = %node.name, "node updated");
        Ok(())
    }

    async fn list_deployments(&self, namespace: &str) -> ClusterResult<Vec<DeploymentInfo>> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::ListDeployments)?;
        Ok(inner
            .deployments
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, spec)| DeploymentInfo::from(spec))
            .collect())
    }

    async fn create_deployment(&self, namespace: &str, spec: &DeploymentSpec) -> ClusterResult<()> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::CreateDeployment)?;

        let key = (namespace.to_string(), spec.name.clone());
        if inner.deployments.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "deployment {namespace}/{}",
                spec.name
            )));
        }

        let target = inner
            .nodes
            .values()
            .find(|n| n.matches(&spec.template.node_selector))
            .map(|n| n.name.clone());
        for i in 0..spec.replicas.max(0) {
            let pod = PodInfo {
                name: format!("{}-{i}", spec.name),
                phase: Some(if target.is_some() { "Running" } else { "Pending" }.to_string()),
                node_name: target.clone(),
            };
            inner.pods.insert((namespace.to_string(), pod.name.clone()), pod);
        }

        inner.deployments.insert(key, spec.clone());
        debug!(%namespace, name = %spec.name, node = ?target, "deployment created");
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::DeleteDeployment)?;

        // Foreground propagation: dependents go first.
        let prefix = format!("{name}-");
        inner
            .pods
            .retain(|(ns, pod), _| !(ns == namespace && pod.starts_with(&prefix)));

        let existed = inner
            .deployments
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some();
        debug!(%namespace, %name, existed, "deployment deleted");
        Ok(existed)
    }

    async fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodInfo>> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        inner.enter(Operation::ListPods)?;
        Ok(inner
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }
}
