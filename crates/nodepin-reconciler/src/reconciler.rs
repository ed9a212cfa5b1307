//! Reconciler — the present/absent state machine for one (application, node) pair.
//!
//! ```text
//!            present: label node, create deployment
//!   Absent ───────────────────────────────────────► Present
//!     ▲  ◄───────────────────────────────────────   │
//!     │    absent: release label, delete (foreground)│
//!     └─ absent: no-op            present: no-op ───┘
//! ```
//!
//! Every call validates its input before touching the cluster, then holds the
//! application lock followed by the node lock for its whole duration.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use nodepin_cluster::{ClusterError, ClusterHandle, DeploymentInfo};
use nodepin_placement::{
    LabelChange, NodeLabeler, PlacementLabel, build_deployment_spec, deployment_name,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::locks::KeyedLocks;
use crate::request::{PlacementOutcome, PlacementReport, PlacementRequest};
use crate::settings::PlacementSettings;

/// Longest DNS-1123 label; the application id is used as one.
const MAX_APPLICATION_LEN: usize = 63;

/// Drives deployment existence toward the requested state.
pub struct Reconciler {
    cluster: Arc<dyn ClusterHandle>,
    labeler: NodeLabeler,
    settings: PlacementSettings,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterHandle>, settings: PlacementSettings) -> Self {
        Self {
            labeler: NodeLabeler::new(cluster.clone()),
            cluster,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    pub fn settings(&self) -> &PlacementSettings {
        &self.settings
    }

    /// Pin `application` to `node`.
    pub async fn request_present(
        &self,
        application: &str,
        node: &str,
    ) -> ReconcileResult<PlacementReport> {
        self.reconcile(&PlacementRequest::present(application, node)).await
    }

    /// Remove `application` from `node`.
    pub async fn request_absent(
        &self,
        application: &str,
        node: &str,
    ) -> ReconcileResult<PlacementReport> {
        self.reconcile(&PlacementRequest::absent(application, node)).await
    }

    /// Bring the cluster in line with `request`.
    pub async fn reconcile(&self, request: &PlacementRequest) -> ReconcileResult<PlacementReport> {
        let label = self.validate(request)?;
        let deployment = deployment_name(&request.application);

        let _application_guard = self.locks.lock(&format!("app/{}", request.application)).await;
        let _node_guard = self.locks.lock(&format!("node/{}", request.node)).await;

        debug!(
            application = %request.application,
            node = %request.node,
            present = request.present,
            "reconciling placement"
        );

        let outcome = if request.present {
            self.ensure_present(request, &label, &deployment).await?
        } else {
            self.ensure_absent(request, &label, &deployment).await?
        };

        info!(
            application = %request.application,
            node = %request.node,
            ?outcome,
            "placement reconciled"
        );

        Ok(PlacementReport {
            application: request.application.clone(),
            node: request.node.clone(),
            deployment,
            outcome,
        })
    }

    fn validate(&self, request: &PlacementRequest) -> ReconcileResult<PlacementLabel> {
        validate_application(&request.application)?;

        if request.node.trim().is_empty() {
            return Err(ReconcileError::Validation("node name must not be empty".to_string()));
        }

        let key = request
            .label_key
            .as_deref()
            .unwrap_or(self.settings.label_key.as_str());
        if key.trim().is_empty() {
            return Err(ReconcileError::Validation("label key must not be empty".to_string()));
        }

        if self.settings.containers.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "no containers configured for {}",
                request.application
            )));
        }

        Ok(PlacementLabel::new(key, &request.application))
    }

    async fn find_deployment(&self, name: &str) -> ReconcileResult<Option<DeploymentInfo>> {
        let deployments = self.cluster.list_deployments(&self.settings.namespace).await?;
        Ok(deployments.into_iter().find(|d| d.name == name))
    }

    async fn ensure_present(
        &self,
        request: &PlacementRequest,
        label: &PlacementLabel,
        deployment: &str,
    ) -> ReconcileResult<PlacementOutcome> {
        if let Some(existing) = self.find_deployment(deployment).await? {
            if existing.replicas > 0 {
                debug!(%deployment, replicas = existing.replicas, "deployment already present");
                return Ok(PlacementOutcome::AlreadySatisfied);
            }
            return Err(ReconcileError::Conflict(format!(
                "deployment {deployment} exists with 0 replicas"
            )));
        }

        // The label must be in place before the pod is scheduled.
        let change = self
            .labeler
            .set_node_label(&request.node, &label.key, &label.value)
            .await?;
        match change {
            LabelChange::NodeNotFound => {
                return Err(ReconcileError::NodeNotFound(request.node.clone()));
            }
            LabelChange::HeldByOther => {
                return Err(ReconcileError::Conflict(format!(
                    "node {} already carries {} for another application",
                    request.node, label.key
                )));
            }
            LabelChange::Applied | LabelChange::Unchanged => {}
        }

        let containers = self.settings.containers_for(&request.application);
        let spec = build_deployment_spec(
            &request.application,
            &self.settings.image,
            label,
            &containers,
            &self.settings.volumes,
        );

        match self.cluster.create_deployment(&self.settings.namespace, &spec).await {
            Ok(()) => Ok(PlacementOutcome::Created),
            Err(ClusterError::AlreadyExists(what)) => {
                // Created outside nodepin between our check and our create.
                // It selects the same label, so the label stays.
                warn!(%what, "deployment appeared concurrently");
                Ok(PlacementOutcome::AlreadySatisfied)
            }
            Err(err) => {
                if change == LabelChange::Applied {
                    self.compensate_label(request, label).await;
                }
                Err(err.into())
            }
        }
    }

    /// Undo the label this request placed after a failed create.
    async fn compensate_label(&self, request: &PlacementRequest, label: &PlacementLabel) {
        match self
            .labeler
            .release_node_label(&request.node, &label.key, &label.value)
            .await
        {
            Ok(_) => info!(node = %request.node, key = %label.key, "node label rolled back"),
            Err(e) => error!(
                node = %request.node,
                key = %label.key,
                error = %e,
                "failed to roll back node label; node stays labeled without a deployment"
            ),
        }
    }

    async fn ensure_absent(
        &self,
        request: &PlacementRequest,
        label: &PlacementLabel,
        deployment: &str,
    ) -> ReconcileResult<PlacementOutcome> {
        // Each step is attempted even when an earlier one fails.
        let listed = self.find_deployment(deployment).await;
        let key = match &listed {
            Ok(Some(existing)) => pinned_key(existing, &request.application).unwrap_or(&label.key),
            Ok(None) => &label.key,
            Err(e) => {
                error!(%deployment, error = %e, "failed to look up deployment");
                &label.key
            }
        };

        let released = self
            .labeler
            .release_node_label(&request.node, key, &label.value)
            .await;
        if let Err(e) = &released {
            error!(node = %request.node, %key, error = %e, "failed to release node label");
        }

        let deleted = self
            .cluster
            .delete_deployment(&self.settings.namespace, deployment)
            .await;
        if let Err(e) = &deleted {
            error!(%deployment, error = %e, "failed to delete deployment");
        }

        listed?;
        let change = released?;
        let existed = deleted?;
        if !existed {
            debug!(%deployment, "deployment already absent");
        }

        Ok(if existed || change == LabelChange::Applied {
            PlacementOutcome::Removed
        } else {
            PlacementOutcome::AlreadySatisfied
        })
    }
}

/// The node selector key a deployment was pinned with: the entry whose
/// value is the application id.
fn pinned_key<'a>(deployment: &'a DeploymentInfo, application: &str) -> Option<&'a String> {
    deployment
        .node_selector
        .iter()
        .find(|(_, value)| value.as_str() == application)
        .map(|(key, _)| key)
}

/// The application id becomes a container name, a label value and the
/// deployment name prefix, so it must be a DNS-1123 label.
fn validate_application(application: &str) -> ReconcileResult<()> {
    if application.is_empty() {
        return Err(ReconcileError::Validation(
            "application id must not be empty".to_string(),
        ));
    }
    if application.len() > MAX_APPLICATION_LEN {
        return Err(ReconcileError::Validation(format!(
            "application id longer than {MAX_APPLICATION_LEN} characters"
        )));
    }
    let valid_chars = application
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let alnum_ends = !application.starts_with('-') && !application.ends_with('-');
    if !valid_chars || !alnum_ends {
        return Err(ReconcileError::Validation(format!(
            "application id {application:?} must be lowercase alphanumerics and '-', \
             starting and ending with an alphanumeric"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepin_cluster::{InMemoryCluster, Labels, Operation};
    use nodepin_core::NodepinConfig;
    use nodepin_placement::ImageRef;

    const NS: &str = "pi-system";

    fn settings() -> PlacementSettings {
        PlacementSettings::from_config(&NodepinConfig::default())
    }

    fn reconciler_with(cluster: &InMemoryCluster) -> Reconciler {
        Reconciler::new(Arc::new(cluster.clone()), settings())
    }

    fn label_of(cluster: &InMemoryCluster, node: &str, key: &str) -> Option<String> {
        cluster.node(node).and_then(|n| n.labels.get(key).cloned())
    }

    // ── present ────────────────────────────────────────────────

    #[tokio::test]
    async fn present_creates_pinned_deployment() {
        let cluster = InMemoryCluster::with_nodes(&["node-1", "node-7"]);
        let reconciler = reconciler_with(&cluster);

        let report = reconciler.request_present("sensor-x", "node-7").await.unwrap();
        assert_eq!(report.outcome, PlacementOutcome::Created);
        assert_eq!(report.deployment, "sensor-x-deployment");

        let deployments = cluster.deployments(NS);
        assert_eq!(deployments.len(), 1);
        let spec = &deployments[0];
        assert_eq!(spec.name, "sensor-x-deployment");
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.template.containers.len(), 1);
        assert_eq!(
            spec.template.containers[0].image.as_deref(),
            Some("localhost:5000/sensor-x:latest")
        );

        let expected = Labels::from([("app".to_string(), "sensor-x".to_string())]);
        assert_eq!(spec.template.node_selector, expected);
        assert_eq!(label_of(&cluster, "node-7", "app").as_deref(), Some("sensor-x"));
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
    }

    #[tokio::test]
    async fn node_selector_matches_placed_label_and_selector_matches_pod_labels() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        reconciler.request_present("led", "node-1").await.unwrap();

        let spec = cluster.deployment(NS, "led-deployment").unwrap();
        let node = cluster.node("node-1").unwrap();
        assert!(node.matches(&spec.template.node_selector));
        assert_eq!(spec.selector, spec.template.labels);
    }

    #[tokio::test]
    async fn present_twice_is_already_satisfied() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        reconciler.request_present("led", "node-1").await.unwrap();
        let second = reconciler.request_present("led", "node-1").await.unwrap();

        assert_eq!(second.outcome, PlacementOutcome::AlreadySatisfied);
        assert_eq!(cluster.deployments(NS).len(), 1);
        assert_eq!(cluster.call_count(Operation::CreateDeployment), 1);
        assert_eq!(cluster.call_count(Operation::UpdateNode), 1);
    }

    #[tokio::test]
    async fn present_on_unknown_node_creates_nothing() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        let err = reconciler.request_present("led", "node-9").await.unwrap_err();
        assert!(matches!(err, ReconcileError::NodeNotFound(ref n) if n == "node-9"));
        assert!(cluster.deployments(NS).is_empty());
        assert_eq!(cluster.call_count(Operation::CreateDeployment), 0);
    }

    #[tokio::test]
    async fn present_with_zero_replica_deployment_conflicts() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);
        let label = PlacementLabel::new("app", "led");
        let mut spec = build_deployment_spec(
            "led",
            &reconciler.settings().image,
            &label,
            &reconciler.settings().containers_for("led"),
            &[],
        );
        spec.replicas = 0;
        cluster.insert_deployment(NS, spec);

        let err = reconciler.request_present("led", "node-1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Conflict(_)));
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
    }

    #[tokio::test]
    async fn failed_create_rolls_back_label() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        cluster.fail(Operation::CreateDeployment);
        let reconciler = reconciler_with(&cluster);

        let err = reconciler.request_present("led", "node-1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Cluster(ClusterError::Transport(_))));
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
        assert!(cluster.deployments(NS).is_empty());
    }

    #[tokio::test]
    async fn failed_label_stops_before_create() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        cluster.fail(Operation::UpdateNode);
        let reconciler = reconciler_with(&cluster);

        let err = reconciler.request_present("led", "node-1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Cluster(_)));
        assert_eq!(cluster.call_count(Operation::CreateDeployment), 0);
    }

    #[tokio::test]
    async fn label_key_override_is_used_for_node_and_selector() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        let request = PlacementRequest::present("led", "node-1").with_label_key("pinned");
        reconciler.reconcile(&request).await.unwrap();

        assert_eq!(label_of(&cluster, "node-1", "pinned").as_deref(), Some("led"));
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
        let spec = cluster.deployment(NS, "led-deployment").unwrap();
        assert_eq!(
            spec.template.node_selector,
            Labels::from([("pinned".to_string(), "led".to_string())])
        );
    }

    #[tokio::test]
    async fn fixed_image_applies_to_every_application() {
        let cluster = InMemoryCluster::with_nodes(&["node-1", "node-2"]);
        let mut settings = settings();
        settings.image = ImageRef::Fixed("nginx:1.12".to_string());
        let reconciler = Reconciler::new(Arc::new(cluster.clone()), settings);

        reconciler.request_present("led", "node-1").await.unwrap();
        reconciler.request_present("fan", "node-2").await.unwrap();

        for spec in cluster.deployments(NS) {
            assert_eq!(spec.template.containers[0].image.as_deref(), Some("nginx:1.12"));
        }
    }

    #[tokio::test]
    async fn present_on_node_pinned_to_other_application_conflicts() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        reconciler.request_present("fan", "node-1").await.unwrap();
        let err = reconciler.request_present("led", "node-1").await.unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
        assert_eq!(label_of(&cluster, "node-1", "app").as_deref(), Some("fan"));
        assert!(cluster.deployment(NS, "led-deployment").is_none());
        let fan = cluster.deployment(NS, "fan-deployment").unwrap();
        assert!(cluster.node("node-1").unwrap().matches(&fan.template.node_selector));
    }

    // ── validation ─────────────────────────────────────────────

    #[tokio::test]
    async fn empty_containers_rejected_before_cluster_calls() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let mut settings = settings();
        settings.containers.clear();
        let reconciler = Reconciler::new(Arc::new(cluster.clone()), settings);

        let err = reconciler.request_present("led", "node-1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_identifiers_rejected_before_cluster_calls() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        for (app, node) in [
            ("", "node-1"),
            ("Sensor", "node-1"),
            ("-led", "node-1"),
            ("led-", "node-1"),
            ("led_1", "node-1"),
            ("led", ""),
            ("led", "   "),
        ] {
            let err = reconciler.request_present(app, node).await.unwrap_err();
            assert!(
                matches!(err, ReconcileError::Validation(_)),
                "expected validation error for ({app:?}, {node:?})"
            );
        }

        let long = "a".repeat(64);
        assert!(matches!(
            reconciler.request_present(&long, "node-1").await,
            Err(ReconcileError::Validation(_))
        ));

        let request = PlacementRequest::present("led", "node-1").with_label_key("");
        assert!(matches!(
            reconciler.reconcile(&request).await,
            Err(ReconcileError::Validation(_))
        ));

        assert!(cluster.calls().is_empty());
    }

    // ── absent ─────────────────────────────────────────────────

    #[tokio::test]
    async fn absent_without_deployment_succeeds() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        let report = reconciler.request_absent("led", "node-1").await.unwrap();
        assert_eq!(report.outcome, PlacementOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn absent_on_unknown_node_is_tolerated() {
        let cluster = InMemoryCluster::new();
        let reconciler = reconciler_with(&cluster);

        let report = reconciler.request_absent("led", "ghost").await.unwrap();
        assert_eq!(report.outcome, PlacementOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn present_then_absent_round_trip() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("node-1", Labels::from([("zone".to_string(), "a".to_string())]));
        let reconciler = reconciler_with(&cluster);

        reconciler.request_present("led", "node-1").await.unwrap();
        let report = reconciler.request_absent("led", "node-1").await.unwrap();

        assert_eq!(report.outcome, PlacementOutcome::Removed);
        assert!(cluster.deployments(NS).is_empty());
        assert!(cluster.list_pods(NS).await.unwrap().is_empty());
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
        assert_eq!(label_of(&cluster, "node-1", "zone").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn absent_releases_label_key_deployment_was_pinned_with() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        let request = PlacementRequest::present("led", "node-1").with_label_key("pinned");
        reconciler.reconcile(&request).await.unwrap();
        let report = reconciler.request_absent("led", "node-1").await.unwrap();

        assert_eq!(report.outcome, PlacementOutcome::Removed);
        assert!(cluster.deployments(NS).is_empty());
        assert!(cluster.node("node-1").unwrap().labels.is_empty());
    }

    #[tokio::test]
    async fn absent_keeps_label_of_other_application() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);

        reconciler.request_present("fan", "node-1").await.unwrap();
        reconciler.request_absent("led", "node-1").await.unwrap();

        assert_eq!(label_of(&cluster, "node-1", "app").as_deref(), Some("fan"));
        assert!(cluster.deployment(NS, "fan-deployment").is_some());
    }

    #[tokio::test]
    async fn absent_attempts_delete_when_label_release_fails() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);
        reconciler.request_present("led", "node-1").await.unwrap();

        cluster.fail(Operation::ListNodes);
        let err = reconciler.request_absent("led", "node-1").await.unwrap_err();

        assert!(matches!(err, ReconcileError::Cluster(_)));
        assert!(cluster.deployments(NS).is_empty());
    }

    #[tokio::test]
    async fn absent_releases_label_when_delete_fails() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = reconciler_with(&cluster);
        reconciler.request_present("led", "node-1").await.unwrap();

        cluster.fail(Operation::DeleteDeployment);
        let err = reconciler.request_absent("led", "node-1").await.unwrap_err();

        assert!(matches!(err, ReconcileError::Cluster(_)));
        assert_eq!(label_of(&cluster, "node-1", "app"), None);
        assert!(cluster.deployment(NS, "led-deployment").is_some());
    }

    // ── concurrency ────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_presents_create_one_deployment() {
        let cluster = InMemoryCluster::with_nodes(&["node-1"]);
        let reconciler = Arc::new(reconciler_with(&cluster));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler.request_present("led", "node-1").await
            }));
        }

        let mut created = 0;
        let mut satisfied = 0;
        for h in handles {
            match h.await.unwrap().unwrap().outcome {
                PlacementOutcome::Created => created += 1,
                PlacementOutcome::AlreadySatisfied => satisfied += 1,
                PlacementOutcome::Removed => panic!("present never removes"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(satisfied, 15);
        assert_eq!(cluster.deployments(NS).len(), 1);
        assert_eq!(cluster.call_count(Operation::CreateDeployment), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_applications_on_different_nodes_all_land() {
        let nodes: Vec<String> = (0..8).map(|i| format!("node-{i}")).collect();
        let node_refs: Vec<&str> = nodes.iter().map(String::as_str).collect();
        let cluster = InMemoryCluster::with_nodes(&node_refs);
        let reconciler = Arc::new(reconciler_with(&cluster));

        let mut handles = Vec::new();
        for i in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler
                    .request_present(&format!("app-{i}"), &format!("node-{i}"))
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().outcome, PlacementOutcome::Created);
        }

        assert_eq!(cluster.deployments(NS).len(), 8);
        for i in 0..8 {
            assert_eq!(
                label_of(&cluster, &format!("node-{i}"), "app"),
                Some(format!("app-{i}"))
            );
        }
    }
}
