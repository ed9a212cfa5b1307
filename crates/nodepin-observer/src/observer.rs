//! Observer — background polling loop over the cluster handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use nodepin_cluster::ClusterHandle;
use nodepin_core::{FailurePolicy, NodepinConfig};

use crate::error::ObserverResult;
use crate::snapshot::{ClusterSnapshot, detect_drift};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Shared holder of the most recent snapshot. Clones share state.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    latest: Arc<RwLock<Option<ClusterSnapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last published snapshot, if any tick has completed.
    pub async fn latest(&self) -> Option<ClusterSnapshot> {
        self.latest.read().await.clone()
    }

    /// Replace the held snapshot, returning the previous one.
    pub async fn publish(&self, snapshot: ClusterSnapshot) -> Option<ClusterSnapshot> {
        self.latest.write().await.replace(snapshot)
    }
}

/// Polls pods, nodes and deployments until told to stop.
pub struct Observer {
    cluster: Arc<dyn ClusterHandle>,
    namespace: String,
    label_key: String,
    interval: Duration,
    policy: FailurePolicy,
    cache: SnapshotCache,
}

impl Observer {
    pub fn new(cluster: Arc<dyn ClusterHandle>, namespace: &str, label_key: &str) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
            label_key: label_key.to_string(),
            interval: DEFAULT_INTERVAL,
            policy: FailurePolicy::default(),
            cache: SnapshotCache::new(),
        }
    }

    pub fn from_config(cluster: Arc<dyn ClusterHandle>, config: &NodepinConfig) -> Self {
        Self::new(cluster, &config.cluster.namespace, &config.placement.label_key)
            .with_interval(config.observer.interval())
            .with_failure_policy(config.observer.failure_policy)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish into an existing cache instead of a private one.
    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> SnapshotCache {
        self.cache.clone()
    }

    /// List everything once and build a snapshot. Does not publish it.
    pub async fn observe_once(&self) -> ObserverResult<ClusterSnapshot> {
        let pods = self.cluster.list_pods(&self.namespace).await?;
        let nodes = self.cluster.list_nodes().await?;
        let deployments = self.cluster.list_deployments(&self.namespace).await?;
        let drift = detect_drift(&deployments, &nodes, &self.label_key);

        Ok(ClusterSnapshot {
            taken_at: epoch_secs(),
            deployments,
            pods,
            nodes,
            drift,
        })
    }

    /// Run until `shutdown` flips or, under [`FailurePolicy::Halt`], a
    /// listing fails. The first observation happens immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ObserverResult<()> {
        info!(
            namespace = %self.namespace,
            interval_ms = self.interval.as_millis() as u64,
            policy = ?self.policy,
            "cluster observer started"
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            match self.observe_once().await {
                Ok(snapshot) => {
                    if consecutive_failures > 0 {
                        info!(consecutive_failures, "cluster observation recovered");
                    }
                    consecutive_failures = 0;
                    self.publish(snapshot).await;
                }
                Err(e) => match self.policy {
                    FailurePolicy::Halt => {
                        error!(error = %e, "cluster observation failed, observer halting");
                        return Err(e);
                    }
                    FailurePolicy::Continue => {
                        consecutive_failures += 1;
                        warn!(error = %e, consecutive_failures, "cluster observation failed, retrying next tick");
                    }
                },
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    debug!("cluster observer shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn publish(&self, snapshot: ClusterSnapshot) {
        debug!("cluster snapshot\n{}", snapshot.render());

        let previous = self.cache.publish(snapshot.clone()).await;
        let known = previous.map(|p| p.drift).unwrap_or_default();
        // Repeat findings stay quiet until they clear and come back.
        for drift in snapshot.drift.iter().filter(|d| !known.contains(d)) {
            warn!(%drift, "placement drift detected");
        }
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
