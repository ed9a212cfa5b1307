//! Cluster snapshot — one observation of pods, nodes and deployments.

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use nodepin_cluster::{DeploymentInfo, Labels, NodeInfo, PodInfo};

/// Everything one observer tick saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSnapshot {
    /// Unix seconds when the listings completed.
    pub taken_at: u64,
    pub deployments: Vec<DeploymentInfo>,
    pub pods: Vec<PodInfo>,
    pub nodes: Vec<NodeInfo>,
    pub drift: Vec<Drift>,
}

/// A mismatch between managed deployments and node labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    /// No node carries the deployment's node selector; its pod cannot schedule.
    Unplaced { deployment: String },
    /// More than one node carries the selector; placement is not pinned.
    Ambiguous {
        deployment: String,
        nodes: Vec<String>,
    },
    /// A node carries the owned label but no managed deployment selects it.
    OrphanLabel {
        node: String,
        key: String,
        value: String,
    },
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Unplaced { deployment } => {
                write!(f, "deployment {deployment} selects no node")
            }
            Drift::Ambiguous { deployment, nodes } => {
                write!(f, "deployment {deployment} selects {} nodes: {}", nodes.len(), nodes.join(", "))
            }
            Drift::OrphanLabel { node, key, value } => {
                write!(f, "node {node} carries {key}={value} with no deployment selecting it")
            }
        }
    }
}

/// Compare managed deployments against node labels.
///
/// Only deployments carrying the managed-by marker are checked. Orphan
/// labels are looked for under `label_key` and under every key a managed
/// deployment selects on, which covers per-request key overrides.
pub fn detect_drift(deployments: &[DeploymentInfo], nodes: &[NodeInfo], label_key: &str) -> Vec<Drift> {
    let managed: Vec<&DeploymentInfo> = deployments
        .iter()
        .filter(|d| d.is_managed() && !d.node_selector.is_empty())
        .collect();

    let mut drift = Vec::new();

    for deployment in &managed {
        let selected: Vec<String> = nodes
            .iter()
            .filter(|n| n.matches(&deployment.node_selector))
            .map(|n| n.name.clone())
            .collect();
        match selected.len() {
            0 => drift.push(Drift::Unplaced {
                deployment: deployment.name.clone(),
            }),
            1 => {}
            _ => drift.push(Drift::Ambiguous {
                deployment: deployment.name.clone(),
                nodes: selected,
            }),
        }
    }

    let mut owned_keys: BTreeSet<&str> = BTreeSet::from([label_key]);
    owned_keys.extend(
        managed
            .iter()
            .flat_map(|d| d.node_selector.keys().map(String::as_str)),
    );

    for node in nodes {
        for key in &owned_keys {
            let Some(value) = node.labels.get(*key) else {
                continue;
            };
            let selected = managed
                .iter()
                .any(|d| d.node_selector.get(*key) == Some(value));
            if !selected {
                drift.push(Drift::OrphanLabel {
                    node: node.name.clone(),
                    key: key.to_string(),
                    value: value.clone(),
                });
            }
        }
    }

    drift
}

fn render_labels(labels: &Labels) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(", "))
}

impl ClusterSnapshot {
    /// Human-readable rendering: deployments with replica counts, pods by
    /// index, nodes with their label sets.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "── deployments ({}) ──", self.deployments.len());
        for (i, d) in self.deployments.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{i}] {} replicas={} ready={}",
                d.name, d.replicas, d.ready_replicas
            );
        }

        let _ = writeln!(out, "── pods ({}) ──", self.pods.len());
        for (i, p) in self.pods.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{i}] {} node={} phase={}",
                p.name,
                p.node_name.as_deref().unwrap_or("-"),
                p.phase.as_deref().unwrap_or("-")
            );
        }

        let _ = writeln!(out, "── nodes ({}) ──", self.nodes.len());
        for (i, n) in self.nodes.iter().enumerate() {
            let _ = writeln!(out, "[{i}] {} {}", n.name, render_labels(&n.labels));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepin_cluster::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(name: &str, pairs: &[(&str, &str)]) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            labels: labels(pairs),
            resource_version: None,
        }
    }

    fn managed(app: &str) -> DeploymentInfo {
        let pinned = labels(&[("app", app)]);
        DeploymentInfo {
            name: format!("{app}-deployment"),
            labels: labels(&[("app", app), (MANAGED_BY_LABEL, MANAGED_BY_VALUE)]),
            replicas: 1,
            ready_replicas: 1,
            selector: pinned.clone(),
            node_selector: pinned,
        }
    }

    #[test]
    fn consistent_cluster_has_no_drift() {
        let deployments = vec![managed("led"), managed("fan")];
        let nodes = vec![
            node("node-1", &[("app", "led")]),
            node("node-2", &[("app", "fan")]),
            node("node-3", &[]),
        ];
        assert!(detect_drift(&deployments, &nodes, "app").is_empty());
    }

    #[test]
    fn deployment_without_labeled_node_is_unplaced() {
        let drift = detect_drift(&[managed("led")], &[node("node-1", &[])], "app");
        assert_eq!(
            drift,
            vec![Drift::Unplaced {
                deployment: "led-deployment".to_string()
            }]
        );
    }

    #[test]
    fn two_labeled_nodes_are_ambiguous() {
        let nodes = vec![node("node-1", &[("app", "led")]), node("node-2", &[("app", "led")])];
        let drift = detect_drift(&[managed("led")], &nodes, "app");
        assert_eq!(
            drift,
            vec![Drift::Ambiguous {
                deployment: "led-deployment".to_string(),
                nodes: vec!["node-1".to_string(), "node-2".to_string()],
            }]
        );
    }

    #[test]
    fn label_without_deployment_is_orphaned() {
        let drift = detect_drift(&[], &[node("node-1", &[("app", "led"), ("zone", "a")])], "app");
        assert_eq!(
            drift,
            vec![Drift::OrphanLabel {
                node: "node-1".to_string(),
                key: "app".to_string(),
                value: "led".to_string(),
            }]
        );
    }

    #[test]
    fn orphans_are_found_under_overridden_keys() {
        let mut pinned = managed("led");
        pinned.node_selector = labels(&[("pinned", "led")]);
        pinned.selector = pinned.node_selector.clone();
        let nodes = vec![
            node("node-1", &[("pinned", "led")]),
            node("node-2", &[("pinned", "fan")]),
        ];

        let drift = detect_drift(&[pinned], &nodes, "app");
        assert_eq!(
            drift,
            vec![Drift::OrphanLabel {
                node: "node-2".to_string(),
                key: "pinned".to_string(),
                value: "fan".to_string(),
            }]
        );
    }

    #[test]
    fn unmanaged_deployments_are_ignored() {
        let mut foreign = managed("led");
        foreign.labels.remove(MANAGED_BY_LABEL);
        let drift = detect_drift(&[foreign], &[node("node-1", &[])], "app");
        assert!(drift.is_empty());
    }

    #[test]
    fn render_has_three_indexed_sections() {
        let snapshot = ClusterSnapshot {
            taken_at: 0,
            deployments: vec![managed("led")],
            pods: vec![PodInfo {
                name: "led-deployment-0".to_string(),
                node_name: Some("node-1".to_string()),
                phase: Some("Running".to_string()),
            }],
            nodes: vec![node("node-1", &[("app", "led"), ("zone", "a")])],
            drift: Vec::new(),
        };

        let text = snapshot.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "── deployments (1) ──",
                "[0] led-deployment replicas=1 ready=1",
                "── pods (1) ──",
                "[0] led-deployment-0 node=node-1 phase=Running",
                "── nodes (1) ──",
                "[0] node-1 {app=led, zone=a}",
            ]
        );
    }

    #[test]
    fn drift_serializes_with_kind_tag() {
        let json = serde_json::to_value(Drift::Unplaced {
            deployment: "led-deployment".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "unplaced");
        assert_eq!(json["deployment"], "led-deployment");
    }
}
