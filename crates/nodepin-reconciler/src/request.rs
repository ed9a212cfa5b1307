//! Placement requests and their outcomes.

use serde::{Deserialize, Serialize};

/// One request to pin (or unpin) an application on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementRequest {
    pub application: String,
    pub node: String,
    /// `true` → the deployment should exist, `false` → it should not.
    pub present: bool,
    /// Overrides the configured node label key for this application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
}

impl PlacementRequest {
    pub fn present(application: &str, node: &str) -> Self {
        Self {
            application: application.to_string(),
            node: node.to_string(),
            present: true,
            label_key: None,
        }
    }

    pub fn absent(application: &str, node: &str) -> Self {
        Self {
            present: false,
            ..Self::present(application, node)
        }
    }

    pub fn with_label_key(mut self, key: &str) -> Self {
        self.label_key = Some(key.to_string());
        self
    }
}

/// What a successful reconciliation did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// Node labeled and deployment created.
    Created,
    /// Deployment deleted and/or node label released.
    Removed,
    /// The cluster already matched the request; nothing changed.
    AlreadySatisfied,
}

/// Result body for a reconciled request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementReport {
    pub application: String,
    pub node: String,
    pub deployment: String,
    pub outcome: PlacementOutcome,
}
