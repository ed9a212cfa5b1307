//! nodepin-observer — read-only view of the cluster for operators.
//!
//! A single background task lists pods, nodes and deployments on a fixed
//! interval, renders them as a [`ClusterSnapshot`] and keeps the latest one
//! in a [`SnapshotCache`] for the gateway to serve. It never writes to the
//! cluster.
//!
//! # Architecture
//!
//! ```text
//! Observer (one task, watch-channel shutdown)
//!   ├── observe_once()
//!   │   ├── list_pods / list_nodes / list_deployments
//!   │   └── detect_drift() → Vec<Drift>
//!   ├── SnapshotCache (latest ClusterSnapshot)
//!   └── FailurePolicy: halt | continue
//! ```
//!
//! # Drift
//!
//! Each managed deployment should have exactly one node carrying its node
//! selector, and every node carrying the owned label key should be selected
//! by a managed deployment. Anything else is reported as a [`Drift`] entry
//! and logged at `warn`.

pub mod error;
pub mod observer;
pub mod snapshot;

pub use error::{ObserverError, ObserverResult};
pub use observer::{Observer, SnapshotCache};
pub use snapshot::{ClusterSnapshot, Drift, detect_drift};
