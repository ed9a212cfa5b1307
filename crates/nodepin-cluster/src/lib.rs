//! nodepin-cluster — the connection to the cluster control plane.
//!
//! Everything above this crate talks to the cluster through the
//! [`ClusterHandle`] trait. Two implementations are provided:
//!
//! - **`KubeCluster`** — backed by `kube::Client`, translating between
//!   nodepin's domain types and `k8s-openapi` objects (see `convert`).
//! - **`InMemoryCluster`** — a thread-safe fake with per-operation fault
//!   injection, used by the test suites of every crate in the workspace.
//!
//! # Architecture
//!
//! ```text
//! Arc<dyn ClusterHandle>
//!   ├── KubeCluster ── kube::Api<Node | Deployment | Pod>
//!   └── InMemoryCluster ── nodes / deployments / pods maps
//! ```

pub mod convert;
pub mod error;
pub mod handle;
pub mod kubernetes;
pub mod memory;
pub mod types;

pub use error::{ClusterError, ClusterResult};
pub use handle::ClusterHandle;
pub use kubernetes::KubeCluster;
pub use memory::{InMemoryCluster, Operation};
pub use types::*;
