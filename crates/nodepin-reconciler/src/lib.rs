//! nodepin-reconciler — converges one application's deployment onto one node.
//!
//! The `Reconciler` takes a [`PlacementRequest`] (application, node,
//! present/absent) and brings the cluster in line with it:
//!
//! - **present** — label the node, build the pinned spec, create the deployment
//! - **absent** — release the node label, delete the deployment (foreground)
//!
//! Both directions are idempotent; a request that is already satisfied
//! reports [`PlacementOutcome::AlreadySatisfied`] without side effects.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── KeyedLocks (application lock, then node lock)
//!   ├── NodeLabeler ──┐
//!   ├── build_deployment_spec (pure)
//!   └── Arc<dyn ClusterHandle> ◄┘
//! ```

pub mod error;
pub mod locks;
pub mod reconciler;
pub mod request;
pub mod settings;

pub use error::{ReconcileError, ReconcileResult};
pub use locks::KeyedLocks;
pub use reconciler::Reconciler;
pub use request::{PlacementOutcome, PlacementReport, PlacementRequest};
pub use settings::{ContainerTemplate, PlacementSettings};
