//! nodepin-placement — node pinning primitives.
//!
//! Pinning a workload to a node takes two halves that must agree: a label
//! on the node, and a pod node selector asking for that same label. This
//! crate provides both and nothing else; ordering and failure handling
//! live in `nodepin-reconciler`.
//!
//! # Components
//!
//! - **`labeler`** — idempotent add/remove of one label on a named node
//! - **`builder`** — pure derivation of the deployment spec for an application

pub mod builder;
pub mod labeler;

pub use builder::{ImageRef, PlacementLabel, build_deployment_spec, deployment_name};
pub use labeler::{LabelChange, NodeLabeler};
