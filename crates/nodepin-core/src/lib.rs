pub mod config;

pub use config::{
    ClusterConfig, ContainerConfig, FailurePolicy, ImageConfig, NodepinConfig, ObserverConfig,
    PlacementConfig, VolumeConfig,
};
