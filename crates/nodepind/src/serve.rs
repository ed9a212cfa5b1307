//! Serve mode — wires the cluster handle, reconciler, observer and gateway
//! together and runs until Ctrl-C or an observer halt.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use nodepin_cluster::{ClusterHandle, KubeCluster};
use nodepin_core::NodepinConfig;
use nodepin_observer::Observer;
use nodepin_reconciler::{PlacementSettings, Reconciler};

fn load_config(path: Option<PathBuf>) -> anyhow::Result<NodepinConfig> {
    match path {
        Some(path) => {
            let config = NodepinConfig::from_file(&path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => {
            info!("no configuration file given, using defaults");
            Ok(NodepinConfig::default())
        }
    }
}

pub async fn run_serve(config_path: Option<PathBuf>, port: u16) -> anyhow::Result<()> {
    info!("nodepin daemon starting");

    let config = load_config(config_path)?;

    // ── Initialize subsystems ──────────────────────────────────

    let cluster: Arc<dyn ClusterHandle> = Arc::new(
        KubeCluster::connect(config.cluster.kubeconfig.as_deref())
            .await
            .context("connecting to cluster")?,
    );
    info!(namespace = %config.cluster.namespace, "cluster client ready");

    let settings = PlacementSettings::from_config(&config);
    let reconciler = Arc::new(Reconciler::new(cluster.clone(), settings));
    info!(label_key = %config.placement.label_key, "reconciler initialized");

    let observer = Observer::from_config(cluster, &config);
    let snapshots = observer.cache();

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    let mut observer_handle = tokio::spawn(observer.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = nodepin_api::build_router(reconciler, snapshots);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server starting");

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server_handle = tokio::spawn(async move { server.await });

    // Either Ctrl-C or the observer halting ends the process.
    let halted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("installing Ctrl-C handler")?;
            info!("shutdown signal received");
            None
        }
        result = &mut observer_handle => Some(result),
    };

    let _ = shutdown_tx.send(true);
    server_handle.await??;

    let observer_result = match halted {
        Some(result) => result,
        None => observer_handle.await,
    };
    match observer_result? {
        Ok(()) => {
            info!("nodepin daemon stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "observer halted, daemon exiting");
            Err(e.into())
        }
    }
}
