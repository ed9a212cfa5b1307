//! nodepin-api — HTTP gateway for nodepin.
//!
//! Translates inbound calls into [`Reconciler`] requests and serves the
//! observer's latest snapshot. Handlers hold no state of their own.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Static greeting |
//! | POST | `/{application}/{state}/{node}` | Pin (`true`) or unpin (`false`) an application |
//! | POST | `/api/v1/placements` | Same, with a JSON body |
//! | GET | `/api/v1/snapshot` | Latest cluster snapshot |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use nodepin_observer::SnapshotCache;
use nodepin_reconciler::Reconciler;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub reconciler: Arc<Reconciler>,
    pub snapshots: SnapshotCache,
}

/// Build the complete gateway router.
pub fn build_router(reconciler: Arc<Reconciler>, snapshots: SnapshotCache) -> Router {
    let state = ApiState {
        reconciler,
        snapshots,
    };

    let api_routes = Router::new()
        .route("/placements", post(handlers::create_placement))
        .route("/snapshot", get(handlers::get_snapshot))
        .with_state(state.clone());

    Router::new()
        .route("/", get(handlers::greeting))
        .route("/{application}/{state}/{node}", post(handlers::path_placement))
        .with_state(state)
        .nest("/api/v1", api_routes)
}
