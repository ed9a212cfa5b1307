//! Gateway handlers.
//!
//! Every placement handler funnels into [`place`], which runs the reconciler
//! and maps its error onto a status code.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use tracing::{info, warn};

use nodepin_cluster::ClusterError;
use nodepin_reconciler::{PlacementRequest, ReconcileError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for a failed reconciliation.
fn status_for(err: &ReconcileError) -> StatusCode {
    match err {
        ReconcileError::Validation(_) => StatusCode::BAD_REQUEST,
        ReconcileError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::Conflict(_) => StatusCode::CONFLICT,
        ReconcileError::Cluster(ClusterError::Conflict(_)) => StatusCode::CONFLICT,
        ReconcileError::Cluster(_) => StatusCode::BAD_GATEWAY,
    }
}

async fn place(state: &ApiState, request: PlacementRequest) -> axum::response::Response {
    match state.reconciler.reconcile(&request).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => {
            let status = status_for(&e);
            warn!(
                application = %request.application,
                node = %request.node,
                status = status.as_u16(),
                error = %e,
                "placement request failed"
            );
            error_response(&e.to_string(), status).into_response()
        }
    }
}

// ── Greeting ───────────────────────────────────────────────────

/// GET /
pub async fn greeting() -> impl IntoResponse {
    (StatusCode::OK, Html("<html><h1>HELLO from nodepin</h1></html>"))
}

// ── Placements ─────────────────────────────────────────────────

/// POST /{application}/{state}/{node}
pub async fn path_placement(
    State(state): State<ApiState>,
    Path((application, desired, node)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let present = match desired.as_str() {
        "true" => true,
        "false" => false,
        other => {
            return error_response(
                &format!("state must be \"true\" or \"false\", got {other:?}"),
                StatusCode::BAD_REQUEST,
            )
            .into_response();
        }
    };

    info!(%application, %node, present, "placement requested");
    let request = if present {
        PlacementRequest::present(&application, &node)
    } else {
        PlacementRequest::absent(&application, &node)
    };
    place(&state, request).await
}

/// POST /api/v1/placements
pub async fn create_placement(
    State(state): State<ApiState>,
    Json(request): Json<PlacementRequest>,
) -> impl IntoResponse {
    info!(
        application = %request.application,
        node = %request.node,
        present = request.present,
        label_key = ?request.label_key,
        "placement requested"
    );
    place(&state, request).await
}

// ── Snapshot ───────────────────────────────────────────────────

/// GET /api/v1/snapshot
pub async fn get_snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    match state.snapshots.latest().await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => error_response("no snapshot taken yet", StatusCode::NOT_FOUND).into_response(),
    }
}
