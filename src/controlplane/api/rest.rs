//! REST API Handlers
//!
//! Read-only endpoints over the readiness board: control plane snapshots and
//! their readiness verdicts.

use crate::controlplane::board::{ReadinessBoard, ReadinessSnapshot};
use crate::crd::{ConditionType, ReadinessPolicy};
use crate::domain::ObjectKey;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

// =============================================================================
// Request/Response Types
// =============================================================================

/// List response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneListResponse {
    pub items: Vec<ReadinessSnapshot>,
    pub total: usize,
    pub ready: usize,
}

/// Condition excluded from the readiness verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub reason: String,
}

/// Readiness verdict response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub unmet: Vec<ConditionType>,
    pub deferred: Vec<DeferredCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    board: Arc<ReadinessBoard>,
    policy: ReadinessPolicy,
}

impl RestRouter {
    pub fn new(board: Arc<ReadinessBoard>, policy: ReadinessPolicy) -> Self {
        Self { board, policy }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            board: self.board,
            policy: Arc::new(self.policy),
        };

        Router::new()
            .route("/v1/controlplanes", get(list_control_planes))
            .route("/v1/controlplanes/:namespace/:name", get(get_control_plane))
            .route(
                "/v1/controlplanes/:namespace/:name/readiness",
                get(get_readiness),
            )
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    board: Arc<ReadinessBoard>,
    policy: Arc<ReadinessPolicy>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_control_planes(State(state): State<AppState>) -> impl IntoResponse {
    let items: Vec<ReadinessSnapshot> = state
        .board
        .list()
        .into_iter()
        .map(|snapshot| (*snapshot).clone())
        .collect();
    let ready = items.iter().filter(|s| s.is_ready()).count();

    (
        StatusCode::OK,
        Json(ControlPlaneListResponse {
            total: items.len(),
            ready,
            items,
        }),
    )
        .into_response()
}

async fn get_control_plane(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = ObjectKey::new(namespace, name);
    match state.board.get(&key) {
        Some(snapshot) => (StatusCode::OK, Json((*snapshot).clone())).into_response(),
        None => not_found(&key),
    }
}

async fn get_readiness(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = ObjectKey::new(namespace, name);
    let Some(snapshot) = state.board.get(&key) else {
        return not_found(&key);
    };
    debug!("Readiness of {}: {}", key, snapshot.state);

    let deferred = state
        .policy
        .deferred()
        .map(|(condition_type, reason)| DeferredCondition {
            condition_type,
            reason: reason.to_string(),
        })
        .collect();

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            ready: snapshot.is_ready(),
            unmet: snapshot.unmet.clone(),
            deferred,
            observed_generation: snapshot.observed_generation,
        }),
    )
        .into_response()
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "healthy"})))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "controlPlanes": state.board.len(),
            "ready": state.board.ready_count(),
        })),
    )
}

fn not_found(key: &ObjectKey) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse {
            error: "not_found".into(),
            message: format!("Control plane {} not found", key),
            details: None,
        }),
    )
        .into_response()
}
