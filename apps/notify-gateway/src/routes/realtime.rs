//! Observability and internal dispatch endpoints for the notification gateway.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::middleware::InternalCaller;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::dispatcher::BroadcastReport;
use crate::gateway::events::EventName;
use crate::gateway::payload::NotificationPayload;
use crate::gateway::registry::RegistryStats;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/realtime/stats", get(stats))
        .route("/realtime/users/{user_id}", get(user_status))
        .route("/realtime/dispatch", post(dispatch))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserConnectionStatus {
    pub user_id: String,
    pub connected: bool,
    pub socket_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Recipients. Offline users are skipped silently.
    pub user_ids: Vec<String>,
    /// The already-persisted notification record, forwarded as-is.
    #[schema(value_type = Object)]
    pub notification: Value,
    /// Event name override; defaults to `notification:new`.
    #[serde(default)]
    pub event: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/realtime/stats",
    tag = "Realtime",
    responses((status = 200, description = "Live connection counts", body = RegistryStats))
)]
pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.count())
}

#[utoipa::path(
    get,
    path = "/api/v1/realtime/users/{user_id}",
    tag = "Realtime",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Live connections for one user", body = UserConnectionStatus)
    )
)]
pub async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserConnectionStatus> {
    let socket_ids = state.registry.get(&user_id);
    Json(UserConnectionStatus {
        connected: !socket_ids.is_empty(),
        user_id,
        socket_ids,
    })
}

/// Entry point for a notification writer running out of process. Always
/// succeeds once the request is valid; the report is informational.
#[utoipa::path(
    post,
    path = "/api/v1/realtime/dispatch",
    tag = "Realtime",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "Dispatch attempted", body = BroadcastReport),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Missing or invalid internal key", body = ApiErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn dispatch(
    _caller: InternalCaller,
    State(state): State<AppState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Json<BroadcastReport>, ApiError> {
    let Json(req) = body?;

    // --- Validation ---
    let mut errors = Vec::new();
    if req.user_ids.is_empty() {
        errors.push(FieldError::new("userIds", "must contain at least one user id"));
    }
    if req.user_ids.iter().any(|id| id.trim().is_empty()) {
        errors.push(FieldError::new("userIds", "must not contain blank ids"));
    }
    if !req.notification.is_object() {
        errors.push(FieldError::new("notification", "must be an object"));
    }
    if req.event.as_deref().is_some_and(|e| e.trim().is_empty()) {
        errors.push(FieldError::new("event", "must not be blank"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let event = req.event.as_deref().unwrap_or(EventName::NOTIFICATION_NEW);
    let payload = NotificationPayload::with_event_type(event, req.notification);
    let report = state.dispatcher.broadcast(&req.user_ids, &payload);

    tracing::debug!(
        users = report.users,
        reached = report.reached_users,
        delivered = report.delivered,
        "internal dispatch"
    );
    Ok(Json(report))
}
