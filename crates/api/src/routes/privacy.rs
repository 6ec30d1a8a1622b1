//! Data export and erasure for notifications a user triggered.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use feed_common::error::AppError;
use feed_engine::ExportedNotification;

use crate::middleware::auth::ServiceAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/privacy/users/{id}/notifications",
        get(export_notifications).delete(delete_notifications),
    )
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub user_id: i64,
    pub notifications: Vec<ExportedNotification>,
}

/// GET /api/privacy/users/{id}/notifications — Export the user's queued notifications.
async fn export_notifications(
    State(state): State<AppState>,
    _auth: ServiceAuth,
    Path(user_id): Path<i64>,
) -> Result<Json<ExportResponse>, AppError> {
    let notifications = state.privacy.export_user_data(user_id).await?;
    Ok(Json(ExportResponse {
        user_id,
        notifications,
    }))
}

/// DELETE /api/privacy/users/{id}/notifications — Erase the user's queued notifications.
async fn delete_notifications(
    State(state): State<AppState>,
    auth: ServiceAuth,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.privacy.delete_user_data(user_id).await?;
    tracing::info!(service = %auth.service, user_id, deleted, "Privacy erasure request served");
    Ok(Json(json!({ "deleted": deleted })))
}
