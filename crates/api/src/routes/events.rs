//! Event ingestion from the host event bus.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use feed_common::error::AppError;
use feed_common::types::CourseModuleEvent;

use crate::middleware::auth::ServiceAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events/course-module", post(course_module_event))
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub id: i64,
}

/// POST /api/events/course-module — Queue a notification for a created/updated module.
async fn course_module_event(
    State(state): State<AppState>,
    auth: ServiceAuth,
    payload: Result<Json<CourseModuleEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<QueuedResponse>), AppError> {
    let Json(event) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    tracing::debug!(
        service = %auth.service,
        action = %event.action,
        course_id = event.course_id,
        cm_id = event.cm_id,
        "Course module event received"
    );

    let id = state.capture.capture(&event).await?;
    Ok((StatusCode::CREATED, Json(QueuedResponse { id })))
}
