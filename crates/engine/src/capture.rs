//! Event capture: turns course-module created/updated events into queue rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use feed_common::error::AppError;
use feed_common::types::{
    Course, CourseModuleEvent, FEED_COMPONENT, ModuleAction, NewQueuedNotification,
};

use crate::host::CourseDirectory;
use crate::store::QueueStore;

/// Appends one `pending` notification per module event.
pub struct EventCapture {
    store: Arc<dyn QueueStore>,
    directory: Arc<dyn CourseDirectory>,
    host_base_url: String,
}

impl EventCapture {
    pub fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<dyn CourseDirectory>,
        host_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            host_base_url: host_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Queue a notification for the event and return the new row id.
    ///
    /// Fails with `NotFound` when the course no longer exists; nothing is
    /// inserted in that case.
    pub async fn capture(&self, event: &CourseModuleEvent) -> Result<i64, AppError> {
        validate_event(event)?;

        let course = self
            .directory
            .course(event.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", event.course_id)))?;

        let row = build_notification(event, &course, &self.host_base_url, Utc::now());
        let id = self.store.insert(&row).await?;

        tracing::info!(
            queue_id = id,
            course_id = event.course_id,
            cm_id = event.cm_id,
            action = %event.action,
            "Notification queued"
        );

        Ok(id)
    }
}

/// Notification text, e.g. `"Week 3 quiz created in MATH101."`.
pub fn message_text(action: ModuleAction, name: &str, course: &Course) -> String {
    format!("{} {} in {}.", name, action, course.display_name())
}

/// Link to the module's view page on the host.
pub fn module_url(host_base_url: &str, module_name: &str, cm_id: i64) -> String {
    format!("{}/mod/{}/view.php?id={}", host_base_url, module_name, cm_id)
}

pub fn build_notification(
    event: &CourseModuleEvent,
    course: &Course,
    host_base_url: &str,
    now: DateTime<Utc>,
) -> NewQueuedNotification {
    NewQueuedNotification {
        user_from_id: event.user_id,
        course_id: event.course_id,
        cm_id: event.cm_id,
        small_message: message_text(event.action, &event.name, course),
        component: FEED_COMPONENT.to_string(),
        module_name: event.module_name.clone(),
        time_created: now,
        context_url: module_url(host_base_url, &event.module_name, event.cm_id),
        context_url_name: event.name.clone(),
    }
}

fn validate_event(event: &CourseModuleEvent) -> Result<(), AppError> {
    // module_name ends up in a URL path segment
    let slug_ok = !event.module_name.is_empty()
        && event
            .module_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !slug_ok {
        return Err(AppError::Validation(format!(
            "Invalid module name '{}'",
            event.module_name
        )));
    }

    if event.name.trim().is_empty() {
        return Err(AppError::Validation("Module instance name is empty".to_string()));
    }

    Ok(())
}
