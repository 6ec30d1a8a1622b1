//! Export and erasure of the queue rows a user originated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use feed_common::error::AppError;
use feed_common::types::{QueueStatus, QueuedNotification};

use crate::store::QueueStore;

/// A queued notification as handed to a user on a data export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedNotification {
    /// "Yes" once delivered, otherwise "No". A failed row was never
    /// delivered and reads "No"; `status` tells it apart from a pending one.
    pub sent: String,
    pub status: QueueStatus,
    pub course_id: i64,
    pub cm_id: i64,
    pub small_message: String,
    pub component: String,
    pub module_name: String,
    /// RFC 3339
    pub time_created: String,
    pub context_url: String,
    pub context_url_name: String,
}

impl From<&QueuedNotification> for ExportedNotification {
    fn from(row: &QueuedNotification) -> Self {
        Self {
            sent: if row.status == QueueStatus::Sent { "Yes" } else { "No" }.to_string(),
            status: row.status,
            course_id: row.course_id,
            cm_id: row.cm_id,
            small_message: row.small_message.clone(),
            component: row.component.clone(),
            module_name: row.module_name.clone(),
            time_created: row.time_created.to_rfc3339(),
            context_url: row.context_url.clone(),
            context_url_name: row.context_url_name.clone(),
        }
    }
}

pub struct PrivacyService {
    store: Arc<dyn QueueStore>,
}

impl PrivacyService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    pub async fn user_has_data(&self, user_id: i64) -> Result<bool, AppError> {
        self.store.sender_has_rows(user_id).await
    }

    /// Every notification the user triggered, oldest first.
    pub async fn export_user_data(&self, user_id: i64) -> Result<Vec<ExportedNotification>, AppError> {
        let rows = self.store.list_by_sender(user_id).await?;
        Ok(rows.iter().map(ExportedNotification::from).collect())
    }

    /// Remove every notification the user triggered. Returns the number of rows deleted.
    pub async fn delete_user_data(&self, user_id: i64) -> Result<u64, AppError> {
        let deleted = self.store.delete_by_sender(user_id).await?;
        tracing::info!(user_id, deleted, "Deleted queued notifications for user");
        Ok(deleted)
    }
}
