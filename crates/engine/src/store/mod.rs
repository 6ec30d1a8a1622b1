//! Persistence for the activity queue and the feed history.

mod memory;
mod postgres;

pub use memory::MemoryQueueStore;
pub use postgres::PgQueueStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feed_common::error::AppError;
use feed_common::types::{FeedHistoryEntry, NewQueuedNotification, QueueStatus, QueuedNotification};

/// Storage handle passed explicitly to every job.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a `pending` row and return its id.
    async fn insert(&self, row: &NewQueuedNotification) -> Result<i64, AppError>;

    async fn get(&self, id: i64) -> Result<Option<QueuedNotification>, AppError>;

    /// All `pending` rows in insertion (id) order.
    async fn list_pending(&self) -> Result<Vec<QueuedNotification>, AppError>;

    /// Move a `pending` row to a terminal status.
    ///
    /// Returns `false` when the row is missing or no longer pending; terminal
    /// rows are never rewritten. Passing `Pending` is a validation error.
    async fn finish(&self, id: i64, status: QueueStatus) -> Result<bool, AppError>;

    async fn append_history(
        &self,
        course_id: i64,
        user_from_id: i64,
        user_to_id: i64,
        time_created: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn list_history(&self) -> Result<Vec<FeedHistoryEntry>, AppError>;

    /// Delete `sent` queue rows created before `cutoff`.
    async fn delete_sent_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete history entries created before `cutoff`.
    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Rows originated by a user, oldest first.
    async fn list_by_sender(&self, user_id: i64) -> Result<Vec<QueuedNotification>, AppError>;

    async fn sender_has_rows(&self, user_id: i64) -> Result<bool, AppError>;

    async fn delete_by_sender(&self, user_id: i64) -> Result<u64, AppError>;
}

pub(crate) fn ensure_terminal(status: QueueStatus) -> Result<(), AppError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Cannot move a queue row to '{}'",
            status
        )))
    }
}
