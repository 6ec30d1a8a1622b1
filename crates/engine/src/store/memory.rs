use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feed_common::error::AppError;
use feed_common::types::{FeedHistoryEntry, NewQueuedNotification, QueueStatus, QueuedNotification};

use super::{QueueStore, ensure_terminal};

#[derive(Default)]
struct Inner {
    next_id: i64,
    next_history_id: i64,
    rows: BTreeMap<i64, QueuedNotification>,
    history: Vec<FeedHistoryEntry>,
}

/// In-process queue store for single-node setups and tests.
///
/// Mirrors the SQL semantics of [`super::PgQueueStore`]: ids are assigned in
/// increasing order and status updates only apply to pending rows.
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with an explicit status, bypassing the `pending` default.
    pub fn seed(&self, row: &NewQueuedNotification, status: QueueStatus) -> Result<i64, AppError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            QueuedNotification {
                id,
                user_from_id: row.user_from_id,
                course_id: row.course_id,
                cm_id: row.cm_id,
                small_message: row.small_message.clone(),
                component: row.component.clone(),
                module_name: row.module_name.clone(),
                time_created: row.time_created,
                context_url: row.context_url.clone(),
                context_url_name: row.context_url_name.clone(),
                status,
            },
        );
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("queue store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, row: &NewQueuedNotification) -> Result<i64, AppError> {
        self.seed(row, QueueStatus::Pending)
    }

    async fn get(&self, id: i64) -> Result<Option<QueuedNotification>, AppError> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<QueuedNotification>, AppError> {
        Ok(self
            .lock()?
            .rows
            .values()
            .filter(|row| row.status == QueueStatus::Pending)
            .cloned()
            .collect())
    }

    async fn finish(&self, id: i64, status: QueueStatus) -> Result<bool, AppError> {
        ensure_terminal(status)?;

        let mut inner = self.lock()?;
        match inner.rows.get_mut(&id) {
            Some(row) if row.status.can_transition_to(status) => {
                row.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_history(
        &self,
        course_id: i64,
        user_from_id: i64,
        user_to_id: i64,
        time_created: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner.next_history_id += 1;
        let id = inner.next_history_id;
        inner.history.push(FeedHistoryEntry {
            id,
            course_id,
            user_from_id,
            user_to_id,
            time_created,
        });
        Ok(())
    }

    async fn list_history(&self) -> Result<Vec<FeedHistoryEntry>, AppError> {
        Ok(self.lock()?.history.clone())
    }

    async fn delete_sent_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner
            .rows
            .retain(|_, row| !(row.status == QueueStatus::Sent && row.time_created < cutoff));
        Ok((before - inner.rows.len()) as u64)
    }

    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let before = inner.history.len();
        inner.history.retain(|entry| entry.time_created >= cutoff);
        Ok((before - inner.history.len()) as u64)
    }

    async fn list_by_sender(&self, user_id: i64) -> Result<Vec<QueuedNotification>, AppError> {
        let mut rows: Vec<QueuedNotification> = self
            .lock()?
            .rows
            .values()
            .filter(|row| row.user_from_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.time_created, row.id));
        Ok(rows)
    }

    async fn sender_has_rows(&self, user_id: i64) -> Result<bool, AppError> {
        Ok(self
            .lock()?
            .rows
            .values()
            .any(|row| row.user_from_id == user_id))
    }

    async fn delete_by_sender(&self, user_id: i64) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.user_from_id != user_id);
        Ok((before - inner.rows.len()) as u64)
    }
}
