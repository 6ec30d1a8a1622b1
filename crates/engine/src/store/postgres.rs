use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use feed_common::error::AppError;
use feed_common::types::{FeedHistoryEntry, NewQueuedNotification, QueueStatus, QueuedNotification};

use super::{QueueStore, ensure_terminal};

/// PostgreSQL-backed queue store (`activity_queue` + `activity_history`).
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert(&self, row: &NewQueuedNotification) -> Result<i64, AppError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO activity_queue
                (user_from_id, course_id, cm_id, small_message, component, module_name,
                 time_created, context_url, context_url_name, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(row.user_from_id)
        .bind(row.course_id)
        .bind(row.cm_id)
        .bind(&row.small_message)
        .bind(&row.component)
        .bind(&row.module_name)
        .bind(row.time_created)
        .bind(&row.context_url)
        .bind(&row.context_url_name)
        .bind(QueueStatus::Pending.as_i16())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<QueuedNotification>, AppError> {
        let row = sqlx::query_as("SELECT * FROM activity_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_pending(&self) -> Result<Vec<QueuedNotification>, AppError> {
        let rows = sqlx::query_as("SELECT * FROM activity_queue WHERE status = $1 ORDER BY id ASC")
            .bind(QueueStatus::Pending.as_i16())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn finish(&self, id: i64, status: QueueStatus) -> Result<bool, AppError> {
        ensure_terminal(status)?;

        let result = sqlx::query("UPDATE activity_queue SET status = $1 WHERE id = $2 AND status = $3")
            .bind(status.as_i16())
            .bind(id)
            .bind(QueueStatus::Pending.as_i16())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_history(
        &self,
        course_id: i64,
        user_from_id: i64,
        user_to_id: i64,
        time_created: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO activity_history (course_id, user_from_id, user_to_id, time_created)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(course_id)
        .bind(user_from_id)
        .bind(user_to_id)
        .bind(time_created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(&self) -> Result<Vec<FeedHistoryEntry>, AppError> {
        let entries = sqlx::query_as("SELECT * FROM activity_history ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    async fn delete_sent_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM activity_queue WHERE status = $1 AND time_created < $2")
            .bind(QueueStatus::Sent.as_i16())
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM activity_history WHERE time_created < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_by_sender(&self, user_id: i64) -> Result<Vec<QueuedNotification>, AppError> {
        let rows = sqlx::query_as(
            "SELECT * FROM activity_queue WHERE user_from_id = $1 ORDER BY time_created ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn sender_has_rows(&self, user_id: i64) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM activity_queue WHERE user_from_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn delete_by_sender(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM activity_queue WHERE user_from_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
