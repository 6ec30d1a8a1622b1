//! Queue drainer: delivers pending notifications to every enrolled user who
//! can see the course and the module.
//!
//! Per row:
//! 1. Resolve the course (missing -> `failed`)
//! 2. Resolve enrolled users
//! 3. Filter on course visibility (or the view-hidden capability) and module visibility
//! 4. Send one message per qualifying user, swallowing delivery failures
//! 5. Mark the row `sent`, or `failed` if the module reference was invalid
//!
//! An invalid module stops the recipient loop for that row; messages already
//! handed to the host are not recalled.
//!
//! The job lease is renewed while the pass runs. If a renewal finds the lease
//! gone, the pass stops before the next row and leaves it pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use feed_common::error::AppError;
use feed_common::types::{OutgoingMessage, QueueStatus, QueuedNotification, VIEW_HIDDEN_COURSES_CAPABILITY};

use crate::host::{CourseDirectory, MessageSender};
use crate::lock::{JobLock, hold_while};
use crate::store::QueueStore;

/// Lock name held for the duration of a drain pass.
pub const DRAIN_JOB: &str = "drain_queue";

/// Totals for one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Pending rows examined
    pub rows: u32,
    pub sent: u32,
    pub failed: u32,
    /// Rows left pending after a transient host error
    pub deferred: u32,
    pub messages_delivered: u32,
    pub delivery_failures: u32,
    /// The lease was lost and the pass stopped early
    pub interrupted: bool,
}

enum RowOutcome {
    Finished(QueueStatus),
    Deferred,
}

pub struct QueueDrainer {
    store: Arc<dyn QueueStore>,
    directory: Arc<dyn CourseDirectory>,
    sender: Arc<dyn MessageSender>,
    lock: Arc<dyn JobLock>,
    lock_ttl: Duration,
}

impl QueueDrainer {
    pub fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<dyn CourseDirectory>,
        sender: Arc<dyn MessageSender>,
        lock: Arc<dyn JobLock>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            sender,
            lock,
            lock_ttl,
        }
    }

    /// Run one drain pass under the job lock.
    ///
    /// Returns `Ok(None)` when another pass holds the lock.
    pub async fn run_pass(&self) -> Result<Option<DrainReport>, AppError> {
        let Some(lease) = self.lock.try_acquire(DRAIN_JOB, self.lock_ttl).await? else {
            tracing::info!("Drain pass skipped, another pass is running");
            return Ok(None);
        };

        let lost = AtomicBool::new(false);
        let result = hold_while(
            self.lock.as_ref(),
            &lease,
            self.lock_ttl,
            &lost,
            self.drain(&lost),
        )
        .await;

        if let Err(e) = self.lock.release(lease).await {
            tracing::warn!(error = %e, "Failed to release drain lock");
        }

        let report = result?;
        tracing::info!(
            rows = report.rows,
            sent = report.sent,
            failed = report.failed,
            deferred = report.deferred,
            messages = report.messages_delivered,
            delivery_failures = report.delivery_failures,
            interrupted = report.interrupted,
            "Drain pass complete"
        );
        Ok(Some(report))
    }

    async fn drain(&self, lost: &AtomicBool) -> Result<DrainReport, AppError> {
        let rows = self.store.list_pending().await?;
        let mut report = DrainReport::default();

        for row in &rows {
            if lost.load(Ordering::Acquire) {
                tracing::warn!(queue_id = row.id, "Drain lock lost, leaving remaining rows pending");
                report.interrupted = true;
                break;
            }
            report.rows += 1;

            let status = match self.process_row(row, &mut report).await {
                RowOutcome::Finished(status) => status,
                RowOutcome::Deferred => {
                    report.deferred += 1;
                    continue;
                }
            };

            match self.store.finish(row.id, status).await {
                Ok(true) => match status {
                    QueueStatus::Failed => report.failed += 1,
                    _ => report.sent += 1,
                },
                Ok(false) => {
                    tracing::debug!(queue_id = row.id, "Row no longer pending, status left as is");
                }
                Err(e) => {
                    tracing::error!(queue_id = row.id, error = %e, "Failed to persist row status");
                }
            }
        }

        Ok(report)
    }

    async fn process_row(&self, row: &QueuedNotification, report: &mut DrainReport) -> RowOutcome {
        let course = match self.directory.course(row.course_id).await {
            Ok(Some(course)) => course,
            Ok(None) => {
                tracing::warn!(queue_id = row.id, course_id = row.course_id, "Invalid course id");
                return RowOutcome::Finished(QueueStatus::Failed);
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(queue_id = row.id, course_id = row.course_id, "Invalid course id");
                return RowOutcome::Finished(QueueStatus::Failed);
            }
            Err(e) => {
                tracing::warn!(queue_id = row.id, error = %e, "Course lookup failed, retrying next pass");
                return RowOutcome::Deferred;
            }
        };

        let users = match self.directory.enrolled_users(course.id).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(queue_id = row.id, error = %e, "Enrolment lookup failed, retrying next pass");
                return RowOutcome::Deferred;
            }
        };

        let mut status = QueueStatus::Sent;
        let mut notified = 0u32;

        for user in &users {
            if !course.visible && !self.can_view_hidden(course.id, user.id).await {
                continue;
            }

            match self.directory.module_visible(&course, user.id, row.cm_id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        queue_id = row.id,
                        cm_id = row.cm_id,
                        course = %course.shortname,
                        "Invalid course module"
                    );
                    status = QueueStatus::Failed;
                    break;
                }
                Err(e) => {
                    tracing::warn!(queue_id = row.id, user_id = user.id, error = %e, "Module visibility check failed");
                    continue;
                }
            }

            let message = OutgoingMessage::for_recipient(row, user.id);
            match self.sender.send(&message).await {
                Ok(()) => {
                    notified += 1;
                    report.messages_delivered += 1;
                    if let Err(e) = self
                        .store
                        .append_history(row.course_id, row.user_from_id, user.id, Utc::now())
                        .await
                    {
                        tracing::warn!(queue_id = row.id, error = %e, "Failed to record feed history");
                    }
                }
                Err(e) => {
                    report.delivery_failures += 1;
                    tracing::warn!(queue_id = row.id, user_id = user.id, error = %e, "Message delivery failed");
                }
            }
        }

        tracing::debug!(
            queue_id = row.id,
            notified,
            text = %row.small_message,
            "Users notified"
        );

        RowOutcome::Finished(status)
    }

    async fn can_view_hidden(&self, course_id: i64, user_id: i64) -> bool {
        match self
            .directory
            .has_capability(VIEW_HIDDEN_COURSES_CAPABILITY, course_id, user_id)
            .await
        {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(course_id, user_id, error = %e, "Capability check failed");
                false
            }
        }
    }
}
