//! Retention sweeper: purges sent notifications and feed history older than
//! the configured retention delay.
//!
//! A delay of `0` disables purging entirely. Pending and failed rows are
//! never removed.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use feed_common::error::AppError;

use crate::lock::{JobLock, hold_while};
use crate::store::QueueStore;

/// Lock name held for the duration of a sweep.
pub const SWEEP_JOB: &str = "sweep_feed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub queue_deleted: u64,
    pub history_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Retention delay is zero
    Disabled,
    /// Another sweep holds the lock
    Skipped,
    Completed(SweepReport),
}

pub struct RetentionSweeper {
    store: Arc<dyn QueueStore>,
    lock: Arc<dyn JobLock>,
    lock_ttl: Duration,
    retention_delay_secs: u64,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn QueueStore>,
        lock: Arc<dyn JobLock>,
        lock_ttl: Duration,
        retention_delay_secs: u64,
    ) -> Self {
        Self {
            store,
            lock,
            lock_ttl,
            retention_delay_secs,
        }
    }

    pub async fn run_pass(&self) -> Result<SweepOutcome, AppError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepOutcome, AppError> {
        let Some(cutoff) = retention_cutoff(now, self.retention_delay_secs) else {
            tracing::debug!("Retention sweep disabled (delay = 0)");
            return Ok(SweepOutcome::Disabled);
        };

        let Some(lease) = self.lock.try_acquire(SWEEP_JOB, self.lock_ttl).await? else {
            tracing::info!("Retention sweep skipped, another sweep is running");
            return Ok(SweepOutcome::Skipped);
        };

        let lost = AtomicBool::new(false);
        let result = hold_while(
            self.lock.as_ref(),
            &lease,
            self.lock_ttl,
            &lost,
            self.sweep(cutoff),
        )
        .await;

        if let Err(e) = self.lock.release(lease).await {
            tracing::warn!(error = %e, "Failed to release sweep lock");
        }

        let report = result?;
        if report.queue_deleted > 0 || report.history_deleted > 0 {
            tracing::info!(
                cutoff = %report.cutoff,
                queue_deleted = report.queue_deleted,
                history_deleted = report.history_deleted,
                "Retention sweep: purged old rows"
            );
        } else {
            tracing::debug!(cutoff = %report.cutoff, "Retention sweep: no rows to purge");
        }

        Ok(SweepOutcome::Completed(report))
    }

    async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let queue_deleted = self.store.delete_sent_before(cutoff).await?;
        let history_deleted = self.store.delete_history_before(cutoff).await?;

        Ok(SweepReport {
            cutoff,
            queue_deleted,
            history_deleted,
        })
    }
}

/// Rows created strictly before the returned instant are eligible for deletion.
///
/// `None` when purging is disabled.
pub fn retention_cutoff(now: DateTime<Utc>, retention_delay_secs: u64) -> Option<DateTime<Utc>> {
    if retention_delay_secs == 0 {
        return None;
    }
    let cutoff = i64::try_from(retention_delay_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delay| now.checked_sub_signed(delay))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Some(cutoff)
}
