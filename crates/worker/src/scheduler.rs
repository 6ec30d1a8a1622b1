//! Periodic drivers for the drain and sweep jobs.
//!
//! Each job ticks on its own `tokio::time::interval` and stops when the
//! cancellation token fires. A failed pass is logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use feed_engine::{QueueDrainer, RetentionSweeper, SweepOutcome};

/// Run drain passes every `every` until `cancel` is triggered.
pub async fn run_drain_loop(drainer: Arc<QueueDrainer>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Queue drainer started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Queue drainer stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = drainer.run_pass().await {
                    tracing::error!(error = %e, "Drain pass failed");
                }
            }
        }
    }
}

/// Run retention sweeps every `every` until `cancel` is triggered.
pub async fn run_sweep_loop(sweeper: Arc<RetentionSweeper>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Retention sweeper started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Retention sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match sweeper.run_pass().await {
                    Ok(SweepOutcome::Disabled) => {
                        tracing::debug!("Retention sweep disabled, nothing to do");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }
    }
}
