//! Single-flight job locks.
//!
//! A drain or sweep pass must hold the lease for its job name before it
//! touches the queue, so two scheduler ticks (or two worker processes) never
//! process the same rows concurrently.
//!
//! The Redis implementation uses `SET NX EX` for atomic acquire with a TTL
//! that frees the key if the holder dies mid-pass. A live holder renews the
//! TTL through [`hold_while`] for as long as its work runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use feed_common::error::AppError;

/// Compare-and-delete: only the lease that set the key may remove it.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Compare-and-expire: only the current holder may push the TTL out.
const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Floor for the renewal period so a tiny TTL cannot spin the keep-alive.
const MIN_RENEW_EVERY: Duration = Duration::from_millis(10);

/// Proof of holding a job lock. Hand it back to [`JobLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    job: String,
    token: String,
}

impl LockLease {
    fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            token: Uuid::new_v4().to_string(),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }
}

#[async_trait]
pub trait JobLock: Send + Sync {
    /// Try to take the lock for `job`. `Ok(None)` when someone else holds it.
    async fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<LockLease>, AppError>;

    /// Push the expiry of a held lease out to `ttl` from now.
    ///
    /// `Ok(false)` when the lease has expired and may belong to someone else.
    async fn extend(&self, lease: &LockLease, ttl: Duration) -> Result<bool, AppError>;

    async fn release(&self, lease: LockLease) -> Result<(), AppError>;
}

/// Drive `work` to completion while renewing `lease` every third of `ttl`.
///
/// `lost` is raised once a renewal reports the lease gone; `work` is expected
/// to check it between units and stop early. Renewal errors are logged and
/// retried on the next tick.
pub async fn hold_while<F>(
    lock: &dyn JobLock,
    lease: &LockLease,
    ttl: Duration,
    lost: &AtomicBool,
    work: F,
) -> F::Output
where
    F: Future,
{
    let mut renew = tokio::time::interval((ttl / 3).max(MIN_RENEW_EVERY));
    renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately; the lease is fresh.
    renew.tick().await;

    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            output = &mut work => return output,
            _ = renew.tick(), if !lost.load(Ordering::Acquire) => {
                match lock.extend(lease, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(job = %lease.job, "Job lock lost while running");
                        lost.store(true, Ordering::Release);
                    }
                    Err(e) => {
                        tracing::warn!(job = %lease.job, error = %e, "Failed to extend job lock");
                    }
                }
            }
        }
    }
}

/// Redis-backed lock shared by every worker process.
#[derive(Clone)]
pub struct RedisJobLock {
    redis: ConnectionManager,
}

impl RedisJobLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(job: &str) -> String {
        format!("feed:lock:{}", job)
    }
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<LockLease>, AppError> {
        let lease = LockLease::new(job);
        let mut conn = self.redis.clone();

        // SET key token NX EX ttl -> Some("OK") when taken, None when held elsewhere
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::key(job))
            .arg(&lease.token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        if result.is_some() {
            Ok(Some(lease))
        } else {
            tracing::debug!(job, "Job lock held elsewhere");
            Ok(None)
        }
    }

    async fn extend(&self, lease: &LockLease, ttl: Duration) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        let extended: i64 = redis::Script::new(EXTEND_SCRIPT)
            .key(Self::key(&lease.job))
            .arg(&lease.token)
            .arg(ttl.as_millis().max(1) as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, lease: LockLease) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(Self::key(&lease.job))
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            tracing::warn!(job = %lease.job, "Job lock expired before release");
        }
        Ok(())
    }
}

/// In-process lock for single-node deployments and tests.
#[derive(Default)]
pub struct LocalJobLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl LocalJobLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, AppError> {
        self.held
            .lock()
            .map_err(|_| AppError::Internal("job lock mutex poisoned".to_string()))
    }
}

#[async_trait]
impl JobLock for LocalJobLock {
    async fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<LockLease>, AppError> {
        let mut held = self.held()?;
        let now = Instant::now();

        if let Some((_, expires_at)) = held.get(job)
            && *expires_at > now
        {
            return Ok(None);
        }

        let lease = LockLease::new(job);
        held.insert(job.to_string(), (lease.token.clone(), now + ttl));
        Ok(Some(lease))
    }

    async fn extend(&self, lease: &LockLease, ttl: Duration) -> Result<bool, AppError> {
        let mut held = self.held()?;
        let now = Instant::now();
        match held.get_mut(&lease.job) {
            Some((token, expires_at)) if *token == lease.token && *expires_at > now => {
                *expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: LockLease) -> Result<(), AppError> {
        let mut held = self.held()?;
        if held
            .get(&lease.job)
            .is_some_and(|(token, _)| *token == lease.token)
        {
            held.remove(&lease.job);
        }
        Ok(())
    }
}
