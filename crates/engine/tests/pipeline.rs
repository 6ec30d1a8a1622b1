//! Capture → drain → sweep behaviour against in-process host fakes.
//!
//! These run without external services:
//!
//! ```bash
//! cargo test -p feed-engine --test pipeline
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use feed_common::error::AppError;
use feed_common::types::{CourseModuleEvent, ModuleAction, QueueStatus};
use feed_engine::drainer::DRAIN_JOB;
use feed_engine::{
    EventCapture, JobLock, LocalJobLock, LockLease, MemoryQueueStore, PrivacyService, QueueDrainer,
    QueueStore, RetentionSweeper, SweepOutcome,
};

use common::{FakeDirectory, RecordingSender, queued_row};

const LOCK_TTL: Duration = Duration::from_secs(60);

struct Harness {
    store: Arc<MemoryQueueStore>,
    sender: Arc<RecordingSender>,
    lock: Arc<LocalJobLock>,
    drainer: QueueDrainer,
}

fn harness(directory: FakeDirectory, sender: RecordingSender) -> Harness {
    let store = Arc::new(MemoryQueueStore::new());
    let sender = Arc::new(sender);
    let lock = Arc::new(LocalJobLock::new());
    let drainer = QueueDrainer::new(
        store.clone(),
        Arc::new(directory),
        sender.clone(),
        lock.clone(),
        LOCK_TTL,
    );
    Harness {
        store,
        sender,
        lock,
        drainer,
    }
}

/// Grants leases but refuses every renewal, as if each one had expired.
struct ExpiringLock(LocalJobLock);

#[async_trait]
impl JobLock for ExpiringLock {
    async fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<LockLease>, AppError> {
        self.0.try_acquire(job, ttl).await
    }

    async fn extend(&self, _lease: &LockLease, _ttl: Duration) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn release(&self, lease: LockLease) -> Result<(), AppError> {
        self.0.release(lease).await
    }
}

fn module_event(action: ModuleAction, course_id: i64, cm_id: i64) -> CourseModuleEvent {
    CourseModuleEvent {
        action,
        course_id,
        cm_id,
        module_name: "forum".to_string(),
        name: "Announcements".to_string(),
        user_id: 2,
    }
}

// ============================================================
// Event capture
// ============================================================

#[tokio::test]
async fn test_capture_and_drain_two_events_two_users() {
    let directory = Arc::new(
        FakeDirectory::new()
            .course(10, true)
            .enrol(10, 101)
            .enrol(10, 102)
            .module(10, 500),
    );
    let store = Arc::new(MemoryQueueStore::new());
    let sender = Arc::new(RecordingSender::new());
    let capture = EventCapture::new(store.clone(), directory.clone(), "http://lms.test/");

    let created = capture
        .capture(&module_event(ModuleAction::Created, 10, 500))
        .await
        .unwrap();
    let updated = capture
        .capture(&module_event(ModuleAction::Updated, 10, 500))
        .await
        .unwrap();

    let row = store.get(created).await.unwrap().unwrap();
    assert_eq!(row.small_message, "Announcements created in Course 10.");
    assert_eq!(row.context_url, "http://lms.test/mod/forum/view.php?id=500");
    assert_eq!(row.status, QueueStatus::Pending);
    assert_eq!(
        store.get(updated).await.unwrap().unwrap().small_message,
        "Announcements updated in Course 10."
    );

    let drainer = QueueDrainer::new(
        store.clone(),
        directory,
        sender.clone(),
        Arc::new(LocalJobLock::new()),
        LOCK_TTL,
    );
    let report = drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(report.sent, 2);
    assert_eq!(report.messages_delivered, 4);
    assert_eq!(sender.sent().len(), 4);
    for id in [created, updated] {
        assert_eq!(store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
    }
    assert_eq!(store.list_history().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_capture_missing_course_inserts_nothing() {
    let store = Arc::new(MemoryQueueStore::new());
    let capture = EventCapture::new(
        store.clone(),
        Arc::new(FakeDirectory::new()),
        "http://lms.test",
    );

    let result = capture
        .capture(&module_event(ModuleAction::Created, 404, 1))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(store.is_empty());
}

// ============================================================
// Drainer
// ============================================================

#[tokio::test]
async fn test_drain_delivers_to_users_who_can_see_module() {
    let h = harness(
        FakeDirectory::new()
            .course(1, true)
            .enrol(1, 11)
            .enrol(1, 12)
            .enrol(1, 13)
            .module(1, 100)
            .hide_module_from(100, 12),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(h.sender.recipients(), vec![11, 13]);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);

    let message = &h.sender.sent()[0];
    assert_eq!(message.user_from_id, 2);
    assert_eq!(message.subject, "Fake activity created in Course.");
    assert_eq!(message.context_url, "http://lms.test/mod/page/view.php?id=100");
}

#[tokio::test]
async fn test_drain_missing_course_marks_failed() {
    let h = harness(
        FakeDirectory::new().course(1, true).enrol(1, 11).module(1, 100),
        RecordingSender::new(),
    );
    let bad = h.store.insert(&queued_row(99, 100, Utc::now())).await.unwrap();
    let good = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(h.store.get(bad).await.unwrap().unwrap().status, QueueStatus::Failed);
    assert_eq!(h.store.get(good).await.unwrap().unwrap().status, QueueStatus::Sent);
    assert!(h.sender.sent().iter().all(|m| m.course_id == 1));
}

#[tokio::test]
async fn test_drain_invalid_module_marks_failed() {
    let h = harness(
        FakeDirectory::new().course(1, true).enrol(1, 11).enrol(1, 12),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 777, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.failed, 1);
    assert!(h.sender.sent().is_empty());
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Failed);
}

#[tokio::test]
async fn test_drain_invalid_module_stops_at_first_missing_recipient() {
    let h = harness(
        FakeDirectory::new()
            .course(1, true)
            .enrol(1, 11)
            .enrol(1, 12)
            .enrol(1, 13)
            .module(1, 100)
            .module_missing_for(100, 12),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    // 11 keeps its message, 13 is never reached.
    assert_eq!(h.sender.recipients(), vec![11]);
    assert_eq!(report.failed, 1);
    assert_eq!(report.messages_delivered, 1);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Failed);
    assert_eq!(h.store.list_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_drain_hidden_course_without_viewers_never_resolves_module() {
    let h = harness(
        FakeDirectory::new().course(1, false).enrol(1, 11).enrol(1, 12),
        RecordingSender::new(),
    );
    // cm 777 does not exist, but nobody can see the course to ask.
    let id = h.store.insert(&queued_row(1, 777, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.sent, 1);
    assert!(h.sender.sent().is_empty());
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_drain_visibility_error_skips_only_that_user() {
    let h = harness(
        FakeDirectory::new()
            .course(1, true)
            .enrol(1, 11)
            .enrol(1, 12)
            .enrol(1, 13)
            .module(1, 100)
            .visibility_error_for(12),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(h.sender.recipients(), vec![11, 13]);
    assert_eq!(report.sent, 1);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_drain_zero_recipients_still_sent() {
    let h = harness(
        FakeDirectory::new().course(1, true).module(1, 100),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    h.drainer.run_pass().await.unwrap().unwrap();

    assert!(h.sender.sent().is_empty());
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_drain_hidden_course_requires_capability() {
    let h = harness(
        FakeDirectory::new()
            .course(1, false)
            .enrol(1, 11)
            .enrol(1, 12)
            .grant_view_hidden(1, 12)
            .module(1, 100),
        RecordingSender::new(),
    );
    h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(h.sender.recipients(), vec![12]);
}

#[tokio::test]
async fn test_drain_swallows_delivery_failure() {
    let h = harness(
        FakeDirectory::new()
            .course(1, true)
            .enrol(1, 11)
            .enrol(1, 12)
            .module(1, 100),
        RecordingSender::new().rejecting(11),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.delivery_failures, 1);
    assert_eq!(report.messages_delivered, 1);
    assert_eq!(h.sender.recipients(), vec![12]);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
    assert_eq!(h.store.list_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_drain_pass_is_noop() {
    let h = harness(
        FakeDirectory::new().course(1, true).enrol(1, 11).module(1, 100),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    h.drainer.run_pass().await.unwrap().unwrap();
    let second = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(second.rows, 0);
    assert_eq!(second.messages_delivered, 0);
    assert_eq!(h.sender.sent().len(), 1);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_drain_skipped_while_lock_held() {
    let h = harness(
        FakeDirectory::new().course(1, true).enrol(1, 11).module(1, 100),
        RecordingSender::new(),
    );
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let lease = h.lock.try_acquire(DRAIN_JOB, LOCK_TTL).await.unwrap().unwrap();
    assert!(h.drainer.run_pass().await.unwrap().is_none());
    assert!(h.sender.sent().is_empty());
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Pending);

    h.lock.release(lease).await.unwrap();
    assert!(h.drainer.run_pass().await.unwrap().is_some());
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_slow_pass_keeps_lock_past_ttl() {
    let ttl = Duration::from_millis(100);
    let store = Arc::new(MemoryQueueStore::new());
    let sender = Arc::new(RecordingSender::new().slow(Duration::from_millis(300)));
    let lock = Arc::new(LocalJobLock::new());
    let directory = Arc::new(
        FakeDirectory::new()
            .course(1, true)
            .enrol(1, 10)
            .enrol(1, 11)
            .module(1, 100),
    );
    let drainer = |store: Arc<MemoryQueueStore>| {
        QueueDrainer::new(store, directory.clone(), sender.clone(), lock.clone(), ttl)
    };
    let first = drainer(store.clone());
    let second = drainer(store.clone());
    let id = store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let running = tokio::spawn(async move { first.run_pass().await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(second.run_pass().await.unwrap().is_none());

    let report = running.await.unwrap().unwrap().unwrap();
    assert!(!report.interrupted);
    assert_eq!(sender.recipients(), vec![10, 11]);
    assert_eq!(store.get(id).await.unwrap().unwrap().status, QueueStatus::Sent);
}

#[tokio::test]
async fn test_drain_stops_when_lease_is_lost() {
    let store = Arc::new(MemoryQueueStore::new());
    let sender = Arc::new(RecordingSender::new().slow(Duration::from_millis(60)));
    let drainer = QueueDrainer::new(
        store.clone(),
        Arc::new(FakeDirectory::new().course(1, true).enrol(1, 11).module(1, 100)),
        sender.clone(),
        Arc::new(ExpiringLock(LocalJobLock::new())),
        Duration::from_millis(30),
    );
    let first = store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();
    let second = store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = drainer.run_pass().await.unwrap().unwrap();

    assert!(report.interrupted);
    assert_eq!(report.rows, 1);
    assert_eq!(sender.sent().len(), 1);
    assert_eq!(store.get(first).await.unwrap().unwrap().status, QueueStatus::Sent);
    assert_eq!(store.get(second).await.unwrap().unwrap().status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_drain_defers_rows_when_host_unavailable() {
    let h = harness(FakeDirectory::new().unavailable(), RecordingSender::new());
    let id = h.store.insert(&queued_row(1, 100, Utc::now())).await.unwrap();

    let report = h.drainer.run_pass().await.unwrap().unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, QueueStatus::Pending);
}

// ============================================================
// Retention sweeper
// ============================================================

#[tokio::test]
async fn test_sweeper_removes_aged_sent_rows_only() {
    let store = Arc::new(MemoryQueueStore::new());
    let now = Utc::now();

    let old_sent = store
        .seed(&queued_row(1, 100, now - chrono::Duration::seconds(6)), QueueStatus::Sent)
        .unwrap();
    let old_pending = store
        .seed(&queued_row(1, 100, now - chrono::Duration::seconds(10)), QueueStatus::Pending)
        .unwrap();
    let old_failed = store
        .seed(&queued_row(1, 100, now - chrono::Duration::seconds(10)), QueueStatus::Failed)
        .unwrap();
    let fresh_sent = store.seed(&queued_row(1, 100, now), QueueStatus::Sent).unwrap();

    store
        .append_history(1, 2, 11, now - chrono::Duration::seconds(6))
        .await
        .unwrap();
    store.append_history(1, 11, 2, now).await.unwrap();

    let sweeper = RetentionSweeper::new(store.clone(), Arc::new(LocalJobLock::new()), LOCK_TTL, 5);
    let outcome = sweeper.sweep_at(now).await.unwrap();

    let report = match outcome {
        SweepOutcome::Completed(report) => report,
        other => panic!("expected a completed sweep, got {:?}", other),
    };
    assert_eq!(report.queue_deleted, 1);
    assert_eq!(report.history_deleted, 1);

    assert!(store.get(old_sent).await.unwrap().is_none());
    assert!(store.get(old_pending).await.unwrap().is_some());
    assert!(store.get(old_failed).await.unwrap().is_some());
    assert!(store.get(fresh_sent).await.unwrap().is_some());

    let history = store.list_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_from_id, 11);
}

#[tokio::test]
async fn test_sweeper_zero_delay_deletes_nothing() {
    let store = Arc::new(MemoryQueueStore::new());
    let ancient = Utc::now() - chrono::Duration::days(3650);
    store.seed(&queued_row(1, 100, ancient), QueueStatus::Sent).unwrap();
    store.append_history(1, 2, 11, ancient).await.unwrap();

    let sweeper = RetentionSweeper::new(store.clone(), Arc::new(LocalJobLock::new()), LOCK_TTL, 0);

    assert_eq!(sweeper.run_pass().await.unwrap(), SweepOutcome::Disabled);
    assert_eq!(store.len(), 1);
    assert_eq!(store.list_history().await.unwrap().len(), 1);
}

// ============================================================
// Privacy
// ============================================================

#[tokio::test]
async fn test_privacy_export_and_delete_by_sender() {
    let store = Arc::new(MemoryQueueStore::new());
    let now = Utc::now();

    let mut other = queued_row(1, 100, now);
    other.user_from_id = 3;
    store.insert(&other).await.unwrap();
    store
        .seed(&queued_row(1, 100, now - chrono::Duration::seconds(30)), QueueStatus::Sent)
        .unwrap();
    store.insert(&queued_row(1, 101, now)).await.unwrap();

    let privacy = PrivacyService::new(store.clone());

    assert!(privacy.user_has_data(2).await.unwrap());
    assert!(!privacy.user_has_data(4).await.unwrap());

    let export = privacy.export_user_data(2).await.unwrap();
    assert_eq!(export.len(), 2);
    assert_eq!(export[0].sent, "Yes");
    assert_eq!(export[0].cm_id, 100);
    assert_eq!(export[1].sent, "No");

    assert_eq!(privacy.delete_user_data(2).await.unwrap(), 2);
    assert!(!privacy.user_has_data(2).await.unwrap());
    assert!(privacy.user_has_data(3).await.unwrap());
}

#[tokio::test]
async fn test_privacy_export_reports_failed_rows_as_not_sent() {
    let store = Arc::new(MemoryQueueStore::new());
    store
        .seed(&queued_row(1, 100, Utc::now()), QueueStatus::Failed)
        .unwrap();

    let export = PrivacyService::new(store).export_user_data(2).await.unwrap();

    assert_eq!(export.len(), 1);
    assert_eq!(export[0].sent, "No");
    assert_eq!(export[0].status, QueueStatus::Failed);
}
