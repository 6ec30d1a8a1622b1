//! Queue-and-deliver pipeline for course activity notifications.

pub mod capture;
pub mod drainer;
pub mod host;
pub mod lock;
pub mod privacy;
pub mod store;
pub mod sweeper;

pub use capture::EventCapture;
pub use drainer::{DrainReport, QueueDrainer};
pub use host::{CourseDirectory, MessageSender};
pub use lock::{JobLock, LocalJobLock, LockLease, RedisJobLock, hold_while};
pub use privacy::{ExportedNotification, PrivacyService};
pub use store::{MemoryQueueStore, PgQueueStore, QueueStore};
pub use sweeper::{RetentionSweeper, SweepOutcome, SweepReport};
