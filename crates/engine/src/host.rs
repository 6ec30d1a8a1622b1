//! Interfaces to the services the host LMS owns.
//!
//! Courses, enrolments, capabilities, module visibility and message delivery
//! all live in the host. The engine only talks to them through these traits,
//! so the jobs can run against the HTTP client in `feed-host` or against
//! in-process fakes in tests.

use async_trait::async_trait;

use feed_common::error::AppError;
use feed_common::types::{Course, HostUser, OutgoingMessage};

/// Read access to courses, enrolments and permissions.
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    /// Look up a course. `Ok(None)` when it does not exist.
    async fn course(&self, course_id: i64) -> Result<Option<Course>, AppError>;

    /// Users currently enrolled in the course.
    async fn enrolled_users(&self, course_id: i64) -> Result<Vec<HostUser>, AppError>;

    /// Whether `user_id` holds `capability` in the course context.
    async fn has_capability(
        &self,
        capability: &str,
        course_id: i64,
        user_id: i64,
    ) -> Result<bool, AppError>;

    /// Whether the course module is visible to the user.
    ///
    /// Returns `Err(AppError::NotFound)` when `cm_id` is not a module of the course.
    async fn module_visible(
        &self,
        course: &Course,
        user_id: i64,
        cm_id: i64,
    ) -> Result<bool, AppError>;
}

/// The host messaging subsystem.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Hand one message to the host for delivery. No delivery receipt is implied.
    async fn send(&self, message: &OutgoingMessage) -> Result<(), AppError>;
}
