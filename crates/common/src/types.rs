use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Component name stamped on every queued notification.
pub const FEED_COMPONENT: &str = "course_activity_feed";

/// Message provider under which the host files delivered notifications.
pub const MESSAGE_PROVIDER: &str = "course_updates";

/// Capability that lets a user see (and be notified about) hidden courses.
pub const VIEW_HIDDEN_COURSES_CAPABILITY: &str = "moodle/course:viewhiddencourses";

/// Delivery state of a queued notification.
///
/// Persisted as a small integer: `0` pending, `1` sent, `-1` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum QueueStatus {
    Pending = 0,
    Sent = 1,
    Failed = -1,
}

impl QueueStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Terminal states are never rewritten by the drainer.
    pub fn is_terminal(self) -> bool {
        !matches!(self, QueueStatus::Pending)
    }

    /// Only `pending → sent` and `pending → failed` are legal.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        self == QueueStatus::Pending && next.is_terminal()
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Sent => write!(f, "sent"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Which course-module lifecycle event produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleAction {
    Created,
    Updated,
}

impl std::fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleAction::Created => write!(f, "created"),
            ModuleAction::Updated => write!(f, "updated"),
        }
    }
}

/// A course-module created/updated event as delivered by the host event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModuleEvent {
    pub action: ModuleAction,
    pub course_id: i64,
    /// Course-module id (the event's object id)
    pub cm_id: i64,
    /// Module type, e.g. `forum` or `assign`
    pub module_name: String,
    /// Instance name shown to users, e.g. "Week 3 discussion"
    pub name: String,
    /// User who triggered the change
    pub user_id: i64,
}

/// A notification row in the activity queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueuedNotification {
    pub id: i64,
    pub user_from_id: i64,
    pub course_id: i64,
    pub cm_id: i64,
    pub small_message: String,
    pub component: String,
    pub module_name: String,
    pub time_created: DateTime<Utc>,
    pub context_url: String,
    pub context_url_name: String,
    pub status: QueueStatus,
}

/// Insert form of a queue row. New rows always start `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueuedNotification {
    pub user_from_id: i64,
    pub course_id: i64,
    pub cm_id: i64,
    pub small_message: String,
    pub component: String,
    pub module_name: String,
    pub time_created: DateTime<Utc>,
    pub context_url: String,
    pub context_url_name: String,
}

/// One delivered feed entry, kept until the retention sweeper prunes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedHistoryEntry {
    pub id: i64,
    pub course_id: i64,
    pub user_from_id: i64,
    pub user_to_id: i64,
    pub time_created: DateTime<Utc>,
}

/// A course as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub fullname: String,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub idnumber: Option<String>,
    pub visible: bool,
}

impl Course {
    /// Name used in notification text: the id number when set, else the full name.
    pub fn display_name(&self) -> &str {
        match self.idnumber.as_deref() {
            Some(idnumber) if !idnumber.trim().is_empty() => idnumber,
            _ => &self.fullname,
        }
    }
}

/// A user enrolled in a course, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUser {
    pub id: i64,
    #[serde(default)]
    pub fullname: String,
}

/// Body format of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Plain,
    Html,
}

/// A message handed to the host messaging service for one recipient.
///
/// Built from a queue row through an explicit field mapping; nothing else
/// from the row leaks into the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub provider: String,
    pub component: String,
    pub user_from_id: i64,
    pub user_to_id: i64,
    pub course_id: i64,
    pub subject: String,
    pub full_message: String,
    pub full_message_format: MessageFormat,
    pub full_message_html: String,
    pub small_message: String,
    pub context_url: String,
    pub context_url_name: String,
    pub notification: bool,
}

impl OutgoingMessage {
    pub fn for_recipient(row: &QueuedNotification, user_to_id: i64) -> Self {
        Self {
            provider: MESSAGE_PROVIDER.to_string(),
            component: row.component.clone(),
            user_from_id: row.user_from_id,
            user_to_id,
            course_id: row.course_id,
            subject: row.small_message.clone(),
            full_message: row.small_message.clone(),
            full_message_format: MessageFormat::Plain,
            full_message_html: row.small_message.clone(),
            small_message: row.small_message.clone(),
            context_url: row.context_url.clone(),
            context_url_name: row.context_url_name.clone(),
            notification: true,
        }
    }
}
