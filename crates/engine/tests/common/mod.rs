//! In-process stand-ins for the host services.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feed_common::error::AppError;
use feed_common::types::{
    Course, FEED_COMPONENT, HostUser, NewQueuedNotification, OutgoingMessage,
};
use feed_engine::host::{CourseDirectory, MessageSender};

struct Module {
    course_id: i64,
    hidden_from: HashSet<i64>,
    missing_for: HashSet<i64>,
}

/// Course directory backed by plain maps.
#[derive(Default)]
pub struct FakeDirectory {
    courses: HashMap<i64, Course>,
    enrolments: HashMap<i64, Vec<HostUser>>,
    view_hidden: HashSet<(i64, i64)>,
    modules: HashMap<i64, Module>,
    visibility_errors: HashSet<i64>,
    unavailable: bool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, id: i64, visible: bool) -> Self {
        self.courses.insert(
            id,
            Course {
                id,
                fullname: format!("Course {}", id),
                shortname: format!("C{}", id),
                idnumber: None,
                visible,
            },
        );
        self
    }

    pub fn enrol(mut self, course_id: i64, user_id: i64) -> Self {
        self.enrolments.entry(course_id).or_default().push(HostUser {
            id: user_id,
            fullname: format!("User {}", user_id),
        });
        self
    }

    pub fn grant_view_hidden(mut self, course_id: i64, user_id: i64) -> Self {
        self.view_hidden.insert((course_id, user_id));
        self
    }

    pub fn module(mut self, course_id: i64, cm_id: i64) -> Self {
        self.modules.insert(
            cm_id,
            Module {
                course_id,
                hidden_from: HashSet::new(),
                missing_for: HashSet::new(),
            },
        );
        self
    }

    pub fn hide_module_from(mut self, cm_id: i64, user_id: i64) -> Self {
        if let Some(module) = self.modules.get_mut(&cm_id) {
            module.hidden_from.insert(user_id);
        }
        self
    }

    /// Resolving the module for this user reports it as deleted.
    pub fn module_missing_for(mut self, cm_id: i64, user_id: i64) -> Self {
        if let Some(module) = self.modules.get_mut(&cm_id) {
            module.missing_for.insert(user_id);
        }
        self
    }

    /// Module visibility checks for this user fail with a transport error.
    pub fn visibility_error_for(mut self, user_id: i64) -> Self {
        self.visibility_errors.insert(user_id);
        self
    }

    /// Every lookup fails with a transport-style error.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable {
            Err(AppError::Host("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CourseDirectory for FakeDirectory {
    async fn course(&self, course_id: i64) -> Result<Option<Course>, AppError> {
        self.check_available()?;
        Ok(self.courses.get(&course_id).cloned())
    }

    async fn enrolled_users(&self, course_id: i64) -> Result<Vec<HostUser>, AppError> {
        self.check_available()?;
        Ok(self.enrolments.get(&course_id).cloned().unwrap_or_default())
    }

    async fn has_capability(
        &self,
        _capability: &str,
        course_id: i64,
        user_id: i64,
    ) -> Result<bool, AppError> {
        self.check_available()?;
        Ok(self.view_hidden.contains(&(course_id, user_id)))
    }

    async fn module_visible(
        &self,
        course: &Course,
        user_id: i64,
        cm_id: i64,
    ) -> Result<bool, AppError> {
        self.check_available()?;
        if self.visibility_errors.contains(&user_id) {
            return Err(AppError::Host("visibility check timed out".to_string()));
        }
        match self.modules.get(&cm_id) {
            Some(module) if module.course_id == course.id && !module.missing_for.contains(&user_id) => {
                Ok(!module.hidden_from.contains(&user_id))
            }
            _ => Err(AppError::NotFound(format!(
                "Course module {} not found in course {}",
                cm_id, course.id
            ))),
        }
    }
}

/// Message sender that records every message it accepts.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutgoingMessage>>,
    reject: HashSet<i64>,
    delay: Duration,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to this user fail.
    pub fn rejecting(mut self, user_id: i64) -> Self {
        self.reject.insert(user_id);
        self
    }

    /// Every send takes this long before it is accepted.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<i64> {
        self.sent().iter().map(|m| m.user_to_id).collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), AppError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.reject.contains(&message.user_to_id) {
            return Err(AppError::Delivery(format!(
                "user {} has no delivery channel",
                message.user_to_id
            )));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn queued_row(course_id: i64, cm_id: i64, time_created: DateTime<Utc>) -> NewQueuedNotification {
    NewQueuedNotification {
        user_from_id: 2,
        course_id,
        cm_id,
        small_message: "Fake activity created in Course.".to_string(),
        component: FEED_COMPONENT.to_string(),
        module_name: "page".to_string(),
        time_created,
        context_url: format!("http://lms.test/mod/page/view.php?id={}", cm_id),
        context_url_name: "Fake activity".to_string(),
    }
}
