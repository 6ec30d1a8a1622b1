//! HTTP client for the host LMS REST API.
//!
//! Implements both host-facing interfaces of the engine:
//! - [`CourseDirectory`]: course lookup, enrolments, capabilities, module visibility
//! - [`MessageSender`]: hands notifications to the host messaging subsystem
//!
//! Host endpoints (relative to `HOST_API_URL`):
//! - `GET  /courses/{id}`
//! - `GET  /courses/{id}/enrolled-users`
//! - `GET  /courses/{id}/capabilities?capability=&user_id=`
//! - `GET  /courses/{id}/modules/{cm_id}/visibility?user_id=`
//! - `POST /messages`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use feed_common::config::AppConfig;
use feed_common::error::AppError;
use feed_common::types::{Course, HostUser, OutgoingMessage};
use feed_engine::host::{CourseDirectory, MessageSender};

#[derive(Debug, Deserialize)]
struct CapabilityResponse {
    granted: bool,
}

#[derive(Debug, Deserialize)]
struct VisibilityResponse {
    visible: bool,
}

/// reqwest-based client for the host API.
#[derive(Clone)]
pub struct HttpHostClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpHostClient {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.host_api_url.clone(),
            config.host_api_token.clone(),
            Duration::from_secs(config.host_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET a JSON resource. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, AppError> {
        let response = self
            .request(Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Host(format!("GET {}: {}", path, e)))?;

        if !check_status(response.status(), path)? {
            return Ok(None);
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| AppError::Host(format!("GET {}: invalid body: {}", path, e)))?;
        Ok(Some(body))
    }
}

/// `Ok(true)` on success, `Ok(false)` on 404, `Err` otherwise.
fn check_status(status: StatusCode, path: &str) -> Result<bool, AppError> {
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(AppError::Config(format!(
            "Host rejected credentials for {} ({})",
            path, status
        )))
    } else {
        Err(AppError::Host(format!("{} returned {}", path, status)))
    }
}

#[async_trait]
impl CourseDirectory for HttpHostClient {
    async fn course(&self, course_id: i64) -> Result<Option<Course>, AppError> {
        self.get_json(&format!("courses/{}", course_id), &[]).await
    }

    async fn enrolled_users(&self, course_id: i64) -> Result<Vec<HostUser>, AppError> {
        let path = format!("courses/{}/enrolled-users", course_id);
        self.get_json(&path, &[])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
    }

    async fn has_capability(
        &self,
        capability: &str,
        course_id: i64,
        user_id: i64,
    ) -> Result<bool, AppError> {
        let path = format!("courses/{}/capabilities", course_id);
        let query = [
            ("capability", capability.to_string()),
            ("user_id", user_id.to_string()),
        ];
        let response: Option<CapabilityResponse> = self.get_json(&path, &query).await?;
        Ok(response.is_some_and(|r| r.granted))
    }

    async fn module_visible(
        &self,
        course: &Course,
        user_id: i64,
        cm_id: i64,
    ) -> Result<bool, AppError> {
        let path = format!("courses/{}/modules/{}/visibility", course.id, cm_id);
        let response: VisibilityResponse = self
            .get_json(&path, &[("user_id", user_id.to_string())])
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Course module {} not found in {}",
                    cm_id, course.shortname
                ))
            })?;
        Ok(response.visible)
    }
}

#[async_trait]
impl MessageSender for HttpHostClient {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), AppError> {
        let response = self
            .request(Method::POST, "messages")
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Delivery(format!(
                "host answered {} for recipient {}",
                status, message.user_to_id
            )));
        }

        tracing::debug!(
            user_to_id = message.user_to_id,
            course_id = message.course_id,
            "Message handed to host"
        );
        Ok(())
    }
}
