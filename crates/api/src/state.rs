//! Shared application state for the Axum API server.

use std::sync::Arc;

use feed_common::config::AppConfig;
use feed_engine::{CourseDirectory, EventCapture, PrivacyService, QueueStore};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub capture: Arc<EventCapture>,
    pub privacy: Arc<PrivacyService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<dyn CourseDirectory>,
        config: AppConfig,
    ) -> Self {
        Self {
            capture: Arc::new(EventCapture::new(
                store.clone(),
                directory,
                config.host_base_url.clone(),
            )),
            privacy: Arc::new(PrivacyService::new(store)),
            config,
        }
    }
}
