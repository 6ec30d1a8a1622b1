//! Ingest API: the host event bus pushes course-module events here, and
//! privacy requests for queued notifications are served here.

pub mod middleware;
pub mod routes;
pub mod state;
