pub mod events;
pub mod health;
pub mod privacy;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(events::router())
        .merge(privacy::router())
        .with_state(state)
}
