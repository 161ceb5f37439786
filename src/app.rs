use crate::handlers;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/lifetime", get(handlers::get_lifetime))
        .route("/api/funnel", get(handlers::get_funnel))
        .route("/api/connections", get(handlers::get_connections))
        .with_state(state)
}
