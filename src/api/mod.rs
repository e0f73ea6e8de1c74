//! API layer -- axum routes, handlers, and middleware.
//!
//! Two surfaces share one router: the control API under `/api/v1` (start,
//! query, list speed tests, node health/status) and the target endpoints
//! under `/speedtest` that other nodes measure against.

mod routes;
pub mod state;
pub mod target;

use self::state::AppState;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .nest("/speedtest", target::target_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
