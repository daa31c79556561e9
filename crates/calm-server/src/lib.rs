//! Calm server library - local HTTP/WebSocket bridge between a breathing UI and
//! the session engine.
//!
//! Split from main.rs so the router can be exercised in integration tests.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/session", get(routes::session::get))
        .route("/session/start", post(routes::session::start))
        .route("/session/stop", post(routes::session::stop))
        .route("/session/reset", post(routes::session::reset))
        .route("/session/config", put(routes::session::update_config))
        .route("/health", get(routes::health));

    let ws_routes = Router::new().route("/session", get(routes::ws::upgrade));

    let mut app = Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes);

    if let Some(static_dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
