//! REST control surface
//!
//! Thin HTTP layer over the session registry. Handlers translate requests
//! into session commands and engine errors into status codes; playback
//! progress streams out over SSE.

pub mod handlers;
pub mod sse;

use crate::session::registry::SessionRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use segue_common::events::EventBus;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<SessionRegistry>,
    pub bus: EventBus,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Queue management
                .route("/sessions/:session_id/queue", get(handlers::get_queue))
                .route("/sessions/:session_id/queue", post(handlers::enqueue))
                // Playback control
                .route(
                    "/sessions/:session_id/playback/start",
                    post(handlers::start_playback),
                )
                // Volume
                .route("/sessions/:session_id/volume", get(handlers::get_volume))
                .route("/sessions/:session_id/volume", post(handlers::set_volume))
                // Session state
                .route("/sessions/:session_id/state", get(handlers::get_state))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}
