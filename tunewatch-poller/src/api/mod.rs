//! HTTP surface for tunewatch-poller
//!
//! Health and status probes plus the JSON command endpoints that mutate
//! the tracked-artist roster. The poll loop itself never goes through this
//! layer.

pub mod handlers;

use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tunewatch_common::db::Store;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub store: Store,
    pub state: Arc<SharedState>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Probes (no prefix)
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        // Command surface
        .nest(
            "/api",
            Router::new()
                .route("/users", post(handlers::register_user))
                .route(
                    "/artists",
                    post(handlers::track_artist)
                        .get(handlers::list_artists)
                        .delete(handlers::untrack_artist),
                )
                .route("/channels", post(handlers::set_channel)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
