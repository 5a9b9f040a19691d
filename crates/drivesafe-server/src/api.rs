//! HTTP API routes and handlers.
//!
//! - `detection` - shared detection state, motion and override
//! - `messages` - inbound text messages
//! - `ws` - block signal stream for the companion client
//! - `health` - service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod detection;
pub mod error;
pub mod health;
pub mod messages;
pub mod openapi;
pub mod ws;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /ws                      - Block signal stream (WebSocket)
/// /api
/// ├── /state               - Detection record snapshot
/// ├── /motion              - Vehicle motion flag
/// ├── /override            - Driver override flag
/// ├── /messages/inbound    - Inbound text messages
/// └── /openapi.json        - OpenAPI specification
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(ws::block_updates))
        .nest(
            "/api",
            Router::new()
                .merge(detection::router())
                .nest("/messages", messages::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
