//! HTTP API routes and handlers.
//!
//! Endpoints are organized by domain:
//! - `regions` - Desired region set and reconciliation
//! - `rankings` - Ranked view of tracked regions
//! - `radio` - Simulated radio control and platform callbacks
//! - `telemetry` - Recent engine events
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod openapi;
pub mod radio;
pub mod rankings;
pub mod regions;
pub mod telemetry;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /regions           - Desired set (GET, PUT), /reconcile (POST)
/// ├── /rankings          - Ranked tracked regions
/// ├── /radio             - Radio status, authorization, capabilities, callbacks, reset
/// ├── /telemetry         - Recent events
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/regions", regions::router())
                .nest("/rankings", rankings::router())
                .nest("/radio", radio::router())
                .nest("/telemetry", telemetry::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
