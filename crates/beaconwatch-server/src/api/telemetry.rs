//! Telemetry API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beaconwatch_core::TelemetryRecord;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the telemetry router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_telemetry))
}

/// Recent engine telemetry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "events": [{
        "at": "2026-01-05T21:14:03Z",
        "event": "capability_unavailable",
        "capability": "ranging"
    }]
}))]
pub struct TelemetryResponse {
    /// Recorded events, oldest first.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<TelemetryRecord>,
}

/// Get recent telemetry.
#[utoipa::path(
    get,
    path = "/api/telemetry",
    tag = "telemetry",
    operation_id = "getTelemetry",
    summary = "List recent telemetry events",
    description = "Returns the most recent monitoring, ranging, authorization and \
        capability events, oldest first. Older events are discarded once the buffer is full.",
    responses(
        (status = 200, description = "Recent events", body = TelemetryResponse)
    )
)]
pub async fn get_telemetry(State(state): State<SharedState>) -> Json<TelemetryResponse> {
    Json(TelemetryResponse {
        events: state.telemetry().recent(),
    })
}
