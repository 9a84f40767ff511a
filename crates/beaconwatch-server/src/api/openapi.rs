//! OpenAPI specification generation for the beaconwatch API.
//!
//! The document is served at `/api/openapi.json` and written to disk by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::radio::{
    AcceptedResponse, FailureRequest, RadioStatusResponse, ResetResponse, SamplesRequest,
    StateRequest, UpdateAuthorizationRequest,
};
use super::rankings::{RankingEntry, RankingsResponse};
use super::regions::{
    ReconcileResponse, RegionInput, RegionView, RegionsResponse, ReplaceRegionsRequest,
    ReplaceRegionsResponse,
};
use super::telemetry::TelemetryResponse;
use beaconwatch_core::{
    AuthorizationStatus, BeaconIdentity, Capabilities, Capability, Proximity, RegionState, Sample,
};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// Used by the gen-openapi binary.
pub fn get_openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_default()
}

/// Main OpenAPI document structure for beaconwatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beaconwatch API",
        version = "0.1.0",
        description = r#"
# beaconwatch API

beaconwatch keeps a radio's beacon monitoring and ranging in line with a
persisted set of desired regions, and ranks tracked regions by proximity.

## Overview

1. **Regions**: Replace the desired region set. Each change is persisted and reconciled.
2. **Rankings**: Tracked regions ordered closest and most confident first.
3. **Radio**: Steer the simulated radio and deliver platform callbacks.
4. **Telemetry**: Recent monitoring, ranging and authorization events.

Region identities use the compact form `UUID[:major[:minor]]`.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beaconwatch server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "regions", description = "Desired region set and reconciliation"),
        (name = "rankings", description = "Proximity ranking of tracked regions"),
        (name = "radio", description = "Simulated radio control and platform callbacks"),
        (name = "telemetry", description = "Recent engine events")
    ),
    paths(
        super::health::health_check,
        super::regions::list_regions,
        super::regions::replace_regions,
        super::regions::reconcile_regions,
        super::rankings::get_rankings,
        super::radio::get_radio,
        super::radio::update_authorization,
        super::radio::update_capabilities,
        super::radio::post_samples,
        super::radio::post_state,
        super::radio::post_failure,
        super::radio::reset,
        super::telemetry::get_telemetry,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Region types
            RegionView,
            RegionInput,
            RegionsResponse,
            ReplaceRegionsRequest,
            ReplaceRegionsResponse,
            ReconcileResponse,
            // Ranking types
            RankingEntry,
            RankingsResponse,
            // Radio types
            RadioStatusResponse,
            UpdateAuthorizationRequest,
            SamplesRequest,
            StateRequest,
            FailureRequest,
            AcceptedResponse,
            ResetResponse,
            // Telemetry types
            TelemetryResponse,
            // Core types
            AuthorizationStatus,
            BeaconIdentity,
            Capabilities,
            Capability,
            Proximity,
            RegionState,
            Sample,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beaconwatch API");
        assert!(spec.paths.paths.contains_key("/api/rankings"));
        assert!(spec.paths.paths.contains_key("/api/radio/samples"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beaconwatch API\""));
    }
}
