//! Simulated radio API endpoints.
//!
//! These endpoints stand in for the platform: they steer the simulated
//! radio's authorization and capabilities, and accept the callbacks a
//! platform bridge would deliver (ranged samples, state determinations,
//! monitoring failures). Region identities use the compact
//! `UUID[:major[:minor]]` form.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use beaconwatch_core::{
    AuthorizationStatus, Capabilities, ProviderEvent, RegionAction, RegionIdentity, RegionState,
    Sample,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::regions::RegionView;
use crate::state::SharedState;

/// Creates the radio router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_radio))
        .route("/authorization", put(update_authorization))
        .route("/capabilities", put(update_capabilities))
        .route("/samples", post(post_samples))
        .route("/state", post(post_state))
        .route("/failures", post(post_failure))
        .route("/reset", post(reset))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current simulated radio status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RadioStatusResponse {
    /// Regions being monitored.
    pub monitored: Vec<RegionView>,
    /// Regions being ranged.
    pub ranged: Vec<RegionView>,
    /// Current location authorization.
    pub authorization: AuthorizationStatus,
    /// Current platform capabilities.
    pub capabilities: Capabilities,
    /// Elevated authorization requests so far.
    pub authorization_requests: u32,
    /// State determination requests so far.
    pub state_requests: u32,
}

/// Request body changing authorization.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "status": "authorized_when_in_use" }))]
pub struct UpdateAuthorizationRequest {
    /// New authorization status.
    pub status: AuthorizationStatus,
}

/// Ranged samples delivered by a platform bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SamplesRequest {
    /// Region the samples were ranged in, as `UUID[:major[:minor]]`.
    #[schema(example = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0:1")]
    pub region: String,
    /// The ranged samples.
    pub samples: Vec<Sample>,
}

/// A state determination delivered by a platform bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "region": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0:1",
    "state": "inside"
}))]
pub struct StateRequest {
    /// Region the state applies to, as `UUID[:major[:minor]]`.
    pub region: String,
    /// Determined state.
    pub state: RegionState,
}

/// A monitoring failure delivered by a platform bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FailureRequest {
    /// Region that failed, as `UUID[:major[:minor]]`, when known.
    #[serde(default)]
    pub region: Option<String>,
    /// Platform error description.
    #[schema(example = "Region monitoring limit reached")]
    pub error: String,
}

/// Acknowledgement for bridge callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AcceptedResponse {
    /// Always `true`.
    pub accepted: bool,
}

/// Result of a reset.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResetResponse {
    /// Stop actions applied, in order.
    #[schema(value_type = Vec<Object>)]
    pub actions: Vec<RegionAction>,
}

fn parse_region(text: &str) -> ApiResult<RegionIdentity> {
    Ok(text.parse::<RegionIdentity>()?)
}

async fn status(state: &SharedState) -> RadioStatusResponse {
    let radio = state.radio().status();
    RadioStatusResponse {
        monitored: radio.monitored.iter().map(RegionView::from).collect(),
        ranged: radio.ranged.iter().map(RegionView::from).collect(),
        authorization: radio.authorization,
        capabilities: radio.capabilities,
        authorization_requests: radio.authorization_requests,
        state_requests: radio.state_requests,
    }
}

/// Forwards a platform callback and waits for the engine to handle it.
async fn deliver(state: &SharedState, event: ProviderEvent) -> ApiResult<()> {
    debug!(?event, "Delivering platform callback");
    state.engine().send_event(event)?;
    state.engine().flush().await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the simulated radio status.
#[utoipa::path(
    get,
    path = "/api/radio",
    tag = "radio",
    operation_id = "getRadio",
    summary = "Get simulated radio status",
    responses(
        (status = 200, description = "Radio status", body = RadioStatusResponse)
    )
)]
pub async fn get_radio(State(state): State<SharedState>) -> Json<RadioStatusResponse> {
    Json(status(&state).await)
}

/// Change the location authorization.
#[utoipa::path(
    put,
    path = "/api/radio/authorization",
    tag = "radio",
    operation_id = "updateAuthorization",
    summary = "Change location authorization",
    description = "Sets the simulated authorization and notifies the engine. Granting \
        `authorized_when_in_use` or `authorized_always` triggers reconciliation.",
    request_body = UpdateAuthorizationRequest,
    responses(
        (status = 200, description = "Authorization changed", body = RadioStatusResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_authorization(
    State(state): State<SharedState>,
    Json(request): Json<UpdateAuthorizationRequest>,
) -> ApiResult<Json<RadioStatusResponse>> {
    state.radio().set_authorization(request.status);
    deliver(
        &state,
        ProviderEvent::AuthorizationChanged {
            status: request.status,
        },
    )
    .await?;
    Ok(Json(status(&state).await))
}

/// Change the platform capabilities.
#[utoipa::path(
    put,
    path = "/api/radio/capabilities",
    tag = "radio",
    operation_id = "updateCapabilities",
    summary = "Change platform capabilities",
    description = "Sets the simulated capabilities and notifies the engine, which reconciles.",
    request_body = Capabilities,
    responses(
        (status = 200, description = "Capabilities changed", body = RadioStatusResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_capabilities(
    State(state): State<SharedState>,
    Json(capabilities): Json<Capabilities>,
) -> ApiResult<Json<RadioStatusResponse>> {
    state.radio().set_capabilities(capabilities);
    deliver(&state, ProviderEvent::CapabilitiesChanged { capabilities }).await?;
    Ok(Json(status(&state).await))
}

/// Deliver ranged samples.
#[utoipa::path(
    post,
    path = "/api/radio/samples",
    tag = "radio",
    operation_id = "postSamples",
    summary = "Deliver ranged samples",
    description = "Appends samples to every tracked region matching the identity. \
        Samples for untracked regions are ignored.",
    request_body = SamplesRequest,
    responses(
        (status = 202, description = "Samples accepted", body = AcceptedResponse),
        (status = 400, description = "Invalid region identity", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn post_samples(
    State(state): State<SharedState>,
    Json(request): Json<SamplesRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let region = parse_region(&request.region)?;
    deliver(
        &state,
        ProviderEvent::SamplesRanged {
            region,
            samples: request.samples,
        },
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

/// Deliver a state determination.
#[utoipa::path(
    post,
    path = "/api/radio/state",
    tag = "radio",
    operation_id = "postState",
    summary = "Deliver a region state",
    request_body = StateRequest,
    responses(
        (status = 202, description = "State accepted", body = AcceptedResponse),
        (status = 400, description = "Invalid region identity", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn post_state(
    State(state): State<SharedState>,
    Json(request): Json<StateRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let region = parse_region(&request.region)?;
    deliver(
        &state,
        ProviderEvent::RegionStateDetermined {
            region,
            state: request.state,
        },
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

/// Deliver a monitoring failure.
#[utoipa::path(
    post,
    path = "/api/radio/failures",
    tag = "radio",
    operation_id = "postFailure",
    summary = "Deliver a monitoring failure",
    description = "Records the failure in telemetry. Tracked state is not changed.",
    request_body = FailureRequest,
    responses(
        (status = 202, description = "Failure recorded", body = AcceptedResponse),
        (status = 400, description = "Invalid region identity", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn post_failure(
    State(state): State<SharedState>,
    Json(request): Json<FailureRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    if request.error.trim().is_empty() {
        return Err(ApiError::bad_request("empty_error", "Failure description must not be empty"));
    }
    let region = request.region.as_deref().map(parse_region).transpose()?;
    deliver(
        &state,
        ProviderEvent::MonitoringFailed {
            region,
            error: request.error,
        },
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

/// Stop monitoring and ranging for every desired region.
#[utoipa::path(
    post,
    path = "/api/radio/reset",
    tag = "radio",
    operation_id = "resetRadio",
    summary = "Reset monitoring and ranging",
    description = "Stops ranging, then monitoring, for every desired region. The desired \
        set is kept; the next reconciliation restores it.",
    responses(
        (status = 200, description = "Reset applied", body = ResetResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn reset(State(state): State<SharedState>) -> ApiResult<Json<ResetResponse>> {
    let actions = state.engine().reset().await?;
    Ok(Json(ResetResponse { actions }))
}
