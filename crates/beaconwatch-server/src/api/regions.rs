//! Desired region API endpoints.
//!
//! The desired set is replaced wholesale. Every replacement is persisted,
//! reconciled against the radio, and mirrored into tracking subscriptions.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconwatch_core::{ReconcileOutcome, TrackedRegion};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the regions router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_regions).put(replace_regions))
        .route("/reconcile", post(reconcile_regions))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A region as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "identity": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0:1",
    "uuid": "e2c56db5-dffb-48d2-b060-d0f5a71096e0",
    "major": 1,
    "minor": null,
    "label": "Kitchen",
    "description": "Major: 1 Minor: Any",
    "metadata": null
}))]
pub struct RegionView {
    /// Compact `UUID[:major[:minor]]` form.
    pub identity: String,
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major key, if constrained.
    #[schema(nullable)]
    pub major: Option<u16>,
    /// Minor key, if constrained.
    #[schema(nullable)]
    pub minor: Option<u16>,
    /// Human label.
    pub label: String,
    /// Major/minor summary.
    pub description: String,
    /// Opaque caller metadata.
    #[schema(value_type = Object, nullable)]
    pub metadata: serde_json::Value,
}

impl From<&TrackedRegion> for RegionView {
    fn from(region: &TrackedRegion) -> Self {
        let identity = region.identity();
        Self {
            identity: identity.to_string(),
            uuid: identity.uuid(),
            major: identity.major(),
            minor: identity.minor(),
            label: region.label().to_string(),
            description: identity.major_minor_description(),
            metadata: region.metadata().clone(),
        }
    }
}

/// A region as submitted by clients.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "uuid": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0",
    "major": 1,
    "label": "Kitchen"
}))]
pub struct RegionInput {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major key; omit to match any.
    #[serde(default)]
    pub major: Option<u16>,
    /// Minor key; omit to match any. Requires `major`.
    #[serde(default)]
    pub minor: Option<u16>,
    /// Human label.
    #[schema(min_length = 1)]
    pub label: String,
    /// Opaque caller metadata, stored as-is.
    #[serde(default)]
    #[schema(value_type = Object, nullable)]
    pub metadata: serde_json::Value,
}

impl TryFrom<RegionInput> for TrackedRegion {
    type Error = ApiError;

    fn try_from(input: RegionInput) -> Result<Self, Self::Error> {
        if input.label.trim().is_empty() {
            return Err(ApiError::bad_request("empty_label", "Region label must not be empty"));
        }
        Ok(Self::new(input.uuid, input.major, input.minor, input.label)?
            .with_metadata(input.metadata))
    }
}

/// The desired region set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegionsResponse {
    /// Desired regions in configured order.
    pub regions: Vec<RegionView>,
}

/// Request body replacing the desired set.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceRegionsRequest {
    /// The new desired set. Later duplicates of an identity are dropped.
    pub regions: Vec<RegionInput>,
}

/// Result of replacing the desired set.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "regions": [],
    "outcome": { "outcome": "converged", "actions": [] }
}))]
pub struct ReplaceRegionsResponse {
    /// The desired set as stored.
    pub regions: Vec<RegionView>,
    /// What reconciliation did.
    #[schema(value_type = Object)]
    pub outcome: ReconcileOutcome,
}

/// Result of a reconciliation cycle.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// What reconciliation did.
    #[schema(value_type = Object)]
    pub outcome: ReconcileOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the desired regions.
#[utoipa::path(
    get,
    path = "/api/regions",
    tag = "regions",
    operation_id = "listRegions",
    summary = "List desired regions",
    responses(
        (status = 200, description = "Desired regions", body = RegionsResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn list_regions(State(state): State<SharedState>) -> ApiResult<Json<RegionsResponse>> {
    let regions = state.engine().desired_regions().await?;
    Ok(Json(RegionsResponse {
        regions: regions.iter().map(RegionView::from).collect(),
    }))
}

/// Replace the desired region set.
///
/// Persists the new set, reconciles monitoring and ranging, and returns the
/// reconciliation outcome.
#[utoipa::path(
    put,
    path = "/api/regions",
    tag = "regions",
    operation_id = "replaceRegions",
    summary = "Replace desired regions",
    description = "Replaces the desired set wholesale. Regions are compared by identity; \
        the first occurrence of an identity wins. The response carries the actions \
        reconciliation applied, or why it could not converge.",
    request_body = ReplaceRegionsRequest,
    responses(
        (status = 200, description = "Set replaced", body = ReplaceRegionsResponse),
        (status = 400, description = "Invalid region", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Store write failed", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn replace_regions(
    State(state): State<SharedState>,
    Json(request): Json<ReplaceRegionsRequest>,
) -> ApiResult<Json<ReplaceRegionsResponse>> {
    let regions = request
        .regions
        .into_iter()
        .map(TrackedRegion::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state.engine().replace_desired(regions).await?;
    state.sync_subscriptions().await?;
    let stored = state.engine().desired_regions().await?;

    Ok(Json(ReplaceRegionsResponse {
        regions: stored.iter().map(RegionView::from).collect(),
        outcome,
    }))
}

/// Reconcile the radio against the desired set.
#[utoipa::path(
    post,
    path = "/api/regions/reconcile",
    tag = "regions",
    operation_id = "reconcileRegions",
    summary = "Reconcile monitoring and ranging",
    description = "Runs one reconciliation cycle without changing the desired set. \
        Returns the applied actions, or the capability or authorization that blocked it.",
    responses(
        (status = 200, description = "Reconciliation outcome", body = ReconcileResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn reconcile_regions(
    State(state): State<SharedState>,
) -> ApiResult<Json<ReconcileResponse>> {
    let outcome = state.engine().reconcile().await?;
    Ok(Json(ReconcileResponse { outcome }))
}
