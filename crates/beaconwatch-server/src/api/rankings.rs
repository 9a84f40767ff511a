//! Ranking API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beaconwatch_core::{closest, RankedRegion, RegionState, Sample, SortWeight};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::api::regions::RegionView;
use crate::state::SharedState;

/// Creates the rankings router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_rankings))
}

/// One tracked region in ranked order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankingEntry {
    /// Tracking subscription id.
    #[schema(example = 1)]
    pub subscription: u64,
    /// The tracked region.
    pub region: RegionView,
    /// Latest region state.
    pub state: RegionState,
    /// Latest usable sample.
    #[schema(nullable)]
    pub last_sample: Option<Sample>,
    /// History entries held, absent ones included.
    #[schema(example = 12)]
    pub history_len: usize,
    /// Composite key `[[proximity rank, distance], state rank]`, lower is closer.
    #[schema(value_type = Object, example = json!([[1, 2.4], 0]))]
    pub sort_weight: SortWeight,
}

impl From<&RankedRegion> for RankingEntry {
    fn from(row: &RankedRegion) -> Self {
        Self {
            subscription: row.subscription.get(),
            region: RegionView::from(&row.region),
            state: row.state,
            last_sample: row.last_sample.clone(),
            history_len: row.history_len,
            sort_weight: row.sort_weight.clone(),
        }
    }
}

/// Ranked view of every tracked region.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankingsResponse {
    /// The best-ranked region, if any is tracked.
    #[schema(nullable)]
    pub closest: Option<RankingEntry>,
    /// All tracked regions, closest and most confident first.
    pub rankings: Vec<RankingEntry>,
}

/// Get the current ranking.
#[utoipa::path(
    get,
    path = "/api/rankings",
    tag = "rankings",
    operation_id = "getRankings",
    summary = "Rank tracked regions",
    description = "Orders tracked regions by proximity category, then distance, then \
        region state. Regions never sampled, or whose last sample had unknown \
        proximity, rank last.",
    responses(
        (status = 200, description = "Current ranking", body = RankingsResponse),
        (status = 503, description = "Engine stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_rankings(State(state): State<SharedState>) -> ApiResult<Json<RankingsResponse>> {
    let rows = state.engine().rankings().await?;
    Ok(Json(RankingsResponse {
        closest: closest(&rows).map(RankingEntry::from),
        rankings: rows.iter().map(RankingEntry::from).collect(),
    }))
}
