//! Ranking evaluator: turns region state plus the latest sample into a
//! [`SortWeight`].
//!
//! The weight has the shape `[[proximity rank, distance], region state rank]`.
//! Ascending order yields the closest, most confident region first. A region
//! that has never been sampled and a region whose last sample reported
//! [`Proximity::Unknown`] rank identically, and worse than any concrete reading.

use serde::Serialize;

use crate::region::TrackedRegion;
use crate::sample::Sample;
use crate::sort_weight::SortWeight;
use crate::stream::SubscriptionId;
use crate::types::{Proximity, RegionState};

/// Computes the ranking weight for a region.
#[must_use]
pub fn evaluate(state: RegionState, last_sample: Option<&Sample>, very_far_away: f64) -> SortWeight {
    let sample_weight = match last_sample {
        Some(sample) if sample.proximity != Proximity::Unknown => sample.sort_weight(very_far_away),
        _ => SortWeight::list([
            Proximity::Unknown.sort_weight(),
            SortWeight::float(very_far_away),
        ]),
    };
    SortWeight::list([sample_weight, state.sort_weight()])
}

/// One row of a ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedRegion {
    /// Subscription the row belongs to.
    pub subscription: SubscriptionId,
    /// The tracked region.
    pub region: TrackedRegion,
    /// Latest region state.
    pub state: RegionState,
    /// Latest usable sample, if any.
    pub last_sample: Option<Sample>,
    /// Number of history entries, absent ones included.
    pub history_len: usize,
    /// Composite ranking key.
    pub sort_weight: SortWeight,
}

/// Sorts rows ascending by weight; ties keep their input order.
#[must_use]
pub fn rank(mut rows: Vec<RankedRegion>) -> Vec<RankedRegion> {
    rows.sort_by(|a, b| a.sort_weight.cmp(&b.sort_weight));
    rows
}

/// The best-ranked row.
#[must_use]
pub fn closest(rows: &[RankedRegion]) -> Option<&RankedRegion> {
    rows.iter().min_by(|a, b| a.sort_weight.cmp(&b.sort_weight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::tests::sample;
    use crate::sample::VERY_FAR_AWAY;

    fn weight(proximity: Proximity, accuracy: f64) -> SortWeight {
        let s = sample(proximity, accuracy);
        let last = s.has_valid_accuracy().then_some(&s);
        evaluate(RegionState::Inside, last, VERY_FAR_AWAY)
    }

    #[test]
    fn test_category_dominates_accuracy() {
        let mut weights = [
            ("near", weight(Proximity::Near, 5.0)),
            ("immediate", weight(Proximity::Immediate, 2.0)),
            ("unknown", weight(Proximity::Unknown, -1.0)),
            ("far", weight(Proximity::Far, 1.0)),
        ];
        weights.sort_by(|a, b| a.1.cmp(&b.1));
        let order: Vec<&str> = weights.iter().map(|(name, _)| *name).collect();
        assert_eq!(order, ["immediate", "near", "far", "unknown"]);
    }

    #[test]
    fn test_never_seen_equals_reported_unknown() {
        let never_seen = evaluate(RegionState::Inside, None, VERY_FAR_AWAY);
        let unknown = sample(Proximity::Unknown, 0.5);
        let reported_unknown = evaluate(RegionState::Inside, Some(&unknown), VERY_FAR_AWAY);
        assert_eq!(never_seen, reported_unknown);
    }

    #[test]
    fn test_region_state_is_final_tiebreak() {
        let s = sample(Proximity::Near, 1.0);
        let inside = evaluate(RegionState::Inside, Some(&s), VERY_FAR_AWAY);
        let outside = evaluate(RegionState::Outside, Some(&s), VERY_FAR_AWAY);
        let unknown = evaluate(RegionState::Unknown, Some(&s), VERY_FAR_AWAY);

        assert_eq!(inside, outside);
        assert!(inside < unknown);
    }

    #[test]
    fn test_weight_shape() {
        let s = sample(Proximity::Near, 5.0);
        let w = evaluate(RegionState::Unknown, Some(&s), VERY_FAR_AWAY);
        assert_eq!(serde_json::to_string(&w).unwrap(), "[[1,5.0],1]");
    }
}
