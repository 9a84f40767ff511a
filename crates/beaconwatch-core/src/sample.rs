//! Ranged beacon samples and bounded per-region history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::sort_weight::SortWeight;
use crate::types::Proximity;

/// Default number of entries retained per region.
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Distance used in place of an unusable accuracy reading, in meters.
pub const VERY_FAR_AWAY: f64 = 1_000_000.0;

/// The concrete beacon that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct BeaconIdentity {
    /// Proximity UUID advertised by the beacon.
    pub uuid: Uuid,
    /// Major key advertised by the beacon.
    pub major: u16,
    /// Minor key advertised by the beacon.
    pub minor: u16,
}

/// One ranging observation of a beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sample {
    /// Beacon that produced the reading.
    pub beacon: BeaconIdentity,
    /// Coarse distance category.
    pub proximity: Proximity,
    /// Estimated distance in meters; negative means no usable reading.
    #[schema(example = 1.8)]
    pub accuracy: f64,
    /// Received signal strength in dBm.
    #[schema(example = -62)]
    pub rssi: i32,
    /// When the radio produced the reading.
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Whether the accuracy reading is usable.
    #[must_use]
    pub fn has_valid_accuracy(&self) -> bool {
        self.accuracy >= 0.0
    }

    /// `[proximity rank, accuracy]`, substituting `very_far_away` for an
    /// unusable accuracy.
    #[must_use]
    pub fn sort_weight(&self, very_far_away: f64) -> SortWeight {
        let distance = if self.has_valid_accuracy() {
            self.accuracy
        } else {
            very_far_away
        };
        SortWeight::list([self.proximity.sort_weight(), SortWeight::float(distance)])
    }
}

/// Bounded, append-only history of samples for one region.
///
/// `None` entries mark "no usable reading": either a sample with negative
/// accuracy or a synthetic staleness marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleHistory {
    entries: VecDeque<Option<Sample>>,
    capacity: usize,
}

impl SampleHistory {
    /// Creates an empty history holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a real sample. Samples with negative accuracy become absent entries.
    pub fn push_sample(&mut self, sample: Sample) {
        if sample.has_valid_accuracy() {
            self.push(Some(sample));
        } else {
            self.push(None);
        }
    }

    /// Appends an absent entry.
    pub fn push_absent(&mut self) {
        self.push(None);
    }

    fn push(&mut self, entry: Option<Sample>) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The newest entry, flattened: an absent newest entry yields `None`.
    #[must_use]
    pub fn last(&self) -> Option<&Sample> {
        self.entries.back().and_then(Option::as_ref)
    }

    /// Number of entries, absent ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Sample>> {
        self.entries.iter().map(Option::as_ref)
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
