//! Signal sample stream.
//!
//! Keeps one [`RangingInfo`] per tracking subscription: the region's latest
//! state, a bounded [`SampleHistory`], and a staleness watchdog. Every append
//! (real or synthetic) and every state record yields the subscription id so
//! the caller can publish a change notification.
//!
//! Time is passed in explicitly; the stream never reads a clock.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ranking::{self, RankedRegion};
use crate::region::{RegionIdentity, TrackedRegion};
use crate::sample::{Sample, SampleHistory};
use crate::sort_weight::SortWeight;
use crate::types::RegionState;

/// Identifies one tracking subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Watchdog timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// How often each region is checked.
    pub period: Duration,
    /// How old the last real sample may be before a check marks it stale.
    pub stale_threshold: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs_f64(5.0),
            stale_threshold: Duration::from_secs_f64(2.5),
        }
    }
}

/// Ranging state for one tracked region.
#[derive(Debug, Clone)]
pub struct RangingInfo {
    region: TrackedRegion,
    state: RegionState,
    history: SampleHistory,
    last_sample_at: Option<Instant>,
    next_check: Instant,
}

impl RangingInfo {
    fn new(region: TrackedRegion, capacity: usize, first_check: Instant) -> Self {
        Self {
            region,
            state: RegionState::Unknown,
            history: SampleHistory::new(capacity),
            last_sample_at: None,
            next_check: first_check,
        }
    }

    /// The tracked region.
    #[must_use]
    pub const fn region(&self) -> &TrackedRegion {
        &self.region
    }

    /// Latest region state.
    #[must_use]
    pub const fn state(&self) -> RegionState {
        self.state
    }

    /// Sample history.
    #[must_use]
    pub const fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// Latest usable sample.
    #[must_use]
    pub fn last_sample(&self) -> Option<&Sample> {
        self.history.last()
    }

    /// When the last real sample arrived.
    #[must_use]
    pub const fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    /// Ranking weight for the current state and latest sample.
    #[must_use]
    pub fn sort_weight(&self, very_far_away: f64) -> SortWeight {
        ranking::evaluate(self.state, self.last_sample(), very_far_away)
    }

    fn is_stale_at(&self, at: Instant, threshold: Duration) -> bool {
        self.last_sample_at
            .is_some_and(|last| at.saturating_duration_since(last) > threshold)
    }
}

/// Per-subscription ranging state plus the staleness watchdog.
#[derive(Debug)]
pub struct SampleStream {
    entries: BTreeMap<SubscriptionId, RangingInfo>,
    next_id: u64,
    capacity: usize,
    watchdog: WatchdogSettings,
}

impl SampleStream {
    /// Creates an empty stream.
    #[must_use]
    pub const fn new(capacity: usize, watchdog: WatchdogSettings) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
            capacity,
            watchdog,
        }
    }

    /// Begins tracking `region`. The first watchdog check is due one period
    /// after `now`.
    pub fn track(&mut self, region: TrackedRegion, now: Instant) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        debug!(subscription = %id, region = %region, "Tracking region");
        self.entries.insert(
            id,
            RangingInfo::new(region, self.capacity, now + self.watchdog.period),
        );
        id
    }

    /// Stops tracking. The history and the watchdog timer go away together.
    pub fn untrack(&mut self, id: SubscriptionId) -> Option<RangingInfo> {
        let removed = self.entries.remove(&id);
        if let Some(info) = &removed {
            debug!(subscription = %id, region = %info.region, "Stopped tracking region");
        }
        removed
    }

    /// Ranging info for one subscription.
    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<&RangingInfo> {
        self.entries.get(&id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all live subscriptions, ascending.
    pub fn ids(&self) -> impl Iterator<Item = SubscriptionId> + '_ {
        self.entries.keys().copied()
    }

    /// Records a batch of samples ranged in `region`.
    ///
    /// Returns the subscriptions that changed. Samples for regions nobody
    /// tracks are ignored.
    pub fn record_samples(
        &mut self,
        region: &RegionIdentity,
        samples: &[Sample],
        now: Instant,
    ) -> Vec<SubscriptionId> {
        if samples.is_empty() {
            return Vec::new();
        }
        let changed = self.matching_mut(region, |info| {
            for sample in samples {
                info.history.push_sample(sample.clone());
            }
            info.last_sample_at = Some(now);
        });
        if changed.is_empty() {
            trace!(region = %region, "Ignoring samples for untracked region");
        }
        changed
    }

    /// Records a state determination for `region`.
    ///
    /// Every matching subscription is notified, even when the state is unchanged.
    pub fn record_state(&mut self, region: &RegionIdentity, state: RegionState) -> Vec<SubscriptionId> {
        let changed = self.matching_mut(region, |info| info.state = state);
        if changed.is_empty() {
            trace!(region = %region, %state, "Ignoring state for untracked region");
        }
        changed
    }

    fn matching_mut(
        &mut self,
        region: &RegionIdentity,
        mut apply: impl FnMut(&mut RangingInfo),
    ) -> Vec<SubscriptionId> {
        self.entries
            .iter_mut()
            .filter(|(_, info)| info.region.matches(region))
            .map(|(id, info)| {
                apply(info);
                *id
            })
            .collect()
    }

    /// Earliest pending watchdog deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|info| info.next_check).min()
    }

    /// Runs every watchdog check that is due at `now`.
    ///
    /// Each elapsed period is checked once, at its own deadline, so a late
    /// tick catches up period by period and an early tick does nothing.
    /// Returns the subscriptions that received a synthetic absent entry.
    ///
    /// Catch-up checks use the latest sample time. A sample recorded after a
    /// missed deadline but before the late tick suppresses that deadline's
    /// absent entry, so callers tick before recording newer samples.
    pub fn tick(&mut self, now: Instant) -> Vec<SubscriptionId> {
        let WatchdogSettings {
            period,
            stale_threshold,
        } = self.watchdog;
        let mut changed = Vec::new();

        for (id, info) in &mut self.entries {
            let mut marked = false;
            while info.next_check <= now {
                if info.is_stale_at(info.next_check, stale_threshold) {
                    debug!(subscription = %id, region = %info.region, "No recent samples, marking stale");
                    info.history.push_absent();
                    marked = true;
                }
                info.next_check += period;
            }
            if marked {
                changed.push(*id);
            }
        }
        changed
    }

    /// Unsorted ranking rows for every subscription.
    #[must_use]
    pub fn ranked_rows(&self, very_far_away: f64) -> Vec<RankedRegion> {
        self.entries
            .iter()
            .map(|(id, info)| RankedRegion {
                subscription: *id,
                region: info.region.clone(),
                state: info.state,
                last_sample: info.last_sample().cloned(),
                history_len: info.history.len(),
                sort_weight: info.sort_weight(very_far_away),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::tests::sample;
    use crate::sample::VERY_FAR_AWAY;
    use crate::types::Proximity;
    use uuid::Uuid;

    fn region(major: u16, label: &str) -> TrackedRegion {
        TrackedRegion::new(Uuid::nil(), Some(major), None, label).unwrap()
    }

    fn stream() -> SampleStream {
        SampleStream::new(60, WatchdogSettings::default())
    }

    #[test]
    fn test_samples_append_to_matching_regions_only() {
        let mut stream = stream();
        let now = Instant::now();
        let a = stream.track(region(1, "A"), now);
        let b = stream.track(region(2, "B"), now);

        let changed = stream.record_samples(region(1, "renamed").identity(), &[sample(Proximity::Near, 1.0)], now);
        assert_eq!(changed, vec![a]);
        assert_eq!(stream.get(a).unwrap().history().len(), 1);
        assert!(stream.get(b).unwrap().history().is_empty());
    }

    #[test]
    fn test_untracked_region_is_ignored() {
        let mut stream = stream();
        let now = Instant::now();
        stream.track(region(1, "A"), now);
        let changed = stream.record_samples(region(9, "Z").identity(), &[sample(Proximity::Near, 1.0)], now);
        assert!(changed.is_empty());
    }

    #[test]
    fn test_state_change_notifies_even_when_unchanged() {
        let mut stream = stream();
        let now = Instant::now();
        let a = stream.track(region(1, "A"), now);
        let identity = *region(1, "A").identity();

        assert_eq!(stream.record_state(&identity, RegionState::Inside), vec![a]);
        assert_eq!(stream.record_state(&identity, RegionState::Inside), vec![a]);
        assert_eq!(stream.get(a).unwrap().state(), RegionState::Inside);
    }

    #[test]
    fn test_invalid_accuracy_ranks_like_no_sample() {
        let mut stream = stream();
        let now = Instant::now();
        let sampled = stream.track(region(1, "A"), now);
        let untouched = stream.track(region(2, "B"), now);

        stream.record_samples(region(1, "A").identity(), &[sample(Proximity::Near, -1.0)], now);

        let sampled = stream.get(sampled).unwrap();
        assert_eq!(sampled.history().len(), 1);
        assert_eq!(
            sampled.sort_weight(VERY_FAR_AWAY),
            stream.get(untouched).unwrap().sort_weight(VERY_FAR_AWAY)
        );
    }

    #[test]
    fn test_late_tick_after_newer_sample_skips_missed_deadlines() {
        let mut stream = stream();
        let start = Instant::now();
        let a = stream.track(region(1, "A"), start);
        let identity = *region(1, "A").identity();
        stream.record_samples(&identity, &[sample(Proximity::Near, 1.0)], start);

        // Deadlines at 5s and 10s pass unticked; a fresh sample lands at 11s.
        stream.record_samples(&identity, &[sample(Proximity::Near, 1.2)], start + Duration::from_secs(11));

        assert!(stream.tick(start + Duration::from_secs(12)).is_empty());
        assert_eq!(stream.get(a).unwrap().history().len(), 2);
        assert_eq!(stream.next_deadline(), Some(start + Duration::from_secs(15)));
    }

    #[test]
    fn test_watchdog_marks_stale_once_per_period() {
        let mut stream = stream();
        let start = Instant::now();
        let a = stream.track(region(1, "A"), start);
        stream.record_samples(region(1, "A").identity(), &[sample(Proximity::Near, 1.0)], start);

        // Checks before the first deadline do nothing.
        assert!(stream.tick(start + Duration::from_secs(1)).is_empty());
        assert!(stream.tick(start + Duration::from_secs(4)).is_empty());

        // First deadline at 5s: last sample is 5s old, stale.
        assert_eq!(stream.tick(start + Duration::from_secs(5)), vec![a]);
        assert_eq!(stream.get(a).unwrap().history().len(), 2);

        // Repeated checks within the same period add nothing.
        assert!(stream.tick(start + Duration::from_secs(6)).is_empty());
        assert!(stream.tick(start + Duration::from_secs(9)).is_empty());
        assert_eq!(stream.get(a).unwrap().history().len(), 2);

        // A late tick catches up one entry per missed period (10s, 15s, 20s).
        assert_eq!(stream.tick(start + Duration::from_secs(21)), vec![a]);
        assert_eq!(stream.get(a).unwrap().history().len(), 5);
        assert!(stream.get(a).unwrap().last_sample().is_none());
    }

    #[test]
    fn test_watchdog_skips_fresh_and_never_sampled_regions() {
        let mut stream = stream();
        let start = Instant::now();
        let fresh = stream.track(region(1, "A"), start);
        let silent = stream.track(region(2, "B"), start);

        stream.record_samples(
            region(1, "A").identity(),
            &[sample(Proximity::Near, 1.0)],
            start + Duration::from_secs(4),
        );

        assert!(stream.tick(start + Duration::from_secs(5)).is_empty());
        assert_eq!(stream.get(fresh).unwrap().history().len(), 1);
        assert!(stream.get(silent).unwrap().history().is_empty());
    }

    #[test]
    fn test_untrack_removes_history_and_deadline() {
        let mut stream = stream();
        let now = Instant::now();
        let a = stream.track(region(1, "A"), now);
        assert!(stream.next_deadline().is_some());

        assert!(stream.untrack(a).is_some());
        assert!(stream.next_deadline().is_none());
        assert!(stream.get(a).is_none());

        let changed = stream.record_samples(region(1, "A").identity(), &[sample(Proximity::Near, 1.0)], now);
        assert!(changed.is_empty());
        assert!(stream.untrack(a).is_none());
    }

    #[test]
    fn test_empty_sample_batch_is_ignored() {
        let mut stream = stream();
        let now = Instant::now();
        let a = stream.track(region(1, "A"), now);
        assert!(stream.record_samples(region(1, "A").identity(), &[], now).is_empty());
        assert!(stream.get(a).unwrap().last_sample_at().is_none());
    }
}
