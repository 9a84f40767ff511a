//! The beaconwatch engine.
//!
//! [`Engine`] owns the desired region set, the provider, the region store and
//! the sample stream. It is synchronous; [`crate::service`] runs it on a task.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::provider::{ProviderEvent, RadioProvider};
use crate::ranking::{self, RankedRegion};
use crate::reconcile::{self, RadioSnapshot, ReconcileOutcome, RegionAction};
use crate::region::{dedup_by_match, TrackedRegion};
use crate::sample::Sample;
use crate::sort_weight::SortWeight;
use crate::storage::RegionStore;
use crate::stream::{SampleStream, SubscriptionId};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::RegionState;

/// Shared telemetry sink handle.
pub type SharedTelemetry = Arc<dyn TelemetrySink + Send + Sync>;

/// Point-in-time view of one tracking subscription.
#[derive(Debug, Clone, Serialize)]
pub struct RangingSnapshot {
    /// The subscription.
    pub subscription: SubscriptionId,
    /// The tracked region.
    pub region: TrackedRegion,
    /// Latest region state.
    pub state: RegionState,
    /// History, oldest first. `None` marks an absent reading.
    pub history: Vec<Option<Sample>>,
    /// Latest usable sample.
    pub last_sample: Option<Sample>,
    /// Ranking weight.
    pub sort_weight: SortWeight,
}

/// What handling a [`ProviderEvent`] did.
#[derive(Debug, Clone, Default)]
pub struct EventEffect {
    /// Subscriptions whose ranging info changed.
    pub changed: Vec<SubscriptionId>,
    /// Outcome of the reconciliation the event triggered, if any.
    pub reconciled: Option<ReconcileOutcome>,
}

/// Proximity region engine.
pub struct Engine<P> {
    config: EngineConfig,
    provider: P,
    store: Box<dyn RegionStore + Send>,
    telemetry: SharedTelemetry,
    desired: Vec<TrackedRegion>,
    stream: SampleStream,
}

impl<P> std::fmt::Debug for Engine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("desired", &self.desired)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<P: RadioProvider> Engine<P> {
    /// Creates an engine, loading the desired set from `store`.
    ///
    /// Duplicate identities in the stored set are dropped (first one wins).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn new(
        config: EngineConfig,
        provider: P,
        store: Box<dyn RegionStore + Send>,
        telemetry: SharedTelemetry,
    ) -> Result<Self> {
        let desired = dedup_by_match(store.load()?);
        let stream = SampleStream::new(config.history_capacity, config.watchdog());
        info!(regions = desired.len(), "Engine created");
        Ok(Self {
            config,
            provider,
            store,
            telemetry,
            desired,
            stream,
        })
    }

    /// Engine settings.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access to the provider.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Desired regions, in configured order.
    pub fn desired_regions(&self) -> &[TrackedRegion] {
        &self.desired
    }

    /// Initial reconciliation, followed by a state request for every desired
    /// region once monitoring is in place.
    ///
    /// When authorization is still pending, the requests go out after the
    /// grant instead (see [`Engine::handle_event`]).
    pub fn start(&mut self) -> ReconcileOutcome {
        let outcome = self.reconcile();
        if outcome.is_converged() {
            self.request_states();
        }
        outcome
    }

    fn request_states(&mut self) {
        for region in &self.desired {
            self.provider.request_state(region);
        }
    }

    /// Replaces the desired set wholesale, persists it, and reconciles.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written. The desired set is
    /// left unchanged in that case.
    pub fn replace_desired(&mut self, regions: Vec<TrackedRegion>) -> Result<ReconcileOutcome> {
        let regions = dedup_by_match(regions);
        self.store.save(&regions)?;
        info!(regions = regions.len(), "Desired regions replaced");
        self.desired = regions;
        Ok(self.reconcile())
    }

    /// Converges the provider's monitored and ranged sets to the desired set.
    pub fn reconcile(&mut self) -> ReconcileOutcome {
        let snapshot = RadioSnapshot::capture(&self.provider);
        let outcome = reconcile::reconcile(&self.desired, &snapshot);

        match &outcome {
            ReconcileOutcome::Unavailable { capability } => {
                warn!(%capability, "Reconciliation skipped");
                self.telemetry.record(&TelemetryEvent::CapabilityUnavailable {
                    capability: *capability,
                });
            }
            ReconcileOutcome::AwaitingAuthorization { status } => {
                info!(%status, "Location authorization insufficient, requesting");
            }
            ReconcileOutcome::Converged { actions } => {
                debug!(actions = actions.len(), "Reconciled");
            }
        }

        for action in outcome.actions() {
            self.apply(action, &snapshot);
        }
        outcome
    }

    fn apply(&mut self, action: &RegionAction, snapshot: &RadioSnapshot) {
        action.apply(&mut self.provider);
        let event = match action {
            RegionAction::RequestAuthorization => TelemetryEvent::AuthorizationRequested {
                status: snapshot.authorization,
            },
            RegionAction::StopRanging(region) => TelemetryEvent::RangingStopped {
                region: region.clone(),
            },
            RegionAction::StopMonitoring(region) => TelemetryEvent::MonitoringStopped {
                region: region.clone(),
            },
            RegionAction::StartMonitoring(region) => TelemetryEvent::MonitoringStarted {
                region: region.clone(),
            },
            RegionAction::StartRanging(region) => TelemetryEvent::RangingStarted {
                region: region.clone(),
            },
        };
        self.telemetry.record(&event);
    }

    /// Stops ranging, then monitoring, for every desired region.
    ///
    /// The desired set itself is kept; the next reconciliation restores it.
    pub fn reset(&mut self) -> Vec<RegionAction> {
        let snapshot = RadioSnapshot::capture(&self.provider);
        let actions: Vec<RegionAction> = self
            .desired
            .iter()
            .flat_map(|region| {
                [
                    RegionAction::StopRanging(region.clone()),
                    RegionAction::StopMonitoring(region.clone()),
                ]
            })
            .collect();
        info!(regions = self.desired.len(), "Resetting monitoring and ranging");
        for action in &actions {
            self.apply(action, &snapshot);
        }
        actions
    }

    /// Handles a platform callback.
    pub fn handle_event(&mut self, event: ProviderEvent, now: Instant) -> EventEffect {
        match event {
            ProviderEvent::RegionStateDetermined { region, state } => {
                self.telemetry
                    .record(&TelemetryEvent::StateDetermined { region, state });
                EventEffect {
                    changed: self.stream.record_state(&region, state),
                    reconciled: None,
                }
            }
            ProviderEvent::SamplesRanged { region, samples } => {
                // Due checks run first so new samples cannot hide a missed period.
                let mut changed = self.stream.tick(now);
                for id in self.stream.record_samples(&region, &samples, now) {
                    if !changed.contains(&id) {
                        changed.push(id);
                    }
                }
                EventEffect {
                    changed,
                    reconciled: None,
                }
            }
            ProviderEvent::AuthorizationChanged { status } => {
                if status.is_sufficient() {
                    info!(%status, "Authorization granted, reconciling");
                    let outcome = self.reconcile();
                    if outcome.is_converged() {
                        self.request_states();
                    }
                    EventEffect {
                        changed: Vec::new(),
                        reconciled: Some(outcome),
                    }
                } else {
                    info!(%status, "Authorization changed, still insufficient");
                    EventEffect::default()
                }
            }
            ProviderEvent::MonitoringFailed { region, error } => {
                match &region {
                    Some(region) => error!(region = %region, error = %error, "Monitoring failed"),
                    None => error!(error = %error, "Monitoring failed"),
                }
                self.telemetry
                    .record(&TelemetryEvent::MonitoringFailed { region, error });
                EventEffect::default()
            }
            ProviderEvent::CapabilitiesChanged { capabilities } => {
                info!(?capabilities, "Capabilities changed, reconciling");
                EventEffect {
                    changed: Vec::new(),
                    reconciled: Some(self.reconcile()),
                }
            }
        }
    }

    /// Begins tracking samples for `region`.
    pub fn track(&mut self, region: TrackedRegion, now: Instant) -> SubscriptionId {
        self.stream.track(region, now)
    }

    /// Stops tracking. Returns whether the subscription was live.
    pub fn untrack(&mut self, id: SubscriptionId) -> bool {
        self.stream.untrack(id).is_some()
    }

    /// Runs due watchdog checks.
    pub fn tick(&mut self, now: Instant) -> Vec<SubscriptionId> {
        self.stream.tick(now)
    }

    /// Earliest pending watchdog deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.stream.next_deadline()
    }

    /// Current view of one subscription.
    pub fn snapshot(&self, id: SubscriptionId) -> Option<RangingSnapshot> {
        self.stream.get(id).map(|info| RangingSnapshot {
            subscription: id,
            region: info.region().clone(),
            state: info.state(),
            history: info.history().iter().map(|s| s.cloned()).collect(),
            last_sample: info.last_sample().cloned(),
            sort_weight: info.sort_weight(self.config.very_far_away_m),
        })
    }

    /// Every subscription, closest and most confident first.
    pub fn rankings(&self) -> Vec<RankedRegion> {
        ranking::rank(self.stream.ranked_rows(self.config.very_far_away_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedRadio;
    use crate::sample::tests::sample;
    use crate::storage::MemoryStore;
    use crate::telemetry::MemoryTelemetry;
    use crate::types::{AuthorizationStatus, Capabilities, Capability, Proximity};
    use std::time::Duration;
    use uuid::Uuid;

    fn region(major: u16, label: &str) -> TrackedRegion {
        TrackedRegion::new(Uuid::nil(), Some(major), None, label).unwrap()
    }

    fn engine(
        radio: &SimulatedRadio,
        stored: Vec<TrackedRegion>,
    ) -> (Engine<SimulatedRadio>, MemoryTelemetry) {
        let telemetry = MemoryTelemetry::default();
        let engine = Engine::new(
            EngineConfig::default(),
            radio.clone(),
            Box::new(MemoryStore::with_regions(stored)),
            Arc::new(telemetry.clone()),
        )
        .unwrap();
        (engine, telemetry)
    }

    #[test]
    fn test_new_dedups_stored_regions() {
        let radio = SimulatedRadio::default();
        let (engine, _) = engine(&radio, vec![region(1, "A"), region(1, "A again"), region(2, "B")]);
        let labels: Vec<&str> = engine.desired_regions().iter().map(TrackedRegion::label).collect();
        assert_eq!(labels, ["A", "B"]);
    }

    #[test]
    fn test_start_converges_and_requests_state() {
        let radio = SimulatedRadio::default();
        let (mut engine, telemetry) = engine(&radio, vec![region(1, "A"), region(2, "B")]);

        assert!(engine.start().is_converged());

        let status = radio.status();
        assert_eq!(status.monitored.len(), 2);
        assert_eq!(status.ranged.len(), 2);
        assert_eq!(status.state_requests, 2);
        assert_eq!(telemetry.events().len(), 4);
    }

    #[test]
    fn test_replace_desired_persists_and_reconciles() {
        let radio = SimulatedRadio::default();
        let (mut engine, _) = engine(&radio, vec![region(1, "A")]);
        engine.start();

        engine.replace_desired(vec![region(2, "B")]).unwrap();

        let status = radio.status();
        assert_eq!(status.monitored, vec![region(2, "B")]);
        assert_eq!(status.ranged, vec![region(2, "B")]);
        assert_eq!(engine.store.load().unwrap(), vec![region(2, "B")]);
    }

    #[test]
    fn test_unavailable_capability_records_telemetry() {
        let radio = SimulatedRadio::new(
            Capabilities {
                ranging_available: false,
                ..Capabilities::ALL
            },
            AuthorizationStatus::AuthorizedAlways,
        );
        let (mut engine, telemetry) = engine(&radio, vec![region(1, "A")]);

        assert!(!engine.start().is_converged());
        assert!(radio.status().monitored.is_empty());
        assert_eq!(radio.status().state_requests, 0);
        assert_eq!(
            telemetry.events(),
            vec![TelemetryEvent::CapabilityUnavailable {
                capability: Capability::Ranging
            }]
        );
    }

    #[test]
    fn test_authorization_grant_triggers_reconcile() {
        let radio = SimulatedRadio::new(Capabilities::ALL, AuthorizationStatus::NotDetermined);
        let (mut engine, _) = engine(&radio, vec![region(1, "A")]);

        engine.start();
        assert_eq!(radio.status().authorization_requests, 1);
        assert!(radio.status().monitored.is_empty());

        // A denial does not loop back into another request.
        let effect = engine.handle_event(
            ProviderEvent::AuthorizationChanged {
                status: AuthorizationStatus::Denied,
            },
            Instant::now(),
        );
        assert!(effect.reconciled.is_none());
        assert_eq!(radio.status().authorization_requests, 1);

        radio.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);
        let effect = engine.handle_event(
            ProviderEvent::AuthorizationChanged {
                status: AuthorizationStatus::AuthorizedWhenInUse,
            },
            Instant::now(),
        );
        assert!(effect.reconciled.is_some_and(|o| o.is_converged()));
        assert_eq!(radio.status().monitored.len(), 1);
    }

    #[test]
    fn test_due_watchdog_runs_before_new_samples() {
        let radio = SimulatedRadio::default();
        let (mut engine, _) = engine(&radio, Vec::new());
        let start = Instant::now();
        let a = engine.track(region(1, "A"), start);
        let identity = *region(1, "A").identity();

        let ranged = || ProviderEvent::SamplesRanged {
            region: identity,
            samples: vec![sample(Proximity::Near, 1.0)],
        };

        engine.handle_event(ranged(), start);
        // Deadlines at 5s and 10s were never ticked.
        let effect = engine.handle_event(ranged(), start + Duration::from_secs(11));

        assert_eq!(effect.changed, vec![a]);
        let history = engine.snapshot(a).unwrap().history;
        assert_eq!(history.len(), 4);
        assert!(history[1].is_none() && history[2].is_none());
        assert!(history[3].is_some());
    }

    #[test]
    fn test_authorization_grant_requests_state() {
        let radio = SimulatedRadio::new(Capabilities::ALL, AuthorizationStatus::NotDetermined);
        let (mut engine, _) = engine(&radio, vec![region(1, "A"), region(2, "B")]);

        assert!(!engine.start().is_converged());
        assert_eq!(radio.status().state_requests, 0);

        radio.set_authorization(AuthorizationStatus::AuthorizedAlways);
        engine.handle_event(
            ProviderEvent::AuthorizationChanged {
                status: AuthorizationStatus::AuthorizedAlways,
            },
            Instant::now(),
        );
        assert_eq!(radio.status().state_requests, 2);
    }

    #[test]
    fn test_samples_and_state_reach_subscriptions() {
        let radio = SimulatedRadio::default();
        let (mut engine, _) = engine(&radio, vec![]);
        let now = Instant::now();
        let a = engine.track(region(1, "A"), now);
        let identity = *region(1, "A").identity();

        let effect = engine.handle_event(
            ProviderEvent::SamplesRanged {
                region: identity,
                samples: vec![sample(Proximity::Near, 2.0)],
            },
            now,
        );
        assert_eq!(effect.changed, vec![a]);

        let effect = engine.handle_event(
            ProviderEvent::RegionStateDetermined {
                region: identity,
                state: RegionState::Inside,
            },
            now,
        );
        assert_eq!(effect.changed, vec![a]);

        let snapshot = engine.snapshot(a).unwrap();
        assert_eq!(snapshot.state, RegionState::Inside);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(serde_json::to_string(&snapshot.sort_weight).unwrap(), "[[1,2.0],0]");
    }

    #[test]
    fn test_monitoring_failure_leaves_state_alone() {
        let radio = SimulatedRadio::default();
        let (mut engine, telemetry) = engine(&radio, vec![region(1, "A")]);
        engine.start();
        telemetry.clear();

        engine.handle_event(
            ProviderEvent::MonitoringFailed {
                region: Some(*region(1, "A").identity()),
                error: "radio busy".into(),
            },
            Instant::now(),
        );

        assert_eq!(radio.status().monitored.len(), 1);
        assert!(matches!(
            telemetry.events().as_slice(),
            [TelemetryEvent::MonitoringFailed { .. }]
        ));
    }

    #[test]
    fn test_reset_stops_ranging_then_monitoring() {
        let radio = SimulatedRadio::default();
        let (mut engine, _) = engine(&radio, vec![region(1, "A")]);
        engine.start();

        let actions = engine.reset();
        assert_eq!(
            actions,
            vec![
                RegionAction::StopRanging(region(1, "A")),
                RegionAction::StopMonitoring(region(1, "A")),
            ]
        );
        assert!(radio.status().monitored.is_empty());
        assert!(radio.status().ranged.is_empty());
        assert_eq!(engine.desired_regions().len(), 1);
    }

    #[test]
    fn test_rankings_order() {
        let radio = SimulatedRadio::default();
        let (mut engine, _) = engine(&radio, vec![]);
        let now = Instant::now();
        let far = engine.track(region(1, "far"), now);
        let near = engine.track(region(2, "near"), now);
        engine.handle_event(
            ProviderEvent::SamplesRanged {
                region: *region(1, "far").identity(),
                samples: vec![sample(Proximity::Far, 1.0)],
            },
            now,
        );
        engine.handle_event(
            ProviderEvent::SamplesRanged {
                region: *region(2, "near").identity(),
                samples: vec![sample(Proximity::Near, 5.0)],
            },
            now,
        );

        let order: Vec<SubscriptionId> = engine.rankings().iter().map(|r| r.subscription).collect();
        assert_eq!(order, vec![near, far]);
    }
}
