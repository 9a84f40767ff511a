//! The radio/location provider seam.
//!
//! The engine drives the platform through [`RadioProvider`] and receives the
//! platform's asynchronous callbacks as [`ProviderEvent`]s. [`SimulatedRadio`]
//! is an in-memory provider used by the server and by tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::region::{RegionIdentity, TrackedRegion};
use crate::sample::Sample;
use crate::types::{AuthorizationStatus, Capabilities, RegionState};

/// Platform radio and location services, as seen by the engine.
pub trait RadioProvider {
    /// Starts coarse enter/exit monitoring for `region`.
    fn start_monitoring(&mut self, region: &TrackedRegion);

    /// Stops monitoring `region`.
    fn stop_monitoring(&mut self, region: &TrackedRegion);

    /// Starts fine-grained ranging for `region`.
    fn start_ranging(&mut self, region: &TrackedRegion);

    /// Stops ranging `region`.
    fn stop_ranging(&mut self, region: &TrackedRegion);

    /// Asks the platform to report the current state of `region`.
    fn request_state(&mut self, region: &TrackedRegion);

    /// Regions currently being monitored.
    fn monitored_regions(&self) -> Vec<TrackedRegion>;

    /// Regions currently being ranged.
    fn ranged_regions(&self) -> Vec<TrackedRegion>;

    /// Current location authorization.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Asks the user for elevated authorization.
    fn request_elevated_authorization(&mut self);

    /// Current platform capabilities.
    fn capabilities(&self) -> Capabilities;
}

/// Asynchronous callbacks delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// The platform determined the device's state for a region.
    RegionStateDetermined {
        /// Region the state applies to.
        region: RegionIdentity,
        /// Determined state.
        state: RegionState,
    },
    /// The platform ranged beacons in a region.
    SamplesRanged {
        /// Region the samples were ranged in.
        region: RegionIdentity,
        /// Ranged samples, possibly empty.
        samples: Vec<Sample>,
    },
    /// Location authorization changed.
    AuthorizationChanged {
        /// New status.
        status: AuthorizationStatus,
    },
    /// Monitoring failed for a region.
    MonitoringFailed {
        /// Region that failed, when the platform names one.
        region: Option<RegionIdentity>,
        /// Platform error description.
        error: String,
    },
    /// Platform capabilities changed.
    CapabilitiesChanged {
        /// New capabilities.
        capabilities: Capabilities,
    },
}

/// Observable state of a [`SimulatedRadio`].
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedRadioStatus {
    /// Regions being monitored.
    pub monitored: Vec<TrackedRegion>,
    /// Regions being ranged.
    pub ranged: Vec<TrackedRegion>,
    /// Current authorization.
    pub authorization: AuthorizationStatus,
    /// Current capabilities.
    pub capabilities: Capabilities,
    /// How many times elevated authorization was requested.
    pub authorization_requests: u32,
    /// How many state determinations were requested.
    pub state_requests: u32,
}

impl Default for SimulatedRadioStatus {
    /// Nothing monitored, every capability present, and always-on authorization.
    fn default() -> Self {
        Self {
            monitored: Vec::new(),
            ranged: Vec::new(),
            authorization: AuthorizationStatus::AuthorizedAlways,
            capabilities: Capabilities::ALL,
            authorization_requests: 0,
            state_requests: 0,
        }
    }
}

/// In-memory radio provider.
///
/// Clones share state, so a bridge can inspect or steer the radio while the
/// engine owns another clone.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRadio {
    inner: Arc<Mutex<SimulatedRadioStatus>>,
}

impl SimulatedRadio {
    /// Creates a radio with the given capabilities and authorization.
    #[must_use]
    pub fn new(capabilities: Capabilities, authorization: AuthorizationStatus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatedRadioStatus {
                capabilities,
                authorization,
                ..SimulatedRadioStatus::default()
            })),
        }
    }

    /// Snapshot of the radio state.
    #[must_use]
    pub fn status(&self) -> SimulatedRadioStatus {
        self.inner.lock().clone()
    }

    /// Changes the authorization status.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.inner.lock().authorization = status;
    }

    /// Changes the capabilities.
    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.inner.lock().capabilities = capabilities;
    }

    /// Pretends the platform is already monitoring `region`.
    pub fn seed_monitored(&self, region: TrackedRegion) {
        upsert(&mut self.inner.lock().monitored, region);
    }

    /// Pretends the platform is already ranging `region`.
    pub fn seed_ranged(&self, region: TrackedRegion) {
        upsert(&mut self.inner.lock().ranged, region);
    }
}

fn upsert(regions: &mut Vec<TrackedRegion>, region: TrackedRegion) {
    if let Some(existing) = regions.iter_mut().find(|r| **r == region) {
        *existing = region;
    } else {
        regions.push(region);
    }
}

impl RadioProvider for SimulatedRadio {
    fn start_monitoring(&mut self, region: &TrackedRegion) {
        info!(region = %region, "Simulated radio: start monitoring");
        upsert(&mut self.inner.lock().monitored, region.clone());
    }

    fn stop_monitoring(&mut self, region: &TrackedRegion) {
        info!(region = %region, "Simulated radio: stop monitoring");
        self.inner.lock().monitored.retain(|r| r != region);
    }

    fn start_ranging(&mut self, region: &TrackedRegion) {
        info!(region = %region, "Simulated radio: start ranging");
        upsert(&mut self.inner.lock().ranged, region.clone());
    }

    fn stop_ranging(&mut self, region: &TrackedRegion) {
        info!(region = %region, "Simulated radio: stop ranging");
        self.inner.lock().ranged.retain(|r| r != region);
    }

    fn request_state(&mut self, region: &TrackedRegion) {
        debug!(region = %region, "Simulated radio: state requested");
        self.inner.lock().state_requests += 1;
    }

    fn monitored_regions(&self) -> Vec<TrackedRegion> {
        self.inner.lock().monitored.clone()
    }

    fn ranged_regions(&self) -> Vec<TrackedRegion> {
        self.inner.lock().ranged.clone()
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.inner.lock().authorization
    }

    fn request_elevated_authorization(&mut self) {
        info!("Simulated radio: elevated authorization requested");
        self.inner.lock().authorization_requests += 1;
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.lock().capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn region(major: u16, label: &str) -> TrackedRegion {
        TrackedRegion::new(Uuid::nil(), Some(major), None, label).unwrap()
    }

    #[test]
    fn test_monitoring_is_keyed_by_identity() {
        let mut radio = SimulatedRadio::default();
        radio.start_monitoring(&region(1, "A"));
        radio.start_monitoring(&region(1, "A renamed"));
        assert_eq!(radio.monitored_regions().len(), 1);
        assert_eq!(radio.monitored_regions()[0].label(), "A renamed");

        radio.stop_monitoring(&region(1, "whatever"));
        assert!(radio.monitored_regions().is_empty());
    }

    #[test]
    fn test_default_radio_is_ready() {
        let status = SimulatedRadio::default().status();
        assert_eq!(status.authorization, AuthorizationStatus::AuthorizedAlways);
        assert_eq!(status.capabilities, Capabilities::ALL);
        assert!(status.monitored.is_empty());
        assert_eq!(status.state_requests, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let radio = SimulatedRadio::default();
        let mut engine_side = radio.clone();
        engine_side.start_ranging(&region(2, "B"));
        engine_side.request_elevated_authorization();

        let status = radio.status();
        assert_eq!(status.ranged.len(), 1);
        assert_eq!(status.authorization_requests, 1);
    }

    #[test]
    fn test_event_json_shape() {
        let json = format!(
            r#"{{"event":"region_state_determined","region":{{"uuid":"{}","major":1,"minor":null}},"state":"inside"}}"#,
            Uuid::nil()
        );
        let event: ProviderEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            event,
            ProviderEvent::RegionStateDetermined {
                state: RegionState::Inside,
                ..
            }
        ));
    }
}
