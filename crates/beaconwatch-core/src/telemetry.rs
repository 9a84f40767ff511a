//! Telemetry sinks.
//!
//! Platform-facing actions and failures are reported as [`TelemetryEvent`]s.
//! Recording never fails; a sink that cannot keep an event drops it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::region::{RegionIdentity, TrackedRegion};
use crate::types::{AuthorizationStatus, Capability, RegionState};

/// Default number of events kept by [`MemoryTelemetry`].
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 256;

/// Something worth reporting about the engine's dealings with the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Monitoring started for a region.
    MonitoringStarted {
        /// The region.
        region: TrackedRegion,
    },
    /// Monitoring stopped for a region.
    MonitoringStopped {
        /// The region.
        region: TrackedRegion,
    },
    /// Ranging started for a region.
    RangingStarted {
        /// The region.
        region: TrackedRegion,
    },
    /// Ranging stopped for a region.
    RangingStopped {
        /// The region.
        region: TrackedRegion,
    },
    /// The platform reported a region state.
    StateDetermined {
        /// The region.
        region: RegionIdentity,
        /// Reported state.
        state: RegionState,
    },
    /// Elevated authorization was requested.
    AuthorizationRequested {
        /// Status at the time of the request.
        status: AuthorizationStatus,
    },
    /// Reconciliation was skipped for a missing capability.
    CapabilityUnavailable {
        /// The missing capability.
        capability: Capability,
    },
    /// The platform reported a monitoring failure.
    MonitoringFailed {
        /// Region that failed, when known.
        region: Option<RegionIdentity>,
        /// Platform error description.
        error: String,
    },
}

/// Receives telemetry events.
pub trait TelemetrySink {
    /// Records one event.
    fn record(&self, event: &TelemetryEvent);
}

impl<A: TelemetrySink, B: TelemetrySink> TelemetrySink for (A, B) {
    fn record(&self, event: &TelemetryEvent) {
        self.0.record(event);
        self.1.record(event);
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn record(&self, event: &TelemetryEvent) {
        (**self).record(event);
    }
}

/// Tracing target used by [`TracingTelemetry`].
pub const TELEMETRY_TARGET: &str = "beaconwatch::telemetry";

/// Emits each event as an `info` tracing event under [`TELEMETRY_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::MonitoringStarted { region } => {
                info!(target: TELEMETRY_TARGET, region = %region, "monitoring_started");
            }
            TelemetryEvent::MonitoringStopped { region } => {
                info!(target: TELEMETRY_TARGET, region = %region, "monitoring_stopped");
            }
            TelemetryEvent::RangingStarted { region } => {
                info!(target: TELEMETRY_TARGET, region = %region, "ranging_started");
            }
            TelemetryEvent::RangingStopped { region } => {
                info!(target: TELEMETRY_TARGET, region = %region, "ranging_stopped");
            }
            TelemetryEvent::StateDetermined { region, state } => {
                info!(target: TELEMETRY_TARGET, region = %region, %state, "state_determined");
            }
            TelemetryEvent::AuthorizationRequested { status } => {
                info!(target: TELEMETRY_TARGET, %status, "authorization_requested");
            }
            TelemetryEvent::CapabilityUnavailable { capability } => {
                info!(target: TELEMETRY_TARGET, %capability, "capability_unavailable");
            }
            TelemetryEvent::MonitoringFailed { region, error } => {
                let region = region.map(|r| r.to_string()).unwrap_or_default();
                info!(target: TELEMETRY_TARGET, %region, %error, "monitoring_failed");
            }
        }
    }
}

/// A recorded event with its wall-clock time.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// The event.
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

/// Keeps the most recent events in memory. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct MemoryTelemetry {
    inner: Arc<Mutex<VecDeque<TelemetryRecord>>>,
    capacity: usize,
}

impl MemoryTelemetry {
    /// Creates a buffer keeping at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Recorded events, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<TelemetryRecord> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Recorded events without timestamps, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.inner.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for MemoryTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_CAPACITY)
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        let mut buffer = self.inner.lock();
        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(TelemetryRecord {
            at: Utc::now(),
            event: event.clone(),
        });
    }
}
