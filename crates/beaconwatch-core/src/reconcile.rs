//! Region set reconciliation.
//!
//! Computes the actions that bring the platform's monitored and ranged region
//! sets in line with the desired set. The reconciler is a pure function of the
//! desired set and a [`RadioSnapshot`]; applying the actions is the caller's job.

use serde::Serialize;

use crate::error::{BeaconError, Result};
use crate::provider::RadioProvider;
use crate::region::{RegionSliceExt, TrackedRegion};
use crate::types::{AuthorizationStatus, Capabilities, Capability};

/// Platform state the reconciler works from.
#[derive(Debug, Clone)]
pub struct RadioSnapshot {
    /// Platform capabilities.
    pub capabilities: Capabilities,
    /// Current authorization.
    pub authorization: AuthorizationStatus,
    /// Regions currently monitored.
    pub monitored: Vec<TrackedRegion>,
    /// Regions currently ranged.
    pub ranged: Vec<TrackedRegion>,
}

impl RadioSnapshot {
    /// Queries `provider` for its current state.
    pub fn capture<P: RadioProvider + ?Sized>(provider: &P) -> Self {
        Self {
            capabilities: provider.capabilities(),
            authorization: provider.authorization_status(),
            monitored: provider.monitored_regions(),
            ranged: provider.ranged_regions(),
        }
    }
}

/// One step the provider must perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "region", rename_all = "snake_case")]
pub enum RegionAction {
    /// Ask the user for elevated location authorization.
    RequestAuthorization,
    /// Stop ranging a region.
    StopRanging(TrackedRegion),
    /// Stop monitoring a region.
    StopMonitoring(TrackedRegion),
    /// Start monitoring a region.
    StartMonitoring(TrackedRegion),
    /// Start ranging a region.
    StartRanging(TrackedRegion),
}

impl RegionAction {
    /// Applies the action to `provider`.
    pub fn apply<P: RadioProvider + ?Sized>(&self, provider: &mut P) {
        match self {
            Self::RequestAuthorization => provider.request_elevated_authorization(),
            Self::StopRanging(region) => provider.stop_ranging(region),
            Self::StopMonitoring(region) => provider.stop_monitoring(region),
            Self::StartMonitoring(region) => provider.start_monitoring(region),
            Self::StartRanging(region) => provider.start_ranging(region),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// All preconditions held; these actions converge the platform.
    Converged {
        /// Ordered actions, possibly empty.
        actions: Vec<RegionAction>,
    },
    /// Authorization is insufficient; convergence waits for it to change.
    AwaitingAuthorization {
        /// Status found during the pass.
        status: AuthorizationStatus,
    },
    /// A required capability is missing; nothing was attempted.
    Unavailable {
        /// First missing capability.
        capability: Capability,
    },
}

impl ReconcileOutcome {
    /// Actions to apply, in order.
    #[must_use]
    pub fn actions(&self) -> &[RegionAction] {
        const REQUEST: &[RegionAction] = &[RegionAction::RequestAuthorization];
        match self {
            Self::Converged { actions } => actions,
            Self::AwaitingAuthorization { .. } => REQUEST,
            Self::Unavailable { .. } => &[],
        }
    }

    /// Whether the pass reached convergence.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Converts the outcome into error semantics.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::CapabilityUnavailable`] or
    /// [`BeaconError::AuthorizationInsufficient`] when the pass did not converge.
    pub fn check(&self) -> Result<&[RegionAction]> {
        match self {
            Self::Converged { actions } => Ok(actions),
            Self::AwaitingAuthorization { status } => {
                Err(BeaconError::AuthorizationInsufficient(*status))
            }
            Self::Unavailable { capability } => Err(BeaconError::CapabilityUnavailable(*capability)),
        }
    }
}

/// Computes the actions that converge `snapshot` to `desired`.
///
/// Regions are compared by match-equality. Monitoring is stopped for regions
/// no longer desired (ranging first, when active), then started for new ones,
/// and finally ranging is started for every desired region not already ranged.
#[must_use]
pub fn reconcile(desired: &[TrackedRegion], snapshot: &RadioSnapshot) -> ReconcileOutcome {
    if let Some(capability) = snapshot.capabilities.first_missing() {
        return ReconcileOutcome::Unavailable { capability };
    }

    if !snapshot.authorization.is_sufficient() {
        return ReconcileOutcome::AwaitingAuthorization {
            status: snapshot.authorization,
        };
    }

    let to_stop = snapshot.monitored.subtracting_match(desired);
    let to_start = desired.subtracting_match(&snapshot.monitored);

    let mut actions = Vec::new();
    for region in to_stop {
        if snapshot.ranged.contains(&region) {
            actions.push(RegionAction::StopRanging(region.clone()));
        }
        actions.push(RegionAction::StopMonitoring(region));
    }
    actions.extend(to_start.into_iter().map(RegionAction::StartMonitoring));
    actions.extend(
        desired
            .subtracting_match(&snapshot.ranged)
            .into_iter()
            .map(RegionAction::StartRanging),
    );

    ReconcileOutcome::Converged { actions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedRadio;
    use uuid::Uuid;

    fn region(major: u16, label: &str) -> TrackedRegion {
        TrackedRegion::new(Uuid::nil(), Some(major), None, label).unwrap()
    }

    fn snapshot(monitored: Vec<TrackedRegion>, ranged: Vec<TrackedRegion>) -> RadioSnapshot {
        RadioSnapshot {
            capabilities: Capabilities::ALL,
            authorization: AuthorizationStatus::AuthorizedAlways,
            monitored,
            ranged,
        }
    }

    #[test]
    fn test_stops_before_starts_then_ranges() {
        let (a, b, c) = (region(1, "A"), region(2, "B"), region(3, "C"));
        let outcome = reconcile(
            &[a.clone(), b.clone()],
            &snapshot(vec![b.clone(), c.clone()], vec![]),
        );

        assert_eq!(
            outcome.actions(),
            [
                RegionAction::StopMonitoring(c),
                RegionAction::StartMonitoring(a.clone()),
                RegionAction::StartRanging(a),
                RegionAction::StartRanging(b),
            ]
        );
    }

    #[test]
    fn test_stop_ranging_precedes_stop_monitoring() {
        let c = region(3, "C");
        let outcome = reconcile(&[], &snapshot(vec![c.clone()], vec![c.clone()]));
        assert_eq!(
            outcome.actions(),
            [RegionAction::StopRanging(c.clone()), RegionAction::StopMonitoring(c)]
        );
    }

    #[test]
    fn test_already_ranged_regions_are_left_alone() {
        let a = region(1, "A");
        let relabeled = region(1, "A, relabeled");
        let outcome = reconcile(&[a], &snapshot(vec![relabeled.clone()], vec![relabeled]));
        assert!(outcome.actions().is_empty());
    }

    #[test]
    fn test_idempotent_after_apply() {
        let desired = vec![region(1, "A"), region(2, "B")];
        let mut radio = SimulatedRadio::new(Capabilities::ALL, AuthorizationStatus::AuthorizedWhenInUse);
        radio.seed_monitored(region(3, "C"));

        let first = reconcile(&desired, &RadioSnapshot::capture(&radio));
        assert!(!first.actions().is_empty());
        for action in first.actions() {
            action.apply(&mut radio);
        }

        let second = reconcile(&desired, &RadioSnapshot::capture(&radio));
        assert_eq!(second, ReconcileOutcome::Converged { actions: vec![] });
    }

    #[test]
    fn test_missing_capability_aborts_whole_cycle() {
        let mut snap = snapshot(vec![region(3, "C")], vec![]);
        snap.capabilities.monitoring_available = false;

        let outcome = reconcile(&[region(1, "A")], &snap);
        assert_eq!(
            outcome,
            ReconcileOutcome::Unavailable {
                capability: Capability::RegionMonitoring
            }
        );
        assert!(outcome.actions().is_empty());
        assert!(matches!(
            outcome.check(),
            Err(BeaconError::CapabilityUnavailable(Capability::RegionMonitoring))
        ));
    }

    #[test]
    fn test_capabilities_are_checked_before_authorization() {
        let mut snap = snapshot(vec![], vec![]);
        snap.capabilities.location_services_enabled = false;
        snap.authorization = AuthorizationStatus::Denied;
        assert!(matches!(
            reconcile(&[region(1, "A")], &snap),
            ReconcileOutcome::Unavailable {
                capability: Capability::LocationServices
            }
        ));
    }

    #[test]
    fn test_insufficient_authorization_requests_and_defers() {
        let mut snap = snapshot(vec![], vec![]);
        snap.authorization = AuthorizationStatus::NotDetermined;

        let outcome = reconcile(&[region(1, "A")], &snap);
        assert_eq!(outcome.actions(), [RegionAction::RequestAuthorization]);
        assert!(!outcome.is_converged());
        assert!(matches!(
            outcome.check(),
            Err(BeaconError::AuthorizationInsufficient(
                AuthorizationStatus::NotDetermined
            ))
        ));
    }

    #[test]
    fn test_action_json_shape() {
        let json = serde_json::to_value(RegionAction::StartRanging(region(1, "A"))).unwrap();
        assert_eq!(json["action"], "start_ranging");
        assert_eq!(json["region"]["label"], "A");
    }
}
