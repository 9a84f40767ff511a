//! Shared enums and OpenAPI schemas.
//!
//! These types are reported by the radio provider and consumed by every other
//! module. Their ranks feed the [`SortWeight`] used for beacon ranking.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::sort_weight::SortWeight;

/// Coarse distance category reported with every ranged sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    /// Within a few centimeters.
    Immediate,
    /// Within a couple of meters.
    Near,
    /// Detected, but further away.
    Far,
    /// The radio could not estimate a distance.
    Unknown,
}

impl Proximity {
    /// Rank used for ordering; lower is closer.
    #[must_use]
    pub const fn rank(self) -> i64 {
        match self {
            Self::Immediate => 0,
            Self::Near => 1,
            Self::Far => 2,
            Self::Unknown => 3,
        }
    }

    /// The rank as a sort weight sub-key.
    #[must_use]
    pub const fn sort_weight(self) -> SortWeight {
        SortWeight::int(self.rank())
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Immediate => "immediate",
            Self::Near => "near",
            Self::Far => "far",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Whether the device is inside a monitored region.
///
/// Transitions only ever arrive from the radio provider.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// The device is inside the region.
    Inside,
    /// The device is outside the region.
    Outside,
    /// No determination has been made yet.
    #[default]
    Unknown,
}

impl RegionState {
    /// Rank used as the final ranking tiebreak.
    ///
    /// Inside and Outside share a rank; only Unknown is demoted.
    #[must_use]
    pub const fn rank(self) -> i64 {
        match self {
            Self::Inside | Self::Outside => 0,
            Self::Unknown => 1,
        }
    }

    /// The rank as a sort weight sub-key.
    #[must_use]
    pub const fn sort_weight(self) -> SortWeight {
        SortWeight::int(self.rank())
    }
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Location authorization granted to the application.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// Access is restricted by policy.
    Restricted,
    /// The user denied access.
    Denied,
    /// Access granted while the application is in use.
    AuthorizedWhenInUse,
    /// Access granted at all times.
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Returns `true` when the status allows monitoring and ranging.
    #[must_use]
    pub const fn is_sufficient(self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotDetermined => "not_determined",
            Self::Restricted => "restricted",
            Self::Denied => "denied",
            Self::AuthorizedWhenInUse => "authorized_when_in_use",
            Self::AuthorizedAlways => "authorized_always",
        };
        f.write_str(name)
    }
}

/// A platform capability required before any reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Location services are switched on.
    LocationServices,
    /// The device can monitor beacon regions.
    RegionMonitoring,
    /// The device can range beacons.
    Ranging,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::LocationServices => "Location Services is not enabled",
            Self::RegionMonitoring => "Monitoring beacons is not available on this device",
            Self::Ranging => "Ranging beacons is not available on this device",
        };
        f.write_str(description)
    }
}

/// Snapshot of the platform capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Whether location services are enabled.
    pub location_services_enabled: bool,
    /// Whether beacon region monitoring is available.
    pub monitoring_available: bool,
    /// Whether beacon ranging is available.
    pub ranging_available: bool,
}

impl Capabilities {
    /// All capabilities present.
    pub const ALL: Self = Self {
        location_services_enabled: true,
        monitoring_available: true,
        ranging_available: true,
    };

    /// Returns the first missing capability, in check order.
    #[must_use]
    pub const fn first_missing(&self) -> Option<Capability> {
        if !self.location_services_enabled {
            Some(Capability::LocationServices)
        } else if !self.monitoring_available {
            Some(Capability::RegionMonitoring)
        } else if !self.ranging_available {
            Some(Capability::Ranging)
        } else {
            None
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proximity_ranks() {
        assert_eq!(Proximity::Immediate.rank(), 0);
        assert_eq!(Proximity::Near.rank(), 1);
        assert_eq!(Proximity::Far.rank(), 2);
        assert_eq!(Proximity::Unknown.rank(), 3);
    }

    #[test]
    fn test_region_state_ranks_do_not_penalize_outside() {
        assert_eq!(RegionState::Inside.rank(), RegionState::Outside.rank());
        assert!(RegionState::Unknown.rank() > RegionState::Inside.rank());
    }

    #[test]
    fn test_authorization_sufficiency() {
        assert!(AuthorizationStatus::AuthorizedAlways.is_sufficient());
        assert!(AuthorizationStatus::AuthorizedWhenInUse.is_sufficient());
        assert!(!AuthorizationStatus::NotDetermined.is_sufficient());
        assert!(!AuthorizationStatus::Denied.is_sufficient());
        assert!(!AuthorizationStatus::Restricted.is_sufficient());
    }

    #[test]
    fn test_first_missing_capability_follows_check_order() {
        let none = Capabilities {
            location_services_enabled: false,
            monitoring_available: false,
            ranging_available: false,
        };
        assert_eq!(none.first_missing(), Some(Capability::LocationServices));

        let no_ranging = Capabilities {
            ranging_available: false,
            ..Capabilities::ALL
        };
        assert_eq!(no_ranging.first_missing(), Some(Capability::Ranging));
        assert_eq!(Capabilities::ALL.first_missing(), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&AuthorizationStatus::AuthorizedWhenInUse).unwrap();
        assert_eq!(json, "\"authorized_when_in_use\"");
        let state: RegionState = serde_json::from_str("\"inside\"").unwrap();
        assert_eq!(state, RegionState::Inside);
    }
}
