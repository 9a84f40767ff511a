//! Beacon region identities and tracked regions.
//!
//! A region is identified by a proximity UUID plus an optional major and an
//! optional minor key. A [`TrackedRegion`] adds a human label and opaque
//! metadata on top of that identity.
//!
//! Two notions of equality exist and must not be conflated:
//!
//! - **Match-equality** (`==`, [`Hash`]): compares the identity only. This is
//!   how radio callbacks and reconciliation find "the same region".
//! - **Exact-sameness** ([`TrackedRegion::is_same`]): match-equality plus an
//!   equal label.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Record type tag written with every persisted region.
pub const REGION_RECORD_TYPE: &str = "BeaconConfig";

/// Record subtype tag written with every persisted region.
pub const REGION_RECORD_SUBTYPE: &str = "iBeacon";

/// Current persisted record version.
pub const REGION_RECORD_VERSION: u32 = 1;

/// Compiled pattern for the compact `UUID[:major[:minor]]` form.
static REGION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<uuid>[0-9A-Fa-f-]{32,36})(?::(?P<major>\d{1,5})(?::(?P<minor>\d{1,5}))?)?$")
        .expect("Invalid region regex")
});

/// Errors raised while building or decoding regions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// A minor key was given without a major key.
    #[error("If minor is provided then major must also be provided (minor: {minor})")]
    MinorWithoutMajor {
        /// The orphaned minor key.
        minor: u16,
    },

    /// The compact text form could not be parsed.
    #[error("Invalid region '{input}': expected UUID[:major[:minor]]")]
    InvalidFormat {
        /// The rejected input.
        input: String,
    },

    /// A persisted record carries an unexpected type or subtype tag.
    #[error("Unexpected region record {field}: '{value}'")]
    UnexpectedTag {
        /// Which tag was wrong.
        field: &'static str,
        /// The value found.
        value: String,
    },

    /// A persisted record has an unsupported version.
    #[error("Unsupported region record version {0}")]
    UnsupportedVersion(u32),
}

/// Result type for region construction.
pub type RegionResult<T> = std::result::Result<T, RegionError>;

/// The identity of a beacon region: UUID plus optional major and minor keys.
///
/// Invariant: `minor` is only ever set when `major` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegionIdentity {
    uuid: Uuid,
    major: Option<u16>,
    minor: Option<u16>,
}

impl RegionIdentity {
    /// Creates an identity.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::MinorWithoutMajor`] when `minor` is set and
    /// `major` is not.
    pub const fn new(uuid: Uuid, major: Option<u16>, minor: Option<u16>) -> RegionResult<Self> {
        if let (None, Some(minor)) = (major, minor) {
            return Err(RegionError::MinorWithoutMajor { minor });
        }
        Ok(Self { uuid, major, minor })
    }

    /// Identity covering every beacon that advertises `uuid`.
    #[must_use]
    pub const fn any(uuid: Uuid) -> Self {
        Self {
            uuid,
            major: None,
            minor: None,
        }
    }

    /// Proximity UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Major key, if the region is narrowed to one.
    #[must_use]
    pub const fn major(&self) -> Option<u16> {
        self.major
    }

    /// Minor key, if the region is narrowed to one.
    #[must_use]
    pub const fn minor(&self) -> Option<u16> {
        self.minor
    }

    /// Human-readable major/minor summary, using "Any" for unset keys.
    #[must_use]
    pub fn major_minor_description(&self) -> String {
        fn describe(key: Option<u16>) -> String {
            key.map_or_else(|| "Any".to_string(), |k| k.to_string())
        }
        format!(
            "Major: {} Minor: {}",
            describe(self.major),
            describe(self.minor)
        )
    }
}

impl fmt::Display for RegionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid.hyphenated().to_string().to_uppercase())?;
        if let Some(major) = self.major {
            write!(f, ":{major}")?;
        }
        if let Some(minor) = self.minor {
            write!(f, ":{minor}")?;
        }
        Ok(())
    }
}

impl FromStr for RegionIdentity {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegionError::InvalidFormat {
            input: s.to_string(),
        };
        let captures = REGION_PATTERN.captures(s.trim()).ok_or_else(invalid)?;
        let uuid = Uuid::parse_str(&captures["uuid"]).map_err(|_| invalid())?;
        let parse_key = |name: &str| -> RegionResult<Option<u16>> {
            captures
                .name(name)
                .map(|m| m.as_str().parse::<u16>().map_err(|_| invalid()))
                .transpose()
        };
        Self::new(uuid, parse_key("major")?, parse_key("minor")?)
    }
}

impl<'de> Deserialize<'de> for RegionIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            uuid: Uuid,
            major: Option<u16>,
            minor: Option<u16>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.uuid, raw.major, raw.minor).map_err(serde::de::Error::custom)
    }
}

/// A region the application wants monitored and ranged.
///
/// Immutable once constructed. `==` and [`Hash`] use match-equality, so two
/// regions with the same identity and different labels compare equal. Use
/// [`TrackedRegion::is_same`] to also compare labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RegionRecord", into = "RegionRecord")]
pub struct TrackedRegion {
    identity: RegionIdentity,
    label: String,
    metadata: serde_json::Value,
}

impl TrackedRegion {
    /// Creates a tracked region with no metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::MinorWithoutMajor`] when `minor` is set and
    /// `major` is not.
    pub fn new(
        uuid: Uuid,
        major: Option<u16>,
        minor: Option<u16>,
        label: impl Into<String>,
    ) -> RegionResult<Self> {
        Ok(Self::from_identity(
            RegionIdentity::new(uuid, major, minor)?,
            label,
        ))
    }

    /// Creates a tracked region from an existing identity.
    #[must_use]
    pub fn from_identity(identity: RegionIdentity, label: impl Into<String>) -> Self {
        Self {
            identity,
            label: label.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Returns a copy of this region carrying `metadata`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The region identity.
    #[must_use]
    pub const fn identity(&self) -> &RegionIdentity {
        &self.identity
    }

    /// Human label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Opaque caller metadata.
    #[must_use]
    pub const fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Exact-sameness: same identity and same label.
    #[must_use]
    pub fn is_same(a: &Self, b: &Self) -> bool {
        a == b && a.label == b.label
    }

    /// Returns `true` if this region covers `identity` by match-equality.
    #[must_use]
    pub fn matches(&self, identity: &RegionIdentity) -> bool {
        self.identity == *identity
    }
}

impl PartialEq for TrackedRegion {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for TrackedRegion {}

impl Hash for TrackedRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for TrackedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.identity)
    }
}

/// Persisted form of a [`TrackedRegion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Always [`REGION_RECORD_TYPE`].
    #[serde(rename = "type", default = "default_record_type")]
    pub kind: String,
    /// Always [`REGION_RECORD_SUBTYPE`].
    #[serde(default = "default_record_subtype")]
    pub subtype: String,
    /// Record version, currently [`REGION_RECORD_VERSION`].
    #[serde(default = "default_record_version")]
    pub version: u32,
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Optional major key.
    #[serde(default)]
    pub major: Option<u16>,
    /// Optional minor key.
    #[serde(default)]
    pub minor: Option<u16>,
    /// Human label.
    pub label: String,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_record_type() -> String {
    REGION_RECORD_TYPE.to_string()
}

fn default_record_subtype() -> String {
    REGION_RECORD_SUBTYPE.to_string()
}

const fn default_record_version() -> u32 {
    REGION_RECORD_VERSION
}

impl TryFrom<RegionRecord> for TrackedRegion {
    type Error = RegionError;

    fn try_from(record: RegionRecord) -> Result<Self, Self::Error> {
        if record.kind != REGION_RECORD_TYPE {
            return Err(RegionError::UnexpectedTag {
                field: "type",
                value: record.kind,
            });
        }
        if record.subtype != REGION_RECORD_SUBTYPE {
            return Err(RegionError::UnexpectedTag {
                field: "subtype",
                value: record.subtype,
            });
        }
        if record.version != REGION_RECORD_VERSION {
            return Err(RegionError::UnsupportedVersion(record.version));
        }
        Ok(
            Self::new(record.uuid, record.major, record.minor, record.label)?
                .with_metadata(record.metadata),
        )
    }
}

impl From<TrackedRegion> for RegionRecord {
    fn from(region: TrackedRegion) -> Self {
        Self {
            kind: default_record_type(),
            subtype: default_record_subtype(),
            version: REGION_RECORD_VERSION,
            uuid: region.identity.uuid,
            major: region.identity.major,
            minor: region.identity.minor,
            label: region.label,
            metadata: region.metadata,
        }
    }
}

/// Set-style helpers over slices of regions.
pub trait RegionSliceExt {
    /// Whether any element is exactly the same as `region`.
    fn contains_same(&self, region: &TrackedRegion) -> bool;

    /// Position of the first element exactly the same as `region`.
    fn position_of_same(&self, region: &TrackedRegion) -> Option<usize>;

    /// Whether any element match-equals `identity`.
    fn contains_match(&self, identity: &RegionIdentity) -> bool;

    /// Elements with no exactly-same counterpart in `other`, in order.
    fn subtracting_same(&self, other: &[TrackedRegion]) -> Vec<TrackedRegion>;

    /// Elements with no match-equal counterpart in `other`, in order.
    fn subtracting_match(&self, other: &[TrackedRegion]) -> Vec<TrackedRegion>;
}

impl RegionSliceExt for [TrackedRegion] {
    fn contains_same(&self, region: &TrackedRegion) -> bool {
        self.iter().any(|r| TrackedRegion::is_same(r, region))
    }

    fn position_of_same(&self, region: &TrackedRegion) -> Option<usize> {
        self.iter().position(|r| TrackedRegion::is_same(r, region))
    }

    fn contains_match(&self, identity: &RegionIdentity) -> bool {
        self.iter().any(|r| r.matches(identity))
    }

    fn subtracting_same(&self, other: &[TrackedRegion]) -> Vec<TrackedRegion> {
        self.iter()
            .filter(|r| !other.contains_same(r))
            .cloned()
            .collect()
    }

    fn subtracting_match(&self, other: &[TrackedRegion]) -> Vec<TrackedRegion> {
        self.iter()
            .filter(|r| !other.contains(r))
            .cloned()
            .collect()
    }
}

/// Removes match-equal duplicates, keeping the first occurrence.
#[must_use]
pub fn dedup_by_match(regions: Vec<TrackedRegion>) -> Vec<TrackedRegion> {
    let mut unique: Vec<TrackedRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        if !unique.contains(&region) {
            unique.push(region);
        }
    }
    unique
}
