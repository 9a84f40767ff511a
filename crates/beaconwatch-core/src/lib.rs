//! # beaconwatch-core
//!
//! Core logic for the beaconwatch proximity region engine.
//!
//! This crate provides:
//! - Reconciliation of monitored and ranged beacon regions against a desired set
//! - Bounded per-region sample history with a staleness watchdog
//! - A deterministic multi-key ranking of tracked regions
//! - Configuration management and persistence of the desired set
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`region`] - Region identities, tracked regions, and their record format
//! - [`sort_weight`] - Lexicographic composite sort keys
//! - [`sample`] - Ranged samples and bounded history
//! - [`ranking`] - The ranking evaluator
//! - [`reconcile`] - The pure region-set reconciler
//! - [`stream`] - Per-subscription ranging state and the watchdog
//! - [`provider`] - The radio provider seam and an in-memory simulation
//! - [`engine`] - Synchronous engine tying the pieces together
//! - [`service`] - Async actor and scoped subscriptions
//! - [`storage`] - Persistent storage for the desired region set
//! - [`telemetry`] - Telemetry sinks
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared enums and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod ranking;
pub mod reconcile;
pub mod region;
pub mod sample;
pub mod service;
pub mod sort_weight;
pub mod storage;
pub mod stream;
pub mod telemetry;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    default_config_path, Config, ConfigError, ConfigResult, EngineConfig, RadioConfig,
    ServerConfig, StorageConfig,
};
pub use engine::{Engine, EventEffect, RangingSnapshot, SharedTelemetry};
pub use error::{BeaconError, Result};
pub use provider::{ProviderEvent, RadioProvider, SimulatedRadio, SimulatedRadioStatus};
pub use ranking::{closest, evaluate, rank, RankedRegion};
pub use reconcile::{reconcile, RadioSnapshot, ReconcileOutcome, RegionAction};
pub use region::{
    dedup_by_match, RegionError, RegionIdentity, RegionRecord, RegionResult, RegionSliceExt,
    TrackedRegion,
};
pub use sample::{BeaconIdentity, Sample, SampleHistory, DEFAULT_HISTORY_CAPACITY, VERY_FAR_AWAY};
pub use service::{spawn, EngineHandle, EngineService, RegionSubscription};
pub use sort_weight::{SortWeight, SortWeightError};
pub use storage::{
    default_data_dir, default_regions_path, JsonFileStore, MemoryStore, RegionStore, StoreError,
    StoreResult,
};
pub use stream::{RangingInfo, SampleStream, SubscriptionId, WatchdogSettings};
pub use telemetry::{
    MemoryTelemetry, TelemetryEvent, TelemetryRecord, TelemetrySink, TracingTelemetry,
};
pub use types::{AuthorizationStatus, Capabilities, Capability, Proximity, RegionState};
