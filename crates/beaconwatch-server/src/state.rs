//! Application state shared across handlers.

use std::collections::HashMap;
use std::sync::Arc;

use beaconwatch_core::{
    spawn, BeaconError, Config, Engine, EngineHandle, JsonFileStore, MemoryTelemetry,
    RegionIdentity, RegionStore, RegionSubscription, SimulatedRadio, TrackedRegion,
    TracingTelemetry,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared application state handle.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: EngineHandle,
    radio: SimulatedRadio,
    telemetry: MemoryTelemetry,
    subscriptions: Mutex<HashMap<RegionIdentity, RegionSubscription>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the engine from `config`, persisting regions to the configured
    /// file, and starts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the region store cannot be read.
    pub async fn new(
        config: &Config,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Self, JoinHandle<Engine<SimulatedRadio>>)> {
        let path = config.storage.regions_path();
        info!(path = %path.display(), "Using region store");
        Self::with_store(config, Box::new(JsonFileStore::new(path)), shutdown).await
    }

    /// Same as [`AppState::new`] with an explicit region store.
    ///
    /// # Errors
    ///
    /// Returns an error if the region store cannot be read.
    pub async fn with_store(
        config: &Config,
        store: Box<dyn RegionStore + Send>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Self, JoinHandle<Engine<SimulatedRadio>>)> {
        let radio = SimulatedRadio::new(config.radio.capabilities(), config.radio.authorization);
        let telemetry = MemoryTelemetry::default();
        let engine = Engine::new(
            config.engine.clone(),
            radio.clone(),
            store,
            Arc::new((TracingTelemetry, telemetry.clone())),
        )?;
        let (handle, task) = spawn(engine, shutdown);

        let state = Self {
            inner: Arc::new(AppStateInner {
                engine: handle,
                radio,
                telemetry,
                subscriptions: Mutex::new(HashMap::new()),
                started_at: Utc::now(),
            }),
        };
        state.sync_subscriptions().await?;
        Ok((state, task))
    }

    /// Handle to the engine service.
    #[must_use]
    pub fn engine(&self) -> &EngineHandle {
        &self.inner.engine
    }

    /// The simulated radio the engine drives.
    #[must_use]
    pub fn radio(&self) -> &SimulatedRadio {
        &self.inner.radio
    }

    /// Recent telemetry.
    #[must_use]
    pub fn telemetry(&self) -> &MemoryTelemetry {
        &self.inner.telemetry
    }

    /// When the server state was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Keeps exactly one tracking subscription per desired region.
    ///
    /// Subscriptions for regions no longer desired are dropped, which ends
    /// their tracking. A relabeled region is resubscribed under its new label.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the engine is gone.
    pub async fn sync_subscriptions(&self) -> Result<(), BeaconError> {
        let desired = self.engine().desired_regions().await?;
        let mut subscriptions = self.inner.subscriptions.lock().await;

        subscriptions.retain(|_, sub| desired.iter().any(|r| TrackedRegion::is_same(r, sub.region())));
        for region in desired {
            let identity = *region.identity();
            if subscriptions.contains_key(&identity) {
                continue;
            }
            debug!(region = %region, "Subscribing to desired region");
            let subscription = self.engine().subscribe(region).await?;
            subscriptions.insert(identity, subscription);
        }
        Ok(())
    }

    /// Number of live tracking subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().await.len()
    }
}
