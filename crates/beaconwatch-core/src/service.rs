//! Async engine service.
//!
//! The [`EngineService`] owns an [`Engine`] on a single tokio task. Platform
//! callbacks and caller requests arrive as commands on an unbounded channel;
//! watchdog deadlines are served by a sleep in the same `select!`, so engine
//! state is only ever touched from one place.
//!
//! ```text
//!  ProviderEvent ─┐
//!  EngineHandle ──┼──► mpsc ──► EngineService ──► watch ──► RegionSubscription
//!  Drop(sub) ─────┘                 ▲
//!                       sleep_until(next deadline)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let shutdown = CancellationToken::new();
//! let (handle, task) = service::spawn(engine, shutdown.clone());
//!
//! let mut sub = handle.subscribe(region).await?;
//! handle.send_event(ProviderEvent::SamplesRanged { region: id, samples })?;
//! let snapshot = sub.changed().await?;
//! ```

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::engine::{Engine, RangingSnapshot};
use crate::error::{BeaconError, Result};
use crate::provider::{ProviderEvent, RadioProvider};
use crate::ranking::RankedRegion;
use crate::reconcile::{ReconcileOutcome, RegionAction};
use crate::region::TrackedRegion;
use crate::stream::SubscriptionId;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Event(ProviderEvent),
    Subscribe {
        region: TrackedRegion,
        token: CancellationToken,
        reply: Reply<Option<(SubscriptionId, watch::Receiver<RangingSnapshot>)>>,
    },
    Untrack(SubscriptionId),
    ReplaceDesired {
        regions: Vec<TrackedRegion>,
        reply: Reply<Result<ReconcileOutcome>>,
    },
    Desired(Reply<Vec<TrackedRegion>>),
    Rankings(Reply<Vec<RankedRegion>>),
    Reconcile(Reply<ReconcileOutcome>),
    Reset(Reply<Vec<RegionAction>>),
    Flush(Reply<()>),
}

struct Subscriber {
    token: CancellationToken,
    sender: watch::Sender<RangingSnapshot>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Runs an [`Engine`] on its own task.
pub struct EngineService<P> {
    engine: Engine<P>,
    commands: mpsc::UnboundedReceiver<Command>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl<P: RadioProvider + Send + 'static> EngineService<P> {
    /// Creates the service and the handle that talks to it.
    pub fn new(engine: Engine<P>) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            engine,
            commands: rx,
            subscribers: HashMap::new(),
        };
        (service, EngineHandle { commands: tx })
    }

    /// Starts the engine and serves commands until `shutdown` is cancelled or
    /// every handle is dropped. Returns the engine.
    pub async fn run(mut self, shutdown: CancellationToken) -> Engine<P> {
        info!("Engine service starting");
        let outcome = self.engine.start();
        debug!(?outcome, "Initial reconciliation");

        loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Engine service shutting down");
                    break;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("All engine handles dropped");
                        break;
                    };
                    self.reap_cancelled();
                    self.handle(command);
                }

                () = sleep_until(deadline) => {
                    self.reap_cancelled();
                    let changed = self.engine.tick(now());
                    self.notify(&changed);
                }
            }
        }

        info!("Engine service stopped");
        self.engine
    }

    fn reap_cancelled(&mut self) {
        let cancelled: Vec<SubscriptionId> = self
            .subscribers
            .iter()
            .filter(|(_, sub)| sub.token.is_cancelled())
            .map(|(id, _)| *id)
            .collect();
        for id in cancelled {
            self.subscribers.remove(&id);
            self.engine.untrack(id);
        }
    }

    fn notify(&self, changed: &[SubscriptionId]) {
        for id in changed {
            let (Some(sub), Some(snapshot)) = (self.subscribers.get(id), self.engine.snapshot(*id))
            else {
                continue;
            };
            trace!(subscription = %id, "Publishing snapshot");
            sub.sender.send_replace(snapshot);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Event(event) => {
                let effect = self.engine.handle_event(event, now());
                self.notify(&effect.changed);
            }
            Command::Subscribe {
                region,
                token,
                reply,
            } => {
                if token.is_cancelled() {
                    let _ = reply.send(None);
                    return;
                }
                let id = self.engine.track(region, now());
                let Some(snapshot) = self.engine.snapshot(id) else {
                    let _ = reply.send(None);
                    return;
                };
                let (sender, receiver) = watch::channel(snapshot);
                self.subscribers.insert(id, Subscriber { token, sender });
                if reply.send(Some((id, receiver))).is_err() {
                    // Caller went away before receiving its handle.
                    self.subscribers.remove(&id);
                    self.engine.untrack(id);
                }
            }
            Command::Untrack(id) => {
                self.subscribers.remove(&id);
                self.engine.untrack(id);
            }
            Command::ReplaceDesired { regions, reply } => {
                let _ = reply.send(self.engine.replace_desired(regions));
            }
            Command::Desired(reply) => {
                let _ = reply.send(self.engine.desired_regions().to_vec());
            }
            Command::Rankings(reply) => {
                let _ = reply.send(self.engine.rankings());
            }
            Command::Reconcile(reply) => {
                let _ = reply.send(self.engine.reconcile());
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.engine.reset());
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

/// Spawns the service on the current runtime.
pub fn spawn<P: RadioProvider + Send + 'static>(
    engine: Engine<P>,
    shutdown: CancellationToken,
) -> (EngineHandle, JoinHandle<Engine<P>>) {
    let (service, handle) = EngineService::new(engine);
    let task = tokio::spawn(service.run(shutdown));
    (handle, task)
}

/// Cloneable handle to a running [`EngineService`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| BeaconError::EngineStopped)?;
        rx.await.map_err(|_| BeaconError::EngineStopped)
    }

    /// Whether the service has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Delivers a platform callback. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub fn send_event(&self, event: ProviderEvent) -> Result<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| BeaconError::EngineStopped)
    }

    /// Starts tracking `region`. Tracking lasts as long as the returned
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn subscribe(&self, region: TrackedRegion) -> Result<RegionSubscription> {
        let token = CancellationToken::new();
        let tracked = region.clone();
        let subscribed = self
            .request(|reply| Command::Subscribe {
                region: tracked,
                token: token.clone(),
                reply,
            })
            .await?;
        let (id, receiver) = subscribed.ok_or(BeaconError::EngineStopped)?;
        Ok(RegionSubscription {
            id,
            region,
            token,
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Replaces the desired set and reconciles.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone, or the
    /// store error if the set could not be persisted.
    pub async fn replace_desired(&self, regions: Vec<TrackedRegion>) -> Result<ReconcileOutcome> {
        self.request(|reply| Command::ReplaceDesired { regions, reply })
            .await?
    }

    /// The desired regions.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn desired_regions(&self) -> Result<Vec<TrackedRegion>> {
        self.request(Command::Desired).await
    }

    /// The current ranking, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn rankings(&self) -> Result<Vec<RankedRegion>> {
        self.request(Command::Rankings).await
    }

    /// Runs a reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        self.request(Command::Reconcile).await
    }

    /// Waits until every command sent before this call has been handled.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn flush(&self) -> Result<()> {
        self.request(Command::Flush).await
    }

    /// Stops monitoring and ranging for every desired region.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] if the service is gone.
    pub async fn reset(&self) -> Result<Vec<RegionAction>> {
        self.request(Command::Reset).await
    }
}

/// Scoped tracking of one region.
///
/// Dropping the subscription ends tracking: the token is cancelled at once,
/// so no later sample reaches it, and the history is discarded.
pub struct RegionSubscription {
    id: SubscriptionId,
    region: TrackedRegion,
    token: CancellationToken,
    receiver: watch::Receiver<RangingSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for RegionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionSubscription")
            .field("id", &self.id)
            .field("region", &self.region)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RegionSubscription {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Tracked region.
    #[must_use]
    pub const fn region(&self) -> &TrackedRegion {
        &self.region
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn current(&self) -> RangingSnapshot {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::EngineStopped`] once the service is gone.
    pub async fn changed(&mut self) -> Result<RangingSnapshot> {
        self.receiver
            .changed()
            .await
            .map_err(|_| BeaconError::EngineStopped)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Another receiver for the same snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RangingSnapshot> {
        self.receiver.clone()
    }

    /// Ends tracking. Same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for RegionSubscription {
    fn drop(&mut self) {
        self.token.cancel();
        let _ = self.commands.send(Command::Untrack(self.id));
    }
}
