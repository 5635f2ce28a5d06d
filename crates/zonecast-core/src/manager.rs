// ── Stream manager ──
//
// Owns every push-stream connection: at most one live connection per
// ConnectionId, its driver task, and its state. Zone subscribers register
// here and are fed from the shared main stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use zonecast_api::{SseTransport, Transport, TransportConfig, ZoneUpdate, bearer_headers};

use crate::auth::TokenProvider;
use crate::config::{Endpoints, ManagerConfig};
use crate::connection::Driver;
use crate::dispatch::{DispatchReport, dispatch_frame};
use crate::error::CoreError;
use crate::handlers::ConnectionHandlers;
use crate::id::{ConnectionId, ZoneKey};
use crate::registry::{Subscription, SubscriptionRegistry};

const STATE_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle state of one connection id, observable by consumers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Error,
    #[default]
    Disconnected,
}

/// Published on [`StreamManager::state_changes`] for every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub id: ConnectionId,
    pub state: ConnectionState,
}

// ── StreamManager ────────────────────────────────────────────────

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Construct one at the
/// application root and hand clones to whatever needs zone data. Dropping
/// the last clone tears down every connection.
///
/// Connecting spawns a task, so `connect_main` / `connect_zone` must be
/// called from inside a tokio runtime.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    config: ManagerConfig,
    endpoints: Endpoints,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    registry: SubscriptionRegistry,
    live: DashMap<ConnectionId, LiveConnection>,
    /// Generation of a connection that ran out of retries, until the
    /// caller disconnects it or connects the id again.
    retired: DashMap<ConnectionId, u64>,
    /// Ids that are not `Disconnected`. An id is removed on disconnect.
    states: DashMap<ConnectionId, ConnectionState>,
    state_tx: broadcast::Sender<StateChange>,
    next_generation: AtomicU64,
}

struct LiveConnection {
    /// Distinguishes successive connections under the same id.
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveConnection {
    fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl StreamManager {
    /// Create a manager over an arbitrary transport. Does NOT connect.
    pub fn new(
        config: ManagerConfig,
        endpoints: Endpoints,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                endpoints,
                transport,
                tokens,
                registry: SubscriptionRegistry::new(),
                live: DashMap::new(),
                retired: DashMap::new(),
                states: DashMap::new(),
                state_tx,
                next_generation: AtomicU64::new(1),
            }),
        })
    }

    /// Create a manager that speaks Server-Sent-Events over HTTP(S).
    pub fn with_sse(
        config: ManagerConfig,
        endpoints: Endpoints,
        transport: &TransportConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, CoreError> {
        let sse = SseTransport::new(transport).map_err(|e| CoreError::Config {
            message: format!("failed to build stream transport: {e}"),
        })?;
        Self::new(config, endpoints, Arc::new(sse), tokens)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register `callback` for updates to `zone` (matched case-insensitively).
    ///
    /// Pure bookkeeping: make sure the main stream is connected if data
    /// is expected to flow.
    pub fn subscribe<F>(&self, zone: &str, callback: F) -> Result<Subscription, CoreError>
    where
        F: Fn(&ZoneUpdate) + Send + Sync + 'static,
    {
        let key = ZoneKey::new(zone)?;
        Ok(self.inner.registry.subscribe(key, callback))
    }

    /// Fan a main-stream frame out to the zone subscribers.
    ///
    /// The main connection does this for every frame it receives; exposed
    /// for frames that arrive by other means.
    pub fn dispatch(&self, frame: &Value) -> DispatchReport {
        dispatch_frame(&self.inner.registry, frame)
    }

    // ── Connections ──────────────────────────────────────────────

    /// Connect (or reuse) the shared main stream. Its frames are fanned
    /// out to zone subscribers, then passed to `handlers`.
    ///
    /// If the main stream is already live, the returned handle controls
    /// that connection and `handlers` are dropped unused: only the first
    /// caller's `on_open`, `on_message` and `on_error` ever fire. Use
    /// [`subscribe`](Self::subscribe) to receive data on a shared stream.
    pub fn connect_main(&self, handlers: ConnectionHandlers) -> Disconnect {
        let url = self.inner.endpoints.main_url().clone();
        self.connect(ConnectionId::Main, url, handlers)
    }

    /// Connect (or reuse) a dedicated stream for one zone. Its frames go
    /// straight to `handlers`; zone subscribers are not involved.
    ///
    /// As with [`connect_main`](Self::connect_main), reusing a live zone
    /// stream drops `handlers` unused.
    pub fn connect_zone(
        &self,
        zone: &str,
        handlers: ConnectionHandlers,
    ) -> Result<Disconnect, CoreError> {
        let key = ZoneKey::new(zone)?;
        let url = self.inner.endpoints.zone_url(&key);
        Ok(self.connect(ConnectionId::Zone(key), url, handlers))
    }

    fn connect(&self, id: ConnectionId, url: Url, handlers: ConnectionHandlers) -> Disconnect {
        let Some(token) = self.inner.tokens.token() else {
            warn!(id = %id, "no auth token, not connecting");
            handlers.error(&id, &CoreError::AuthenticationMissing { id: id.clone() });
            return Disconnect::noop();
        };

        let headers = match bearer_headers(&token) {
            Ok(headers) => headers,
            Err(e) => {
                warn!(id = %id, error = %e, "auth token unusable, not connecting");
                handlers.error(&id, &CoreError::transport(id.clone(), &e));
                return Disconnect::noop();
            }
        };

        match self.inner.live.entry(id.clone()) {
            Entry::Occupied(live) => {
                debug!(id = %id, "reusing live connection");
                Disconnect::new(&self.inner, id, live.get().generation)
            }
            Entry::Vacant(slot) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                self.inner.retired.remove(&id);

                self.inner.publish(&id, ConnectionState::Connecting);

                let driver = Driver {
                    id: id.clone(),
                    generation,
                    url,
                    headers,
                    transport: Arc::clone(&self.inner.transport),
                    handlers,
                    fanout: id.is_main().then(|| self.inner.registry.clone()),
                    config: self.inner.config.clone(),
                    cancel: cancel.clone(),
                    manager: Arc::downgrade(&self.inner),
                };
                let task = tokio::spawn(driver.run());

                slot.insert(LiveConnection {
                    generation,
                    cancel,
                    task,
                });
                info!(id = %id, "connection started");
                Disconnect::new(&self.inner, id, generation)
            }
        }
    }

    // ── State observation ────────────────────────────────────────

    /// Current state of `id`. Ids never connected report `Disconnected`.
    pub fn connection_state(&self, id: &ConnectionId) -> ConnectionState {
        self.inner
            .states
            .get(id)
            .map(|s| *s.value())
            .unwrap_or_default()
    }

    /// Subscribe to state transitions of every connection.
    pub fn state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.inner.state_tx.subscribe()
    }

    /// Ids with a live connection (connecting, connected, or retrying), sorted.
    pub fn live_connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> =
            self.inner.live.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_live(&self, id: &ConnectionId) -> bool {
        self.inner.live.contains_key(id)
    }

    /// Disconnect every live connection, and move any that gave up
    /// retrying from `Error` to `Disconnected`.
    pub fn disconnect_all(&self) {
        let mut targets: Vec<(ConnectionId, u64)> = self
            .inner
            .live
            .iter()
            .map(|e| (e.key().clone(), e.value().generation))
            .collect();
        targets.extend(
            self.inner
                .retired
                .iter()
                .map(|e| (e.key().clone(), *e.value())),
        );

        for (id, generation) in targets {
            self.inner.disconnect(&id, generation);
        }
    }
}

impl ManagerInner {
    /// Record `state` for `id`, unless a different (or no) connection is
    /// live for it. Holding the live entry while writing keeps a stale
    /// driver from racing a disconnect.
    pub(crate) fn set_state_if_live(
        &self,
        id: &ConnectionId,
        generation: u64,
        state: ConnectionState,
    ) -> bool {
        let Some(live) = self.live.get(id) else {
            return false;
        };
        if live.generation != generation {
            return false;
        }
        self.publish(id, state);
        true
    }

    /// Drop a connection that gave up retrying. Its state stays as is
    /// until the caller disconnects it.
    pub(crate) fn retire(&self, id: &ConnectionId, generation: u64) -> bool {
        let retired = self
            .live
            .remove_if(id, |_, live| live.generation == generation)
            .is_some();
        if retired {
            self.retired.insert(id.clone(), generation);
        }
        retired
    }

    fn disconnect(&self, id: &ConnectionId, generation: u64) {
        if let Some((_, live)) = self
            .live
            .remove_if(id, |_, live| live.generation == generation)
        {
            live.stop();
        } else if self
            .retired
            .remove_if(id, |_, retired| *retired == generation)
            .is_none()
        {
            return;
        }

        self.publish(id, ConnectionState::Disconnected);
        info!(id = %id, "disconnected");
    }

    fn publish(&self, id: &ConnectionId, state: ConnectionState) {
        let previous = if state == ConnectionState::Disconnected {
            self.states.remove(id).map(|(_, s)| s)
        } else {
            self.states.insert(id.clone(), state)
        };
        if previous != Some(state) {
            debug!(id = %id, %state, "connection state changed");
            // Ignore send errors -- just means nobody is watching right now
            let _ = self.state_tx.send(StateChange {
                id: id.clone(),
                state,
            });
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for live in &self.live {
            live.stop();
        }
    }
}

// ── Disconnect ───────────────────────────────────────────────────

/// Handle returned by `connect_main` / `connect_zone`.
///
/// [`disconnect`](Self::disconnect) is idempotent, and a handle never
/// tears down a newer connection that later took over the same id.
#[derive(Debug, Clone)]
pub struct Disconnect {
    target: Option<Target>,
}

#[derive(Debug, Clone)]
struct Target {
    manager: Weak<ManagerInner>,
    id: ConnectionId,
    generation: u64,
}

impl Disconnect {
    fn new(manager: &Arc<ManagerInner>, id: ConnectionId, generation: u64) -> Self {
        Self {
            target: Some(Target {
                manager: Arc::downgrade(manager),
                id,
                generation,
            }),
        }
    }

    /// A handle that does nothing (returned when no connection was made).
    pub fn noop() -> Self {
        Self { target: None }
    }

    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    /// The connection this handle controls.
    pub fn id(&self) -> Option<&ConnectionId> {
        self.target.as_ref().map(|t| &t.id)
    }

    /// Close the stream, stop its heartbeat and any pending retry, and
    /// mark it `Disconnected`. No handler fires for it afterwards.
    pub fn disconnect(&self) {
        let Some(target) = &self.target else {
            return;
        };
        if let Some(manager) = target.manager.upgrade() {
            manager.disconnect(&target.id, target.generation);
        }
    }
}
