// ── Connection driver ──
//
// One spawned task per live connection: open → read frames (with the
// heartbeat watching) → on failure, back off → reopen. The task owns the
// transport stream, the heartbeat, and the only pending retry sleep for
// its connection id; cancelling it drops all three.

use std::sync::Weak;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use zonecast_api::{HeaderMap, Transport};

use crate::config::ManagerConfig;
use crate::dispatch::dispatch_frame;
use crate::error::CoreError;
use crate::handlers::ConnectionHandlers;
use crate::heartbeat::Heartbeat;
use crate::id::ConnectionId;
use crate::manager::{ConnectionState, ManagerInner};
use crate::registry::SubscriptionRegistry;

/// How a session (one open transport stream) ended.
struct SessionEnd {
    error: CoreError,
    /// Whether the stream got as far as opening; resets the retry budget.
    opened: bool,
}

pub(crate) struct Driver {
    pub(crate) id: ConnectionId,
    pub(crate) generation: u64,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) transport: std::sync::Arc<dyn Transport>,
    pub(crate) handlers: ConnectionHandlers,
    /// Registry to fan frames out to. Only the main stream has one.
    pub(crate) fanout: Option<SubscriptionRegistry>,
    pub(crate) config: ManagerConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) manager: Weak<ManagerInner>,
}

impl Driver {
    /// Main loop: session → on error, backoff → reconnect, until cancelled,
    /// retired, or out of retries.
    pub(crate) async fn run(self) {
        let mut retries: u32 = 0;

        loop {
            let end = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                end = self.session() => end,
            };
            let Some(end) = end else { return };

            if end.opened {
                retries = 0;
            }

            if !self.set_state(ConnectionState::Error) {
                return;
            }
            self.emit_error(&end.error);

            if !self.config.reconnect.allows(retries) {
                self.give_up(retries);
                return;
            }

            let delay = self.config.reconnect.delay_for(retries);
            retries += 1;
            tracing::info!(
                id = %self.id,
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if !self.set_state(ConnectionState::Connecting) {
                return;
            }
        }
    }

    /// Open the transport and read until it fails.
    ///
    /// Returns `None` when the connection was disconnected or replaced
    /// underneath us and the driver should stop quietly.
    async fn session(&self) -> Option<SessionEnd> {
        tracing::debug!(id = %self.id, url = %self.url, "opening stream");

        // The heartbeat only covers an open stream, so the open itself is
        // bounded by the same connection timeout.
        let limit = self.config.connection_timeout;
        let opening = self.transport.open(&self.url, self.headers.clone());
        let mut frames = match tokio::time::timeout(limit, opening).await {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => {
                tracing::warn!(id = %self.id, error = %e, "stream open failed");
                return Some(SessionEnd {
                    error: CoreError::transport(self.id.clone(), &e),
                    opened: false,
                });
            }
            Err(_elapsed) => {
                tracing::warn!(
                    id = %self.id,
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "stream open timed out"
                );
                return Some(SessionEnd {
                    error: CoreError::Transport {
                        id: self.id.clone(),
                        reason: format!("stream did not open within {limit:?}"),
                        status: None,
                    },
                    opened: false,
                });
            }
        };

        if !self.set_state(ConnectionState::Connected) || self.cancel.is_cancelled() {
            return None;
        }
        tracing::info!(id = %self.id, "stream connected");

        let mut heartbeat =
            Heartbeat::start(self.config.heartbeat_interval, self.config.connection_timeout);
        self.handlers.open(&self.id);

        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(text)) => {
                        heartbeat.record_message();
                        if !self.handle_frame(&text) {
                            return None;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(id = %self.id, error = %e, "stream error");
                        return Some(SessionEnd {
                            error: CoreError::transport(self.id.clone(), &e),
                            opened: true,
                        });
                    }
                    None => {
                        tracing::info!(id = %self.id, "stream ended");
                        return Some(SessionEnd {
                            error: CoreError::transport(self.id.clone(), &zonecast_api::Error::Closed),
                            opened: true,
                        });
                    }
                },
                silent = heartbeat.tick() => {
                    if let Some(silent_for) = silent {
                        tracing::warn!(
                            id = %self.id,
                            silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                            "no frames within connection timeout, forcing reconnect"
                        );
                        return Some(SessionEnd {
                            error: CoreError::StaleConnection {
                                id: self.id.clone(),
                                silent_for,
                            },
                            opened: true,
                        });
                    }
                }
            }
        }
    }

    /// Parse one frame and deliver it. Returns `false` once the
    /// connection has been cancelled.
    fn handle_frame(&self, text: &str) -> bool {
        match serde_json::from_str::<Value>(text) {
            Ok(payload) => {
                if let Some(registry) = &self.fanout {
                    if self.cancel.is_cancelled() {
                        return false;
                    }
                    let report = dispatch_frame(registry, &payload);
                    tracing::trace!(
                        id = %self.id,
                        delivered = report.delivered,
                        failed = report.failed,
                        unrouted = report.unrouted,
                        "frame dispatched"
                    );
                }
                if self.cancel.is_cancelled() {
                    return false;
                }
                self.handlers.message(&self.id, &payload);
            }
            Err(e) => {
                // A single bad frame does not tear the stream down.
                tracing::debug!(id = %self.id, error = %e, "malformed frame");
                if self.cancel.is_cancelled() {
                    return false;
                }
                self.handlers.error(
                    &self.id,
                    &CoreError::Parse {
                        id: self.id.clone(),
                        message: e.to_string(),
                    },
                );
            }
        }
        true
    }

    fn emit_error(&self, err: &CoreError) {
        if !self.cancel.is_cancelled() {
            self.handlers.error(&self.id, err);
        }
    }

    /// Out of retries: leave the state at `Error`, drop out of the live
    /// set, and tell the caller once.
    fn give_up(&self, attempts: u32) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if !manager.retire(&self.id, self.generation) {
            return;
        }

        tracing::error!(
            id = %self.id,
            max_retries = self.config.reconnect.max_retries,
            "reconnection limit reached, giving up"
        );
        self.emit_error(&CoreError::RetriesExhausted {
            id: self.id.clone(),
            attempts,
        });
    }

    /// Record a state transition. Returns `false` if this driver's
    /// connection is no longer the live one for its id.
    fn set_state(&self, state: ConnectionState) -> bool {
        self.manager
            .upgrade()
            .is_some_and(|m| m.set_state_if_live(&self.id, self.generation, state))
    }
}
