// ── Per-connection outcome handlers ──
//
// Callers describe what should happen on open, on each parsed frame, and
// on errors. Handlers run on the connection's driver task; a panicking
// handler is logged and does not take the connection down.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::panic_message;
use crate::error::CoreError;
use crate::id::ConnectionId;

type OpenFn = Arc<dyn Fn() + Send + Sync>;
type MessageFn = Arc<dyn Fn(&Value) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&CoreError) + Send + Sync>;

/// Callbacks for one connection. Every handler is optional.
///
/// ```rust,ignore
/// let handlers = ConnectionHandlers::new()
///     .on_open(|| tracing::info!("live"))
///     .on_error(|e| tracing::warn!(error = %e, "stream trouble"));
/// ```
#[derive(Clone, Default)]
pub struct ConnectionHandlers {
    on_open: Option<OpenFn>,
    on_message: Option<MessageFn>,
    on_error: Option<ErrorFn>,
}

impl ConnectionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Called with every parsed frame. On the main stream this runs after
    /// the frame has been fanned out to zone subscribers.
    #[must_use]
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&CoreError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn open(&self, id: &ConnectionId) {
        if let Some(f) = &self.on_open {
            guarded(id, "on_open", || f());
        }
    }

    pub(crate) fn message(&self, id: &ConnectionId, payload: &Value) {
        if let Some(f) = &self.on_message {
            guarded(id, "on_message", || f(payload));
        }
    }

    pub(crate) fn error(&self, id: &ConnectionId, err: &CoreError) {
        if let Some(f) = &self.on_error {
            guarded(id, "on_error", || f(err));
        }
    }
}

impl fmt::Debug for ConnectionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

fn guarded(id: &ConnectionId, handler: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            id = %id,
            handler,
            panic = %panic_message(payload.as_ref()),
            "connection handler panicked"
        );
    }
}
