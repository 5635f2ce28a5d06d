// ── Core error types ──
//
// Every failure a connection can report to its `on_error` handler, plus
// the few construction-time errors of the manager itself. Transport-layer
// errors from `zonecast-api` are folded into `Transport` with the id of
// the connection they happened on.

use std::time::Duration;

use thiserror::Error;

use crate::id::ConnectionId;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("No auth token available for stream '{id}' -- sign in and reconnect")]
    AuthenticationMissing { id: ConnectionId },

    #[error("Stream '{id}' transport error: {reason}")]
    Transport {
        id: ConnectionId,
        reason: String,
        /// HTTP status code (if the server answered at all).
        status: Option<u16>,
    },

    #[error("Stream '{id}' silent for {silent_for:?}, treating as stale")]
    StaleConnection { id: ConnectionId, silent_for: Duration },

    #[error("Stream '{id}' gave up after {attempts} reconnection attempts")]
    RetriesExhausted { id: ConnectionId, attempts: u32 },

    // ── Frame errors ─────────────────────────────────────────────────
    #[error("Malformed frame on stream '{id}': {message}")]
    Parse { id: ConnectionId, message: String },

    // ── Caller errors ────────────────────────────────────────────────
    #[error("Invalid zone identifier: {raw:?}")]
    InvalidZone { raw: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Wrap a transport-layer error raised on connection `id`.
    pub fn transport(id: ConnectionId, err: &zonecast_api::Error) -> Self {
        Self::Transport {
            id,
            reason: err.to_string(),
            status: err.status(),
        }
    }

    /// Returns `true` if this failure sends the connection down the
    /// reconnect path. Parse errors and missing auth never do.
    pub fn triggers_retry(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::StaleConnection { .. })
    }

    /// Returns `true` if the connection is gone and the caller has to
    /// call `connect` again to get data flowing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationMissing { .. } | Self::RetriesExhausted { .. }
        )
    }

    /// The connection this error was reported on, if any.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::AuthenticationMissing { id }
            | Self::Transport { id, .. }
            | Self::StaleConnection { id, .. }
            | Self::RetriesExhausted { id, .. }
            | Self::Parse { id, .. } => Some(id),
            Self::InvalidZone { .. } | Self::Config { .. } => None,
        }
    }
}
