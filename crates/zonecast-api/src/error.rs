use thiserror::Error;

/// Top-level error type for the `zonecast-api` crate.
///
/// Covers every failure mode of the push-stream transport: building the
/// HTTP client, opening the stream, and reading frames off it.
/// `zonecast-core` maps these into connection-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A header value could not be encoded (e.g. a token with control characters).
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    // ── Stream ──────────────────────────────────────────────────────
    /// The server answered the stream request with a non-2xx status.
    #[error("Stream endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The server answered with something other than `text/event-stream`.
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// The event stream failed mid-flight (truncated chunk, bad UTF-8, reset).
    #[error("Event stream error: {0}")]
    Stream(String),

    /// The server closed the event stream.
    #[error("Event stream closed by server")]
    Closed,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Stream(_) | Self::Closed => true,
            _ => false,
        }
    }

    /// Returns `true` if the server rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401 | 403, .. })
    }

    /// HTTP status code, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
