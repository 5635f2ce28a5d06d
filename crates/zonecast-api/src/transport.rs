// Shared transport configuration and the push-stream transport seam.
//
// The connection manager only ever talks to a `Transport`; the reqwest-backed
// SSE implementation lives in `sse.rs`, test doubles live next to the tests.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// A live push stream: one item per frame body, in delivery order.
///
/// An `Err` item is terminal for the stream; `None` means the server
/// closed it.
pub type FrameStream = BoxStream<'static, Result<String, Error>>;

/// Opens push streams. Implemented by [`SseTransport`](crate::SseTransport)
/// and by in-memory fakes in tests.
pub trait Transport: Send + Sync + 'static {
    /// Open a stream to `url` with the given request headers.
    ///
    /// Resolves once the server has accepted the stream (the equivalent of
    /// an `open` event); frames are then pulled from the returned stream.
    fn open(&self, url: &Url, headers: HeaderMap) -> BoxFuture<'static, Result<FrameStream, Error>>;
}

/// Build the request headers for a stream request authenticated with `token`.
pub fn bearer_headers(token: &SecretString) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| Error::InvalidHeader {
            name: "authorization",
        })?;
    auth.set_sensitive(true);

    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(headers)
}

/// TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed plant servers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Upper bound on establishing the TCP/TLS connection.
    ///
    /// Push streams are long-lived, so there is deliberately no
    /// whole-request timeout; stalls are caught by the heartbeat.
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("zonecast/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str());

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
