// zonecast-api: push-stream transport, wire types, and reconnect policy.

pub mod backoff;
pub mod error;
pub mod frame;
pub mod sse;
pub mod transport;

pub use backoff::ReconnectConfig;
pub use error::Error;
pub use frame::{MainFrame, ZoneUpdate};
pub use sse::SseTransport;
pub use reqwest::header::HeaderMap;
pub use transport::{FrameStream, TlsMode, Transport, TransportConfig, bearer_headers};
