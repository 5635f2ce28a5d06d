// zonecast-core: one push stream, many zone subscribers.

pub mod auth;
pub mod config;
mod connection;
pub mod dispatch;
pub mod error;
pub mod handlers;
mod heartbeat;
pub mod id;
pub mod manager;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{StaticToken, TokenProvider, TokenStore};
pub use config::{Endpoints, ManagerConfig, ZONE_QUERY_PARAM};
pub use dispatch::{DispatchReport, dispatch_frame};
pub use error::CoreError;
pub use handlers::ConnectionHandlers;
pub use id::{ConnectionId, ZoneKey};
pub use manager::{ConnectionState, Disconnect, StateChange, StreamManager};
pub use registry::{SubscriberId, Subscription, SubscriptionRegistry, ZoneCallback};

// Wire and transport types consumers need alongside the manager.
pub use zonecast_api::{
    MainFrame, ReconnectConfig, TlsMode, Transport, TransportConfig, ZoneUpdate,
};
