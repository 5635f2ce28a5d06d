// ── Runtime manager configuration ──
//
// These types describe *where* the streams live and *how* to keep them
// alive. They never touch disk: `zonecast-config` (or a test) builds them
// and hands them in.

use std::time::Duration;

use url::Url;

use zonecast_api::ReconnectConfig;

use crate::error::CoreError;
use crate::id::ZoneKey;

/// Query parameter carrying the zone on dedicated zone streams.
pub const ZONE_QUERY_PARAM: &str = "zoneId";

/// Tuning for every connection the manager owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Reconnect attempts and backoff.
    pub reconnect: ReconnectConfig,
    /// Tick period for staleness checks.
    pub heartbeat_interval: Duration,
    /// Maximum silence before a connection is considered stale.
    pub connection_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(60),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.heartbeat_interval.is_zero() {
            return Err(CoreError::Config {
                message: "heartbeat interval must be greater than zero".into(),
            });
        }
        if self.connection_timeout < self.heartbeat_interval {
            return Err(CoreError::Config {
                message: format!(
                    "connection timeout ({:?}) is shorter than the heartbeat interval ({:?})",
                    self.connection_timeout, self.heartbeat_interval
                ),
            });
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(CoreError::Config {
                message: "max retry delay is shorter than the initial retry delay".into(),
            });
        }
        Ok(())
    }
}

/// Builds stream URLs: the shared main stream and `<base>?zoneId=<ZONE>`
/// for dedicated zone streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    main: Url,
    zone_base: Url,
}

impl Endpoints {
    pub fn new(main: Url, zone_base: Url) -> Self {
        Self { main, zone_base }
    }

    /// Resolve both stream paths against a server base URL.
    pub fn from_base(base: &Url, main_path: &str, zone_path: &str) -> Result<Self, CoreError> {
        let join = |path: &str| {
            base.join(path).map_err(|e| CoreError::Config {
                message: format!("invalid stream path {path:?}: {e}"),
            })
        };
        Ok(Self::new(join(main_path)?, join(zone_path)?))
    }

    pub fn main_url(&self) -> &Url {
        &self.main
    }

    pub fn zone_url(&self, zone: &ZoneKey) -> Url {
        let mut url = self.zone_base.clone();
        url.query_pairs_mut()
            .append_pair(ZONE_QUERY_PARAM, zone.as_str());
        url
    }
}
