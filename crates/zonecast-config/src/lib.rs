//! Configuration for zonecast consumers.
//!
//! TOML profiles, `ZONECAST_` environment overrides, bearer-token
//! resolution (env + keyring + plaintext), and translation into the
//! runtime types `zonecast_core` expects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zonecast_core::{Endpoints, ManagerConfig, ReconnectConfig, TlsMode, TransportConfig};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "zonecast";

/// Environment variable holding a token for any profile.
pub const TOKEN_ENV: &str = "ZONECAST_TOKEN";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "ZONECAST_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick `name`, or the configured default profile.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// Connect timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub stream: StreamOptions,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            stream: StreamOptions::default(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

/// Reconnect and liveness tuning, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamOptions {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2_000,
            max_retry_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            connection_timeout_ms: 60_000,
        }
    }
}

impl StreamOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(invalid("heartbeat_interval_ms", "must be greater than zero"));
        }
        if self.connection_timeout_ms < self.heartbeat_interval_ms {
            return Err(invalid(
                "connection_timeout_ms",
                "must be at least heartbeat_interval_ms",
            ));
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(invalid("max_retry_delay_ms", "must be at least retry_delay_ms"));
        }
        Ok(())
    }

    pub fn to_manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        self.validate()?;
        Ok(ManagerConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.retry_delay_ms),
                max_delay: Duration::from_millis(self.max_retry_delay_ms),
                max_retries: self.max_retries,
            },
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
        })
    }
}

/// A named server profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Dashboard server base URL (e.g., "https://plant.example:8443").
    pub server: String,

    /// Path of the shared multi-zone stream.
    #[serde(default = "default_main_path")]
    pub main_path: String,

    /// Path of the dedicated per-zone stream.
    #[serde(default = "default_zone_path")]
    pub zone_path: String,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override connect timeout.
    pub timeout: Option<u64>,

    /// Override stream tuning for this profile.
    pub stream: Option<StreamOptions>,
}

fn default_main_path() -> String {
    "/api/sse/stream".into()
}
fn default_zone_path() -> String {
    "/api/sse/zone".into()
}

impl Profile {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            main_path: default_main_path(),
            zone_path: default_zone_path(),
            token: None,
            token_env: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            stream: None,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `ZONECAST_CONFIG`, else platform conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("dev", "zonecast", "zonecast").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zonecast");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment keys nest on `__`, e.g.
/// `ZONECAST_DEFAULTS__STREAM__MAX_RETRIES=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZONECAST_").ignore(&["token", "config"]).split("__"));

    let config: Config = figment.extract()?;
    config.defaults.stream.validate()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bearer token: `token_env` → `ZONECAST_TOKEN` → keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        tracing::debug!(env = %env_name, "token_env not set, trying next source");
    }

    // 2. Shared env var
    if let Ok(val) = std::env::var(TOKEN_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

/// Store a token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── Translation to runtime types ────────────────────────────────────

/// Everything needed to build a `StreamManager`, minus the token.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub endpoints: Endpoints,
    pub manager: ManagerConfig,
    pub transport: TransportConfig,
}

/// Build runtime settings from a profile, falling back to `defaults`.
pub fn profile_to_stream_settings(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<StreamSettings, ConfigError> {
    let base: url::Url = profile
        .server
        .parse()
        .map_err(|_| invalid("server", format!("invalid URL: {}", profile.server)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(
            "server",
            format!("expected http or https, got '{}'", base.scheme()),
        ));
    }

    let endpoints = Endpoints::from_base(&base, &profile.main_path, &profile.zone_path)
        .map_err(|e| invalid("main_path/zone_path", e.to_string()))?;

    let manager = profile
        .stream
        .as_ref()
        .unwrap_or(&defaults.stream)
        .to_manager_config()?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let transport = TransportConfig {
        tls,
        connect_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..TransportConfig::default()
    };

    Ok(StreamSettings {
        endpoints,
        manager,
        transport,
    })
}
