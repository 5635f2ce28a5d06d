//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use zonecast_config::ConfigError;
use zonecast_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Stream '{id}' could not be kept open: {reason}")]
    #[diagnostic(
        code(zonecast::connection_failed),
        help(
            "Check that the dashboard server is running and reachable.\n\
             Try: zonecast watch -v --insecure"
        )
    )]
    ConnectionFailed { id: String, reason: String },

    #[error("Stream '{id}' gave up after {attempts} reconnection attempts")]
    #[diagnostic(
        code(zonecast::retries_exhausted),
        help("Raise the limit with --max-retries or stream.max_retries in your profile.")
    )]
    RetriesExhausted { id: String, attempts: u32 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("The server rejected the bearer token for profile '{profile}'")]
    #[diagnostic(
        code(zonecast::auth_failed),
        help("Store a fresh token with: zonecast config set-token --profile {profile}")
    )]
    AuthFailed { profile: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(zonecast::no_token),
        help(
            "Store one with: zonecast config set-token\n\
             Or set the ZONECAST_TOKEN environment variable."
        )
    )]
    NoToken { profile: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(code(zonecast::keyring))]
    Keyring { reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zonecast::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(zonecast::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Or pass the server directly with --server."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(zonecast::no_config),
        help(
            "Pass --server (or ZONECAST_SERVER), or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(zonecast::config))]
    Config(Box<figment::Error>),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render config: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::RetriesExhausted { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoToken { .. } | Self::Keyring { .. } => {
                exit_code::AUTH
            }
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationMissing { .. } => CliError::NoToken {
                profile: "current".into(),
            },

            CoreError::Transport {
                status: Some(401 | 403),
                ..
            } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Transport { ref id, .. } | CoreError::StaleConnection { ref id, .. } => {
                CliError::ConnectionFailed {
                    id: id.to_string(),
                    reason: err.to_string(),
                }
            }

            CoreError::RetriesExhausted { id, attempts } => CliError::RetriesExhausted {
                id: id.to_string(),
                attempts,
            },

            CoreError::Parse { message, .. } => CliError::Validation {
                field: "frame".into(),
                reason: message,
            },

            CoreError::InvalidZone { raw } => CliError::Validation {
                field: "zone".into(),
                reason: format!("{raw:?} is not a zone identifier"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Keyring(e) => CliError::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Serialization(e) => CliError::Toml(e),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
