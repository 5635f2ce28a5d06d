//! CLI-side configuration: applies global flags on top of the profile
//! loaded by `zonecast-config`.

use secrecy::SecretString;

use zonecast_config::{Config, Profile, StreamSettings};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A profile resolved into everything `watch` needs.
pub struct Resolved {
    pub profile_name: String,
    pub settings: StreamSettings,
    pub token: SecretString,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// Translate config + global flags into stream settings and a token.
///
/// Precedence: flag > env > profile. Without a matching profile, `--server`
/// alone is enough.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut profile = match (config.profiles.get(&profile_name), &global.server) {
        (Some(profile), _) => profile.clone(),
        (None, Some(server)) => Profile::new(server.clone()),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(config),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: zonecast_config::config_path().display().to_string(),
            });
        }
    };

    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }

    let settings = zonecast_config::profile_to_stream_settings(&profile, &config.defaults)?;

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => zonecast_config::resolve_token(&profile, &profile_name)?,
    };

    Ok(Resolved {
        profile_name,
        settings,
        token,
    })
}
