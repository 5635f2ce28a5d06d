//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;

const MASK: &str = "********";

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", zonecast_config::config_path().display());
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = zonecast_config::load_config()?;
            let active = config::active_profile_name(global, &cfg);

            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some(MASK.into());
                }
            }

            if !global.quiet {
                eprintln!("# {}", zonecast_config::config_path().display());
                eprintln!("# active profile: {active}");
            }
            print!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { profile } => {
            let cfg = zonecast_config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));

            if !cfg.profiles.contains_key(&profile_name) {
                tracing::warn!(
                    profile = %profile_name,
                    available = %config::available_profiles(&cfg),
                    "storing token for a profile that is not in the config file"
                );
            }

            let token = rpassword::prompt_password("Token: ").map_err(prompt_err)?;
            let token = token.trim();
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            zonecast_config::store_token(&profile_name, token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}
