//! Output formatting: JSON lines on stdout, colored status on stderr.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;

use zonecast_core::{ConnectionState, StateChange};

use crate::cli::ColorMode;
use crate::error::CliError;

/// Determine whether status output on stderr should be colored.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// One line of `watch` output.
#[derive(Debug, Serialize)]
pub struct UpdateLine<'a> {
    pub received_at: String,
    /// Zone the update belongs to, or the connection id for whole frames.
    pub source: &'a str,
    pub payload: &'a Value,
}

impl<'a> UpdateLine<'a> {
    pub fn now(source: &'a str, payload: &'a Value) -> Self {
        Self {
            received_at: timestamp(Utc::now()),
            source,
            payload,
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write one JSON line to stdout.
pub fn print_line(line: &UpdateLine<'_>) -> Result<(), CliError> {
    let rendered = serde_json::to_string(line)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    stdout.flush()?;
    Ok(())
}

/// Human-readable state transition for stderr.
pub fn render_state(change: &StateChange, color: bool) -> String {
    let state = change.state.to_string();
    let state = if color {
        match change.state {
            ConnectionState::Connected => state.green().bold().to_string(),
            ConnectionState::Connecting => state.yellow().to_string(),
            ConnectionState::Error => state.red().bold().to_string(),
            ConnectionState::Disconnected => state.dimmed().to_string(),
        }
    } else {
        state
    };
    format!("[{}] {state}", change.id)
}
