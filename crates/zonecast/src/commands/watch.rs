//! `zonecast watch`: print zone updates as JSON lines until interrupted.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use zonecast_core::{
    ConnectionHandlers, CoreError, MainFrame, StateChange, StaticToken, StreamManager,
};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, UpdateLine};

/// What a connection's `on_message` prints.
#[derive(Debug, Clone, Copy)]
enum FrameOutput {
    /// The whole frame, tagged with the connection id.
    Whole,
    /// One line per zone update in a main-stream frame.
    PerZone,
    /// Nothing; zone subscribers do the printing.
    Silent,
}

type Fatal = mpsc::UnboundedSender<CliError>;

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let WatchArgs {
        zones,
        dedicated,
        raw,
        max_retries,
    } = args;
    let cfg = zonecast_config::load_config()?;
    let resolved = config::resolve(global, &cfg)?;

    let mut manager_config = resolved.settings.manager;
    if let Some(max_retries) = max_retries {
        manager_config.reconnect.max_retries = max_retries;
    }

    let manager = StreamManager::with_sse(
        manager_config,
        resolved.settings.endpoints,
        &resolved.settings.transport,
        Arc::new(StaticToken::new(resolved.token)),
    )?;

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let status = (!global.quiet)
        .then(|| spawn_status(manager.state_changes(), output::should_color(global.color)));

    let profile = resolved.profile_name.as_str();
    if dedicated {
        for zone in &zones {
            manager.connect_zone(zone, handlers(FrameOutput::Whole, &fatal_tx, profile))?;
        }
    } else {
        let mode = if raw {
            FrameOutput::Whole
        } else if zones.is_empty() {
            FrameOutput::PerZone
        } else {
            for zone in &zones {
                let fatal = fatal_tx.clone();
                manager.subscribe(zone, move |update| {
                    let payload = update.to_value();
                    let line = UpdateLine::now(&update.zone_name, &payload);
                    report(&fatal, output::print_line(&line));
                })?;
            }
            FrameOutput::Silent
        };
        manager.connect_main(handlers(mode, &fatal_tx, profile));
    }
    tracing::info!(
        connections = manager.live_connections().len(),
        zones = ?zones,
        "watching"
    );

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.map_err(CliError::from),
        Some(err) = fatal_rx.recv() => Err(err),
    };

    manager.disconnect_all();
    if let Some(task) = status {
        task.abort();
    }
    result
}

fn handlers(mode: FrameOutput, fatal: &Fatal, profile: &str) -> ConnectionHandlers {
    let on_message = fatal.clone();
    let on_error = fatal.clone();
    let profile = profile.to_owned();
    let last_error: Arc<Mutex<Option<CoreError>>> = Arc::default();

    ConnectionHandlers::new()
        .on_message(move |frame| report(&on_message, print_frame(mode, frame)))
        .on_error(move |err| {
            let Ok(mut last) = last_error.lock() else {
                return;
            };
            if err.is_terminal() {
                let _ = on_error.send(terminal_error(err, last.as_ref(), &profile));
                return;
            }
            match err {
                CoreError::Parse { .. } => tracing::debug!(error = %err, "skipping frame"),
                _ => tracing::warn!(error = %err, "stream interrupted"),
            }
            *last = Some(err.clone());
        })
}

/// Give up with the most useful error: a rejected token beats a bare
/// "retries exhausted".
fn terminal_error(err: &CoreError, last: Option<&CoreError>, profile: &str) -> CliError {
    match last {
        Some(CoreError::Transport {
            status: Some(401 | 403),
            ..
        }) => CliError::AuthFailed {
            profile: profile.to_owned(),
        },
        _ => err.clone().into(),
    }
}

fn print_frame(mode: FrameOutput, frame: &Value) -> Result<(), CliError> {
    match mode {
        FrameOutput::Whole => {
            let source = frame
                .get("zoneName")
                .and_then(Value::as_str)
                .unwrap_or("main");
            output::print_line(&UpdateLine::now(source, frame))
        }
        FrameOutput::PerZone => {
            let Some(frame) = MainFrame::from_value(frame) else {
                return Ok(());
            };
            for update in &frame.updates {
                let payload = update.to_value();
                output::print_line(&UpdateLine::now(&update.zone_name, &payload))?;
            }
            Ok(())
        }
        FrameOutput::Silent => Ok(()),
    }
}

/// Forward an output failure (closed pipe, ...) to the main task.
fn report(fatal: &Fatal, result: Result<(), CliError>) {
    if let Err(err) = result {
        let _ = fatal.send(err);
    }
}

fn spawn_status(mut changes: broadcast::Receiver<StateChange>, color: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => eprintln!("{}", output::render_state(&change, color)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "state updates lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
