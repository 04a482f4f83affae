//! Daemon runtime: one bridge instance driven from the console.

use std::path::PathBuf;

use cgbridge_core::config::Settings;
use cgbridge_core::{BridgeHandle, ConnectionManager, SocketIoConnector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config_watcher::spawn_config_watcher;
use crate::console::{ConsoleCommand, ConsoleView, HELP, console, render_fields};
use crate::error::Result;

/// Startup options, usually taken from the command line
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    /// Overrides `url` from the settings file
    pub url: Option<String>,
    /// Overrides `token` from the settings file
    pub token: Option<String>,
    pub watch: bool,
}

/// Load the settings file and apply the command line overrides.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(options: &DaemonOptions) -> Result<Settings> {
    let settings = Settings::load(&options.config_path)?;
    Ok(settings.with_overrides(options.url.clone(), options.token.clone()))
}

/// Run until `quit`, Ctrl-C or a fatal stdin error.
///
/// # Errors
///
/// Returns an error if the initial settings cannot be loaded or stdin fails.
pub async fn run(options: DaemonOptions) -> Result<()> {
    let mut settings = load_settings(&options)?;
    info!("Loaded settings from {}", options.config_path.display());

    let (host, view) = console();
    let connector = SocketIoConnector::new(&settings.transport);
    let (manager, handle) = ConnectionManager::new(connector, host, settings.bridge.clone());
    let bridge = tokio::spawn(manager.run());

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let _watcher = options
        .watch
        .then(|| spawn_config_watcher(options.config_path.clone(), reload_tx));

    spawn_printers(&view);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            Some(()) = reload_rx.recv() => {
                reload(&options, &handle, &mut settings, false);
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    debug!("stdin closed, waiting for Ctrl-C");
                    stdin_open = false;
                    continue;
                };
                match ConsoleCommand::parse(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Reload)) => {
                        reload(&options, &handle, &mut settings, true);
                    }
                    Ok(Some(command)) => execute(&command, &view),
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    handle.destroy();
    if let Err(e) = bridge.await {
        error!("Bridge task failed: {}", e);
    }
    Ok(())
}

fn execute(command: &ConsoleCommand, view: &ConsoleView) {
    match command {
        ConsoleCommand::Status => println!("{}", view.render_status()),
        ConsoleCommand::List => println!("{}", view.render_actions()),
        ConsoleCommand::Run(id) => match view.run_action(id) {
            Ok(()) => println!("Running {id}"),
            Err(e) => println!("{e}"),
        },
        ConsoleCommand::Fields => println!("{}", render_fields()),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Reload | ConsoleCommand::Quit => {}
    }
}

/// Re-read the settings file and reconfigure the bridge if its config changed.
///
/// `force` reconfigures even when nothing changed, which also forces a reconnect.
fn reload(options: &DaemonOptions, handle: &BridgeHandle, current: &mut Settings, force: bool) {
    let updated = match load_settings(options) {
        Ok(updated) => updated,
        Err(e) => {
            error!("Failed to reload settings, keeping previous ones: {}", e);
            return;
        }
    };

    if updated.transport != current.transport {
        warn!("Transport settings changed; restart cgbridge to apply them");
    }

    if force || updated.bridge != current.bridge {
        info!("Reconfiguring bridge");
        handle.reconfigure(updated.bridge.clone());
    } else {
        debug!("Bridge settings unchanged");
    }

    *current = updated;
}

fn spawn_printers(view: &ConsoleView) {
    let mut status = view.status.clone();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            println!("Status: {}", *status.borrow_and_update());
        }
    });

    let mut actions = view.actions.clone();
    tokio::spawn(async move {
        while actions.changed().await.is_ok() {
            let count = actions.borrow_and_update().len();
            println!("{count} actions available (type 'list' to show them)");
        }
    });
}
