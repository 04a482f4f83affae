//! cgbridge entry point.
//!
//! Connects to a NodeCG server, turns its remote methods into actions and
//! lets the operator run them from the console.

use std::path::PathBuf;

use anyhow::Context;
use cgbridge_core::config::Directories;
use cgbridge_daemon::DaemonOptions;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// cgbridge - run NodeCG remote methods from the console
#[derive(Parser, Debug)]
#[command(name = "cgbridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to `$XDG_CONFIG_HOME/cgbridge/config.json`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// NodeCG URL, overrides the settings file
    #[arg(long)]
    url: Option<String>,

    /// Access token, overrides the settings file
    #[arg(long)]
    token: Option<String>,

    /// Do not reload the settings file when it changes
    #[arg(long)]
    no_watch: bool,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cgbridge={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("cgbridge-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("cgbridge.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    let config_path = match args.config {
        Some(path) => path,
        None => {
            let dirs = Directories::new()?;
            dirs.ensure_exists()
                .with_context(|| format!("Failed to create {}", dirs.config.display()))?;
            dirs.config_file
        }
    };

    info!("Starting cgbridge...");

    cgbridge_daemon::run(DaemonOptions {
        config_path,
        url: args.url,
        token: args.token,
        watch: !args.no_watch,
    })
    .await
    .context("cgbridge stopped with an error")?;

    info!("cgbridge stopped");
    Ok(())
}
