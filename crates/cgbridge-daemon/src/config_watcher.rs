//! Settings file watcher for hot-reload support.
//!
//! notify delivers events on its own thread; a second thread debounces them
//! and forwards a single `()` per burst to the async side.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info};

use crate::error::{DaemonError, Result};

/// Editors often write in several steps; wait for the file to settle.
const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

pub struct ConfigWatcher {
    _watcher_thread: std::thread::JoinHandle<()>,
    _bridge_thread: std::thread::JoinHandle<()>,
}

/// Watch `config_path` and send `()` on `tx` whenever it changes.
///
/// The threads stop once `tx`'s receiver is dropped and the next change arrives.
pub fn spawn_config_watcher(
    config_path: PathBuf,
    tx: tokio_mpsc::UnboundedSender<()>,
) -> ConfigWatcher {
    let (sync_tx, sync_rx) = mpsc::channel::<()>();

    let watcher_thread = std::thread::spawn(move || {
        if let Err(e) = watch_config_file(&config_path, &sync_tx) {
            error!("Config watcher error: {e}");
        }
    });

    let bridge_thread = std::thread::spawn(move || {
        let mut last_sent: Option<Instant> = None;
        while sync_rx.recv().is_ok() {
            if last_sent.is_some_and(|at| at.elapsed() < DEBOUNCE_DURATION) {
                continue;
            }
            std::thread::sleep(RELOAD_SETTLE_DELAY);
            // Collapse whatever arrived while settling
            while sync_rx.try_recv().is_ok() {}

            debug!("Config file changed, sending reload notification");
            if tx.send(()).is_err() {
                debug!("Config reload receiver dropped, stopping watcher");
                break;
            }
            last_sent = Some(Instant::now());
        }
    });

    ConfigWatcher {
        _watcher_thread: watcher_thread,
        _bridge_thread: bridge_thread,
    }
}

/// Whether a notify event concerns the settings file itself.
fn is_config_event(event: &notify::Event, config_path: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == config_path.file_name())
}

fn watch_config_file(config_path: &Path, tx: &mpsc::Sender<()>) -> Result<()> {
    let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Err(DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Invalid config path",
        )));
    };

    let watched = config_path.to_owned();
    let (watcher_tx, watcher_rx) = mpsc::channel();

    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) if is_config_event(&event, &watched) => {
                let _ = watcher_tx.send(());
            }
            Ok(_) => {}
            Err(e) => error!("Watcher error: {}", e),
        })?;

    // Watch the directory so atomic replace-by-rename is noticed too
    watcher.watch(parent, RecursiveMode::NonRecursive)?;
    info!("Watching config directory: {:?}", parent);

    while watcher_rx.recv().is_ok() {
        if tx.send(()).is_err() {
            break;
        }
    }

    Ok(())
}
