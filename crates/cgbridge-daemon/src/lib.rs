//! cgbridge daemon library: a console host for one NodeCG bridge.
//!
//! The binary wires the bridge from `cgbridge-core` to stdin/stdout, reloads
//! the settings file when it changes and shuts down cleanly on Ctrl-C.

pub(crate) mod config_watcher;
pub mod console;
pub mod daemon;
pub mod error;

pub use console::{ConsoleCommand, ConsoleHost, ConsoleView, console};
pub use daemon::{DaemonOptions, load_settings, run};
pub use error::{DaemonError, Result};
