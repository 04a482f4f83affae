//! Console host: publishes bridge state on watch channels and parses
//! operator commands typed on stdin.

use std::fmt::Write as _;

use cgbridge_core::{ActionSet, Host, InstanceStatus, config_fields};
use tokio::sync::watch;

use crate::error::{DaemonError, Result};

/// [`Host`] implementation that keeps only the latest status and action set.
pub struct ConsoleHost {
    status: watch::Sender<InstanceStatus>,
    actions: watch::Sender<ActionSet>,
}

/// Read side of a [`ConsoleHost`]
#[derive(Clone)]
pub struct ConsoleView {
    pub status: watch::Receiver<InstanceStatus>,
    pub actions: watch::Receiver<ActionSet>,
}

/// Create a connected host/view pair. The initial status is `Disconnected`.
#[must_use]
pub fn console() -> (ConsoleHost, ConsoleView) {
    let (status_tx, status_rx) = watch::channel(InstanceStatus::Disconnected(None));
    let (actions_tx, actions_rx) = watch::channel(ActionSet::new());

    (
        ConsoleHost {
            status: status_tx,
            actions: actions_tx,
        },
        ConsoleView {
            status: status_rx,
            actions: actions_rx,
        },
    )
}

impl Host for ConsoleHost {
    fn update_status(&mut self, status: &InstanceStatus) {
        self.status.send_replace(status.clone());
    }

    fn set_action_definitions(&mut self, actions: ActionSet) {
        self.actions.send_replace(actions);
    }
}

impl ConsoleView {
    #[must_use]
    pub fn render_status(&self) -> String {
        format!("Status: {}", *self.status.borrow())
    }

    #[must_use]
    pub fn render_actions(&self) -> String {
        let actions = self.actions.borrow();
        if actions.is_empty() {
            return "No actions available".to_string();
        }

        let mut out = String::new();
        for (id, action) in actions.iter() {
            let _ = write!(out, "{id}  {}", action.name);
            if let Some(description) = &action.description {
                let _ = write!(out, " - {description}");
            }
            if !action.options.is_empty() {
                let _ = write!(out, " ({} options)", action.options.len());
            }
            out.push('\n');
        }
        out.pop();
        out
    }

    /// Invoke the action published under `id`.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::UnknownAction` if no such action is published.
    pub fn run_action(&self, id: &str) -> Result<()> {
        // Clone so the callback does not run under the watch lock
        let action = self
            .actions
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| DaemonError::UnknownAction(id.to_string()))?;
        action.invoke();
        Ok(())
    }
}

/// Operator command typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    List,
    Run(String),
    Fields,
    Reload,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands or a `run` without an action id.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };

        let parsed = match command {
            "status" => Self::Status,
            "list" | "ls" => Self::List,
            "run" => {
                let id = words.next().ok_or(DaemonError::MissingArgument("run"))?;
                Self::Run(id.to_string())
            }
            "fields" => Self::Fields,
            "reload" => Self::Reload,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(DaemonError::UnknownCommand(other.to_string())),
        };
        Ok(Some(parsed))
    }
}

pub const HELP: &str = "\
Commands:
  status        show the connection status
  list          list the available actions
  run <id>      run an action
  fields        show the configuration fields
  reload        reload the settings file
  quit          disconnect and exit";

/// The configuration form, one field per line.
#[must_use]
pub fn render_fields() -> String {
    config_fields()
        .iter()
        .map(|field| format!("{}  {} (width {})", field.id, field.label, field.width))
        .collect::<Vec<_>>()
        .join("\n")
}
