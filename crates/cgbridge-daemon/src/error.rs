//! Error types for the cgbridge daemon.

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bridge error
    #[error("Bridge error: {0}")]
    Bridge(#[from] cgbridge_core::BridgeError),

    /// Console input that is not a known command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command given without its argument
    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),

    /// No published action with this id
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DaemonError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_daemon_error_display_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = DaemonError::Json(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_daemon_error_display_bridge() {
        let err: DaemonError = cgbridge_core::BridgeError::Config("bad file".to_string()).into();
        assert!(matches!(err, DaemonError::Bridge(_)));
        assert_eq!(err.to_string(), "Bridge error: Config error: bad file");
    }

    #[test]
    fn test_daemon_error_display_console() {
        assert_eq!(
            DaemonError::UnknownCommand("jump".to_string()).to_string(),
            "Unknown command: jump"
        );
        assert_eq!(
            DaemonError::MissingArgument("run").to_string(),
            "Missing argument for 'run'"
        );
        assert_eq!(
            DaemonError::UnknownAction("method_x_y".to_string()).to_string(),
            "Unknown action: method_x_y"
        );
    }

    #[test]
    fn test_daemon_error_display_watcher() {
        let notify_err = notify::Error::generic("watch failed");
        let err = DaemonError::Watcher(notify_err);
        assert!(err.to_string().contains("Watcher error"));
        assert!(err.to_string().contains("watch failed"));
    }

    #[test]
    fn test_daemon_error_result_type_alias_err() {
        fn returns_err() -> Result<i32> {
            Err(DaemonError::UnknownCommand("x".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
