use cgbridge_rpc::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No NodeCG URL configured")]
    Configuration,

    #[error("Unauthorized")]
    Authentication,

    #[error("Transport error: {0}")]
    Transport(#[from] ClientError),

    #[error("Failed to fetch remote methods: {0}")]
    Fetch(String),

    #[error("Failed to execute {bundle_name}/{method_name}: {reason}")]
    Invocation {
        bundle_name: String,
        method_name: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        assert_eq!(
            BridgeError::Configuration.to_string(),
            "No NodeCG URL configured"
        );
    }

    #[test]
    fn test_error_display_authentication() {
        assert_eq!(BridgeError::Authentication.to_string(), "Unauthorized");
    }

    #[test]
    fn test_error_display_transport() {
        let err: BridgeError = ClientError::InvalidUrl("missing host".to_string()).into();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Transport error: Invalid URL: missing host"
        );
    }

    #[test]
    fn test_error_display_invocation() {
        let err = BridgeError::Invocation {
            bundle_name: "obs".to_string(),
            method_name: "cut".to_string(),
            reason: "scene missing".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to execute obs/cut: scene missing");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }
}
