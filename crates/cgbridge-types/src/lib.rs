//! Shared types for cgbridge components.
//!
//! This crate provides the types exchanged between the NodeCG server, the
//! bridge core and the host: remote method descriptors, the host-facing
//! instance status and the per-instance configuration.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Prefix of every action identifier derived from a remote method.
pub const ACTION_ID_PREFIX: &str = "method_";

/// Deserialize a string that may be null, missing or empty (all become `None`)
fn deserialize_empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.is_empty()))
}

/// One invocable unit exposed by a NodeCG bundle.
///
/// Received as part of the `remote:readAllMethods` acknowledgement on every
/// successful (re)connect. `(bundle_name, method_name)` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMethod {
    pub bundle_name: String,
    pub method_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<MethodUi>,
}

/// Optional presentation metadata attached to a remote method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodUi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Host input-field descriptors, forwarded without interpretation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_fields: Option<Vec<Value>>,
}

impl RemoteMethod {
    #[must_use]
    pub fn new(bundle_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            method_name: method_name.into(),
            ui: None,
        }
    }

    #[must_use]
    pub fn with_ui(mut self, ui: MethodUi) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Deterministic action identifier: `method_<bundle>_<method>`.
    #[must_use]
    pub fn action_id(&self) -> String {
        format!(
            "{ACTION_ID_PREFIX}{}_{}",
            self.bundle_name, self.method_name
        )
    }

    /// `"<bundle>: <title>"`, falling back to the method name without a title.
    #[must_use]
    pub fn display_name(&self) -> String {
        let label = self
            .ui
            .as_ref()
            .and_then(|ui| ui.title.as_deref())
            .unwrap_or(&self.method_name);
        format!("{}: {}", self.bundle_name, label)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.ui.as_ref().and_then(|ui| ui.description.as_deref())
    }

    /// Companion fields, or an empty list when the method declares none.
    #[must_use]
    pub fn options(&self) -> Vec<Value> {
        self.ui
            .as_ref()
            .and_then(|ui| ui.companion_fields.clone())
            .unwrap_or_default()
    }
}

/// Connection health as shown on the host's status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum InstanceStatus {
    Connecting(Option<String>),
    Ok,
    BadConfig,
    ConnectionFailure(String),
    Disconnected(Option<String>),
}

impl InstanceStatus {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting(_) => "connecting",
            Self::Ok => "ok",
            Self::BadConfig => "bad_config",
            Self::ConnectionFailure(_) => "connection_failure",
            Self::Disconnected(_) => "disconnected",
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Connecting(msg) | Self::Disconnected(msg) => msg.as_deref(),
            Self::ConnectionFailure(msg) => Some(msg),
            Self::Ok | Self::BadConfig => None,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} ({msg})", self.label()),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Per-instance configuration edited by the host operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default, deserialize_with = "deserialize_empty_as_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_as_none")]
    pub token: Option<String>,
}

impl BridgeConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Configured URL, treating an empty string as absent.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// Configured token, treating an empty string as absent.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Kind of a host configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    Textinput,
}

/// Descriptor of one field in the host's configuration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigField {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    pub label: String,
    pub width: u8,
}

/// Configuration form shown by the host: the NodeCG URL and access token.
#[must_use]
pub fn config_fields() -> Vec<ConfigField> {
    vec![
        ConfigField {
            id: "url".to_string(),
            field_type: ConfigFieldType::Textinput,
            label: "NodeCG URL".to_string(),
            width: 6,
        },
        ConfigField {
            id: "token".to_string(),
            field_type: ConfigFieldType::Textinput,
            label: "Access Token".to_string(),
            width: 6,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_method_deserializes_camel_case() {
        let method: RemoteMethod = serde_json::from_value(json!({
            "bundleName": "obs",
            "methodName": "cut",
            "ui": {
                "title": "Cut",
                "description": "Cut to program",
                "companionFields": [{"id": "scene", "type": "textinput"}]
            }
        }))
        .unwrap();

        assert_eq!(method.bundle_name, "obs");
        assert_eq!(method.method_name, "cut");
        let ui = method.ui.as_ref().unwrap();
        assert_eq!(ui.title.as_deref(), Some("Cut"));
        assert_eq!(ui.companion_fields.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn remote_method_without_ui() {
        let method: RemoteMethod =
            serde_json::from_value(json!({"bundleName": "obs", "methodName": "cut"})).unwrap();
        assert!(method.ui.is_none());
        assert_eq!(method.display_name(), "obs: cut");
        assert_eq!(method.description(), None);
        assert!(method.options().is_empty());
    }

    #[test]
    fn remote_method_missing_bundle_fails() {
        let result = serde_json::from_value::<RemoteMethod>(json!({"methodName": "cut"}));
        assert!(result.is_err());
    }

    #[test]
    fn action_id_joins_bundle_and_method() {
        let method = RemoteMethod::new("obs", "cut");
        assert_eq!(method.action_id(), "method_obs_cut");
    }

    #[test]
    fn display_name_prefers_title() {
        let method = RemoteMethod::new("obs", "cut").with_ui(MethodUi {
            title: Some("Cut".to_string()),
            ..Default::default()
        });
        assert_eq!(method.display_name(), "obs: Cut");
    }

    #[test]
    fn display_name_falls_back_when_ui_has_no_title() {
        let method = RemoteMethod::new("graphics", "showLowerThird").with_ui(MethodUi {
            description: Some("Show the lower third".to_string()),
            ..Default::default()
        });
        assert_eq!(method.display_name(), "graphics: showLowerThird");
        assert_eq!(method.description(), Some("Show the lower third"));
    }

    #[test]
    fn options_are_forwarded_untouched() {
        let field = json!({"type": "dropdown", "id": "x", "choices": [{"id": 1, "label": "a"}]});
        let method = RemoteMethod::new("b", "m").with_ui(MethodUi {
            companion_fields: Some(vec![field.clone()]),
            ..Default::default()
        });
        assert_eq!(method.options(), vec![field]);
    }

    #[test]
    fn instance_status_display() {
        assert_eq!(InstanceStatus::Ok.to_string(), "ok");
        assert_eq!(
            InstanceStatus::ConnectionFailure("Unauthorized".to_string()).to_string(),
            "connection_failure (Unauthorized)"
        );
        assert_eq!(InstanceStatus::Connecting(None).to_string(), "connecting");
    }

    #[test]
    fn instance_status_serializes_tagged() {
        let json = serde_json::to_value(InstanceStatus::ConnectionFailure("x".into())).unwrap();
        assert_eq!(json, json!({"status": "connection_failure", "message": "x"}));

        let json = serde_json::to_value(InstanceStatus::Ok).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn bridge_config_treats_empty_strings_as_absent() {
        let config: BridgeConfig =
            serde_json::from_value(json!({"url": "", "token": ""})).unwrap();
        assert_eq!(config.url(), None);
        assert_eq!(config.token(), None);

        let config = BridgeConfig {
            url: Some(String::new()),
            token: Some(String::new()),
        };
        assert_eq!(config.url(), None);
        assert_eq!(config.token(), None);
    }

    #[test]
    fn bridge_config_builders() {
        let config = BridgeConfig::new("http://localhost:9090").with_token("secret");
        assert_eq!(config.url(), Some("http://localhost:9090"));
        assert_eq!(config.token(), Some("secret"));
    }

    #[test]
    fn config_fields_match_host_form() {
        let fields = config_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].id, "url");
        assert_eq!(fields[1].id, "token");

        let json = serde_json::to_value(&fields[0]).unwrap();
        assert_eq!(json["type"], "textinput");
        assert_eq!(json["label"], "NodeCG URL");
        assert_eq!(json["width"], 6);
    }
}
