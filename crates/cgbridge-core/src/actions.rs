//! Conversion of remote methods into host actions.
//!
//! The action set is rebuilt from scratch on every fetch, so the host always
//! sees exactly the methods the server reported last.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cgbridge_types::RemoteMethod;
use serde_json::Value;
use tracing::warn;

/// Invokes `(bundle_name, method_name)` on the server.
pub type Executor = Arc<dyn Fn(&str, &str) + Send + Sync>;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Actions keyed by their id, ordered for stable presentation.
pub type ActionSet = BTreeMap<String, ActionDefinition>;

/// One host-invocable action derived from a remote method
#[derive(Clone)]
pub struct ActionDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Companion field descriptors, forwarded untouched
    pub options: Vec<Value>,
    callback: Callback,
}

impl ActionDefinition {
    /// Run the action's remote method. Returns immediately.
    pub fn invoke(&self) {
        (self.callback)();
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ActionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.options == other.options
    }
}

/// Build the action set for a method list.
///
/// When two entries share a `(bundle, method)` pair the later one wins.
#[must_use]
pub fn build_action_set(methods: &[RemoteMethod], execute: &Executor) -> ActionSet {
    let mut actions = ActionSet::new();

    for method in methods {
        let id = method.action_id();
        let bundle_name = method.bundle_name.clone();
        let method_name = method.method_name.clone();
        let execute = Arc::clone(execute);

        let definition = ActionDefinition {
            name: method.display_name(),
            description: method.description().map(str::to_string),
            options: method.options(),
            callback: Arc::new(move || execute(&bundle_name, &method_name)),
        };

        if actions.insert(id.clone(), definition).is_some() {
            warn!("Duplicate remote method {}, keeping the last definition", id);
        }
    }

    actions
}
