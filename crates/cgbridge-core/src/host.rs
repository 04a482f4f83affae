//! Surfaces the bridge publishes to.

use cgbridge_types::InstanceStatus;

use crate::actions::ActionSet;

/// The show-control host embedding the bridge.
///
/// Called only from the bridge's event loop, never concurrently.
pub trait Host: Send + 'static {
    /// Connection health changed.
    fn update_status(&mut self, status: &InstanceStatus);

    /// Replace every action previously published with `actions`.
    fn set_action_definitions(&mut self, actions: ActionSet);
}
