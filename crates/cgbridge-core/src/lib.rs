//! Core of the NodeCG bridge.
//!
//! - [`connection`]: the connection manager, a state machine that owns the
//!   socket, reports health to the host and resyncs actions on every connect
//! - [`actions`]: conversion of remote methods into host actions
//! - [`host`] and [`socket`]: the traits the manager is generic over
//! - [`config`]: settings file, directories and validation

pub mod actions;
pub mod config;
pub mod connection;
pub mod host;
pub mod socket;

mod error;

#[cfg(test)]
mod tests;

pub use actions::{ActionDefinition, ActionSet, Executor, build_action_set};
pub use connection::{BridgeHandle, ConnectionInfo, ConnectionManager, ConnectionState};
pub use error::{BridgeError, Result};
pub use host::Host;
pub use socket::{Connector, RemoteSocket, SocketIoConnector};

pub use cgbridge_types::*;
