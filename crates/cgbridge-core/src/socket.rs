//! Seam between the connection manager and the Socket.IO transport.

use std::time::Duration;

use cgbridge_rpc::{ClientError, ReconnectionPolicy, SocketClient, SocketEvent, SocketOptions};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::TransportConfig;

/// An open (or reconnecting) socket to the NodeCG server
pub trait RemoteSocket: Send + 'static {
    /// Emit an event and resolve with the acknowledgement arguments.
    fn emit_with_ack(
        &self,
        event: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, ClientError>>;

    /// Re-open after the server closed the session.
    fn connect(&self);

    fn disconnect(&self);
}

/// Opens sockets; every socket reports its lifecycle on `events`.
pub trait Connector: Send + 'static {
    type Socket: RemoteSocket;

    /// # Errors
    ///
    /// Returns an error when the socket cannot be created at all, for example
    /// because the URL is malformed. Network failures are reported as events.
    fn open(
        &self,
        url: &str,
        token: Option<&str>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Self::Socket, ClientError>;
}

impl RemoteSocket for SocketClient {
    fn emit_with_ack(
        &self,
        event: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, ClientError>> {
        SocketClient::emit_with_ack(self, event, args)
    }

    fn connect(&self) {
        SocketClient::connect(self);
    }

    fn disconnect(&self) {
        SocketClient::disconnect(self);
    }
}

/// Connector backed by [`SocketClient`]
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    reconnection: ReconnectionPolicy,
    connect_timeout: Duration,
    ack_timeout: Duration,
}

impl SocketIoConnector {
    #[must_use]
    pub fn new(transport: &TransportConfig) -> Self {
        Self {
            reconnection: transport.reconnection_policy(),
            connect_timeout: transport.connect_timeout(),
            ack_timeout: transport.ack_timeout(),
        }
    }
}

impl Default for SocketIoConnector {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Connector for SocketIoConnector {
    type Socket = SocketClient;

    fn open(
        &self,
        url: &str,
        token: Option<&str>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<SocketClient, ClientError> {
        let mut options = SocketOptions::new(url)?.with_reconnection(self.reconnection.clone());
        options.connect_timeout = self.connect_timeout;
        options.ack_timeout = self.ack_timeout;

        if let Some(token) = token {
            debug!("Connecting to {} using token", url);
            options = options.with_query("token", token);
        } else {
            debug!("Connecting to {} without token", url);
        }

        Ok(SocketClient::spawn(options, events))
    }
}
