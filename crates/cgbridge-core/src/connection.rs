//! Connection lifecycle of one bridge instance.
//!
//! [`ConnectionManager::run`] is the bridge's single event loop. Socket events,
//! method-list completions and host commands arrive on channels and are handled
//! one at a time, so the manager's state is never shared. Network waits happen
//! in spawned tasks that post their result back to the loop.
//!
//! ```text
//!                  connect (no url)
//!  Disconnected ──────────────────────────────▶ BadConfig
//!       │ connect (url)
//!       ▼             handshake / reconnect
//!   Connecting ────────────────────────────────▶ Connected
//!       ▲  │  reconnect_failed, unauthorized        │
//!       │  └─────────────────────▶ ConnectionFailure │
//!       └────────────────────────────────────────────┘
//!                     disconnect(reason)
//! ```

use std::sync::Arc;

use cgbridge_rpc::{ClientError, SocketEvent};
use cgbridge_types::{BridgeConfig, InstanceStatus, RemoteMethod};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::actions::{Executor, build_action_set};
use crate::error::BridgeError;
use crate::host::Host;
use crate::socket::{Connector, RemoteSocket};

/// Event that asks the server for its method list
pub const READ_ALL_METHODS: &str = "remote:readAllMethods";

/// Event that runs one remote method
pub const EXECUTE_METHOD: &str = "remote:executeMethod";

/// Event the server emits when it rejects the client
pub const PROTOCOL_ERROR: &str = "protocol_error";

const UNAUTHORIZED_ERROR: &str = "UnauthorizedError";
const RECONNECT_FAILED_MESSAGE: &str = "Failed to reconnect to NodeCG server!";
const DRIVER_STOPPED_MESSAGE: &str = "Connection to NodeCG server lost";

/// Lifecycle state of the bridge's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    BadConfig,
    ConnectionFailure,
}

/// Snapshot of the connection published to every [`BridgeHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    /// Detail of the most recent failure, cleared on a successful handshake
    pub last_error: Option<String>,
}

#[derive(Debug)]
enum Command {
    Reconfigure(BridgeConfig),
    ExecuteMethod {
        bundle_name: String,
        method_name: String,
    },
    Destroy,
}

enum Completion {
    MethodsFetched {
        epoch: u64,
        result: Result<Option<Vec<RemoteMethod>>, BridgeError>,
    },
}

struct ActiveConnection<S> {
    epoch: u64,
    socket: S,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Cloneable handle for driving a running [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    info: watch::Receiver<ConnectionInfo>,
}

impl BridgeHandle {
    /// Tear down the current connection and connect with `config`.
    pub fn reconfigure(&self, config: BridgeConfig) {
        self.send(Command::Reconfigure(config));
    }

    /// Run a remote method. Failures are logged by the bridge.
    pub fn execute_method(&self, bundle_name: &str, method_name: &str) {
        self.send(Command::ExecuteMethod {
            bundle_name: bundle_name.to_string(),
            method_name: method_name.to_string(),
        });
    }

    /// Tear down the connection and stop the event loop.
    pub fn destroy(&self) {
        self.send(Command::Destroy);
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.info.borrow().state
    }

    /// Detail of the most recent failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.info.borrow().last_error.clone()
    }

    /// Receiver that is notified whenever the state or last error changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionInfo> {
        self.info.clone()
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!("Bridge already stopped, dropping {:?}", e.0);
        }
    }
}

/// Owns the bridge's connection and publishes its health and actions to the host.
pub struct ConnectionManager<C: Connector, H: Host> {
    connector: C,
    host: H,
    config: BridgeConfig,
    state: ConnectionState,
    last_error: Option<String>,
    last_status: Option<InstanceStatus>,
    info: watch::Sender<ConnectionInfo>,
    connection: Option<ActiveConnection<C::Socket>>,
    next_epoch: u64,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_weak: mpsc::WeakUnboundedSender<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl<C: Connector, H: Host> ConnectionManager<C, H> {
    /// Create a manager for `config`. Nothing connects until [`run`](Self::run).
    pub fn new(connector: C, host: H, config: BridgeConfig) -> (Self, BridgeHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (info, info_rx) = watch::channel(ConnectionInfo {
            state: ConnectionState::Disconnected,
            last_error: None,
        });

        let manager = Self {
            connector,
            host,
            config,
            state: ConnectionState::Disconnected,
            last_error: None,
            last_status: None,
            info,
            connection: None,
            next_epoch: 0,
            commands,
            commands_weak: commands_tx.downgrade(),
            completions_tx,
            completions,
        };

        let handle = BridgeHandle {
            commands: commands_tx,
            info: info_rx,
        };
        (manager, handle)
    }

    /// Connect and process events until destroyed or every handle is dropped.
    ///
    /// Returns the host so callers can inspect it after shutdown.
    pub async fn run(mut self) -> H {
        self.establish_connection();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Destroy) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                event = next_socket_event(&mut self.connection) => match event {
                    Some((epoch, event)) => self.handle_socket_event(epoch, event),
                    None => {
                        error!("Socket driver stopped unexpectedly");
                        self.connection = None;
                        self.fail(DRIVER_STOPPED_MESSAGE.to_string());
                    }
                },
            }
        }

        self.destroy();
        self.host
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Reconfigure(config) => {
                info!("Configuration updated");
                self.teardown_connection();
                self.config = config;
                self.establish_connection();
            }
            Command::ExecuteMethod {
                bundle_name,
                method_name,
            } => self.execute_method(&bundle_name, &method_name),
            Command::Destroy => self.destroy(),
        }
    }

    fn destroy(&mut self) {
        debug!("Destroying bridge");
        self.teardown_connection();
        self.transition(ConnectionState::Disconnected, InstanceStatus::Disconnected(None));
    }

    fn establish_connection(&mut self) {
        let Some(url) = self.config.url().map(str::to_string) else {
            error!("No NodeCG URL configured");
            self.last_error = Some(BridgeError::Configuration.to_string());
            self.transition(ConnectionState::BadConfig, InstanceStatus::BadConfig);
            return;
        };

        info!("Connecting to {}", url);
        self.transition(ConnectionState::Connecting, InstanceStatus::Connecting(None));

        let (events_tx, events) = mpsc::unbounded_channel();
        match self.connector.open(&url, self.config.token(), events_tx) {
            Ok(socket) => {
                let epoch = self.next_epoch;
                self.next_epoch += 1;
                self.connection = Some(ActiveConnection {
                    epoch,
                    socket,
                    events,
                });
            }
            Err(e) => {
                let err = BridgeError::Transport(e);
                error!("Failed to connect to {}: {}", url, err);
                self.fail(transport_reason(&err));
            }
        }
    }

    /// Disconnect and drop the socket together with its event receiver.
    fn teardown_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!("Tearing down connection {}", connection.epoch);
            connection.socket.disconnect();
        }
    }

    fn handle_socket_event(&mut self, epoch: u64, event: SocketEvent) {
        if self.current_epoch() != Some(epoch) {
            trace!("Ignoring event from stale connection {}", epoch);
            return;
        }

        match event {
            SocketEvent::Connect { sid } => {
                debug!("Connected to NodeCG (sid {}), initialising", sid);
                self.last_error = None;
                self.transition(ConnectionState::Connected, InstanceStatus::Ok);
                self.request_methods();
            }
            SocketEvent::Reconnect(attempts) => {
                info!("Reconnected after {} attempts", attempts);
                self.transition(ConnectionState::Connected, InstanceStatus::Ok);
            }
            SocketEvent::ReconnectAttempt(attempt) => {
                debug!("Reconnection attempt {}", attempt);
            }
            SocketEvent::ConnectError(message) => {
                warn!("Connection error: {}", message);
                self.last_error = Some(message.clone());
                self.transition(
                    ConnectionState::Connecting,
                    InstanceStatus::Connecting(Some(message)),
                );
            }
            SocketEvent::Disconnect(reason) => {
                info!("Disconnected: {}", reason);
                self.transition(
                    ConnectionState::Connecting,
                    InstanceStatus::Connecting(Some(reason.to_string())),
                );

                if reason.is_server_initiated() {
                    debug!("Server closed the session, reconnecting");
                    if let Some(connection) = &self.connection {
                        connection.socket.connect();
                    }
                }
            }
            SocketEvent::ConnectRejected(message) => {
                let err = BridgeError::Transport(ClientError::ConnectRejected(message));
                error!(
                    "Failed to connect to {}: {}",
                    self.config.url().unwrap_or_default(),
                    err
                );
                self.teardown_connection();
                self.fail(transport_reason(&err));
            }
            SocketEvent::ReconnectFailed => {
                error!("{}", RECONNECT_FAILED_MESSAGE);
                self.fail(RECONNECT_FAILED_MESSAGE.to_string());
            }
            SocketEvent::Event { name, args } if name == PROTOCOL_ERROR => {
                self.handle_protocol_error(args.first());
            }
            SocketEvent::Event { name, .. } => {
                trace!("Ignoring server event '{}'", name);
            }
        }
    }

    fn handle_protocol_error(&mut self, payload: Option<&Value>) {
        let kind = payload.and_then(|p| p.get("type")).and_then(Value::as_str);
        let message = payload
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if kind == Some(UNAUTHORIZED_ERROR) {
            error!(
                "Failed to connect to {}: unauthorized",
                self.config.url().unwrap_or_default()
            );
            self.teardown_connection();
            self.fail(BridgeError::Authentication.to_string());
        } else {
            error!("Unhandled protocol error: {}", message);
            self.fail(format!("Unhandled error: {message}"));
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion::MethodsFetched { epoch, result } = completion;

        if self.current_epoch() != Some(epoch) {
            debug!("Discarding method list from stale connection {}", epoch);
            return;
        }

        match result {
            Ok(Some(methods)) => {
                debug!("Received {} remote methods", methods.len());
                let actions = build_action_set(&methods, &self.executor());
                self.host.set_action_definitions(actions);
            }
            Ok(None) => debug!("Server returned no method list"),
            Err(e) => error!("{}", e),
        }
    }

    /// Ask for the method list; the reply comes back as a completion.
    fn request_methods(&self) {
        let Some(connection) = &self.connection else {
            return;
        };

        let epoch = connection.epoch;
        let reply = connection.socket.emit_with_ack(READ_ALL_METHODS, Vec::new());
        let completions = self.completions_tx.clone();

        tokio::spawn(async move {
            let result = parse_methods_reply(reply.await);
            let _ = completions.send(Completion::MethodsFetched { epoch, result });
        });
    }

    fn execute_method(&self, bundle_name: &str, method_name: &str) {
        let Some(connection) = &self.connection else {
            warn!(
                "Not connected, dropping call to {}/{}",
                bundle_name, method_name
            );
            return;
        };

        debug!("exec {} {}", bundle_name, method_name);
        let payload = json!({
            "bundleName": bundle_name,
            "methodName": method_name,
            "data": null,
        });
        let reply = connection.socket.emit_with_ack(EXECUTE_METHOD, vec![payload]);
        let bundle_name = bundle_name.to_string();
        let method_name = method_name.to_string();

        tokio::spawn(async move {
            let reason = match reply.await {
                Ok(args) => match args.into_iter().next() {
                    None | Some(Value::Null) => return,
                    Some(err) => describe_remote_error(&err),
                },
                Err(e) => e.to_string(),
            };
            let err = BridgeError::Invocation {
                bundle_name,
                method_name,
                reason,
            };
            error!("{}", err);
        });
    }

    /// Callback target for published actions.
    ///
    /// Holds only a weak sender so published actions do not keep the loop alive.
    fn executor(&self) -> Executor {
        let commands = self.commands_weak.clone();
        Arc::new(move |bundle_name: &str, method_name: &str| {
            let Some(commands) = commands.upgrade() else {
                warn!("Bridge stopped, dropping call to {}/{}", bundle_name, method_name);
                return;
            };
            let _ = commands.send(Command::ExecuteMethod {
                bundle_name: bundle_name.to_string(),
                method_name: method_name.to_string(),
            });
        })
    }

    fn fail(&mut self, reason: String) {
        self.last_error = Some(reason.clone());
        self.transition(
            ConnectionState::ConnectionFailure,
            InstanceStatus::ConnectionFailure(reason),
        );
    }

    fn transition(&mut self, state: ConnectionState, status: InstanceStatus) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.info.send_if_modified(|info| {
            let updated = ConnectionInfo {
                state,
                last_error: self.last_error.clone(),
            };
            if *info == updated {
                return false;
            }
            *info = updated;
            true
        });

        if self.last_status.as_ref() == Some(&status) {
            return;
        }
        info!("Status: {}", status);
        self.host.update_status(&status);
        self.last_status = Some(status);
    }

    fn current_epoch(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.epoch)
    }
}

async fn next_socket_event<S>(
    connection: &mut Option<ActiveConnection<S>>,
) -> Option<(u64, SocketEvent)> {
    match connection {
        Some(connection) => {
            let epoch = connection.epoch;
            connection.events.recv().await.map(|event| (epoch, event))
        }
        None => std::future::pending().await,
    }
}

/// Interpret the `(error, methods)` acknowledgement of `remote:readAllMethods`.
fn parse_methods_reply(
    reply: Result<Vec<Value>, ClientError>,
) -> Result<Option<Vec<RemoteMethod>>, BridgeError> {
    let args = reply.map_err(|e| BridgeError::Fetch(e.to_string()))?;
    let mut args = args.into_iter();

    match args.next() {
        None | Some(Value::Null) => {}
        Some(err) => return Err(BridgeError::Fetch(describe_remote_error(&err))),
    }

    match args.next() {
        None | Some(Value::Null) => Ok(None),
        Some(methods) => serde_json::from_value(methods)
            .map(Some)
            .map_err(|e| BridgeError::Fetch(format!("invalid method list: {e}"))),
    }
}

fn describe_remote_error(err: &Value) -> String {
    match err {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| other.to_string(), str::to_string),
    }
}

fn transport_reason(err: &BridgeError) -> String {
    match err {
        BridgeError::Transport(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods_reply_success() {
        let reply = Ok(vec![
            Value::Null,
            json!([{"bundleName": "obs", "methodName": "cut", "ui": {"title": "Cut"}}]),
        ]);
        let methods = parse_methods_reply(reply).unwrap().unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].action_id(), "method_obs_cut");
    }

    #[test]
    fn test_parse_methods_reply_remote_error() {
        let reply = Ok(vec![json!({"message": "not ready"}), json!([])]);
        let err = parse_methods_reply(reply).unwrap_err();
        assert!(matches!(err, BridgeError::Fetch(ref m) if m == "not ready"));
    }

    #[test]
    fn test_parse_methods_reply_missing_list() {
        assert!(parse_methods_reply(Ok(vec![Value::Null])).unwrap().is_none());
        assert!(
            parse_methods_reply(Ok(vec![Value::Null, Value::Null]))
                .unwrap()
                .is_none()
        );
        assert!(parse_methods_reply(Ok(Vec::new())).unwrap().is_none());
    }

    #[test]
    fn test_parse_methods_reply_malformed_list() {
        let reply = Ok(vec![Value::Null, json!([{"bundleName": "obs"}])]);
        assert!(matches!(
            parse_methods_reply(reply),
            Err(BridgeError::Fetch(_))
        ));
    }

    #[test]
    fn test_parse_methods_reply_transport_failure() {
        let err = parse_methods_reply(Err(ClientError::Timeout)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch remote methods: Request timeout"
        );
    }

    #[test]
    fn test_describe_remote_error() {
        assert_eq!(describe_remote_error(&json!("boom")), "boom");
        assert_eq!(describe_remote_error(&json!({"message": "nope"})), "nope");
        assert_eq!(describe_remote_error(&json!(42)), "42");
    }
}
