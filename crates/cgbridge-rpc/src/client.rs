//! Socket.IO client with automatic reconnection.
//!
//! [`SocketClient::spawn`] starts a driver task that owns the WebSocket, keeps
//! the Engine.IO heartbeat alive, matches acknowledgements to their requests
//! and reconnects with exponential backoff. Everything the driver observes is
//! reported on the [`SocketEvent`] channel handed to `spawn`; the returned
//! handle only sends commands, so it can be cloned into tasks freely.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::protocol::{DEFAULT_NAMESPACE, Packet, PacketType};
use crate::transport::{ENGINE_IO_VERSION, EnginePacket, OpenHandshake};

/// Time allowed for an acknowledgement before the request fails
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the WebSocket upgrade plus the Socket.IO handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

const SOCKET_IO_PATH: &str = "/socket.io/";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type AckSender = oneshot::Sender<Result<Vec<Value>, ClientError>>;

/// When and how often the client tries to re-establish a lost connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    pub enabled: bool,
    /// `None` retries forever.
    pub attempts: Option<u32>,
    pub delay: Duration,
    pub delay_max: Duration,
    pub randomization_factor: f64,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: None,
            delay: Duration::from_secs(1),
            delay_max: Duration::from_secs(5),
            randomization_factor: 0.5,
        }
    }
}

impl ReconnectionPolicy {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.delay, self.delay_max, self.randomization_factor)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.attempts.is_some_and(|max| attempts >= max)
    }
}

/// Connection parameters for a [`SocketClient`]
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub reconnection: ReconnectionPolicy,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl SocketOptions {
    /// Options for a server URL such as `http://localhost:9090`.
    ///
    /// A path other than `/` selects the Socket.IO namespace.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the URL does not parse or its
    /// scheme is not one of `http`, `https`, `ws`, `wss`.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ClientError::InvalidUrl("missing host".to_string()));
        }

        Ok(Self {
            url,
            query: Vec::new(),
            reconnection: ReconnectionPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_reconnection(mut self, reconnection: ReconnectionPolicy) -> Self {
        self.reconnection = reconnection;
        self
    }

    #[must_use]
    pub fn namespace(&self) -> String {
        match self.url.path() {
            "" | "/" => DEFAULT_NAMESPACE.to_string(),
            path => path.trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket URL of the Engine.IO endpoint, including handshake query.
    #[must_use]
    pub fn engine_url(&self) -> Url {
        let mut url = self.url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // http(s) and ws(s) are all special schemes, so switching between them cannot fail
        let _ = url.set_scheme(scheme);
        url.set_path(SOCKET_IO_PATH);
        url.set_fragment(None);

        let existing: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.set_query(None);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("EIO", ENGINE_IO_VERSION);
            pairs.append_pair("transport", "websocket");
            for (key, value) in existing.iter().chain(&self.query) {
                pairs.append_pair(key, value);
            }
        }

        url
    }
}

/// Why an established connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The server sent a DISCONNECT packet
    IoServerDisconnect,
    /// [`SocketClient::disconnect`] was called
    IoClientDisconnect,
    PingTimeout,
    TransportClose,
    TransportError,
    ParseError,
}

impl DisconnectReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IoServerDisconnect => "io server disconnect",
            Self::IoClientDisconnect => "io client disconnect",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::ParseError => "parse error",
        }
    }

    /// The server closed the session on purpose; the client does not retry on its own.
    #[must_use]
    pub fn is_server_initiated(self) -> bool {
        self == Self::IoServerDisconnect
    }

    /// Whether automatic reconnection applies after this reason.
    #[must_use]
    pub fn allows_reconnect(self) -> bool {
        !matches!(self, Self::IoServerDisconnect | Self::IoClientDisconnect)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle and application events reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Handshake completed, `sid` is the Socket.IO session id
    Connect { sid: String },
    /// A connection attempt failed before the handshake completed
    ConnectError(String),
    /// The server refused the namespace connection; the client does not retry
    ConnectRejected(String),
    Disconnect(DisconnectReason),
    /// A reconnection attempt is about to start (1-based)
    ReconnectAttempt(u32),
    /// Reconnected after the given number of attempts
    Reconnect(u32),
    /// No further automatic attempt follows, either because the reconnection
    /// budget is exhausted or because reconnection is disabled. The client
    /// stays idle until [`SocketClient::connect`].
    ReconnectFailed,
    /// Application event emitted by the server
    Event { name: String, args: Vec<Value> },
}

struct OutboundEmit {
    event: String,
    args: Vec<Value>,
    ack: Option<AckSender>,
}

enum Command {
    Emit(OutboundEmit),
    Connect,
    Disconnect,
}

/// Handle to a running Socket.IO connection.
///
/// Dropping the handle shuts the driver down and closes the socket.
#[derive(Debug)]
pub struct SocketClient {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    ack_timeout: Duration,
}

impl SocketClient {
    /// Start connecting in the background.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(options: SocketOptions, events: mpsc::UnboundedSender<SocketEvent>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let ack_timeout = options.ack_timeout;

        let driver = Driver::new(options, commands_rx, events, cancel.clone());
        tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            cancel,
            ack_timeout,
        }
    }

    /// Emit an event without waiting for an acknowledgement.
    ///
    /// Emits issued while disconnected are buffered until the next connect.
    pub fn emit(&self, event: &str, args: Vec<Value>) {
        self.send(Command::Emit(OutboundEmit {
            event: event.to_string(),
            args,
            ack: None,
        }));
    }

    /// Emit an event and resolve with the arguments of the server's acknowledgement.
    ///
    /// The returned future does not borrow the client and can be moved into a task.
    pub fn emit_with_ack(
        &self,
        event: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, ClientError>> {
        let (tx, rx) = oneshot::channel();
        let sent = self
            .commands
            .send(Command::Emit(OutboundEmit {
                event: event.to_string(),
                args,
                ack: Some(tx),
            }))
            .is_ok();
        let ack_timeout = self.ack_timeout;

        async move {
            if !sent {
                return Err(ClientError::ConnectionClosed);
            }
            match tokio::time::timeout(ack_timeout, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Err(ClientError::ConnectionClosed),
                Err(_) => Err(ClientError::Timeout),
            }
        }
        .boxed()
    }

    /// Re-open the connection after a server-initiated or client-initiated disconnect.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Close the connection; no automatic reconnection follows.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            trace!("Socket driver already stopped, dropping command");
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    /// The handshake never completed
    Failed(ClientError),
    /// An established session ended
    Closed(DisconnectReason),
    Shutdown,
}

enum Wake {
    Elapsed,
    Connect,
    Disconnect,
    Shutdown,
}

struct Established {
    sink: WsSink,
    stream: WsSource,
    handshake: OpenHandshake,
    sid: String,
}

struct Driver {
    options: SocketOptions,
    namespace: String,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
    backoff: Backoff,
    buffer: VecDeque<OutboundEmit>,
    pending_acks: HashMap<u64, AckSender>,
    next_ack_id: u64,
}

impl Driver {
    fn new(
        options: SocketOptions,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<SocketEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            namespace: options.namespace(),
            backoff: options.reconnection.backoff(),
            options,
            commands,
            events,
            cancel,
            buffer: VecDeque::new(),
            pending_acks: HashMap::new(),
            next_ack_id: 0,
        }
    }

    async fn run(mut self) {
        let mut active = true;
        let mut reconnecting = false;

        loop {
            if !active {
                match self.wait_for_connect().await {
                    Wake::Connect => {
                        active = true;
                        reconnecting = false;
                        self.backoff.reset();
                    }
                    Wake::Shutdown => break,
                    Wake::Elapsed | Wake::Disconnect => continue,
                }
            }

            if reconnecting {
                if self.options.reconnection.exhausted(self.backoff.attempts()) {
                    warn!(
                        "Giving up on {} after {} reconnection attempts",
                        self.options.url,
                        self.backoff.attempts()
                    );
                    self.backoff.reset();
                    self.emit_event(SocketEvent::ReconnectFailed);
                    active = false;
                    reconnecting = false;
                    continue;
                }

                let delay = self.backoff.duration();
                debug!("Reconnecting in {:?}", delay);
                match self.pause(delay).await {
                    Wake::Elapsed | Wake::Connect => {}
                    Wake::Disconnect => {
                        active = false;
                        reconnecting = false;
                        self.backoff.reset();
                        continue;
                    }
                    Wake::Shutdown => break,
                }
                self.emit_event(SocketEvent::ReconnectAttempt(self.backoff.attempts()));
            }

            match self.session(reconnecting).await {
                SessionEnd::Failed(ClientError::ConnectRejected(message)) => {
                    warn!("{} refused the connection: {}", self.options.url, message);
                    self.emit_event(SocketEvent::ConnectRejected(message));
                    active = false;
                    reconnecting = false;
                    self.backoff.reset();
                }
                SessionEnd::Failed(e) => {
                    debug!("Connection to {} failed: {}", self.options.url, e);
                    self.emit_event(SocketEvent::ConnectError(e.to_string()));
                    if self.options.reconnection.enabled {
                        reconnecting = true;
                    } else {
                        self.emit_event(SocketEvent::ReconnectFailed);
                        active = false;
                        reconnecting = false;
                    }
                }
                SessionEnd::Closed(reason) => {
                    info!("Disconnected from {}: {}", self.options.url, reason);
                    self.fail_pending_acks();
                    self.emit_event(SocketEvent::Disconnect(reason));
                    reconnecting = reason.allows_reconnect() && self.options.reconnection.enabled;
                    if reason.allows_reconnect() && !self.options.reconnection.enabled {
                        debug!("Reconnection disabled, staying disconnected");
                        self.emit_event(SocketEvent::ReconnectFailed);
                    }
                    active = reconnecting;
                    self.backoff.reset();
                }
                SessionEnd::Shutdown => break,
            }
        }

        self.fail_pending_acks();
        for emit in self.buffer.drain(..) {
            if let Some(ack) = emit.ack {
                let _ = ack.send(Err(ClientError::ConnectionClosed));
            }
        }
        debug!("Socket driver for {} stopped", self.options.url);
    }

    async fn wait_for_connect(&mut self) -> Wake {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Wake::Shutdown,
                command = self.commands.recv() => match command {
                    None => return Wake::Shutdown,
                    Some(Command::Connect) => return Wake::Connect,
                    Some(Command::Disconnect) => {}
                    Some(Command::Emit(emit)) => self.buffer.push_back(emit),
                },
            }
        }
    }

    async fn pause(&mut self, delay: Duration) -> Wake {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Wake::Shutdown,
                () = &mut sleep => return Wake::Elapsed,
                command = self.commands.recv() => match command {
                    None => return Wake::Shutdown,
                    Some(Command::Disconnect) => return Wake::Disconnect,
                    Some(Command::Connect) => {}
                    Some(Command::Emit(emit)) => self.buffer.push_back(emit),
                },
            }
        }
    }

    async fn session(&mut self, reconnecting: bool) -> SessionEnd {
        let url = self.options.engine_url();
        debug!("Opening transport to {}", self.options.url);

        let opened = tokio::select! {
            () = self.cancel.cancelled() => return SessionEnd::Shutdown,
            result = tokio::time::timeout(
                self.options.connect_timeout,
                open_transport(&url, &self.namespace),
            ) => result,
        };

        let Established {
            mut sink,
            mut stream,
            handshake,
            sid,
        } = match opened {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => return SessionEnd::Failed(e),
            Err(_) => return SessionEnd::Failed(ClientError::Timeout),
        };

        if reconnecting {
            self.emit_event(SocketEvent::Reconnect(self.backoff.attempts()));
        }
        self.backoff.reset();
        info!("Connected to {} (sid {})", self.options.url, sid);
        self.emit_event(SocketEvent::Connect { sid });

        if let Err(e) = self.flush_buffer(&mut sink).await {
            warn!("Failed to flush buffered emits: {}", e);
            return SessionEnd::Closed(DisconnectReason::TransportError);
        }

        let heartbeat = handshake.heartbeat_timeout();
        let deadline = tokio::time::sleep(heartbeat);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    close_transport(&mut sink, &self.namespace).await;
                    return SessionEnd::Shutdown;
                }
                () = &mut deadline => return SessionEnd::Closed(DisconnectReason::PingTimeout),
                command = self.commands.recv() => match command {
                    None => {
                        close_transport(&mut sink, &self.namespace).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Emit(emit)) => {
                        if let Err(e) = self.write_emit(&mut sink, emit).await {
                            warn!("Failed to send packet: {}", e);
                            return SessionEnd::Closed(DisconnectReason::TransportError);
                        }
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect) => {
                        close_transport(&mut sink, &self.namespace).await;
                        return SessionEnd::Closed(DisconnectReason::IoClientDisconnect);
                    }
                },
                frame = stream.next() => match frame {
                    None | Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Closed(DisconnectReason::TransportClose);
                    }
                    Some(Err(e)) => {
                        debug!("Transport error: {}", e);
                        return SessionEnd::Closed(DisconnectReason::TransportError);
                    }
                    Some(Ok(Message::Text(text))) => match EnginePacket::decode(text.as_str()) {
                        Ok(EnginePacket::Ping(data)) => {
                            deadline.as_mut().reset(Instant::now() + heartbeat);
                            if send_engine(&mut sink, &EnginePacket::Pong(data)).await.is_err() {
                                return SessionEnd::Closed(DisconnectReason::TransportError);
                            }
                        }
                        Ok(EnginePacket::Message(payload)) => {
                            if let Some(reason) = self.dispatch(&payload) {
                                return SessionEnd::Closed(reason);
                            }
                        }
                        Ok(EnginePacket::Close) => {
                            return SessionEnd::Closed(DisconnectReason::TransportClose);
                        }
                        Ok(other) => trace!("Ignoring engine packet {:?}", other),
                        Err(e) => {
                            warn!("Failed to decode frame: {}", e);
                            return SessionEnd::Closed(DisconnectReason::ParseError);
                        }
                    },
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Handle one Socket.IO packet; returns a reason when the session must end.
    fn dispatch(&mut self, payload: &str) -> Option<DisconnectReason> {
        let packet = match Packet::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to decode packet: {}", e);
                return Some(DisconnectReason::ParseError);
            }
        };

        if packet.namespace != self.namespace {
            trace!("Ignoring packet for namespace {}", packet.namespace);
            return None;
        }

        match packet.kind {
            PacketType::Event => {
                if let Some(id) = packet.id {
                    debug!("Server requested ack {} which this client does not send", id);
                }
                if let Some((name, args)) = packet.into_event() {
                    trace!("Received event '{}'", name);
                    self.emit_event(SocketEvent::Event { name, args });
                }
            }
            PacketType::Ack => {
                let Some(id) = packet.id else {
                    return None;
                };
                if let Some(tx) = self.pending_acks.remove(&id) {
                    let _ = tx.send(Ok(packet.into_args()));
                } else {
                    trace!("Ack {} has no pending request", id);
                }
            }
            PacketType::Disconnect => return Some(DisconnectReason::IoServerDisconnect),
            PacketType::ConnectError => {
                warn!("Server reported error: {}", packet.error_message());
            }
            PacketType::Connect | PacketType::BinaryEvent | PacketType::BinaryAck => {
                trace!("Ignoring {:?} packet", packet.kind);
            }
        }

        None
    }

    async fn write_emit(&mut self, sink: &mut WsSink, emit: OutboundEmit) -> Result<(), ClientError> {
        let id = emit.ack.map(|tx| {
            let id = self.next_ack_id;
            self.next_ack_id = self.next_ack_id.wrapping_add(1);
            self.pending_acks.insert(id, tx);
            id
        });

        trace!("Emitting '{}' (ack {:?})", emit.event, id);
        let packet = Packet::event(self.namespace.clone(), &emit.event, emit.args, id);
        send_packet(sink, &packet).await
    }

    async fn flush_buffer(&mut self, sink: &mut WsSink) -> Result<(), ClientError> {
        while let Some(emit) = self.buffer.pop_front() {
            if emit.ack.as_ref().is_some_and(oneshot::Sender::is_closed) {
                trace!("Dropping buffered '{}', nobody awaits its ack", emit.event);
                continue;
            }
            self.write_emit(sink, emit).await?;
        }
        Ok(())
    }

    fn fail_pending_acks(&mut self) {
        for (_, tx) in self.pending_acks.drain() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
    }

    fn emit_event(&self, event: SocketEvent) {
        if self.events.send(event).is_err() {
            trace!("Socket event receiver dropped");
        }
    }
}

/// Upgrade to WebSocket, read the Engine.IO open packet and join the namespace.
async fn open_transport(url: &Url, namespace: &str) -> Result<Established, ClientError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let handshake = match next_engine_packet(&mut stream).await? {
        EnginePacket::Open(handshake) => handshake,
        other => return Err(ClientError::UnexpectedPacket(format!("{other:?}"))),
    };
    trace!("Engine.IO session {} opened", handshake.sid);

    send_packet(&mut sink, &Packet::connect(namespace, None)).await?;

    loop {
        match next_engine_packet(&mut stream).await? {
            EnginePacket::Ping(data) => send_engine(&mut sink, &EnginePacket::Pong(data)).await?,
            EnginePacket::Message(payload) => {
                let packet = Packet::decode(&payload)?;
                if packet.namespace != namespace {
                    continue;
                }
                match packet.kind {
                    PacketType::Connect => {
                        let sid = packet.sid().unwrap_or_default().to_string();
                        return Ok(Established {
                            sink,
                            stream,
                            handshake,
                            sid,
                        });
                    }
                    PacketType::ConnectError => {
                        return Err(ClientError::ConnectRejected(packet.error_message()));
                    }
                    kind => trace!("Ignoring {:?} packet before connect", kind),
                }
            }
            EnginePacket::Close => return Err(ClientError::ConnectionClosed),
            _ => {}
        }
    }
}

async fn next_engine_packet(stream: &mut WsSource) -> Result<EnginePacket, ClientError> {
    loop {
        match stream.next().await {
            None | Some(Ok(Message::Close(_))) => return Err(ClientError::ConnectionClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(_)) => {}
        }
    }
}

async fn send_engine(sink: &mut WsSink, packet: &EnginePacket) -> Result<(), ClientError> {
    sink.send(Message::text(packet.encode()?)).await?;
    Ok(())
}

async fn send_packet(sink: &mut WsSink, packet: &Packet) -> Result<(), ClientError> {
    send_engine(sink, &EnginePacket::Message(packet.encode())).await
}

async fn close_transport(sink: &mut WsSink, namespace: &str) {
    let _ = send_packet(sink, &Packet::disconnect(namespace)).await;
    let _ = send_engine(sink, &EnginePacket::Close).await;
    let _ = sink.close().await;
}
