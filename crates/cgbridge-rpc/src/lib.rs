//! Socket.IO client used by cgbridge to talk to a NodeCG server.
//!
//! NodeCG exposes its remote-method API over Socket.IO v4, which in turn runs
//! on Engine.IO v4. Only the WebSocket transport is implemented; long-polling
//! and binary attachments are not needed for the remote-method API.
//!
//! # Architecture
//!
//! - [`transport`]: Engine.IO packet codec (one packet per WebSocket frame)
//! - [`protocol`]: Socket.IO packet codec (events, acks, namespaces)
//! - [`backoff`]: Exponential reconnection delays with jitter
//! - [`client`]: Connection driver with heartbeat, acks and reconnection
//! - [`error`]: Error type and result alias
//!
//! # Example
//!
//! ```no_run
//! use cgbridge_rpc::{SocketClient, SocketEvent, SocketOptions};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), cgbridge_rpc::ClientError> {
//! let options = SocketOptions::new("http://localhost:9090")?.with_query("token", "s3cret");
//! let (events_tx, mut events) = mpsc::unbounded_channel();
//! let client = SocketClient::spawn(options, events_tx);
//!
//! while let Some(event) = events.recv().await {
//!     if let SocketEvent::Connect { .. } = event {
//!         let reply = client.emit_with_ack("remote:readAllMethods", Vec::new()).await?;
//!         println!("{reply:?}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DisconnectReason, ReconnectionPolicy,
    SocketClient, SocketEvent, SocketOptions,
};
pub use error::{ClientError, Result};
pub use protocol::{Packet, PacketType};
pub use transport::{CodecError, EnginePacket};
