//! Transport abstraction layer for Duskfall.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying client frames. A connection is split into
//! a [`FrameSender`] and a [`FrameReceiver`] so a handler can push
//! notifications while it is waiting for the next inbound request.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConnection, WebSocketReceiver, WebSocketSender,
    WebSocketTransport,
};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted connection, not yet split into its two directions.
pub trait Connection: Send + 'static {
    /// The outbound half.
    type Sender: FrameSender;
    /// The inbound half.
    type Receiver: FrameReceiver;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;

    /// Splits the connection so each direction can be driven on its own.
    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// The outbound half of a connection.
pub trait FrameSender: Send + 'static {
    /// The error type for send operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Closes the connection from our side.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// The inbound half of a connection.
pub trait FrameReceiver: Send + 'static {
    /// The error type for receive operations.
    type Error: std::error::Error + Send + Sync;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;
}
