//! Transport abstraction layer for bedwarp.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the proxy's
//! listener and per-connection handlers are written against, plus:
//!
//! - [`raknet`]: the UDP listener Bedrock clients speak to (offline
//!   discovery, connection handshake, framed game packets).
//! - [`memory`]: an in-process connection pair for driving handlers
//!   without sockets.
//!
//! # Feature Flags
//!
//! - `raknet` (default): RakNet UDP transport

#![allow(async_fn_in_trait)]

mod error;
pub mod memory;
#[cfg(feature = "raknet")]
pub mod raknet;

pub use error::TransportError;
pub use memory::MemoryConnection;
#[cfg(feature = "raknet")]
pub use raknet::{
    ListenerEvents, Pong, RakNetClient, RakNetConfig, RakNetConnection, RakNetTransport,
};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
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
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting new connections and closes the ones still open.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single client session that can send and receive game payloads.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one game payload to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next game payload from the remote peer.
    ///
    /// Returns `Ok(None)` once the session is gone: the peer disconnected,
    /// timed out, or the transport shut down. Cancel-safe.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
