//! In-process [`Connection`] pair.
//!
//! Each side's `send` lands in the other side's `recv`. Closing one side
//! ends the other side's stream with `Ok(None)`, the same signal a RakNet
//! peer produces when the client goes away.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, Mutex};

use crate::{Connection, ConnectionId, TransportError};

/// One end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Creates two connected ends. The first is conventionally the server
    /// side, the second the client side.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Self::new(a_tx, a_rx, 1);
        let b = Self::new(b_tx, b_rx, 2);
        (a, b)
    }

    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        host: u8,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            peer_addr: SocketAddr::from((Ipv4Addr::new(127, 0, 0, host), 19132)),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether [`close`](Connection::close) has been called on this end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let tx = self.tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            return Err(TransportError::ConnectionClosed("closed locally".into()));
        };
        tx.send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        self.tx.lock().await.take();
        self.rx.lock().await.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_directions() {
        let (server, client) = MemoryConnection::pair();

        server.send(b"to client").await.unwrap();
        client.send(b"to server").await.unwrap();

        assert_eq!(client.recv().await.unwrap().unwrap(), b"to client");
        assert_eq!(server.recv().await.unwrap().unwrap(), b"to server");
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (server, client) = MemoryConnection::pair();

        client.close().await.unwrap();

        assert!(server.recv().await.unwrap().is_none());
        assert!(client.is_closed());
        assert!(client.send(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_pending_data_survives_close() {
        let (server, client) = MemoryConnection::pair();

        client.send(b"last words").await.unwrap();
        client.close().await.unwrap();

        assert_eq!(server.recv().await.unwrap().unwrap(), b"last words");
        assert!(server.recv().await.unwrap().is_none());
    }
}
