//! Players: verified identities bound to a live connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bedwarp_transport::ConnectionId;
use p384::ecdsa::VerifyingKey;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::Identity;

/// Stable identity key: the XUID, or the identity UUID for offline
/// clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning reference from a player back to the connection serving it.
///
/// The connection itself belongs to its handler task. The handle only
/// identifies it and lets other parties ask it to leave.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    conn_id: ConnectionId,
    peer_addr: SocketAddr,
    evicted: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(conn_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self { conn_id, peer_addr, evicted: Arc::new(Notify::new()) }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Asks the owning connection to disconnect. The request is kept if
    /// the connection is not currently waiting for it.
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Completes once [`evict`](Self::evict) has been called.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

/// A connected, verified client.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    display_name: String,
    xuid: String,
    identity: Uuid,
    public_key: VerifyingKey,
    session: SessionHandle,
}

impl Player {
    pub fn new(identity: Identity, session: SessionHandle) -> Self {
        Self {
            id: identity.player_id(),
            display_name: identity.display_name,
            xuid: identity.xuid,
            identity: identity.identity,
            public_key: identity.public_key,
            session,
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn xuid(&self) -> &str {
        &self.xuid
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Whether this player is served by the given connection.
    pub fn is_on(&self, conn_id: ConnectionId) -> bool {
        self.session.conn_id == conn_id
    }
}
