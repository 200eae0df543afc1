//! RakNet UDP transport.
//!
//! One driver task owns the socket and every peer's receive-side state.
//! It answers discovery pings, walks peers through the open-connection
//! handshake, ACKs frame sets, reassembles splits, and hands game payloads
//! to the [`RakNetConnection`] the proxy holds for that peer. Sending goes
//! straight from the connection to the shared socket.
//!
//! Outbound frames are sent reliable-ordered but are not retransmitted:
//! ACK and NAK datagrams from clients are accepted and ignored.

mod client;
pub mod frame;
pub mod message;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, trace, warn};

use crate::{Connection, ConnectionId, Transport, TransportError};
use frame::{
    encode_ack, FrameSet, Framer, Reassembler, Reliability, ACK, FRAME_SET_MAX, FRAME_SET_MIN,
    NACK,
};
use message::{id, OfflineRequest, OnlineMessage, RAKNET_PROTOCOL_VERSION};

pub use client::RakNetClient;
pub use message::Pong;

/// Datagram bytes that are not frame payload: IP/UDP headers, the frame
/// set header, and the largest frame header.
pub(crate) const DATAGRAM_OVERHEAD: usize = 28 + 4 + 23;
const MIN_MTU: u16 = 576;
const RECV_BUFFER: usize = 2048;

/// Callbacks the driver makes while handling offline traffic.
pub trait ListenerEvents: Send + Sync + 'static {
    /// Decides whether a peer may open a connection.
    fn on_connection_request(&self, addr: SocketAddr) -> bool {
        let _ = addr;
        true
    }

    /// Returns the metadata to advertise to a discovery ping, or `None` to
    /// stay silent.
    fn on_query(&self, addr: SocketAddr) -> Option<Pong>;
}

/// Tunables for the RakNet listener.
#[derive(Debug, Clone)]
pub struct RakNetConfig {
    /// Upper bound on the MTU negotiated with a client.
    pub max_mtu: u16,
    /// Peers that send nothing for this long are dropped.
    pub peer_timeout: Duration,
    /// Maximum number of peers with handshake or connection state.
    pub max_peers: usize,
    /// Sessions waiting for `accept()` before new ones are refused.
    pub accept_backlog: usize,
    /// Game payloads buffered per session before new ones are dropped.
    pub inbound_queue: usize,
}

impl Default for RakNetConfig {
    fn default() -> Self {
        Self {
            max_mtu: 1492,
            peer_timeout: Duration::from_secs(10),
            max_peers: 1024,
            accept_backlog: 64,
            inbound_queue: 1024,
        }
    }
}

/// A RakNet [`Transport`] bound to one UDP socket.
pub struct RakNetTransport {
    local_addr: SocketAddr,
    guid: u64,
    incoming: mpsc::Receiver<RakNetConnection>,
    shutdown: watch::Sender<bool>,
}

impl RakNetTransport {
    /// Binds the listener with default settings.
    pub async fn bind(
        addr: &str,
        events: Arc<dyn ListenerEvents>,
    ) -> Result<Self, TransportError> {
        Self::bind_with(addr, events, RakNetConfig::default()).await
    }

    /// Binds the listener and spawns its driver task.
    pub async fn bind_with(
        addr: &str,
        events: Arc<dyn ListenerEvents>,
        config: RakNetConfig,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let guid: u64 = rand::random();

        let (incoming_tx, incoming) = mpsc::channel(config.accept_backlog.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            socket: Arc::new(socket),
            guid,
            events,
            config,
            peers: HashMap::new(),
            incoming: incoming_tx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(driver.run());

        info!(%local_addr, guid, "RakNet transport listening");
        Ok(Self { local_addr, guid, incoming, shutdown })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server GUID advertised in pongs and handshake replies.
    pub fn guid(&self) -> u64 {
        self.guid
    }
}

impl Transport for RakNetTransport {
    type Connection = RakNetConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.incoming.recv().await.ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shutdown.send_replace(true);
        Ok(())
    }
}

impl Drop for RakNetTransport {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Peer link (shared between the driver and the connection)
// ---------------------------------------------------------------------------

struct PeerLink {
    addr: SocketAddr,
    mtu: u16,
    socket: Arc<UdpSocket>,
    framer: Mutex<Framer>,
    closed: AtomicBool,
}

impl PeerLink {
    async fn send_raw(&self, datagram: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(datagram, self.addr)
            .await
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }

    /// The framer lock is held until every datagram of `body` is out so
    /// split parts and order indices of concurrent sends do not interleave.
    async fn send_frames(
        &self,
        body: Bytes,
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        let max_payload = usize::from(self.mtu).saturating_sub(DATAGRAM_OVERHEAD);
        let mut framer = self.framer.lock().await;
        for datagram in framer.frame(body, reliability, max_payload) {
            self.send_raw(&datagram).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One connected RakNet session.
pub struct RakNetConnection {
    id: ConnectionId,
    link: Arc<PeerLink>,
    inbound: Mutex<mpsc::Receiver<Bytes>>,
}

impl Connection for RakNetConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.link.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(format!("{} closed", self.id)));
        }
        self.link
            .send_frames(message::game_packet(data), Reliability::ReliableOrdered)
            .await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        if self.link.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(self.inbound.lock().await.recv().await.map(|b| b.to_vec()))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if self.link.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(conn_id = %self.id, addr = %self.link.addr, "closing RakNet session");
        self.link
            .send_frames(message::disconnect_notification(), Reliability::ReliableOrdered)
            .await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.link.addr
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Peer {
    link: Arc<PeerLink>,
    client_guid: u64,
    reassembler: Reassembler,
    last_seen: Instant,
    inbound: Option<mpsc::Sender<Bytes>>,
}

struct Driver {
    socket: Arc<UdpSocket>,
    guid: u64,
    events: Arc<dyn ListenerEvents>,
    config: RakNetConfig,
    peers: HashMap<SocketAddr, Peer>,
    incoming: mpsc::Sender<RakNetConnection>,
    shutdown: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        let mut buf = vec![0u8; RECV_BUFFER];
        let mut sweep = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, addr)) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        if let Err(e) = self.handle_datagram(addr, datagram).await {
                            debug!(%addr, error = %e, "dropping datagram");
                        }
                    }
                    Err(e) => debug!(error = %e, "udp receive failed"),
                },
                _ = sweep.tick() => self.sweep(),
                _ = self.shutdown.changed() => break,
            }
        }

        for (addr, peer) in self.peers.drain() {
            if peer.link.closed.swap(true, Ordering::AcqRel) {
                continue;
            }
            let notify = message::disconnect_notification();
            if let Err(e) = peer.link.send_frames(notify, Reliability::ReliableOrdered).await {
                trace!(%addr, error = %e, "disconnect notification failed");
            }
        }
        debug!("RakNet driver stopped");
    }

    async fn handle_datagram(
        &mut self,
        addr: SocketAddr,
        datagram: Bytes,
    ) -> Result<(), TransportError> {
        let Some(&first) = datagram.first() else {
            return Ok(());
        };
        match first {
            id::UNCONNECTED_PING
            | id::UNCONNECTED_PING_OPEN_CONNECTIONS
            | id::OPEN_CONNECTION_REQUEST_1
            | id::OPEN_CONNECTION_REQUEST_2 => {
                let request = OfflineRequest::decode(datagram)?;
                self.handle_offline(addr, request).await
            }
            FRAME_SET_MIN..=FRAME_SET_MAX => self.handle_frame_set(addr, datagram).await,
            ACK | NACK => {
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.last_seen = Instant::now();
                }
                Ok(())
            }
            other => {
                trace!(%addr, id = other, "ignoring unknown datagram");
                Ok(())
            }
        }
    }

    async fn handle_offline(
        &mut self,
        addr: SocketAddr,
        request: OfflineRequest,
    ) -> Result<(), TransportError> {
        match request {
            OfflineRequest::UnconnectedPing { time, .. } => {
                if let Some(pong) = self.events.on_query(addr) {
                    let ad = pong.to_advertisement(self.guid);
                    self.send_to(addr, &message::unconnected_pong(time, self.guid, &ad))
                        .await?;
                }
            }
            OfflineRequest::OpenConnectionRequest1 { protocol, mtu } => {
                if protocol != RAKNET_PROTOCOL_VERSION {
                    debug!(%addr, protocol, "incompatible RakNet protocol");
                    self.send_to(addr, &message::incompatible_protocol(self.guid)).await?;
                    return Ok(());
                }
                let mtu = mtu.clamp(MIN_MTU, self.config.max_mtu);
                self.send_to(addr, &message::open_connection_reply_1(self.guid, mtu))
                    .await?;
            }
            OfflineRequest::OpenConnectionRequest2 { mtu, client_guid, .. } => {
                if !self.peers.contains_key(&addr) {
                    if self.peers.len() >= self.config.max_peers {
                        warn!(%addr, "peer table full, ignoring connection");
                        return Ok(());
                    }
                    if !self.events.on_connection_request(addr) {
                        debug!(%addr, "connection request refused");
                        return Ok(());
                    }
                    let mtu = mtu.clamp(MIN_MTU, self.config.max_mtu);
                    let link = Arc::new(PeerLink {
                        addr,
                        mtu,
                        socket: Arc::clone(&self.socket),
                        framer: Mutex::new(Framer::default()),
                        closed: AtomicBool::new(false),
                    });
                    self.peers.insert(addr, Peer {
                        link,
                        client_guid,
                        reassembler: Reassembler::default(),
                        last_seen: Instant::now(),
                        inbound: None,
                    });
                    debug!(%addr, mtu, client_guid, "peer opened connection");
                }
                let mtu = self.peers[&addr].link.mtu;
                self.send_to(addr, &message::open_connection_reply_2(self.guid, addr, mtu))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_frame_set(
        &mut self,
        addr: SocketAddr,
        datagram: Bytes,
    ) -> Result<(), TransportError> {
        let Some(peer) = self.peers.get_mut(&addr) else {
            trace!(%addr, "frame set from unknown peer");
            return Ok(());
        };
        peer.last_seen = Instant::now();

        let set = FrameSet::decode(datagram)?;
        peer.link.send_raw(&encode_ack(&[set.sequence])).await?;

        let ready = peer.reassembler.accept(set)?;

        for body in ready {
            self.handle_online(addr, OnlineMessage::decode(body)?).await?;
        }
        Ok(())
    }

    async fn handle_online(
        &mut self,
        addr: SocketAddr,
        message: OnlineMessage,
    ) -> Result<(), TransportError> {
        let Some(peer) = self.peers.get_mut(&addr) else {
            return Ok(());
        };
        match message {
            OnlineMessage::ConnectedPing { time } => {
                let pong = message::connected_pong(time, unix_millis());
                peer.link.send_frames(pong, Reliability::Unreliable).await?;
            }
            OnlineMessage::ConnectionRequest { time, .. } => {
                let accepted = message::connection_request_accepted(addr, time, unix_millis());
                peer.link.send_frames(accepted, Reliability::ReliableOrdered).await?;
            }
            OnlineMessage::NewIncomingConnection => {
                if peer.inbound.is_some() {
                    return Ok(());
                }
                let (tx, rx) = mpsc::channel(self.config.inbound_queue.max(1));
                let conn = RakNetConnection {
                    id: ConnectionId::next(),
                    link: Arc::clone(&peer.link),
                    inbound: Mutex::new(rx),
                };
                let conn_id = conn.id;
                match self.incoming.try_send(conn) {
                    Ok(()) => {
                        peer.inbound = Some(tx);
                        debug!(%addr, %conn_id, client_guid = peer.client_guid, "session established");
                    }
                    Err(_) => {
                        warn!(%addr, "accept backlog full, dropping session");
                        if let Some(peer) = self.peers.remove(&addr) {
                            peer.link.closed.store(true, Ordering::Release);
                            let notify = message::disconnect_notification();
                            peer.link.send_frames(notify, Reliability::ReliableOrdered).await?;
                        }
                    }
                }
            }
            OnlineMessage::Disconnect => {
                debug!(%addr, "peer sent disconnect notification");
                if let Some(peer) = self.peers.remove(&addr) {
                    peer.link.closed.store(true, Ordering::Release);
                }
            }
            OnlineMessage::Game(payload) => match &peer.inbound {
                Some(tx) => {
                    if tx.try_send(payload).is_err() {
                        warn!(%addr, "inbound queue full or closed, dropping game packet");
                    }
                }
                None => trace!(%addr, "game packet before session established"),
            },
            OnlineMessage::ConnectedPong { .. } | OnlineMessage::ConnectionRequestAccepted { .. } => {}
            OnlineMessage::Other(id) => trace!(%addr, id, "ignoring online message"),
        }
        Ok(())
    }

    /// Drops peers that went silent or whose connection was closed
    /// locally. Dropping the inbound sender ends the session's `recv`.
    fn sweep(&mut self) {
        let timeout = self.config.peer_timeout;
        self.peers.retain(|addr, peer| {
            if peer.link.closed.load(Ordering::Acquire) {
                trace!(%addr, "removing closed peer");
                return false;
            }
            if peer.last_seen.elapsed() > timeout {
                info!(%addr, "peer timed out");
                peer.link.closed.store(true, Ordering::Release);
                return false;
            }
            true
        });
    }

    async fn send_to(&self, addr: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(datagram, addr)
            .await
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
