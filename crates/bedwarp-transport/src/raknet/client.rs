//! Minimal RakNet client.
//!
//! Speaks just enough of the protocol to discover a listener and open a
//! session against it: the offline handshake, the connection request, and
//! framed game packets. Used to exercise the listener end to end.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

use super::frame::{
    encode_ack, FrameSet, Framer, Reassembler, Reliability, ACK, FRAME_SET_MAX, FRAME_SET_MIN,
    NACK,
};
use super::message::{self, id, OnlineMessage, MAGIC};
use super::{unix_millis, DATAGRAM_OVERHEAD};
use crate::TransportError;

const CLIENT_MTU: u16 = 1400;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_BUFFER: usize = 2048;

/// A connected client session.
pub struct RakNetClient {
    socket: UdpSocket,
    server: SocketAddr,
    guid: u64,
    mtu: u16,
    framer: Framer,
    reassembler: Reassembler,
    pending: Vec<OnlineMessage>,
}

impl RakNetClient {
    /// Sends one discovery ping and returns the advertisement string from
    /// the pong.
    pub async fn ping(server: SocketAddr) -> Result<String, TransportError> {
        let socket = bind_ephemeral().await?;
        let guid: u64 = rand::random();
        send(&socket, server, &message::unconnected_ping(unix_millis(), guid)).await?;

        let mut pong = recv_offline(&socket, id::UNCONNECTED_PONG).await?;
        // id, ping time, server guid, magic
        skip(&mut pong, 1 + 8 + 8 + MAGIC.len())?;
        if pong.remaining() < 2 {
            return Err(TransportError::malformed("truncated pong"));
        }
        let len = usize::from(pong.get_u16());
        if pong.remaining() < len {
            return Err(TransportError::malformed("truncated advertisement"));
        }
        String::from_utf8(pong.split_to(len).to_vec())
            .map_err(|_| TransportError::malformed("advertisement is not UTF-8"))
    }

    /// Runs the offline handshake and the connection request, returning
    /// once the listener has been told the session is established.
    pub async fn connect(server: SocketAddr) -> Result<Self, TransportError> {
        let socket = bind_ephemeral().await?;
        let guid: u64 = rand::random();

        send(&socket, server, &message::open_connection_request_1(CLIENT_MTU)).await?;
        let mut reply = recv_offline(&socket, id::OPEN_CONNECTION_REPLY_1).await?;
        // id, magic, server guid, security flag
        skip(&mut reply, 1 + MAGIC.len() + 8 + 1)?;
        if reply.remaining() < 2 {
            return Err(TransportError::malformed("truncated open connection reply"));
        }
        let mtu = reply.get_u16();

        send(&socket, server, &message::open_connection_request_2(server, mtu, guid)).await?;
        recv_offline(&socket, id::OPEN_CONNECTION_REPLY_2).await?;

        let mut client = Self {
            socket,
            server,
            guid,
            mtu,
            framer: Framer::default(),
            reassembler: Reassembler::default(),
            pending: Vec::new(),
        };

        let request = message::connection_request(guid, unix_millis());
        client.send_message(request, Reliability::ReliableOrdered).await?;
        let accepted_time = loop {
            match client.next_message().await? {
                OnlineMessage::ConnectionRequestAccepted { accepted_time, .. } => break accepted_time,
                other => client.pending.push(other),
            }
        };
        let incoming = message::new_incoming_connection(server, unix_millis(), accepted_time);
        client.send_message(incoming, Reliability::ReliableOrdered).await?;

        trace!(%server, guid, mtu, "client session established");
        Ok(client)
    }

    pub fn guid(&self) -> u64 {
        self.guid
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::ReceiveFailed)
    }

    /// Sends one game payload.
    pub async fn send_game(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_message(message::game_packet(payload), Reliability::ReliableOrdered)
            .await
    }

    /// Waits for the next game payload. Returns `Ok(None)` once the
    /// listener sends a disconnect notification.
    pub async fn recv_game(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            let message = if self.pending.is_empty() {
                self.next_message().await?
            } else {
                self.pending.remove(0)
            };
            match message {
                OnlineMessage::Game(payload) => return Ok(Some(payload)),
                OnlineMessage::Disconnect => return Ok(None),
                OnlineMessage::ConnectedPing { time } => {
                    let pong = message::connected_pong(time, unix_millis());
                    self.send_message(pong, Reliability::Unreliable).await?;
                }
                _ => {}
            }
        }
    }

    /// Tells the listener the session is over.
    pub async fn disconnect(mut self) -> Result<(), TransportError> {
        self.send_message(message::disconnect_notification(), Reliability::ReliableOrdered)
            .await
    }

    async fn send_message(
        &mut self,
        body: Bytes,
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        let max_payload = usize::from(self.mtu).saturating_sub(DATAGRAM_OVERHEAD);
        for datagram in self.framer.frame(body, reliability, max_payload) {
            send(&self.socket, self.server, &datagram).await?;
        }
        Ok(())
    }

    /// Reads datagrams until a whole online message is available. ACKs
    /// every frame set and skips acknowledgement datagrams.
    async fn next_message(&mut self) -> Result<OnlineMessage, TransportError> {
        let mut ready = std::collections::VecDeque::new();
        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            if let Some(body) = ready.pop_front() {
                let message = OnlineMessage::decode(body)?;
                for rest in ready.drain(..) {
                    self.pending.push(OnlineMessage::decode(rest)?);
                }
                return Ok(message);
            }

            let (len, from) = timeout(REPLY_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| TransportError::ConnectionClosed("server stopped responding".into()))?
                .map_err(TransportError::ReceiveFailed)?;
            if from != self.server || len == 0 {
                continue;
            }
            match buf[0] {
                ACK | NACK => continue,
                FRAME_SET_MIN..=FRAME_SET_MAX => {
                    let set = FrameSet::decode(Bytes::copy_from_slice(&buf[..len]))?;
                    send(&self.socket, self.server, &encode_ack(&[set.sequence])).await?;
                    ready.extend(self.reassembler.accept(set)?);
                }
                other => trace!(id = other, "client ignoring datagram"),
            }
        }
    }
}

async fn bind_ephemeral() -> Result<UdpSocket, TransportError> {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .map_err(|source| TransportError::Bind { addr: "127.0.0.1:0".into(), source })
}

async fn send(socket: &UdpSocket, to: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
    socket
        .send_to(datagram, to)
        .await
        .map(|_| ())
        .map_err(TransportError::SendFailed)
}

/// Waits for an offline reply with the given id. An incompatible-protocol
/// reply is reported as an error.
async fn recv_offline(socket: &UdpSocket, want: u8) -> Result<Bytes, TransportError> {
    let mut buf = vec![0u8; RECV_BUFFER];
    loop {
        let (len, _) = timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf))
            .await
            .map_err(|_| TransportError::ConnectionClosed("no reply from server".into()))?
            .map_err(TransportError::ReceiveFailed)?;
        match buf.first() {
            Some(&got) if got == want => return Ok(Bytes::copy_from_slice(&buf[..len])),
            Some(&id::INCOMPATIBLE_PROTOCOL_VERSION) => {
                return Err(TransportError::ConnectionClosed("incompatible RakNet protocol".into()));
            }
            _ => continue,
        }
    }
}

fn skip(buf: &mut Bytes, n: usize) -> Result<(), TransportError> {
    if buf.remaining() < n {
        return Err(TransportError::malformed("truncated offline reply"));
    }
    buf.advance(n);
    Ok(())
}
