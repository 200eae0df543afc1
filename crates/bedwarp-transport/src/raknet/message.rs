//! RakNet control messages: offline discovery/handshake and the connected
//! messages that travel inside frames.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::frame::need;
use crate::TransportError;

/// Offline message marker that every unconnected datagram carries.
pub const MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56,
    0x78,
];

/// RakNet protocol revision spoken by Bedrock clients.
pub const RAKNET_PROTOCOL_VERSION: u8 = 11;

/// IP + UDP header bytes, counted by clients when they probe the MTU.
pub const UDP_HEADER_SIZE: u16 = 28;

const AF_INET6: u16 = 23;
const SYSTEM_ADDRESS_COUNT: usize = 20;

/// Datagram and message ids.
pub mod id {
    pub const CONNECTED_PING: u8 = 0x00;
    pub const UNCONNECTED_PING: u8 = 0x01;
    pub const UNCONNECTED_PING_OPEN_CONNECTIONS: u8 = 0x02;
    pub const CONNECTED_PONG: u8 = 0x03;
    pub const OPEN_CONNECTION_REQUEST_1: u8 = 0x05;
    pub const OPEN_CONNECTION_REPLY_1: u8 = 0x06;
    pub const OPEN_CONNECTION_REQUEST_2: u8 = 0x07;
    pub const OPEN_CONNECTION_REPLY_2: u8 = 0x08;
    pub const CONNECTION_REQUEST: u8 = 0x09;
    pub const CONNECTION_REQUEST_ACCEPTED: u8 = 0x10;
    pub const NEW_INCOMING_CONNECTION: u8 = 0x13;
    pub const DISCONNECT_NOTIFICATION: u8 = 0x15;
    pub const INCOMPATIBLE_PROTOCOL_VERSION: u8 = 0x19;
    pub const UNCONNECTED_PONG: u8 = 0x1c;
    pub const GAME_PACKET: u8 = 0xfe;
}

/// Server metadata advertised in response to discovery pings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub edition: String,
    pub motd: String,
    pub sub_motd: String,
    pub protocol_version: u32,
    pub version: String,
    pub player_count: u32,
    pub max_player_count: u32,
    pub game_type: String,
    pub game_mode_id: u8,
    pub ipv4_port: u16,
    pub ipv6_port: u16,
}

impl Pong {
    /// Renders the `;`-separated advertisement string clients show in
    /// their server list.
    pub fn to_advertisement(&self, server_guid: u64) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{};{};{};{};",
            self.edition,
            sanitize(&self.motd),
            self.protocol_version,
            self.version,
            self.player_count,
            self.max_player_count,
            server_guid,
            sanitize(&self.sub_motd),
            self.game_type,
            self.game_mode_id,
            self.ipv4_port,
            self.ipv6_port,
        )
    }
}

impl Default for Pong {
    fn default() -> Self {
        Self {
            edition: "MCPE".into(),
            motd: String::new(),
            sub_motd: String::new(),
            protocol_version: 0,
            version: String::new(),
            player_count: 0,
            max_player_count: 0,
            game_type: "Survival".into(),
            game_mode_id: 1,
            ipv4_port: 19132,
            ipv6_port: 19133,
        }
    }
}

fn sanitize(field: &str) -> String {
    field.replace(';', "\\;")
}

/// A datagram a peer sends before it has a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineRequest {
    UnconnectedPing { time: u64, client_guid: u64 },
    OpenConnectionRequest1 { protocol: u8, mtu: u16 },
    OpenConnectionRequest2 { server_addr: SocketAddr, mtu: u16, client_guid: u64 },
}

impl OfflineRequest {
    /// Decodes an offline datagram. Callers dispatch on the first byte, so
    /// an id outside the offline set is an error here.
    pub fn decode(datagram: Bytes) -> Result<Self, TransportError> {
        let datagram_len = datagram.len();
        let mut buf = datagram;
        need(&buf, 1, "offline id")?;
        match buf.get_u8() {
            id::UNCONNECTED_PING | id::UNCONNECTED_PING_OPEN_CONNECTIONS => {
                need(&buf, 8, "ping time")?;
                let time = buf.get_u64();
                expect_magic(&mut buf)?;
                // Some clients omit the GUID.
                let client_guid = if buf.remaining() >= 8 { buf.get_u64() } else { 0 };
                Ok(Self::UnconnectedPing { time, client_guid })
            }
            id::OPEN_CONNECTION_REQUEST_1 => {
                expect_magic(&mut buf)?;
                need(&buf, 1, "raknet protocol")?;
                let protocol = buf.get_u8();
                // The request is padded out to the MTU the client is probing.
                let mtu = u16::try_from(datagram_len)
                    .unwrap_or(u16::MAX)
                    .saturating_add(UDP_HEADER_SIZE);
                Ok(Self::OpenConnectionRequest1 { protocol, mtu })
            }
            id::OPEN_CONNECTION_REQUEST_2 => {
                expect_magic(&mut buf)?;
                let server_addr = get_address(&mut buf)?;
                need(&buf, 10, "mtu and guid")?;
                let mtu = buf.get_u16();
                let client_guid = buf.get_u64();
                Ok(Self::OpenConnectionRequest2 { server_addr, mtu, client_guid })
            }
            other => Err(TransportError::malformed(format!(
                "0x{other:02x} is not an offline message"
            ))),
        }
    }
}

/// A message carried inside a frame once the peer has a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnlineMessage {
    ConnectedPing { time: u64 },
    ConnectedPong { ping_time: u64, pong_time: u64 },
    ConnectionRequest { client_guid: u64, time: u64 },
    ConnectionRequestAccepted { request_time: u64, accepted_time: u64 },
    NewIncomingConnection,
    Disconnect,
    Game(Bytes),
    Other(u8),
}

impl OnlineMessage {
    pub fn decode(body: Bytes) -> Result<Self, TransportError> {
        let mut buf = body;
        need(&buf, 1, "message id")?;
        Ok(match buf.get_u8() {
            id::CONNECTED_PING => {
                need(&buf, 8, "ping time")?;
                Self::ConnectedPing { time: buf.get_u64() }
            }
            id::CONNECTED_PONG => {
                need(&buf, 16, "pong times")?;
                Self::ConnectedPong { ping_time: buf.get_u64(), pong_time: buf.get_u64() }
            }
            id::CONNECTION_REQUEST => {
                need(&buf, 16, "connection request")?;
                Self::ConnectionRequest { client_guid: buf.get_u64(), time: buf.get_u64() }
            }
            id::CONNECTION_REQUEST_ACCEPTED => {
                get_address(&mut buf)?;
                need(&buf, 2, "system index")?;
                buf.advance(2);
                // The address list length varies between implementations;
                // the two timestamps are always the trailing 16 bytes.
                if buf.remaining() < 16 {
                    return Err(TransportError::malformed("truncated accepted timestamps"));
                }
                buf.advance(buf.remaining() - 16);
                Self::ConnectionRequestAccepted {
                    request_time: buf.get_u64(),
                    accepted_time: buf.get_u64(),
                }
            }
            id::NEW_INCOMING_CONNECTION => Self::NewIncomingConnection,
            id::DISCONNECT_NOTIFICATION => Self::Disconnect,
            id::GAME_PACKET => Self::Game(buf),
            other => Self::Other(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Server -> client encoders
// ---------------------------------------------------------------------------

pub fn unconnected_pong(time: u64, server_guid: u64, advertisement: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(35 + advertisement.len());
    buf.put_u8(id::UNCONNECTED_PONG);
    buf.put_u64(time);
    buf.put_u64(server_guid);
    buf.put_slice(&MAGIC);
    buf.put_u16(advertisement.len() as u16);
    buf.put_slice(advertisement.as_bytes());
    buf.freeze()
}

pub fn open_connection_reply_1(server_guid: u64, mtu: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(28);
    buf.put_u8(id::OPEN_CONNECTION_REPLY_1);
    buf.put_slice(&MAGIC);
    buf.put_u64(server_guid);
    buf.put_u8(0); // no security
    buf.put_u16(mtu);
    buf.freeze()
}

pub fn open_connection_reply_2(server_guid: u64, client_addr: SocketAddr, mtu: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(id::OPEN_CONNECTION_REPLY_2);
    buf.put_slice(&MAGIC);
    buf.put_u64(server_guid);
    put_address(&mut buf, client_addr);
    buf.put_u16(mtu);
    buf.put_u8(0); // no encryption
    buf.freeze()
}

pub fn incompatible_protocol(server_guid: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(26);
    buf.put_u8(id::INCOMPATIBLE_PROTOCOL_VERSION);
    buf.put_u8(RAKNET_PROTOCOL_VERSION);
    buf.put_slice(&MAGIC);
    buf.put_u64(server_guid);
    buf.freeze()
}

pub fn connected_pong(ping_time: u64, pong_time: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(17);
    buf.put_u8(id::CONNECTED_PONG);
    buf.put_u64(ping_time);
    buf.put_u64(pong_time);
    buf.freeze()
}

pub fn connection_request_accepted(
    client_addr: SocketAddr,
    request_time: u64,
    accepted_time: u64,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(160);
    buf.put_u8(id::CONNECTION_REQUEST_ACCEPTED);
    put_address(&mut buf, client_addr);
    buf.put_u16(0);
    let placeholder = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    for _ in 0..SYSTEM_ADDRESS_COUNT {
        put_address(&mut buf, placeholder);
    }
    buf.put_u64(request_time);
    buf.put_u64(accepted_time);
    buf.freeze()
}

pub fn disconnect_notification() -> Bytes {
    Bytes::from_static(&[id::DISCONNECT_NOTIFICATION])
}

pub fn game_packet(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(id::GAME_PACKET);
    buf.put_slice(payload);
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Client -> server encoders
// ---------------------------------------------------------------------------

pub fn unconnected_ping(time: u64, client_guid: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(33);
    buf.put_u8(id::UNCONNECTED_PING);
    buf.put_u64(time);
    buf.put_slice(&MAGIC);
    buf.put_u64(client_guid);
    buf.freeze()
}

/// Builds an MTU probe padded so the datagram plus UDP/IP headers equals
/// `mtu`.
pub fn open_connection_request_1(mtu: u16) -> Bytes {
    let len = usize::from(mtu.saturating_sub(UDP_HEADER_SIZE)).max(18);
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u8(id::OPEN_CONNECTION_REQUEST_1);
    buf.put_slice(&MAGIC);
    buf.put_u8(RAKNET_PROTOCOL_VERSION);
    buf.resize(len, 0);
    buf.freeze()
}

pub fn open_connection_request_2(server_addr: SocketAddr, mtu: u16, client_guid: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(id::OPEN_CONNECTION_REQUEST_2);
    buf.put_slice(&MAGIC);
    put_address(&mut buf, server_addr);
    buf.put_u16(mtu);
    buf.put_u64(client_guid);
    buf.freeze()
}

pub fn connection_request(client_guid: u64, time: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(18);
    buf.put_u8(id::CONNECTION_REQUEST);
    buf.put_u64(client_guid);
    buf.put_u64(time);
    buf.put_u8(0); // no security
    buf.freeze()
}

pub fn new_incoming_connection(server_addr: SocketAddr, ping_time: u64, pong_time: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(160);
    buf.put_u8(id::NEW_INCOMING_CONNECTION);
    put_address(&mut buf, server_addr);
    let placeholder = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    for _ in 0..SYSTEM_ADDRESS_COUNT {
        put_address(&mut buf, placeholder);
    }
    buf.put_u64(ping_time);
    buf.put_u64(pong_time);
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

pub fn put_address(buf: &mut BytesMut, addr: SocketAddr) {
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(4);
            for octet in v4.ip().octets() {
                buf.put_u8(!octet);
            }
            buf.put_u16(v4.port());
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(6);
            buf.put_u16_le(AF_INET6);
            buf.put_u16(v6.port());
            buf.put_u32(v6.flowinfo());
            buf.put_slice(&v6.ip().octets());
            buf.put_u32(v6.scope_id());
        }
    }
}

pub fn get_address(buf: &mut Bytes) -> Result<SocketAddr, TransportError> {
    need(buf, 1, "address version")?;
    match buf.get_u8() {
        4 => {
            need(buf, 6, "ipv4 address")?;
            let mut octets = [0u8; 4];
            for octet in &mut octets {
                *octet = !buf.get_u8();
            }
            let port = buf.get_u16();
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        6 => {
            need(buf, 28, "ipv6 address")?;
            buf.advance(2); // address family
            let port = buf.get_u16();
            let flowinfo = buf.get_u32();
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            let scope_id = buf.get_u32();
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        other => Err(TransportError::malformed(format!("address version {other}"))),
    }
}

fn expect_magic(buf: &mut Bytes) -> Result<(), TransportError> {
    need(buf, MAGIC.len(), "magic")?;
    if buf[..MAGIC.len()] != MAGIC {
        return Err(TransportError::malformed("bad offline magic"));
    }
    buf.advance(MAGIC.len());
    Ok(())
}
