//! Direction-typed packet sets.
//!
//! The proxy only reacts to a handful of client packets and only ever
//! sends a handful back. [`InboundPacket`] and [`OutboundPacket`] name
//! exactly those, so the connection handler can dispatch with one `match`.

use std::fmt;

use bytes::Bytes;
use tracing::trace;

use crate::packets::{
    self, encode_packet, read_header, Disconnect, Login, NetworkSettings, Packet, PlayStatus,
    RequestNetworkSettings, ResourcePackClientResponse, ResourcePackStack, ResourcePacksInfo,
    SetLocalPlayerAsInitialized, StartGame, Transfer,
};
use crate::ProtocolError;

/// How much of a packet a log summary may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Token material and other client secrets are replaced by their size.
    #[default]
    Redacted,
    /// Everything, including login tokens. Only for local debugging.
    Full,
}

/// Packets a client sends that the proxy acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    RequestNetworkSettings(RequestNetworkSettings),
    Login(Login),
    ResourcePackClientResponse(ResourcePackClientResponse),
    SetLocalPlayerAsInitialized(SetLocalPlayerAsInitialized),
    /// Anything else. The body is dropped.
    Unhandled { id: u32 },
}

impl InboundPacket {
    /// Decodes one packet from a batch entry.
    pub fn decode(mut raw: Bytes) -> Result<Self, ProtocolError> {
        let id = read_header(&mut raw)?;
        let packet = match id {
            packets::id::REQUEST_NETWORK_SETTINGS => {
                Self::RequestNetworkSettings(RequestNetworkSettings::decode_body(&mut raw)?)
            }
            packets::id::LOGIN => Self::Login(Login::decode_body(&mut raw)?),
            packets::id::RESOURCE_PACK_CLIENT_RESPONSE => {
                Self::ResourcePackClientResponse(ResourcePackClientResponse::decode_body(&mut raw)?)
            }
            packets::id::SET_LOCAL_PLAYER_AS_INITIALIZED => {
                Self::SetLocalPlayerAsInitialized(SetLocalPlayerAsInitialized::decode_body(&mut raw)?)
            }
            other => {
                trace!(id = other, len = raw.len(), "unhandled inbound packet");
                Self::Unhandled { id: other }
            }
        };
        Ok(packet)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestNetworkSettings(_) => "RequestNetworkSettings",
            Self::Login(_) => "Login",
            Self::ResourcePackClientResponse(_) => "ResourcePackClientResponse",
            Self::SetLocalPlayerAsInitialized(_) => "SetLocalPlayerAsInitialized",
            Self::Unhandled { .. } => "Unhandled",
        }
    }

    /// A log-friendly rendering of the packet.
    pub fn summary(&self, visibility: Visibility) -> Summary<'_> {
        Summary { packet: self, visibility }
    }
}

/// Display adapter returned by [`InboundPacket::summary`].
pub struct Summary<'a> {
    packet: &'a InboundPacket,
    visibility: Visibility,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.packet, self.visibility) {
            (InboundPacket::Login(login), Visibility::Full) => write!(
                f,
                "Login {{ protocol_version: {}, chain_data: {:?}, skin_data: {:?} }}",
                login.protocol_version, login.chain_data, login.skin_data
            ),
            (InboundPacket::Unhandled { id }, _) => write!(f, "Unhandled {{ id: 0x{id:02x} }}"),
            // Login's Debug impl already redacts.
            (packet, _) => write!(f, "{packet:?}"),
        }
    }
}

/// Packets the proxy sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPacket {
    NetworkSettings(NetworkSettings),
    PlayStatus(PlayStatus),
    Disconnect(Disconnect),
    ResourcePacksInfo(ResourcePacksInfo),
    ResourcePackStack(ResourcePackStack),
    StartGame(StartGame),
    Transfer(Transfer),
}

impl OutboundPacket {
    /// Encodes the packet with its header, ready to be batched.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::NetworkSettings(p) => encode_packet(p),
            Self::PlayStatus(p) => encode_packet(p),
            Self::Disconnect(p) => encode_packet(p),
            Self::ResourcePacksInfo(p) => encode_packet(p),
            Self::ResourcePackStack(p) => encode_packet(p),
            Self::StartGame(p) => encode_packet(p),
            Self::Transfer(p) => encode_packet(p),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NetworkSettings(_) => "NetworkSettings",
            Self::PlayStatus(_) => "PlayStatus",
            Self::Disconnect(_) => "Disconnect",
            Self::ResourcePacksInfo(_) => "ResourcePacksInfo",
            Self::ResourcePackStack(_) => "ResourcePackStack",
            Self::StartGame(_) => "StartGame",
            Self::Transfer(_) => "Transfer",
        }
    }
}

macro_rules! outbound_from {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for OutboundPacket {
                fn from(packet: $ty) -> Self {
                    Self::$ty(packet)
                }
            }
        )*
    };
}

outbound_from!(
    NetworkSettings,
    PlayStatus,
    Disconnect,
    ResourcePacksInfo,
    ResourcePackStack,
    StartGame,
    Transfer,
);
