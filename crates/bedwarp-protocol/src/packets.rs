//! Game packets the proxy sends or receives.
//!
//! Each packet is a plain struct implementing [`Packet`]. The header (a
//! var-int whose low ten bits are the packet id) is handled by
//! [`encode_packet`] and [`decode_packet`]; a packet's own impl only
//! deals with its body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::wire::{ReadExt, WriteExt};
use crate::ProtocolError;

const ID_MASK: u32 = 0x3ff;

/// Packet ids, as found in the low bits of the packet header.
pub mod id {
    pub const LOGIN: u32 = 0x01;
    pub const PLAY_STATUS: u32 = 0x02;
    pub const DISCONNECT: u32 = 0x05;
    pub const RESOURCE_PACKS_INFO: u32 = 0x06;
    pub const RESOURCE_PACK_STACK: u32 = 0x07;
    pub const RESOURCE_PACK_CLIENT_RESPONSE: u32 = 0x08;
    pub const START_GAME: u32 = 0x0b;
    pub const TRANSFER: u32 = 0x55;
    pub const SET_LOCAL_PLAYER_AS_INITIALIZED: u32 = 0x71;
    pub const NETWORK_SETTINGS: u32 = 0x8f;
    pub const REQUEST_NETWORK_SETTINGS: u32 = 0xc1;
}

/// A packet body with a fixed id.
pub trait Packet: Sized {
    const ID: u32;

    fn encode_body(&self, buf: &mut BytesMut);

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError>;
}

/// Encodes a packet with its header.
pub fn encode_packet<P: Packet>(packet: &P) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.write_var_u32(P::ID);
    packet.encode_body(&mut buf);
    buf.freeze()
}

/// Reads the header of `raw` and returns the packet id, leaving `raw`
/// positioned at the body.
pub fn read_header(raw: &mut Bytes) -> Result<u32, ProtocolError> {
    Ok(raw.read_var_u32()? & ID_MASK)
}

/// Decodes a packet of a known type, checking its id.
pub fn decode_packet<P: Packet>(mut raw: Bytes) -> Result<P, ProtocolError> {
    let actual = read_header(&mut raw)?;
    if actual != P::ID {
        return Err(ProtocolError::UnexpectedPacket { expected: P::ID, actual });
    }
    P::decode_body(&mut raw)
}

// ---------------------------------------------------------------------------
// Network settings
// ---------------------------------------------------------------------------

/// First packet a client sends, before login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNetworkSettings {
    pub protocol_version: i32,
}

impl Packet for RequestNetworkSettings {
    const ID: u32 = id::REQUEST_NETWORK_SETTINGS;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i32(self.protocol_version);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { protocol_version: buf.read_i32_be()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Deflate,
    Snappy,
}

impl CompressionAlgorithm {
    fn to_wire(self) -> u16 {
        match self {
            Self::Deflate => 0,
            Self::Snappy => 1,
        }
    }

    fn from_wire(value: u16) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Deflate),
            1 => Ok(Self::Snappy),
            other => Err(ProtocolError::UnknownValue {
                field: "compression algorithm",
                value: i64::from(other),
            }),
        }
    }
}

/// Server reply to [`RequestNetworkSettings`]. Every batch after this one
/// is compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub compression_threshold: u16,
    pub compression_algorithm: CompressionAlgorithm,
    pub client_throttle: bool,
    pub client_throttle_threshold: u8,
    pub client_throttle_scalar: f32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            compression_threshold: 1,
            compression_algorithm: CompressionAlgorithm::Deflate,
            client_throttle: false,
            client_throttle_threshold: 0,
            client_throttle_scalar: 0.0,
        }
    }
}

impl Packet for NetworkSettings {
    const ID: u32 = id::NETWORK_SETTINGS;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.compression_threshold);
        buf.put_u16_le(self.compression_algorithm.to_wire());
        buf.write_bool(self.client_throttle);
        buf.put_u8(self.client_throttle_threshold);
        buf.put_f32_le(self.client_throttle_scalar);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            compression_threshold: buf.read_u16_le()?,
            compression_algorithm: CompressionAlgorithm::from_wire(buf.read_u16_le()?)?,
            client_throttle: buf.read_bool()?,
            client_throttle_threshold: buf.read_u8()?,
            client_throttle_scalar: buf.read_f32_le()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// The client's login: protocol version, the identity chain (a JSON
/// document holding a `chain` array of JWS tokens), and the signed skin
/// token.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub protocol_version: i32,
    pub chain_data: String,
    pub skin_data: String,
}

impl Packet for Login {
    const ID: u32 = id::LOGIN;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i32(self.protocol_version);
        let mut payload = BytesMut::with_capacity(8 + self.chain_data.len() + self.skin_data.len());
        payload.write_long_string_le(&self.chain_data);
        payload.write_long_string_le(&self.skin_data);
        buf.write_var_u32(payload.len() as u32);
        buf.put_slice(&payload);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let protocol_version = buf.read_i32_be()?;
        let len = buf.read_var_u32()? as usize;
        buf.need(len, "login payload")?;
        let mut payload = buf.split_to(len);
        Ok(Self {
            protocol_version,
            chain_data: payload.read_long_string_le()?,
            skin_data: payload.read_long_string_le()?,
        })
    }
}

// Token material stays out of Debug output.
impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("protocol_version", &self.protocol_version)
            .field("chain_data", &format_args!("<{} bytes>", self.chain_data.len()))
            .field("skin_data", &format_args!("<{} bytes>", self.skin_data.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatusKind {
    LoginSuccess,
    /// The client is older than the server.
    LoginFailedClient,
    /// The server is older than the client.
    LoginFailedServer,
    PlayerSpawn,
    LoginFailedInvalidTenant,
    LoginFailedVanillaEdu,
    LoginFailedEduVanilla,
    LoginFailedServerFull,
}

impl PlayStatusKind {
    fn to_wire(self) -> i32 {
        match self {
            Self::LoginSuccess => 0,
            Self::LoginFailedClient => 1,
            Self::LoginFailedServer => 2,
            Self::PlayerSpawn => 3,
            Self::LoginFailedInvalidTenant => 4,
            Self::LoginFailedVanillaEdu => 5,
            Self::LoginFailedEduVanilla => 6,
            Self::LoginFailedServerFull => 7,
        }
    }

    fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Self::LoginSuccess,
            1 => Self::LoginFailedClient,
            2 => Self::LoginFailedServer,
            3 => Self::PlayerSpawn,
            4 => Self::LoginFailedInvalidTenant,
            5 => Self::LoginFailedVanillaEdu,
            6 => Self::LoginFailedEduVanilla,
            7 => Self::LoginFailedServerFull,
            other => {
                return Err(ProtocolError::UnknownValue {
                    field: "play status",
                    value: i64::from(other),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayStatus {
    pub status: PlayStatusKind,
}

impl Packet for PlayStatus {
    const ID: u32 = id::PLAY_STATUS;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i32(self.status.to_wire());
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { status: PlayStatusKind::from_wire(buf.read_i32_be()?)? })
    }
}

/// Ends the session with a message the client shows on its disconnect
/// screen. `message` is usually a translation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub hide_disconnect_screen: bool,
    pub message: String,
}

impl Disconnect {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self { hide_disconnect_screen: false, message: message.into() }
    }
}

impl Packet for Disconnect {
    const ID: u32 = id::DISCONNECT;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_bool(self.hide_disconnect_screen);
        if !self.hide_disconnect_screen {
            buf.write_string(&self.message);
        }
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let hide_disconnect_screen = buf.read_bool()?;
        let message = if hide_disconnect_screen { String::new() } else { buf.read_string()? };
        Ok(Self { hide_disconnect_screen, message })
    }
}

// ---------------------------------------------------------------------------
// Resource packs
// ---------------------------------------------------------------------------

/// Lists the packs the server offers. The proxy always offers none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePacksInfo {
    pub must_accept: bool,
    pub has_scripts: bool,
    pub force_server_packs: bool,
}

impl Packet for ResourcePacksInfo {
    const ID: u32 = id::RESOURCE_PACKS_INFO;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_bool(self.must_accept);
        buf.write_bool(self.has_scripts);
        buf.write_bool(self.force_server_packs);
        buf.put_u16_le(0); // behaviour packs
        buf.put_u16_le(0); // resource packs
        buf.write_var_u32(0); // CDN urls
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let info = Self {
            must_accept: buf.read_bool()?,
            has_scripts: buf.read_bool()?,
            force_server_packs: buf.read_bool()?,
        };
        let behaviour = buf.read_u16_le()?;
        let resource = buf.read_u16_le()?;
        if behaviour != 0 || resource != 0 {
            return Err(ProtocolError::UnknownValue {
                field: "resource pack entry count",
                value: i64::from(behaviour) + i64::from(resource),
            });
        }
        Ok(info)
    }
}

/// The pack stack to apply. The proxy always sends an empty stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePackStack {
    pub must_accept: bool,
    pub game_version: String,
    pub experiments_previously_toggled: bool,
}

impl Default for ResourcePackStack {
    fn default() -> Self {
        Self {
            must_accept: false,
            game_version: "*".into(),
            experiments_previously_toggled: false,
        }
    }
}

impl Packet for ResourcePackStack {
    const ID: u32 = id::RESOURCE_PACK_STACK;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_bool(self.must_accept);
        buf.write_var_u32(0); // behaviour packs
        buf.write_var_u32(0); // resource packs
        buf.write_string(&self.game_version);
        buf.put_u32_le(0); // experiments
        buf.write_bool(self.experiments_previously_toggled);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let must_accept = buf.read_bool()?;
        let behaviour = buf.read_var_u32()?;
        let resource = buf.read_var_u32()?;
        if behaviour != 0 || resource != 0 {
            return Err(ProtocolError::UnknownValue {
                field: "resource pack stack size",
                value: i64::from(behaviour) + i64::from(resource),
            });
        }
        let game_version = buf.read_string()?;
        let experiments = buf.read_u32_le()?;
        if experiments != 0 {
            return Err(ProtocolError::UnknownValue {
                field: "experiment count",
                value: i64::from(experiments),
            });
        }
        Ok(Self {
            must_accept,
            game_version,
            experiments_previously_toggled: buf.read_bool()?,
        })
    }
}

/// The client's answer to the resource pack offer.
///
/// Decoding never fails: bytes outside the known range come back as
/// [`Unknown`](Self::Unknown) so the caller decides what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePackStatus {
    None,
    Refused,
    SendPacks,
    HaveAllPacks,
    Completed,
    Unknown(u8),
}

impl ResourcePackStatus {
    fn to_wire(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Refused => 1,
            Self::SendPacks => 2,
            Self::HaveAllPacks => 3,
            Self::Completed => 4,
            Self::Unknown(value) => value,
        }
    }

    fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Refused,
            2 => Self::SendPacks,
            3 => Self::HaveAllPacks,
            4 => Self::Completed,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePackClientResponse {
    pub status: ResourcePackStatus,
    pub pack_ids: Vec<String>,
}

impl ResourcePackClientResponse {
    pub fn new(status: ResourcePackStatus) -> Self {
        Self { status, pack_ids: Vec::new() }
    }
}

impl Packet for ResourcePackClientResponse {
    const ID: u32 = id::RESOURCE_PACK_CLIENT_RESPONSE;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u8(self.status.to_wire());
        buf.put_u16_le(self.pack_ids.len() as u16);
        for pack in &self.pack_ids {
            buf.write_string(pack);
        }
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let status = ResourcePackStatus::from_wire(buf.read_u8()?);
        let count = buf.read_u16_le()?;
        let pack_ids = (0..count)
            .map(|_| buf.read_string())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { status, pack_ids })
    }
}

// ---------------------------------------------------------------------------
// World entry and handoff
// ---------------------------------------------------------------------------

/// Opens the world on the client.
///
/// The fields the proxy chooses are modelled. Everything else in the
/// protocol 582 layout (the rest of the level settings, movement settings,
/// palettes and the trailing flags) is written with fixed defaults: no
/// game rules, experiments, custom blocks or items. Decoding reads past
/// those fields and ignores whatever follows the world name.
#[derive(Debug, Clone, PartialEq)]
pub struct StartGame {
    pub entity_id: i64,
    pub runtime_entity_id: u64,
    pub player_game_mode: i32,
    pub position: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
    pub seed: u64,
    pub dimension: i32,
    pub generator: i32,
    pub world_game_mode: i32,
    pub difficulty: i32,
    pub spawn_block: [i32; 3],
    pub level_id: String,
    pub world_name: String,
    /// Also sent as the level's vanilla version.
    pub game_version: String,
}

/// Broadcast to Xbox Live and platform friends as a public game.
const PUBLISH_PUBLIC: i32 = 4;
/// Member permission for players without an explicit level.
const PERMISSION_MEMBER: i32 = 1;
const SERVER_CHUNK_TICK_RADIUS: i32 = 4;
const LIMITED_WORLD_SIZE: i32 = 16;
/// Empty compound in network NBT: tag, zero-length name, end.
const EMPTY_NBT_COMPOUND: [u8; 3] = [0x0a, 0x00, 0x00];

impl StartGame {
    fn encode_level_settings(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.seed);
        buf.put_i16_le(0); // spawn biome type: default
        buf.write_string(""); // user defined biome
        buf.write_var_i32(self.dimension);
        buf.write_var_i32(self.generator);
        buf.write_var_i32(self.world_game_mode);
        buf.write_var_i32(self.difficulty);
        let [x, y, z] = self.spawn_block;
        buf.write_var_i32(x);
        buf.write_var_u32(y as u32);
        buf.write_var_i32(z);
        buf.write_bool(true); // achievements disabled
        buf.write_bool(false); // editor world
        buf.write_bool(false); // created in editor
        buf.write_bool(false); // exported from editor
        buf.write_var_i32(0); // day cycle stop time
        buf.write_var_i32(0); // education offer
        buf.write_bool(false); // education features
        buf.write_string(""); // education product id
        buf.put_f32_le(0.0); // rain level
        buf.put_f32_le(0.0); // lightning level
        buf.write_bool(false); // platform locked content confirmed
        buf.write_bool(true); // multiplayer game
        buf.write_bool(true); // LAN broadcast
        buf.write_var_i32(PUBLISH_PUBLIC); // Xbox Live broadcast
        buf.write_var_i32(PUBLISH_PUBLIC); // platform broadcast
        buf.write_bool(true); // commands enabled
        buf.write_bool(false); // texture packs required
        buf.write_var_u32(0); // game rules
        buf.put_u32_le(0); // experiments
        buf.write_bool(false); // experiments previously toggled
        buf.write_bool(false); // bonus chest
        buf.write_bool(false); // start with map
        buf.write_var_i32(PERMISSION_MEMBER);
        buf.put_i32_le(SERVER_CHUNK_TICK_RADIUS);
        buf.write_bool(false); // locked behaviour pack
        buf.write_bool(false); // locked resource pack
        buf.write_bool(false); // from locked world template
        buf.write_bool(false); // MSA gamertags only
        buf.write_bool(false); // from world template
        buf.write_bool(false); // world template option locked
        buf.write_bool(false); // only spawn v1 villagers
        buf.write_bool(false); // persona disabled
        buf.write_bool(false); // custom skins disabled
        buf.write_string(&self.game_version); // vanilla version
        buf.put_i32_le(LIMITED_WORLD_SIZE); // width
        buf.put_i32_le(LIMITED_WORLD_SIZE); // length
        buf.write_bool(true); // new nether
        buf.write_string(""); // education shared resource button
        buf.write_string(""); // education shared resource link
        buf.write_bool(false); // experimental gameplay override
        buf.put_u8(0); // chat restriction level
        buf.write_bool(false); // player interactions disabled
    }

    fn encode_trailer(buf: &mut BytesMut) {
        buf.write_string(""); // premium world template
        buf.write_bool(false); // trial
        buf.write_var_i32(0); // movement: client authoritative
        buf.write_var_i32(0); // rewind history size
        buf.write_bool(false); // server authoritative block breaking
        buf.put_u64_le(0); // current tick
        buf.write_var_i32(0); // enchantment seed
        buf.write_var_u32(0); // block properties
        buf.write_var_u32(0); // item table
        buf.write_string(""); // multiplayer correlation id
        buf.write_bool(false); // server authoritative inventory
        buf.write_string(""); // server engine
        buf.put_slice(&EMPTY_NBT_COMPOUND); // player property data
        buf.put_u64_le(0); // block registry checksum
        buf.put_slice(&[0; 16]); // world template id
        buf.write_bool(false); // client side generation
        buf.write_bool(false); // block network ids are hashes
    }
}

/// Reads a game rule list without keeping it.
fn skip_game_rules(buf: &mut Bytes) -> Result<(), ProtocolError> {
    for _ in 0..buf.read_var_u32()? {
        buf.read_string()?;
        buf.read_bool()?; // editable
        match buf.read_var_u32()? {
            1 => {
                buf.read_bool()?;
            }
            2 => {
                buf.read_var_u32()?;
            }
            3 => {
                buf.read_f32_le()?;
            }
            other => {
                return Err(ProtocolError::UnknownValue {
                    field: "game rule type",
                    value: i64::from(other),
                })
            }
        }
    }
    Ok(())
}

/// Reads an experiment list and its trailing flag without keeping them.
fn skip_experiments(buf: &mut Bytes) -> Result<(), ProtocolError> {
    for _ in 0..buf.read_u32_le()? {
        buf.read_string()?;
        buf.read_bool()?;
    }
    buf.read_bool()?;
    Ok(())
}

fn skip_bools(buf: &mut Bytes, n: usize) -> Result<(), ProtocolError> {
    for _ in 0..n {
        buf.read_bool()?;
    }
    Ok(())
}

impl Packet for StartGame {
    const ID: u32 = id::START_GAME;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_var_i64(self.entity_id);
        buf.write_var_u64(self.runtime_entity_id);
        buf.write_var_i32(self.player_game_mode);
        for axis in self.position {
            buf.put_f32_le(axis);
        }
        buf.put_f32_le(self.pitch);
        buf.put_f32_le(self.yaw);
        self.encode_level_settings(buf);
        buf.write_string(&self.level_id);
        buf.write_string(&self.world_name);
        Self::encode_trailer(buf);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let entity_id = buf.read_var_i64()?;
        let runtime_entity_id = buf.read_var_u64()?;
        let player_game_mode = buf.read_var_i32()?;
        let position = [buf.read_f32_le()?, buf.read_f32_le()?, buf.read_f32_le()?];
        let pitch = buf.read_f32_le()?;
        let yaw = buf.read_f32_le()?;

        let seed = buf.read_u64_le()?;
        buf.read_u16_le()?; // spawn biome type
        buf.read_string()?;
        let dimension = buf.read_var_i32()?;
        let generator = buf.read_var_i32()?;
        let world_game_mode = buf.read_var_i32()?;
        let difficulty = buf.read_var_i32()?;
        let spawn_block = [buf.read_var_i32()?, buf.read_var_u32()? as i32, buf.read_var_i32()?];
        skip_bools(buf, 4)?;
        buf.read_var_i32()?; // day cycle stop time
        buf.read_var_i32()?; // education offer
        buf.read_bool()?;
        buf.read_string()?;
        buf.read_f32_le()?;
        buf.read_f32_le()?;
        skip_bools(buf, 3)?;
        buf.read_var_i32()?;
        buf.read_var_i32()?;
        skip_bools(buf, 2)?;
        skip_game_rules(buf)?;
        skip_experiments(buf)?;
        skip_bools(buf, 2)?;
        buf.read_var_i32()?; // default permission
        buf.read_i32_le()?; // server chunk tick radius
        skip_bools(buf, 9)?;
        let game_version = buf.read_string()?;
        buf.read_i32_le()?;
        buf.read_i32_le()?;
        buf.read_bool()?; // new nether
        buf.read_string()?;
        buf.read_string()?;
        if buf.read_bool()? {
            buf.read_bool()?; // experimental gameplay override value
        }
        buf.read_u8()?; // chat restriction level
        buf.read_bool()?;

        Ok(Self {
            entity_id,
            runtime_entity_id,
            player_game_mode,
            position,
            pitch,
            yaw,
            seed,
            dimension,
            generator,
            world_game_mode,
            difficulty,
            spawn_block,
            level_id: buf.read_string()?,
            world_name: buf.read_string()?,
            game_version,
        })
    }
}

/// Tells the client to reconnect to another server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub address: String,
    pub port: u16,
}

impl Packet for Transfer {
    const ID: u32 = id::TRANSFER;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_string(&self.address);
        buf.put_u16_le(self.port);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { address: buf.read_string()?, port: buf.read_u16_le()? })
    }
}

/// Sent by the client once its local player has spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLocalPlayerAsInitialized {
    pub runtime_entity_id: u64,
}

impl Packet for SetLocalPlayerAsInitialized {
    const ID: u32 = id::SET_LOCAL_PLAYER_AS_INITIALIZED;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.write_var_u64(self.runtime_entity_id);
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { runtime_entity_id: buf.read_var_u64()? })
    }
}

// =========================================================================
// Tests
// =========================================================================
