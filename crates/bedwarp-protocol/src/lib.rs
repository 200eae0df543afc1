//! Bedrock wire protocol for bedwarp.
//!
//! - **Packets** ([`packets`]): the login and resource-pack packets the
//!   proxy handles, each a struct implementing [`Packet`].
//! - **Messages** ([`InboundPacket`], [`OutboundPacket`]): the two
//!   directions, as enums the connection handler matches on.
//! - **Batches** ([`encode_batch`], [`decode_batch`]): how packets are
//!   grouped and compressed inside one game payload.
//! - **Codec** ([`ProtocolCodec`]): the protocol version the listener
//!   speaks.
//!
//! ```text
//! Transport (game payload) → batch (packets) → InboundPacket → handler
//! ```
//!
//! This crate does no I/O and knows nothing about connections or players.

mod batch;
mod codec;
mod error;
mod message;
pub mod packets;
pub mod wire;

pub use batch::{decode_batch, encode_batch, Compression, MAX_BATCH_SIZE};
pub use codec::ProtocolCodec;
pub use error::ProtocolError;
pub use message::{InboundPacket, OutboundPacket, Summary, Visibility};
pub use packets::{decode_packet, encode_packet, Packet};
