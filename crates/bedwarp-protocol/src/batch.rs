//! Batches: the unit a game payload carries.
//!
//! A batch is a run of `var-int length + packet` entries, raw-deflated
//! once compression has been negotiated. The transport adds and strips the
//! leading `0xfe` game-packet byte, so nothing here sees it.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::wire::{ReadExt, WriteExt};
use crate::ProtocolError;

/// Upper bound on a decompressed batch.
pub const MAX_BATCH_SIZE: usize = 8 * 1024 * 1024;

/// Batch compression state for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Before network settings have been exchanged.
    #[default]
    None,
    /// Raw deflate at the given level (0-9).
    Deflate { level: u32 },
}

impl Compression {
    pub fn deflate() -> Self {
        Self::Deflate { level: 6 }
    }

    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Joins packets into one batch payload.
pub fn encode_batch<I>(packets: I, compression: Compression) -> Result<Vec<u8>, ProtocolError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut plain = BytesMut::new();
    for packet in packets {
        let packet = packet.as_ref();
        plain.write_var_u32(packet.len() as u32);
        plain.extend_from_slice(packet);
    }

    match compression {
        Compression::None => Ok(plain.to_vec()),
        Compression::Deflate { level } => {
            let mut encoder = DeflateEncoder::new(
                Vec::with_capacity(plain.len() / 2),
                flate2::Compression::new(level),
            );
            encoder.write_all(&plain).map_err(ProtocolError::Compression)?;
            encoder.finish().map_err(ProtocolError::Compression)
        }
    }
}

/// Splits a batch payload into its packets.
pub fn decode_batch(payload: &[u8], compression: Compression) -> Result<Vec<Bytes>, ProtocolError> {
    let mut plain = match compression {
        Compression::None => {
            if payload.len() > MAX_BATCH_SIZE {
                return Err(ProtocolError::BatchTooLarge {
                    size: payload.len(),
                    limit: MAX_BATCH_SIZE,
                });
            }
            Bytes::copy_from_slice(payload)
        }
        Compression::Deflate { .. } => inflate(payload)?,
    };

    let mut packets = Vec::new();
    while !plain.is_empty() {
        let len = plain.read_var_u32()? as usize;
        plain.need(len, "batched packet")?;
        packets.push(plain.split_to(len));
    }
    Ok(packets)
}

fn inflate(payload: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut out = Vec::with_capacity(payload.len() * 2);
    // One byte over the limit tells an exact fit from an overflow.
    DeflateDecoder::new(payload)
        .take(MAX_BATCH_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    if out.len() > MAX_BATCH_SIZE {
        return Err(ProtocolError::BatchTooLarge { size: out.len(), limit: MAX_BATCH_SIZE });
    }
    Ok(Bytes::from(out))
}
