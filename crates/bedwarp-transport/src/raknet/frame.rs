//! Connected-datagram framing: frame sets, ACK records, split reassembly,
//! and ordering channels.

use std::collections::{BTreeMap, HashMap, HashSet};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::TransportError;

/// First datagram id used for frame sets.
pub const FRAME_SET_MIN: u8 = 0x80;
/// Last datagram id used for frame sets.
pub const FRAME_SET_MAX: u8 = 0x8d;
/// Positive acknowledgement datagram.
pub const ACK: u8 = 0xc0;
/// Negative acknowledgement datagram.
pub const NACK: u8 = 0xa0;

const SPLIT_FLAG: u8 = 0x10;
const MAX_SPLIT_COUNT: u32 = 512;
const MAX_PENDING_SPLITS: usize = 32;
const MAX_HELD_ORDERED: usize = 512;
const MAX_RELIABLE_WINDOW: u32 = 2048;
const ORDER_CHANNELS: usize = 32;
const U24_MASK: u32 = 0x00ff_ffff;

/// Delivery guarantee carried in each frame's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Unreliable,
    UnreliableSequenced,
    Reliable,
    ReliableOrdered,
    ReliableSequenced,
    UnreliableWithAck,
    ReliableWithAck,
    ReliableOrderedWithAck,
}

impl Reliability {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => Self::Unreliable,
            1 => Self::UnreliableSequenced,
            2 => Self::Reliable,
            3 => Self::ReliableOrdered,
            4 => Self::ReliableSequenced,
            5 => Self::UnreliableWithAck,
            6 => Self::ReliableWithAck,
            7 => Self::ReliableOrderedWithAck,
            _ => return None,
        })
    }

    fn bits(self) -> u8 {
        match self {
            Self::Unreliable => 0,
            Self::UnreliableSequenced => 1,
            Self::Reliable => 2,
            Self::ReliableOrdered => 3,
            Self::ReliableSequenced => 4,
            Self::UnreliableWithAck => 5,
            Self::ReliableWithAck => 6,
            Self::ReliableOrderedWithAck => 7,
        }
    }

    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::Reliable
                | Self::ReliableOrdered
                | Self::ReliableSequenced
                | Self::ReliableWithAck
                | Self::ReliableOrderedWithAck
        )
    }

    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::UnreliableSequenced | Self::ReliableSequenced)
    }

    /// Sequenced reliabilities also carry an order index and channel.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::UnreliableSequenced
                | Self::ReliableOrdered
                | Self::ReliableSequenced
                | Self::ReliableOrderedWithAck
        )
    }
}

/// Fragment header of a split frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub count: u32,
    pub id: u16,
    pub index: u32,
}

/// One frame inside a frame set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub reliability: Reliability,
    pub reliable_index: u32,
    pub sequence_index: u32,
    pub order_index: u32,
    pub order_channel: u8,
    pub split: Option<SplitInfo>,
    pub body: Bytes,
}

impl Frame {
    /// An unsplit frame with zeroed indices; the sender fills them in.
    pub fn new(reliability: Reliability, body: Bytes) -> Self {
        Self {
            reliability,
            reliable_index: 0,
            sequence_index: 0,
            order_index: 0,
            order_channel: 0,
            split: None,
            body,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut flags = self.reliability.bits() << 5;
        if self.split.is_some() {
            flags |= SPLIT_FLAG;
        }
        buf.put_u8(flags);
        buf.put_u16((self.body.len() * 8) as u16);
        if self.reliability.is_reliable() {
            put_u24_le(buf, self.reliable_index);
        }
        if self.reliability.is_sequenced() {
            put_u24_le(buf, self.sequence_index);
        }
        if self.reliability.is_ordered() {
            put_u24_le(buf, self.order_index);
            buf.put_u8(self.order_channel);
        }
        if let Some(split) = self.split {
            buf.put_u32(split.count);
            buf.put_u16(split.id);
            buf.put_u32(split.index);
        }
        buf.put_slice(&self.body);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, TransportError> {
        need(buf, 3, "frame header")?;
        let flags = buf.get_u8();
        let reliability = Reliability::from_bits(flags >> 5)
            .ok_or_else(|| TransportError::malformed("unknown reliability"))?;
        let bit_len = buf.get_u16() as usize;
        let len = bit_len.div_ceil(8);

        let mut frame = Frame::new(reliability, Bytes::new());
        if reliability.is_reliable() {
            frame.reliable_index = get_u24_le(buf)?;
        }
        if reliability.is_sequenced() {
            frame.sequence_index = get_u24_le(buf)?;
        }
        if reliability.is_ordered() {
            frame.order_index = get_u24_le(buf)?;
            need(buf, 1, "order channel")?;
            frame.order_channel = buf.get_u8();
        }
        if flags & SPLIT_FLAG != 0 {
            need(buf, 10, "split header")?;
            frame.split = Some(SplitInfo {
                count: buf.get_u32(),
                id: buf.get_u16(),
                index: buf.get_u32(),
            });
        }
        need(buf, len, "frame body")?;
        frame.body = buf.split_to(len);
        Ok(frame)
    }
}

/// A connected datagram carrying one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    pub sequence: u32,
    pub frames: Vec<Frame>,
}

impl FrameSet {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            4 + self.frames.iter().map(|f| f.body.len() + 23).sum::<usize>(),
        );
        buf.put_u8(FRAME_SET_MIN | 0x04);
        put_u24_le(&mut buf, self.sequence);
        for frame in &self.frames {
            frame.encode(&mut buf);
        }
        buf.freeze()
    }

    pub fn decode(mut datagram: Bytes) -> Result<Self, TransportError> {
        need(&datagram, 1, "frame set id")?;
        let id = datagram.get_u8();
        if !(FRAME_SET_MIN..=FRAME_SET_MAX).contains(&id) {
            return Err(TransportError::malformed(format!(
                "0x{id:02x} is not a frame set"
            )));
        }
        let sequence = get_u24_le(&mut datagram)?;
        let mut frames = Vec::new();
        while datagram.has_remaining() {
            frames.push(Frame::decode(&mut datagram)?);
        }
        Ok(Self { sequence, frames })
    }
}

/// Encodes an ACK datagram for the given datagram sequence numbers,
/// collapsing consecutive numbers into ranges.
pub fn encode_ack(sequences: &[u32]) -> Bytes {
    let mut sorted = sequences.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for seq in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == seq => *end = seq,
            _ => ranges.push((seq, seq)),
        }
    }

    let mut buf = BytesMut::with_capacity(3 + ranges.len() * 7);
    buf.put_u8(ACK);
    buf.put_u16(ranges.len() as u16);
    for (start, end) in ranges {
        if start == end {
            buf.put_u8(1);
            put_u24_le(&mut buf, start);
        } else {
            buf.put_u8(0);
            put_u24_le(&mut buf, start);
            put_u24_le(&mut buf, end);
        }
    }
    buf.freeze()
}

/// Splits `body` into chunks of at most `max` bytes.
pub fn split_body(body: &Bytes, max: usize) -> Vec<Bytes> {
    let mut parts = Vec::with_capacity(body.len().div_ceil(max));
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + max).min(body.len());
        parts.push(body.slice(offset..end));
        offset = end;
    }
    parts
}

/// Reassembles split frames keyed by split id.
#[derive(Debug, Default)]
pub struct SplitAssembler {
    pending: HashMap<u16, PendingSplit>,
}

#[derive(Debug)]
struct PendingSplit {
    received: u32,
    parts: Vec<Option<Bytes>>,
}

impl SplitAssembler {
    /// Stores one fragment. Returns the whole body once every fragment of
    /// its split id has arrived.
    pub fn insert(
        &mut self,
        split: SplitInfo,
        body: Bytes,
    ) -> Result<Option<Bytes>, TransportError> {
        if split.count == 0 || split.count > MAX_SPLIT_COUNT {
            return Err(TransportError::malformed(format!(
                "split count {} out of range",
                split.count
            )));
        }
        if split.index >= split.count {
            return Err(TransportError::malformed("split index beyond count"));
        }
        if !self.pending.contains_key(&split.id)
            && self.pending.len() >= MAX_PENDING_SPLITS
        {
            return Err(TransportError::malformed("too many pending splits"));
        }

        let entry = self.pending.entry(split.id).or_insert_with(|| PendingSplit {
            received: 0,
            parts: vec![None; split.count as usize],
        });
        if entry.parts.len() != split.count as usize {
            return Err(TransportError::malformed("split count changed mid-stream"));
        }

        let slot = &mut entry.parts[split.index as usize];
        if slot.is_none() {
            *slot = Some(body);
            entry.received += 1;
        }
        if entry.received < split.count {
            return Ok(None);
        }

        let Some(done) = self.pending.remove(&split.id) else {
            return Ok(None);
        };
        let mut whole = BytesMut::new();
        for part in done.parts.into_iter().flatten() {
            whole.put_slice(&part);
        }
        Ok(Some(whole.freeze()))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Tracks which reliable indices have arrived so retransmissions are
/// dropped before they reach reassembly.
///
/// `base` is the lowest index not yet seen; everything below it has been
/// received. Indices above it that arrived early wait in `seen`.
#[derive(Debug, Default)]
pub struct ReliableWindow {
    base: u32,
    seen: HashSet<u32>,
}

impl ReliableWindow {
    /// Records `index`. Returns `false` for a duplicate.
    pub fn insert(&mut self, index: u32) -> Result<bool, TransportError> {
        let offset = index.wrapping_sub(self.base) & U24_MASK;
        if offset > U24_MASK / 2 {
            return Ok(false);
        }
        if offset >= MAX_RELIABLE_WINDOW {
            return Err(TransportError::malformed("reliable index beyond window"));
        }
        if !self.seen.insert(index) {
            return Ok(false);
        }
        while self.seen.remove(&self.base) {
            self.base = (self.base + 1) & U24_MASK;
        }
        Ok(true)
    }
}

/// Releases ordered frames to the application in order-index sequence.
#[derive(Debug)]
pub struct OrderingChannels {
    expected: [u32; ORDER_CHANNELS],
    held: Vec<BTreeMap<u32, Bytes>>,
}

impl Default for OrderingChannels {
    fn default() -> Self {
        Self {
            expected: [0; ORDER_CHANNELS],
            held: (0..ORDER_CHANNELS).map(|_| BTreeMap::new()).collect(),
        }
    }
}

impl OrderingChannels {
    /// Accepts one ordered body and returns every body that is now
    /// deliverable on that channel. Stale indices are dropped.
    pub fn push(
        &mut self,
        channel: u8,
        index: u32,
        body: Bytes,
    ) -> Result<Vec<Bytes>, TransportError> {
        let ch = channel as usize;
        if ch >= ORDER_CHANNELS {
            return Err(TransportError::malformed("order channel out of range"));
        }
        let expected = self.expected[ch];
        if index.wrapping_sub(expected) & U24_MASK > U24_MASK / 2 {
            return Ok(Vec::new());
        }
        if index != expected {
            if self.held[ch].len() >= MAX_HELD_ORDERED {
                return Err(TransportError::malformed("ordering window overflow"));
            }
            self.held[ch].insert(index, body);
            return Ok(Vec::new());
        }

        let mut ready = vec![body];
        let mut next = (expected + 1) & U24_MASK;
        while let Some(held) = self.held[ch].remove(&next) {
            ready.push(held);
            next = (next + 1) & U24_MASK;
        }
        self.expected[ch] = next;
        Ok(ready)
    }
}

/// Sender-side counters for one peer. Turns message bodies into encoded
/// frame-set datagrams, splitting them to fit the MTU.
#[derive(Debug, Default)]
pub struct Framer {
    datagram_seq: u32,
    reliable_index: u32,
    order_index: u32,
    split_id: u16,
}

impl Framer {
    /// Frame and encode `body`. Every returned datagram carries one frame;
    /// split parts share the body's order index.
    pub fn frame(&mut self, body: Bytes, reliability: Reliability, max_payload: usize) -> Vec<Bytes> {
        let max_payload = max_payload.max(1);
        let order_index = if reliability.is_ordered() {
            next_u24(&mut self.order_index)
        } else {
            0
        };

        let parts = if body.len() > max_payload {
            split_body(&body, max_payload)
        } else {
            vec![body]
        };
        let split_id = if parts.len() > 1 {
            let id = self.split_id;
            self.split_id = self.split_id.wrapping_add(1);
            Some(id)
        } else {
            None
        };

        let count = parts.len() as u32;
        parts
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let reliable_index = if reliability.is_reliable() {
                    next_u24(&mut self.reliable_index)
                } else {
                    0
                };
                let frame = Frame {
                    reliable_index,
                    order_index,
                    split: split_id.map(|id| SplitInfo { count, id, index: index as u32 }),
                    ..Frame::new(reliability, part)
                };
                FrameSet {
                    sequence: next_u24(&mut self.datagram_seq),
                    frames: vec![frame],
                }
                .encode()
            })
            .collect()
    }
}

/// Receiver-side state for one peer: duplicate filtering, split
/// reassembly, then ordering.
#[derive(Debug, Default)]
pub struct Reassembler {
    reliable: ReliableWindow,
    splits: SplitAssembler,
    ordering: OrderingChannels,
}

impl Reassembler {
    /// Returns the message bodies that became deliverable with this frame
    /// set, in delivery order.
    pub fn accept(&mut self, set: FrameSet) -> Result<Vec<Bytes>, TransportError> {
        let mut ready = Vec::new();
        for frame in set.frames {
            if frame.reliability.is_reliable() && !self.reliable.insert(frame.reliable_index)? {
                continue;
            }
            let body = match frame.split {
                Some(split) => match self.splits.insert(split, frame.body)? {
                    Some(whole) => whole,
                    None => continue,
                },
                None => frame.body,
            };
            if frame.reliability.is_ordered() && !frame.reliability.is_sequenced() {
                ready.extend(self.ordering.push(frame.order_channel, frame.order_index, body)?);
            } else {
                ready.push(body);
            }
        }
        Ok(ready)
    }
}

pub(crate) fn put_u24_le(buf: &mut BytesMut, value: u32) {
    buf.put_uint_le(u64::from(value & U24_MASK), 3);
}

pub(crate) fn get_u24_le(buf: &mut Bytes) -> Result<u32, TransportError> {
    need(buf, 3, "u24")?;
    Ok(buf.get_uint_le(3) as u32)
}

pub(crate) fn next_u24(counter: &mut u32) -> u32 {
    let value = *counter;
    *counter = (*counter + 1) & U24_MASK;
    value
}

pub(crate) fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), TransportError> {
    if buf.remaining() < n {
        return Err(TransportError::malformed(format!("truncated {what}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered(body: &'static [u8], reliable: u32, order: u32) -> Frame {
        Frame {
            reliable_index: reliable,
            order_index: order,
            ..Frame::new(Reliability::ReliableOrdered, Bytes::from_static(body))
        }
    }

    #[test]
    fn test_frame_set_preserves_indices_and_split_header() {
        let mut split = ordered(b"part", 9, 4);
        split.split = Some(SplitInfo { count: 3, id: 2, index: 1 });
        let set = FrameSet {
            sequence: 0x01_0203,
            frames: vec![ordered(b"hello", 1, 0), split],
        };

        let decoded = FrameSet::decode(set.encode()).unwrap();

        assert_eq!(decoded, set);
    }

    #[test]
    fn test_frame_set_decodes_unreliable_without_indices() {
        let set = FrameSet {
            sequence: 5,
            frames: vec![Frame::new(Reliability::Unreliable, Bytes::from_static(b"x"))],
        };
        let bytes = set.encode();
        // id + u24 seq + flags + u16 length + body
        assert_eq!(bytes.len(), 1 + 3 + 1 + 2 + 1);
        assert_eq!(FrameSet::decode(bytes).unwrap(), set);
    }

    #[test]
    fn test_frame_set_rejects_truncated_body() {
        let set = FrameSet { sequence: 1, frames: vec![ordered(b"hello", 0, 0)] };
        let bytes = set.encode();
        let truncated = bytes.slice(..bytes.len() - 2);

        assert!(matches!(
            FrameSet::decode(truncated),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_frame_set_rejects_non_frame_set_id() {
        assert!(FrameSet::decode(Bytes::from_static(&[0x01, 0, 0, 0])).is_err());
    }

    #[test]
    fn test_encode_ack_collapses_ranges() {
        let ack = encode_ack(&[3, 1, 2, 7]);
        assert_eq!(
            &ack[..],
            &[ACK, 0, 2, 0, 1, 0, 0, 3, 0, 0, 1, 7, 0, 0][..]
        );
    }

    #[test]
    fn test_split_assembler_out_of_order() {
        let mut asm = SplitAssembler::default();
        let info = |index| SplitInfo { count: 3, id: 7, index };

        assert!(asm.insert(info(2), Bytes::from_static(b"c")).unwrap().is_none());
        assert!(asm.insert(info(0), Bytes::from_static(b"a")).unwrap().is_none());
        // Duplicates don't count twice.
        assert!(asm.insert(info(0), Bytes::from_static(b"a")).unwrap().is_none());
        let whole = asm.insert(info(1), Bytes::from_static(b"b")).unwrap();

        assert_eq!(whole.as_deref(), Some(&b"abc"[..]));
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn test_split_assembler_rejects_bad_index() {
        let mut asm = SplitAssembler::default();
        let result = asm.insert(SplitInfo { count: 2, id: 1, index: 2 }, Bytes::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_split_body_chunks() {
        let body = Bytes::from_static(b"abcdefg");
        let parts = split_body(&body, 3);
        assert_eq!(parts, vec![
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"def"),
            Bytes::from_static(b"g"),
        ]);
    }

    #[test]
    fn test_ordering_channels_hold_until_gap_fills() {
        let mut ch = OrderingChannels::default();

        assert!(ch.push(0, 1, Bytes::from_static(b"second")).unwrap().is_empty());
        let ready = ch.push(0, 0, Bytes::from_static(b"first")).unwrap();
        assert_eq!(ready, vec![
            Bytes::from_static(b"first"),
            Bytes::from_static(b"second"),
        ]);

        // Index 0 again is stale now.
        assert!(ch.push(0, 0, Bytes::from_static(b"dup")).unwrap().is_empty());
    }

    #[test]
    fn test_ordering_channels_are_independent() {
        let mut ch = OrderingChannels::default();
        assert_eq!(ch.push(1, 0, Bytes::from_static(b"a")).unwrap().len(), 1);
        assert!(ch.push(0, 1, Bytes::from_static(b"b")).unwrap().is_empty());
    }

    #[test]
    fn test_framer_splits_and_reassembler_rebuilds() {
        let body = Bytes::from((0..=255u8).cycle().take(1000).collect::<Vec<_>>());
        let mut framer = Framer::default();
        let datagrams = framer.frame(body.clone(), Reliability::ReliableOrdered, 300);
        assert_eq!(datagrams.len(), 4);

        let mut rx = Reassembler::default();
        let mut out = Vec::new();
        // Deliver in reverse to exercise reassembly.
        for datagram in datagrams.into_iter().rev() {
            out.extend(rx.accept(FrameSet::decode(datagram).unwrap()).unwrap());
        }
        assert_eq!(out, vec![body]);
    }

    #[test]
    fn test_reliable_window_drops_duplicates() {
        let mut window = ReliableWindow::default();

        assert!(window.insert(1).unwrap());
        assert!(!window.insert(1).unwrap());
        assert!(window.insert(0).unwrap());
        // Both are below the base now.
        assert!(!window.insert(0).unwrap());
        assert!(!window.insert(1).unwrap());
        assert!(window.insert(2).unwrap());
        assert!(window.seen.is_empty());
    }

    #[test]
    fn test_reliable_window_rejects_far_ahead_index() {
        let mut window = ReliableWindow::default();
        assert!(window.insert(MAX_RELIABLE_WINDOW).is_err());
    }

    #[test]
    fn test_reliable_window_wraps_at_u24() {
        let mut window = ReliableWindow { base: U24_MASK, seen: HashSet::new() };
        assert!(window.insert(U24_MASK).unwrap());
        assert_eq!(window.base, 0);
        assert!(window.insert(0).unwrap());
        assert!(!window.insert(U24_MASK).unwrap());
    }

    #[test]
    fn test_resent_fragments_of_completed_splits_are_dropped() {
        let mut framer = Framer::default();
        let mut rx = Reassembler::default();
        let body = Bytes::from_static(b"twenty bytes of body");

        let mut first_parts = Vec::new();
        for _ in 0..MAX_PENDING_SPLITS {
            let datagrams = framer.frame(body.clone(), Reliability::ReliableOrdered, 10);
            assert_eq!(datagrams.len(), 2);
            first_parts.push(datagrams[0].clone());
            for datagram in datagrams {
                rx.accept(FrameSet::decode(datagram).unwrap()).unwrap();
            }
        }

        // Lost ACKs make the peer send the first fragment of each again.
        for datagram in first_parts {
            assert!(rx.accept(FrameSet::decode(datagram).unwrap()).unwrap().is_empty());
        }
        assert_eq!(rx.splits.pending(), 0);

        let mut out = Vec::new();
        for datagram in framer.frame(body.clone(), Reliability::ReliableOrdered, 10) {
            out.extend(rx.accept(FrameSet::decode(datagram).unwrap()).unwrap());
        }
        assert_eq!(out, vec![body]);
    }

    #[test]
    fn test_framer_orders_consecutive_messages() {
        let mut framer = Framer::default();
        let first = framer.frame(Bytes::from_static(b"one"), Reliability::ReliableOrdered, 100);
        let second = framer.frame(Bytes::from_static(b"two"), Reliability::ReliableOrdered, 100);

        let mut rx = Reassembler::default();
        let held = rx.accept(FrameSet::decode(second[0].clone()).unwrap()).unwrap();
        assert!(held.is_empty());
        let out = rx.accept(FrameSet::decode(first[0].clone()).unwrap()).unwrap();
        assert_eq!(out, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }
}
