//! VRT IF packet header packing and unpacking
//!
//! ## Header word 0
//!
//! ```text
//! Bits    Field
//! ------  -----
//! 31:28   packet type (0x0 data, 0x1 data + SID, 0x2 ext, 0x3 ext + SID,
//!         0x4 context)
//! 27      class ID present
//! 26      trailer present
//! 25      start of burst
//! 24      end of burst
//! 23:22   integer timestamp (TSI) present
//! 21:20   fractional timestamp (TSF) present
//! 19:16   packet count, modulo 16
//! 15:0    packet size in 32-bit words, header and trailer included
//! ```
//!
//! Optional words follow in order: stream ID, class ID (2 words), TSI,
//! TSF (2 words, upper first). Then the payload and an optional trailer
//! word. Every word is in the byte order of the link.

use crate::convert::ByteOrder;
use crate::error::FramingError;

/// Largest header: word 0, SID, 2 x CID, TSI, 2 x TSF
pub const MAX_IF_HDR_WORDS32: usize = 7;

const FLAG_CID: u32 = 1 << 27;
const FLAG_TLR: u32 = 1 << 26;
const FLAG_SOB: u32 = 1 << 25;
const FLAG_EOB: u32 = 1 << 24;
const TSI_SHIFT: u32 = 22;
const TSF_SHIFT: u32 = 20;

/// Packet classes carried on a streaming link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketType {
    /// IF data (samples)
    #[default]
    Data,
    /// Extension data
    Extension,
    /// IF context (error reports, async messages)
    Context,
}

/// Parsed or to-be-packed header fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IfPacketInfo {
    pub packet_type: PacketType,

    /// Payload length in words; input to `pack`, output of `unpack`
    pub num_payload_words32: usize,
    /// Payload length in bytes; output of `unpack`
    pub num_payload_bytes: usize,
    /// Header length in words; output of both directions
    pub num_header_words32: usize,
    /// Whole packet length in words; output of both directions
    pub num_packet_words32: usize,

    pub packet_count: u8,
    pub sob: bool,
    pub eob: bool,

    pub has_sid: bool,
    pub sid: u32,
    pub has_cid: bool,
    pub cid: u64,
    pub has_tsi: bool,
    pub tsi: u32,
    pub has_tsf: bool,
    pub tsf: u64,
    pub has_tlr: bool,
    pub tlr: u32,
}

impl IfPacketInfo {
    /// Data packet with a stream ID
    pub fn data(sid: u32, num_payload_words32: usize) -> Self {
        Self {
            packet_type: PacketType::Data,
            has_sid: true,
            sid,
            num_payload_words32,
            ..Default::default()
        }
    }

    /// Context packet; these always carry a stream ID
    pub fn context(sid: u32, num_payload_words32: usize) -> Self {
        Self {
            packet_type: PacketType::Context,
            has_sid: true,
            sid,
            num_payload_words32,
            ..Default::default()
        }
    }

    fn carries_sid(&self) -> bool {
        self.has_sid || self.packet_type == PacketType::Context
    }

    /// Header words implied by the presence flags
    pub fn header_words32(&self) -> usize {
        1 + self.carries_sid() as usize
            + 2 * self.has_cid as usize
            + self.has_tsi as usize
            + 2 * self.has_tsf as usize
    }
}

/// Write the header (and trailer) words for `info` into `packet`.
///
/// Fills `num_header_words32` and `num_packet_words32`. The payload is not
/// touched; it goes at `num_header_words32 * 4`.
pub fn pack(order: ByteOrder, packet: &mut [u8], info: &mut IfPacketInfo) -> Result<(), FramingError> {
    let mut flags = match info.packet_type {
        PacketType::Data if info.has_sid => 0x1 << 28,
        PacketType::Data => 0x0,
        PacketType::Extension if info.has_sid => 0x3 << 28,
        PacketType::Extension => 0x2 << 28,
        PacketType::Context => {
            // context packets always carry a stream ID
            info.has_sid = true;
            0x4 << 28
        }
    };

    let header_words = info.header_words32();
    let packet_words = header_words + info.num_payload_words32 + info.has_tlr as usize;
    if packet_words > 0xffff {
        return Err(FramingError::BadHeader);
    }
    if packet.len() < packet_words * 4 {
        return Err(FramingError::PacketTooShort {
            have: packet.len() / 4,
            need: packet_words,
        });
    }

    let mut word = 1;
    let mut put = |packet: &mut [u8], value: u32| {
        order.write_u32(value, &mut packet[word * 4..]);
        word += 1;
    };

    if info.has_sid {
        put(packet, info.sid);
    }
    if info.has_cid {
        flags |= FLAG_CID;
        put(packet, (info.cid >> 32) as u32);
        put(packet, info.cid as u32);
    }
    if info.has_tsi {
        flags |= 0x3 << TSI_SHIFT;
        put(packet, info.tsi);
    }
    if info.has_tsf {
        flags |= 0x1 << TSF_SHIFT;
        put(packet, (info.tsf >> 32) as u32);
        put(packet, info.tsf as u32);
    }
    if info.has_tlr {
        flags |= FLAG_TLR;
        order.write_u32(info.tlr, &mut packet[(packet_words - 1) * 4..]);
    }
    if info.sob {
        flags |= FLAG_SOB;
    }
    if info.eob {
        flags |= FLAG_EOB;
    }

    let word0 = flags | ((info.packet_count as u32 & 0xf) << 16) | packet_words as u32;
    order.write_u32(word0, &mut packet[..4]);

    info.num_header_words32 = header_words;
    info.num_packet_words32 = packet_words;
    Ok(())
}

/// Parse the header of a received packet.
///
/// `packet` is everything the transport delivered; the size field must fit
/// inside it.
pub fn unpack(order: ByteOrder, packet: &[u8]) -> Result<IfPacketInfo, FramingError> {
    let available = packet.len() / 4;
    if available == 0 {
        return Err(FramingError::PacketTooShort { have: 0, need: 1 });
    }

    let word0 = order.read_u32(packet);
    let (packet_type, has_sid) = match word0 >> 28 {
        0x0 => (PacketType::Data, false),
        0x1 => (PacketType::Data, true),
        0x2 => (PacketType::Extension, false),
        0x3 => (PacketType::Extension, true),
        0x4 | 0x5 => (PacketType::Context, true),
        other => return Err(FramingError::UnsupportedPacketType(other)),
    };

    let mut info = IfPacketInfo {
        packet_type,
        has_sid,
        has_cid: word0 & FLAG_CID != 0,
        has_tlr: word0 & FLAG_TLR != 0,
        sob: word0 & FLAG_SOB != 0,
        eob: word0 & FLAG_EOB != 0,
        has_tsi: (word0 >> TSI_SHIFT) & 0x3 != 0,
        has_tsf: (word0 >> TSF_SHIFT) & 0x3 != 0,
        packet_count: ((word0 >> 16) & 0xf) as u8,
        ..Default::default()
    };

    let packet_words = (word0 & 0xffff) as usize;
    let header_words = info.header_words32();
    if packet_words > available || header_words + info.has_tlr as usize > packet_words {
        return Err(FramingError::BadHeader);
    }

    let mut word = 1;
    let mut take = || {
        let value = order.read_u32(&packet[word * 4..]);
        word += 1;
        value
    };

    if info.has_sid {
        info.sid = take();
    }
    if info.has_cid {
        let hi = take() as u64;
        info.cid = (hi << 32) | take() as u64;
    }
    if info.has_tsi {
        info.tsi = take();
    }
    if info.has_tsf {
        let hi = take() as u64;
        info.tsf = (hi << 32) | take() as u64;
    }
    if info.has_tlr {
        info.tlr = order.read_u32(&packet[(packet_words - 1) * 4..]);
    }

    info.num_header_words32 = header_words;
    info.num_packet_words32 = packet_words;
    info.num_payload_words32 = packet_words - header_words - info.has_tlr as usize;
    info.num_payload_bytes = info.num_payload_words32 * 4;
    Ok(info)
}

/// Payload bytes of a packet described by `info`
pub fn payload<'a>(packet: &'a [u8], info: &IfPacketInfo) -> &'a [u8] {
    let start = info.num_header_words32 * 4;
    &packet[start..start + info.num_payload_bytes]
}
