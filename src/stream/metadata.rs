//! Per-call and asynchronous metadata records
//!
//! Conditions met while streaming (timeouts, overflows, late commands,
//! underflows) are reported here as codes rather than as `Err` values. A
//! caller checks `error_code` after every receive and keeps streaming.

use bitflags::bitflags;
use std::fmt;

use super::time_spec::TimeSpec;
use crate::convert::ByteOrder;
use crate::transport::vrt::{self, IfPacketInfo};

/// Outcome of a receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum RxErrorCode {
    /// No error; samples are valid
    #[default]
    None = 0x0,
    /// No packet arrived within the timeout
    Timeout = 0x1,
    /// A stream command was issued in the past
    LateCommand = 0x2,
    /// Expected another stream command
    BrokenChain = 0x4,
    /// Samples were lost, either by the device or on the link
    Overflow = 0x8,
    /// Multi-channel packets could not be aligned in time
    Alignment = 0xc,
    /// A packet could not be parsed
    BadPacket = 0xf,
}

impl RxErrorCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0x0 => RxErrorCode::None,
            0x1 => RxErrorCode::Timeout,
            0x2 => RxErrorCode::LateCommand,
            0x4 => RxErrorCode::BrokenChain,
            0x8 => RxErrorCode::Overflow,
            0xc => RxErrorCode::Alignment,
            0xf => RxErrorCode::BadPacket,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RxErrorCode::None => "ERROR_CODE_NONE",
            RxErrorCode::Timeout => "ERROR_CODE_TIMEOUT",
            RxErrorCode::LateCommand => "ERROR_CODE_LATE_COMMAND",
            RxErrorCode::BrokenChain => "ERROR_CODE_BROKEN_CHAIN",
            RxErrorCode::Overflow => "ERROR_CODE_OVERFLOW",
            RxErrorCode::Alignment => "ERROR_CODE_ALIGNMENT",
            RxErrorCode::BadPacket => "ERROR_CODE_BAD_PACKET",
        }
    }
}

impl fmt::Display for RxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filled in by every receive call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RxMetadata {
    /// Channel the metadata describes (the first one for multi-channel calls)
    pub channel: usize,
    pub has_time_spec: bool,
    /// Time of the first sample returned
    pub time_spec: TimeSpec,
    /// Samples of the current packet remain for the next call
    pub more_fragments: bool,
    /// Offset of the first returned sample within its packet
    pub fragment_offset: usize,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
    /// A packet sequence gap was detected; the data is still delivered
    pub out_of_sequence: bool,
    pub error_code: RxErrorCode,
}

impl RxMetadata {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Readable description of the error code
    pub fn strerror(&self) -> String {
        let detail = match self.error_code {
            RxErrorCode::None => "no error",
            RxErrorCode::Timeout => "no packet received, implementation timed out",
            RxErrorCode::LateCommand => "a stream command was issued in the past",
            RxErrorCode::BrokenChain => "expected another stream command",
            RxErrorCode::Overflow if self.out_of_sequence => "dropped packet detected on the link",
            RxErrorCode::Overflow => "an internal receive buffer has filled",
            RxErrorCode::Alignment => "multi-channel alignment failed",
            RxErrorCode::BadPacket => "the packet could not be parsed",
        };
        format!("{}: {}", self.error_code, detail)
    }

    pub fn to_pp_string(&self, compact: bool) -> String {
        if compact {
            let mut out = String::new();
            if self.has_time_spec {
                out.push_str(&format!("Time: {}, ", self.time_spec));
            }
            if self.more_fragments {
                out.push_str(&format!("Fragment offset: {}, ", self.fragment_offset));
            }
            if self.start_of_burst {
                out.push_str("SOB, ");
            }
            if self.end_of_burst {
                out.push_str("EOB, ");
            }
            if self.error_code != RxErrorCode::None {
                out.push_str(&format!("{}, ", self.strerror()));
            }
            out.trim_end_matches([',', ' ']).to_string()
        } else {
            let time = if self.has_time_spec {
                self.time_spec.to_string()
            } else {
                "none".to_string()
            };
            format!(
                "RX metadata:\n  Channel: {}\n  Time: {}\n  More fragments: {} (offset {})\n  \
                 Start of burst: {}\n  End of burst: {}\n  Out of sequence: {}\n  Error: {}\n",
                self.channel,
                time,
                self.more_fragments,
                self.fragment_offset,
                self.start_of_burst,
                self.end_of_burst,
                self.out_of_sequence,
                self.strerror()
            )
        }
    }
}

impl fmt::Display for RxMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pp_string(true))
    }
}

/// Supplied with every send call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TxMetadata {
    /// Transmit the first sample at `time_spec` instead of immediately
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}

impl TxMetadata {
    /// Start a burst at `time_spec`
    pub fn timed_burst(time_spec: TimeSpec) -> Self {
        Self {
            has_time_spec: true,
            time_spec,
            start_of_burst: true,
            end_of_burst: false,
        }
    }

    /// Close the current burst
    pub fn end_of_burst() -> Self {
        Self {
            end_of_burst: true,
            ..Default::default()
        }
    }
}

bitflags! {
    /// Bit set of asynchronous event codes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventCode: u32 {
        /// A burst was transmitted without error
        const BURST_ACK = 0x1;
        /// The device ran out of samples between packets
        const UNDERFLOW = 0x2;
        /// A packet was lost between host and device
        const SEQ_ERROR = 0x4;
        /// A packet had a time stamp in the past
        const TIME_ERROR = 0x8;
        /// Underflow inside a packet
        const UNDERFLOW_IN_PACKET = 0x10;
        /// Packet loss inside a burst
        const SEQ_ERROR_IN_BURST = 0x20;
        /// The user payload words are valid
        const USER_PAYLOAD = 0x40;
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        if names.is_empty() {
            write!(f, "{:#x}", self.bits())
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// An event reported by the device outside the sample stream
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AsyncMetadata {
    pub channel: usize,
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub event_code: EventCode,
    /// Opaque words following the event code
    pub user_payload: [u32; 4],
}

impl AsyncMetadata {
    /// Decode an async report from a parsed context packet.
    ///
    /// The event code is the low byte of the first payload word; up to four
    /// following words are copied into `user_payload`.
    pub fn from_packet(
        order: ByteOrder,
        info: &IfPacketInfo,
        packet: &[u8],
        tick_rate: f64,
        channel: usize,
    ) -> Self {
        let mut md = AsyncMetadata {
            channel,
            has_time_spec: info.has_tsf,
            ..Default::default()
        };
        if tick_rate != 0.0 {
            md.time_spec = TimeSpec::from_ticks(info.tsf as i64, tick_rate);
        }

        let payload = vrt::payload(packet, info);
        let mut words = payload.chunks_exact(4).map(|word| order.read_u32(word));
        if let Some(first) = words.next() {
            md.event_code = EventCode::from_bits_retain(first & 0xff);
        }
        for (slot, word) in md.user_payload.iter_mut().zip(words) {
            *slot = word;
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::vrt::PacketType;

    #[test]
    fn test_error_code_values() {
        assert_eq!(RxErrorCode::Alignment as u32, 0xc);
        assert_eq!(RxErrorCode::from_raw(0xf), Some(RxErrorCode::BadPacket));
        assert_eq!(RxErrorCode::from_raw(0x3), None);
    }

    #[test]
    fn test_strerror_and_display() {
        let mut md = RxMetadata {
            error_code: RxErrorCode::Timeout,
            ..Default::default()
        };
        assert!(md.strerror().starts_with("ERROR_CODE_TIMEOUT"));
        assert_eq!(md.to_string(), md.strerror());

        md.reset();
        md.has_time_spec = true;
        md.time_spec = TimeSpec::new(1, 0.5);
        md.start_of_burst = true;
        assert_eq!(md.to_string(), "Time: 1.500000000s, SOB");
        assert!(md.to_pp_string(false).contains("Error: ERROR_CODE_NONE"));
    }

    #[test]
    fn test_event_code_bits() {
        let code = EventCode::UNDERFLOW | EventCode::USER_PAYLOAD;
        assert!(code.contains(EventCode::UNDERFLOW));
        assert!(code.intersects(EventCode::UNDERFLOW | EventCode::SEQ_ERROR));
        assert!(!code.contains(EventCode::BURST_ACK));
        assert_eq!(code.to_string(), "underflow|user_payload");
        assert_eq!(EventCode::from_bits_retain(0x80).to_string(), "0x80");

        // unknown device bits survive alongside known ones
        let raw = EventCode::from_bits_retain(0x82);
        assert!(raw.contains(EventCode::UNDERFLOW));
        assert_eq!(raw.bits(), 0x82);
    }

    fn context_packet(order: ByteOrder, words: &[u32], tsf: Option<u64>) -> (IfPacketInfo, Vec<u8>) {
        let mut info = IfPacketInfo {
            packet_type: PacketType::Context,
            num_payload_words32: words.len(),
            has_tsf: tsf.is_some(),
            tsf: tsf.unwrap_or(0),
            ..Default::default()
        };
        let mut packet = vec![0u8; (info.header_words32() + 1 + words.len()) * 4];
        vrt::pack(order, &mut packet, &mut info).unwrap();
        for (i, word) in words.iter().enumerate() {
            order.write_u32(*word, &mut packet[(info.num_header_words32 + i) * 4..]);
        }
        let parsed = vrt::unpack(order, &packet).unwrap();
        (parsed, packet)
    }

    #[test]
    fn test_async_from_packet() {
        let order = ByteOrder::Little;
        let (info, packet) = context_packet(order, &[0xab01, 7, 8, 9, 10, 11], Some(150_000_000));
        let md = AsyncMetadata::from_packet(order, &info, &packet, 100e6, 2);

        assert_eq!(md.channel, 2);
        assert!(md.has_time_spec);
        assert_eq!(md.time_spec, TimeSpec::new(1, 0.5));
        assert_eq!(md.event_code, EventCode::BURST_ACK);
        assert_eq!(md.user_payload, [7, 8, 9, 10]);
    }

    #[test]
    fn test_async_short_payload_and_zero_rate() {
        let order = ByteOrder::Big;
        let (info, packet) = context_packet(order, &[0x2, 42], Some(5));
        let md = AsyncMetadata::from_packet(order, &info, &packet, 0.0, 0);

        assert_eq!(md.event_code, EventCode::UNDERFLOW);
        assert_eq!(md.user_payload, [42, 0, 0, 0]);
        assert_eq!(md.time_spec, TimeSpec::ZERO);
    }
}
