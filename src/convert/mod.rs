//! Sample format conversion
//!
//! Converters move blocks of samples between wire formats (what the hardware
//! puts on the transport, e.g. `sc16_item32_be` or the packed
//! `sc12_item32_le`) and host formats (`fc32`, `fc64`, `sc16`). They are
//! looked up by [`ConvertId`] through a [`ConvertRegistry`] and selected by
//! priority, so faster implementations can shadow the general ones without
//! callers knowing about them.
//!
//! Buffers are passed as raw bytes together with an explicit sample offset.
//! Packed formats need the offset to find the enclosing block of the first
//! sample; plain formats just skip `offset * item_size` bytes.

pub mod item32;
pub mod registry;
pub mod sc12;
pub mod tables;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use registry::ConvertRegistry;

/// Converter priority. Higher wins when no priority is requested.
pub type Priority = i32;

/// Portable scalar implementations
pub const PRIORITY_GENERAL: Priority = 0;
/// Lookup-table implementations
pub const PRIORITY_TABLE: Priority = 3;
/// Application supplied implementations
pub const PRIORITY_CUSTOM: Priority = 4;

/// Identifies a conversion: formats and buffer counts on each side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvertId {
    pub input_format: String,
    pub num_inputs: usize,
    pub output_format: String,
    pub num_outputs: usize,
}

impl ConvertId {
    pub fn new(
        input_format: impl Into<String>,
        num_inputs: usize,
        output_format: impl Into<String>,
        num_outputs: usize,
    ) -> Self {
        Self {
            input_format: input_format.into(),
            num_inputs,
            output_format: output_format.into(),
            num_outputs,
        }
    }

    /// Single input, single output conversion
    pub fn single(input_format: impl Into<String>, output_format: impl Into<String>) -> Self {
        Self::new(input_format, 1, output_format, 1)
    }

    /// Multi-line description used in lookup diagnostics
    pub fn to_pp_string(&self) -> String {
        format!(
            "conversion ID\n  Input format:  {}\n  Num inputs:    {}\n  Output format: {}\n  Num outputs:   {}\n",
            self.input_format, self.num_inputs, self.output_format, self.num_outputs
        )
    }
}

impl fmt::Display for ConvertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({})",
            self.input_format, self.num_inputs, self.output_format, self.num_outputs
        )
    }
}

/// Read side of a conversion.
///
/// `offset` counts samples (items of the input format) from the start of
/// `data`. For packed formats `data` must start on a block boundary.
#[derive(Debug, Clone, Copy)]
pub struct InputBuffer<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> InputBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Write side of a conversion, offset in samples of the output format.
#[derive(Debug)]
pub struct OutputBuffer<'a> {
    data: &'a mut [u8],
    offset: usize,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn with_offset(data: &'a mut [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn data(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A sample converter instance.
///
/// Instances carry at most a scaling factor and derived tables; they are
/// created per streamer channel and never shared between threads.
pub trait Converter: Send {
    /// Set the multiplicative factor applied in the conversion direction.
    fn set_scalar(&mut self, scalar: f64);

    /// Convert exactly `nsamps` samples.
    ///
    /// Panics if a buffer is too small for a whole block it has to touch;
    /// sizing buffers is the caller's job.
    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize);
}

/// Creates fresh converter instances
pub type ConverterFactory = Arc<dyn Fn() -> Box<dyn Converter> + Send + Sync>;

/// Byte order of 32-bit words on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    #[serde(rename = "be")]
    Big,
    #[serde(rename = "le")]
    Little,
}

impl ByteOrder {
    /// Format tag suffix, `"be"` or `"le"`
    pub fn suffix(self) -> &'static str {
        match self {
            ByteOrder::Big => "be",
            ByteOrder::Little => "le",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "be" => Some(ByteOrder::Big),
            "le" => Some(ByteOrder::Little),
            _ => None,
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::Big => u32::from_be_bytes(word),
            ByteOrder::Little => u32::from_le_bytes(word),
        }
    }

    #[inline]
    pub fn write_u32(self, value: u32, out: &mut [u8]) {
        let word = match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        };
        out[..4].copy_from_slice(&word);
    }
}

/// Compile-time byte order for converter hot loops
pub trait WireOrder: Send + 'static {
    const ORDER: ByteOrder;

    fn to_host(word: [u8; 4]) -> u32;
    fn to_wire(value: u32) -> [u8; 4];
}

/// Network (big-endian) word order
pub struct BigEndian;

/// Little-endian word order
pub struct LittleEndian;

impl WireOrder for BigEndian {
    const ORDER: ByteOrder = ByteOrder::Big;

    #[inline(always)]
    fn to_host(word: [u8; 4]) -> u32 {
        u32::from_be_bytes(word)
    }

    #[inline(always)]
    fn to_wire(value: u32) -> [u8; 4] {
        value.to_be_bytes()
    }
}

impl WireOrder for LittleEndian {
    const ORDER: ByteOrder = ByteOrder::Little;

    #[inline(always)]
    fn to_host(word: [u8; 4]) -> u32 {
        u32::from_le_bytes(word)
    }

    #[inline(always)]
    fn to_wire(value: u32) -> [u8; 4] {
        value.to_le_bytes()
    }
}

/// Host floating point component type (`f32` for fc32, `f64` for fc64)
pub trait FloatSample: Copy + Send + 'static {
    /// Bytes per component
    const BYTES: usize;
    /// Host format tag of the complex type
    const FORMAT: &'static str;

    fn load(bytes: &[u8]) -> f64;
    fn store(value: f64, out: &mut [u8]);
}

impl FloatSample for f32 {
    const BYTES: usize = 4;
    const FORMAT: &'static str = "fc32";

    #[inline(always)]
    fn load(bytes: &[u8]) -> f64 {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
    }

    #[inline(always)]
    fn store(value: f64, out: &mut [u8]) {
        out[..4].copy_from_slice(&(value as f32).to_ne_bytes());
    }
}

impl FloatSample for f64 {
    const BYTES: usize = 8;
    const FORMAT: &'static str = "fc64";

    #[inline(always)]
    fn load(bytes: &[u8]) -> f64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        f64::from_ne_bytes(word)
    }

    #[inline(always)]
    fn store(value: f64, out: &mut [u8]) {
        out[..8].copy_from_slice(&value.to_ne_bytes());
    }
}

/// Round to nearest and clamp into a signed range of `bits` width
#[inline(always)]
pub(crate) fn round_saturate(value: f64, bits: u32) -> i32 {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let min = -((1i64 << (bits - 1)) as f64);
    value.round().clamp(min, max) as i32
}

/// Full-scale integer peak of an over-the-wire format (`sc16` -> 32767)
pub fn otw_peak(otw_format: &str) -> f64 {
    let base = otw_format.split('_').next().unwrap_or(otw_format);
    match base {
        "sc16" | "s16" => 32767.0,
        "sc12" => 2047.0,
        "sc8" | "s8" => 127.0,
        _ => 1.0,
    }
}

/// Append a byte order suffix to an otw format: `sc12` -> `sc12_item32_le`
pub fn item32_format(otw_format: &str, order: ByteOrder) -> String {
    format!("{}_item32_{}", otw_format, order.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_id_equality_and_display() {
        let a = ConvertId::single("sc16_item32_be", "fc32");
        let b = ConvertId::new("sc16_item32_be", 1, "fc32", 1);
        assert_eq!(a, b);
        assert_ne!(a, ConvertId::new("sc16_item32_be", 2, "fc32", 2));
        assert_eq!(a.to_string(), "sc16_item32_be (1) -> fc32 (1)");
        assert!(a.to_pp_string().contains("Output format: fc32"));
    }

    #[test]
    fn test_byte_order_words() {
        let mut buf = [0u8; 4];
        ByteOrder::Big.write_u32(0x1234_5678, &mut buf);
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(ByteOrder::Little.read_u32(&buf), 0x7856_3412);
        assert_eq!(ByteOrder::from_suffix("le"), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::from_suffix("xx"), None);
    }

    #[test]
    fn test_round_saturate() {
        assert_eq!(round_saturate(2047.4, 12), 2047);
        assert_eq!(round_saturate(5000.0, 12), 2047);
        assert_eq!(round_saturate(-5000.0, 12), -2048);
        assert_eq!(round_saturate(-1.5, 16), -2);
    }

    #[test]
    fn test_otw_peak() {
        assert_eq!(otw_peak("sc16"), 32767.0);
        assert_eq!(otw_peak("sc12_item32_le"), 2047.0);
        assert_eq!(otw_peak("sc8"), 127.0);
    }
}
