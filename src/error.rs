//! Error types for the streaming stack
//!
//! Only setup-time failures live here. Conditions that happen routinely while
//! streaming (timeouts, overflows, sequence errors) are reported in-band
//! through the metadata records in [`crate::stream::metadata`].

use thiserror::Error;

use crate::convert::{ConvertId, Priority};

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Convert error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converter and item-size lookup errors
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Cannot find a conversion routine for {id}")]
    NoConverter { id: ConvertId },

    #[error("Cannot find a conversion routine with priority {priority} for {id}")]
    NoConverterAtPriority { id: ConvertId, priority: Priority },

    #[error("Cannot find an item size: {0}")]
    UnknownItemSize(String),
}

/// Wire packet parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Bad VRT header or packet fragment")]
    BadHeader,

    #[error("Packet too short: have {have} words, need {need}")]
    PacketTooShort { have: usize, need: usize },

    #[error("Unsupported packet type: {0:#x}")]
    UnsupportedPacketType(u32),
}

/// Streamer construction and contract errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid stream arguments: {0}")]
    InvalidArgs(String),

    #[error("Channel count mismatch: expected {expected}, got {got}")]
    ChannelCount { expected: usize, got: usize },

    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("Transport closed")]
    TransportClosed,

    #[error("Send time {0} is before zero")]
    NegativeTime(String),

    #[error("Framing failed: {0}")]
    Framing(#[from] FramingError),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
