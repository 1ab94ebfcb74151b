//! # SDR Streamer
//!
//! Packed-sample conversion and VRT packet streaming for software-defined
//! radio hardware.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               DEVICE                                     │
//! │        data packets (VRT IF data)           async reports (VRT context)  │
//! └──────────────┬──────────────────────────────────────────▲────────┬───────┘
//!                │ RecvTransport (UDP / channel)            │        │
//!                ▼                                          │        ▼
//! ┌──────────────────────────────────────┐   ┌──────────────┴────────────────┐
//! │        RX Streamer (stream::rx)      │   │   TX Streamer (stream::tx)    │
//! │  ┌────────────┐  ┌────────────────┐  │   │  ┌─────────────────────────┐  │
//! │  │ vrt::unpack│─►│ seq / alignment│  │   │  │ Converter (fc32 -> otw) │  │
//! │  └────────────┘  └───────┬────────┘  │   │  └────────────┬────────────┘  │
//! │                          ▼           │   │               ▼               │
//! │  ┌─────────────────────────────────┐ │   │  ┌─────────────────────────┐  │
//! │  │ Converter (otw -> fc32/fc64)    │ │   │  │ vrt::pack, spp split    │  │
//! │  └───────────────┬─────────────────┘ │   │  └─────────────────────────┘  │
//! └──────────────────┼───────────────────┘   │  ┌─────────────────────────┐  │
//!                    ▼                       │  │ AsyncMessageWorker      │  │
//!          host buffers + RxMetadata         │  │   └► BoundedBuffer      │  │
//!                                            │  └─────────────────────────┘  │
//!                                            └───────────────────────────────┘
//!
//!            ConvertRegistry (convert::registry)
//!            (otw, cpu) format pair + priority ─► ConverterFactory
//! ```
//!
//! Wire formats are named `<otw>_item32_<be|le>`, e.g. `sc16_item32_be` or
//! the 12-bit packed `sc12_item32_le`. Host formats are `fc32`, `fc64` and
//! `sc16`.

pub mod config;
pub mod convert;
pub mod error;
pub mod stream;
pub mod transport;

pub use config::StreamerConfig;
pub use convert::{ConvertId, ConvertRegistry, Converter, Priority};
pub use error::{Error, Result};
pub use stream::{RxMetadata, RxStreamer, StreamArgs, StreamCmd, TimeSpec, TxMetadata, TxStreamer};

/// Library-wide constants
pub mod constants {
    /// Default samples per packet (sc16 in an 1500 byte MTU)
    pub const DEFAULT_SAMPLES_PER_PACKET: usize = 364;

    /// Default transport frame size in bytes
    pub const DEFAULT_FRAME_SIZE: usize = 8000;

    /// Frames the default UDP socket buffers are sized for
    pub const DEFAULT_NUM_FRAMES: usize = 32;

    /// Default device tick rate in Hz
    pub const DEFAULT_TICK_RATE: f64 = 100e6;

    /// Async reports kept per TX streamer
    pub const ASYNC_QUEUE_DEPTH: usize = 1000;

    /// Packets dropped while aligning channels before reporting failure
    pub const ALIGNMENT_FAILURE_THRESHOLD: usize = 1000;

    /// Log target of the single-character status markers
    pub const FASTPATH_TARGET: &str = "sdr_streamer::fastpath";
}

/// Emit a status marker on the fast path log target.
///
/// `O` overflow, `D` dropped packet, `U` underflow, `S` sequence error,
/// `L` late packet.
pub(crate) fn fastpath(marker: char) {
    tracing::warn!(target: constants::FASTPATH_TARGET, "{}", marker);
}

/// Instant `timeout` from now. Timeouts past what `Instant` can represent
/// saturate to a deadline about a century out.
pub(crate) fn deadline_after(timeout: std::time::Duration) -> std::time::Instant {
    const FAR_FUTURE: std::time::Duration = std::time::Duration::from_secs(100 * 365 * 24 * 3600);
    let now = std::time::Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
