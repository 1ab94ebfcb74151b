//! Receive and transmit streamers
//!
//! ```text
//!   RX:  transport ──► vrt::unpack ──► seq/align checks ──► Converter ──► host buffers
//!                                                         └─► RxMetadata
//!
//!   TX:  host buffers ──► Converter ──► vrt::pack ──► transport
//!        async transport ──► AsyncMessageWorker ──► BoundedBuffer<AsyncMetadata>
//! ```

pub mod async_msg;
pub mod metadata;
pub mod rx;
pub mod time_spec;
pub mod tx;

use std::collections::BTreeMap;
use std::str::FromStr;

pub use async_msg::{standard_async_msg_prints, AsyncMessageWorker};
pub use metadata::{AsyncMetadata, EventCode, RxErrorCode, RxMetadata, TxMetadata};
pub use rx::RxStreamer;
pub use time_spec::TimeSpec;
pub use tx::TxStreamer;

use crate::convert::{ByteOrder, Priority};
use crate::error::StreamError;

/// Formats, channel mapping and free-form options of a streamer
#[derive(Debug, Clone, PartialEq)]
pub struct StreamArgs {
    /// Host format handed to the application, e.g. `fc32`
    pub cpu_format: String,
    /// Wire format without byte order, e.g. `sc16` or `sc12`
    pub otw_format: String,
    /// Extra options such as `spp`, `fullscale` or `convert_priority`
    pub args: BTreeMap<String, String>,
    /// Logical channel index to device channel index
    pub channels: Vec<usize>,
}

impl StreamArgs {
    pub fn new(cpu_format: impl Into<String>, otw_format: impl Into<String>) -> Self {
        Self {
            cpu_format: cpu_format.into(),
            otw_format: otw_format.into(),
            args: BTreeMap::new(),
            channels: vec![0],
        }
    }

    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.insert(key.into(), value.to_string());
        self
    }

    /// Merge a `key=value,key=value` string into the options
    pub fn with_arg_string(mut self, args: &str) -> Result<Self, StreamError> {
        for pair in args.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| StreamError::InvalidArgs(format!("expected key=value, got '{}'", pair)))?;
            self.args.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(self)
    }

    /// Typed lookup of an option; `Ok(None)` when absent
    pub fn arg<T: FromStr>(&self, key: &str) -> Result<Option<T>, StreamError> {
        match self.args.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StreamError::InvalidArgs(format!("bad value '{}' for '{}'", raw, key))),
        }
    }

    pub fn fullscale(&self, default: f64) -> Result<f64, StreamError> {
        Ok(self.arg("fullscale")?.unwrap_or(default))
    }

    pub fn convert_priority(&self) -> Result<Option<Priority>, StreamError> {
        self.arg("convert_priority")
    }

    pub fn byte_order(&self, default: ByteOrder) -> Result<ByteOrder, StreamError> {
        match self.args.get("byte_order") {
            None => Ok(default),
            Some(raw) => ByteOrder::from_suffix(raw)
                .ok_or_else(|| StreamError::InvalidArgs(format!("unknown byte order '{}'", raw))),
        }
    }
}

/// How a receive stream is started or stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    StartContinuous,
    StopContinuous,
    /// Stream `num_samps` samples then end the burst
    NumSampsAndDone,
    /// Stream `num_samps` samples and expect another command
    NumSampsAndMore,
}

/// A command forwarded to the device side of a receive stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamCmd {
    pub mode: StreamMode,
    pub num_samps: usize,
    pub stream_now: bool,
    pub time_spec: TimeSpec,
}

impl StreamCmd {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            num_samps: 0,
            stream_now: true,
            time_spec: TimeSpec::ZERO,
        }
    }

    pub fn num_samps(mode: StreamMode, num_samps: usize) -> Self {
        Self {
            num_samps,
            ..Self::new(mode)
        }
    }

    /// Delay the command until `time_spec`
    pub fn at(mut self, time_spec: TimeSpec) -> Self {
        self.stream_now = false;
        self.time_spec = time_spec;
        self
    }
}
