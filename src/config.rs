//! Streamer configuration
//!
//! Loaded from TOML. Every field has a default, so a partial file (or no file
//! at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants;
use crate::convert::ByteOrder;
use crate::error::{Error, Result};

/// Settings shared by RX and TX streamers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Samples per packet unless overridden by the `spp` stream argument
    pub samples_per_packet: usize,

    /// Largest receive frame in bytes
    pub recv_frame_size: usize,

    /// Largest send frame in bytes
    pub send_frame_size: usize,

    /// Async reports kept before the oldest are dropped
    pub async_queue_depth: usize,

    /// Packets discarded while aligning channels before giving up
    pub alignment_failure_threshold: usize,

    /// Device timestamp clock in Hz
    pub tick_rate: f64,

    /// Word order on the link
    pub byte_order: ByteOrder,

    /// Host value mapped to the wire format's full scale
    pub fullscale: f64,

    pub udp: UdpConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            samples_per_packet: constants::DEFAULT_SAMPLES_PER_PACKET,
            recv_frame_size: constants::DEFAULT_FRAME_SIZE,
            send_frame_size: constants::DEFAULT_FRAME_SIZE,
            async_queue_depth: constants::ASYNC_QUEUE_DEPTH,
            alignment_failure_threshold: constants::ALIGNMENT_FAILURE_THRESHOLD,
            tick_rate: constants::DEFAULT_TICK_RATE,
            byte_order: ByteOrder::Big,
            fullscale: 1.0,
            udp: UdpConfig::default(),
        }
    }
}

/// UDP link settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Kernel receive buffer in bytes
    pub recv_buff_size: usize,
    /// Kernel send buffer in bytes
    pub send_buff_size: usize,
    /// Largest datagram
    pub frame_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            recv_buff_size: constants::DEFAULT_FRAME_SIZE * constants::DEFAULT_NUM_FRAMES * 4,
            send_buff_size: constants::DEFAULT_FRAME_SIZE * constants::DEFAULT_NUM_FRAMES,
            frame_size: constants::DEFAULT_FRAME_SIZE,
        }
    }
}

impl StreamerConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded streamer config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Load `streamer.toml` from the platform config directory, or defaults
    /// when there is none
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Where `load_default` looks for its file
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "sdr-streamer", "sdr-streamer")
        .map(|dirs| dirs.config_dir().join("streamer.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamerConfig::default();
        assert_eq!(config.samples_per_packet, 364);
        assert_eq!(config.recv_frame_size, 8000);
        assert_eq!(config.async_queue_depth, 1000);
        assert_eq!(config.tick_rate, 100e6);
        assert_eq!(config.byte_order, ByteOrder::Big);
    }

    #[test]
    fn test_partial_toml() {
        let config = StreamerConfig::from_toml(
            r#"
            samples_per_packet = 200
            byte_order = "le"

            [udp]
            recv_buff_size = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.samples_per_packet, 200);
        assert_eq!(config.byte_order, ByteOrder::Little);
        assert_eq!(config.udp.recv_buff_size, 1 << 20);
        assert_eq!(config.udp.frame_size, constants::DEFAULT_FRAME_SIZE);
        assert_eq!(config.fullscale, 1.0);
    }

    #[test]
    fn test_frame_counts_are_not_config_keys() {
        let text = StreamerConfig::default().to_toml().unwrap();
        assert!(!text.contains("num_recv_frames"));
        assert!(!text.contains("num_send_frames"));

        // older files that still carry them load unchanged
        let config = StreamerConfig::from_toml("num_recv_frames = 8\nsamples_per_packet = 100").unwrap();
        assert_eq!(config.samples_per_packet, 100);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = StreamerConfig::from_toml("byte_order = \"middle\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let mut config = StreamerConfig::default();
        config.tick_rate = 61.44e6;
        config.alignment_failure_threshold = 10;

        let path = std::env::temp_dir().join(format!("sdr-streamer-config-{}.toml", std::process::id()));
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        let loaded = StreamerConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = StreamerConfig::load("/nonexistent/streamer.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
