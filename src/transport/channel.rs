//! In-process frame transport
//!
//! A bounded channel standing in for a device link. Used for loopback
//! testing of streamers and by simulated devices.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::io;
use std::time::Duration;

use super::{RecvTransport, SendTransport};
use crate::constants::DEFAULT_FRAME_SIZE;

/// Sending half of an in-process link
#[derive(Clone)]
pub struct ChannelSender {
    tx: Sender<Bytes>,
    max_frame_size: usize,
}

/// Receiving half of an in-process link
pub struct ChannelReceiver {
    rx: Receiver<Bytes>,
}

/// Create a link holding up to `depth` frames in flight
pub fn loopback(depth: usize) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = bounded(depth);
    (
        ChannelSender {
            tx,
            max_frame_size: DEFAULT_FRAME_SIZE,
        },
        ChannelReceiver { rx },
    )
}

impl ChannelSender {
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl SendTransport for ChannelSender {
    fn send(&mut self, frame: Bytes, timeout: Duration) -> io::Result<bool> {
        if frame.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds {}", frame.len(), self.max_frame_size),
            ));
        }
        match self.tx.send_timeout(frame, timeout) {
            Ok(()) => Ok(true),
            Err(SendTimeoutError::Timeout(_)) => Ok(false),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))
            }
        }
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl RecvTransport for ChannelReceiver {
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Bytes>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sender dropped"))
            }
        }
    }
}
