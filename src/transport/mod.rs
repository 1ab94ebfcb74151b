//! Packet transports and framing
//!
//! A transport moves whole frames (one VRT packet each) between the host and
//! the device. Receiving returns `Ok(None)` on timeout so streamers can turn
//! it into an in-band error code; `Err` means the link is gone.

pub mod benchmarker;
pub mod bounded_buffer;
pub mod channel;
#[cfg(feature = "udp")]
pub mod udp;
pub mod vrt;

use bytes::Bytes;
use std::io;
use std::time::Duration;

pub use bounded_buffer::{create_shared_buffer, BoundedBuffer, SharedBoundedBuffer};
pub use channel::{loopback, ChannelReceiver, ChannelSender};
#[cfg(feature = "udp")]
pub use udp::{create_socket, UdpTransport};

/// Receive side of a frame transport
pub trait RecvTransport: Send {
    /// Wait up to `timeout` for the next frame
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Bytes>>;
}

/// Send side of a frame transport
pub trait SendTransport: Send {
    /// Hand a frame to the link, waiting up to `timeout` for room.
    /// Returns false on timeout.
    fn send(&mut self, frame: Bytes, timeout: Duration) -> io::Result<bool>;

    /// Largest frame the link accepts, in bytes
    fn max_frame_size(&self) -> usize;
}

impl<T: RecvTransport + ?Sized> RecvTransport for Box<T> {
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Bytes>> {
        (**self).recv(timeout)
    }
}

impl<T: SendTransport + ?Sized> SendTransport for Box<T> {
    fn send(&mut self, frame: Bytes, timeout: Duration) -> io::Result<bool> {
        (**self).send(frame, timeout)
    }

    fn max_frame_size(&self) -> usize {
        (**self).max_frame_size()
    }
}
