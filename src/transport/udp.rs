//! UDP frame transport
//!
//! One datagram per frame. Socket buffers are sized through socket2 so a
//! burst of packets is not dropped by the kernel while the streamer is busy
//! converting.

use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::{RecvTransport, SendTransport};
use crate::config::UdpConfig;

/// Smallest read timeout handed to the OS; zero means "block forever" there
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// Create a UDP socket bound to `bind_addr` with the configured buffer sizes
pub fn create_socket(bind_addr: SocketAddr, config: &UdpConfig) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Err(e) = socket.set_recv_buffer_size(config.recv_buff_size) {
        tracing::warn!("Failed to set receive buffer to {} bytes: {}", config.recv_buff_size, e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.send_buff_size) {
        tracing::warn!("Failed to set send buffer to {} bytes: {}", config.send_buff_size, e);
    }

    socket.bind(&bind_addr.into())?;
    Ok(socket)
}

/// Connected UDP socket carrying one frame per datagram
pub struct UdpTransport {
    socket: UdpSocket,
    recv_buf: BytesMut,
    frame_size: usize,
}

impl UdpTransport {
    /// Bind locally and connect to `peer`
    pub fn connect(bind_addr: SocketAddr, peer: SocketAddr, config: &UdpConfig) -> io::Result<Self> {
        let socket = create_socket(bind_addr, config)?;
        socket.connect(&peer.into())?;
        tracing::debug!("UDP transport {} -> {}", bind_addr, peer);
        Ok(Self::from_socket(socket.into(), config.frame_size))
    }

    pub fn from_socket(socket: UdpSocket, frame_size: usize) -> Self {
        Self {
            socket,
            recv_buf: BytesMut::with_capacity(frame_size),
            frame_size,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Independent handle on the same socket, e.g. for a send thread
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self::from_socket(self.socket.try_clone()?, self.frame_size))
    }
}

impl RecvTransport for UdpTransport {
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Bytes>> {
        self.socket.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        self.recv_buf.clear();
        self.recv_buf.resize(self.frame_size, 0);
        match self.socket.recv(&mut self.recv_buf) {
            Ok(len) => {
                self.recv_buf.truncate(len);
                Ok(Some(self.recv_buf.split().freeze()))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl SendTransport for UdpTransport {
    fn send(&mut self, frame: Bytes, timeout: Duration) -> io::Result<bool> {
        self.socket.set_write_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.socket.send(&frame) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn max_frame_size(&self) -> usize {
        self.frame_size
    }
}
