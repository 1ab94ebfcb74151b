//! Asynchronous device reports
//!
//! A background thread drains the async transport (context packets carrying
//! burst acks, underflows, sequence and time errors) into a bounded queue the
//! application polls. The thread never blocks on the queue: when the
//! application stops polling, the oldest reports are dropped.

use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::metadata::{AsyncMetadata, EventCode};
use crate::convert::ByteOrder;
use crate::error::FramingError;
use crate::fastpath;
use crate::transport::vrt::{self, IfPacketInfo, PacketType};
use crate::transport::{RecvTransport, SharedBoundedBuffer};

/// Upper bound on how long the worker waits before re-checking its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Print the status marker for an async event: `U` underflow, `S` sequence
/// error, `L` late packet.
pub fn standard_async_msg_prints(md: &AsyncMetadata) {
    if md
        .event_code
        .intersects(EventCode::UNDERFLOW | EventCode::UNDERFLOW_IN_PACKET)
    {
        fastpath('U');
    } else if md
        .event_code
        .intersects(EventCode::SEQ_ERROR | EventCode::SEQ_ERROR_IN_BURST)
    {
        fastpath('S');
    } else if md.event_code.intersects(EventCode::TIME_ERROR) {
        fastpath('L');
    }
}

/// Decode one frame from the async transport. Non-context packets and
/// unparsable frames yield `None`.
pub fn handle_async_packet(order: ByteOrder, frame: &[u8], tick_rate: f64, channel: usize) -> Option<AsyncMetadata> {
    let info = match vrt::unpack(order, frame) {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!("Dropping malformed async packet: {}", e);
            return None;
        }
    };
    if info.packet_type != PacketType::Context || info.num_payload_words32 == 0 {
        tracing::debug!(packet_type = ?info.packet_type, "Ignoring non-report packet on async transport");
        return None;
    }
    Some(AsyncMetadata::from_packet(order, &info, frame, tick_rate, channel))
}

/// Build the context packet a device sends for `md`. Times before zero are
/// stamped as tick 0.
pub fn encode_async_packet(
    order: ByteOrder,
    md: &AsyncMetadata,
    tick_rate: f64,
    sid: u32,
) -> Result<Bytes, FramingError> {
    let mut info = IfPacketInfo::context(sid, 1 + md.user_payload.len());
    if md.has_time_spec {
        info.has_tsf = true;
        info.tsf = md.time_spec.to_ticks(tick_rate).max(0) as u64;
    }

    let mut packet = BytesMut::zeroed((info.header_words32() + info.num_payload_words32) * 4);
    vrt::pack(order, &mut packet, &mut info)?;

    let mut offset = info.num_header_words32 * 4;
    order.write_u32(md.event_code.bits(), &mut packet[offset..]);
    for word in md.user_payload {
        offset += 4;
        order.write_u32(word, &mut packet[offset..]);
    }
    Ok(packet.freeze())
}

/// Background thread feeding async reports into a shared queue
pub struct AsyncMessageWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncMessageWorker {
    /// Start servicing `transport`. Reports are tagged with `channel`.
    pub fn spawn<R>(
        mut transport: R,
        queue: SharedBoundedBuffer<AsyncMetadata>,
        order: ByteOrder,
        tick_rate: f64,
        channel: usize,
    ) -> io::Result<Self>
    where
        R: RecvTransport + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("async-msg-{}", channel))
            .spawn(move || {
                tracing::debug!("Async message worker for channel {} started", channel);
                while !stop_flag.load(Ordering::Relaxed) {
                    let frame = match transport.recv(POLL_INTERVAL) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!("Async transport closed: {}", e);
                            break;
                        }
                    };
                    let Some(md) = handle_async_packet(order, &frame, tick_rate, channel) else {
                        continue;
                    };
                    standard_async_msg_prints(&md);
                    if !queue.push_with_pop_on_full(md) {
                        tracing::trace!("Async queue full, dropped oldest report");
                    }
                }
                tracing::debug!("Async message worker for channel {} stopped", channel);
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit and wait for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Async message worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AsyncMessageWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
