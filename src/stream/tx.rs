//! Transmit streamer
//!
//! Converts host samples into wire format and cuts them into VRT data
//! packets. Burst acknowledgements and errors come back on a separate async
//! transport, serviced by an [`AsyncMessageWorker`] and polled through
//! [`TxStreamer::recv_async_msg`].

use bytes::BytesMut;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::async_msg::AsyncMessageWorker;
use super::metadata::{AsyncMetadata, TxMetadata};
use super::time_spec::TimeSpec;
use super::StreamArgs;
use crate::config::StreamerConfig;
use crate::convert::{self, ByteOrder, ConvertId, ConvertRegistry, Converter, InputBuffer, OutputBuffer};
use crate::error::StreamError;
use crate::transport::vrt::{self, IfPacketInfo, MAX_IF_HDR_WORDS32};
use crate::transport::{create_shared_buffer, RecvTransport, SendTransport, SharedBoundedBuffer};

struct TxChannel {
    transport: Box<dyn SendTransport>,
    converter: Box<dyn Converter>,
    sid: u32,
    count: u8,
}

/// Flags and time of one outgoing packet
struct PacketHeader {
    sob: bool,
    eob: bool,
    time: Option<TimeSpec>,
}

pub struct TxStreamer {
    channels: Vec<TxChannel>,
    order: ByteOrder,
    otw_item_size: usize,
    cpu_item_size: usize,
    spp: usize,
    tick_rate: f64,
    async_queue: SharedBoundedBuffer<AsyncMetadata>,
    async_worker: AsyncMessageWorker,
}

/// Smallest sample count whose wire size is a whole number of words
fn spp_step(otw_item_size: usize) -> usize {
    fn gcd(a: usize, b: usize) -> usize {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    4 / gcd(4, otw_item_size)
}

impl TxStreamer {
    /// Build a streamer with one data transport per entry of
    /// `args.channels` and one async transport for device reports.
    pub fn new(
        registry: &Arc<ConvertRegistry>,
        args: &StreamArgs,
        config: &StreamerConfig,
        transports: Vec<Box<dyn SendTransport>>,
        async_transport: Box<dyn RecvTransport>,
    ) -> crate::Result<Self> {
        if transports.len() != args.channels.len() || transports.is_empty() {
            return Err(StreamError::ChannelCount {
                expected: args.channels.len(),
                got: transports.len(),
            }
            .into());
        }

        let order = args.byte_order(config.byte_order)?;
        let otw_format = convert::item32_format(&args.otw_format, order);
        let id = ConvertId::single(&args.cpu_format, &otw_format);
        let factory = registry.get_converter(&id, args.convert_priority()?)?;
        let otw_item_size = registry.get_bytes_per_item(&otw_format)?;
        let cpu_item_size = registry.get_bytes_per_item(&args.cpu_format)?;
        let scalar = convert::otw_peak(&args.otw_format) / args.fullscale(config.fullscale)?;

        let frame_size = transports
            .iter()
            .map(|t| t.max_frame_size())
            .min()
            .unwrap_or(config.send_frame_size)
            .min(config.send_frame_size);
        let frame_spp = frame_size.saturating_sub(MAX_IF_HDR_WORDS32 * 4) / otw_item_size;
        let step = spp_step(otw_item_size);
        let spp = args
            .arg::<usize>("spp")?
            .unwrap_or(config.samples_per_packet)
            .min(frame_spp)
            / step
            * step;
        if spp == 0 {
            return Err(StreamError::InvalidArgs(format!(
                "frame size {} leaves no room for {} samples",
                frame_size, otw_format
            ))
            .into());
        }

        let channels = transports
            .into_iter()
            .zip(&args.channels)
            .map(|(transport, &chan)| {
                let mut converter = (*factory)();
                converter.set_scalar(scalar);
                TxChannel {
                    transport,
                    converter,
                    sid: chan as u32,
                    count: 0,
                }
            })
            .collect();

        if config.async_queue_depth == 0 {
            return Err(StreamError::InvalidArgs("async_queue_depth must be at least 1".into()).into());
        }
        let async_queue = create_shared_buffer(config.async_queue_depth);
        let async_worker =
            AsyncMessageWorker::spawn(async_transport, async_queue.clone(), order, config.tick_rate, 0)?;

        tracing::info!(
            "TX streamer: {} on {} channel(s), {} samples per packet",
            id,
            args.channels.len(),
            spp
        );

        Ok(Self {
            channels,
            order,
            otw_item_size,
            cpu_item_size,
            spp,
            tick_rate: config.tick_rate,
            async_queue,
            async_worker,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Largest number of samples put in one packet
    pub fn max_num_samps(&self) -> usize {
        self.spp
    }

    pub fn set_tick_rate(&mut self, tick_rate: f64) {
        self.tick_rate = tick_rate;
    }

    /// Send `nsamps` samples per channel from `buffs`.
    ///
    /// Returns the number of samples handed to the transports; fewer than
    /// `nsamps` means the link stayed full past `timeout`. A call with zero
    /// samples and `end_of_burst` closes the burst with a one-sample packet
    /// of zeros and returns 0.
    pub fn send(
        &mut self,
        buffs: &[&[u8]],
        nsamps: usize,
        md: &TxMetadata,
        timeout: Duration,
    ) -> Result<usize, StreamError> {
        if buffs.len() != self.channels.len() {
            return Err(StreamError::ChannelCount {
                expected: self.channels.len(),
                got: buffs.len(),
            });
        }
        let need = nsamps * self.cpu_item_size;
        if let Some(buff) = buffs.iter().find(|b| b.len() < need) {
            return Err(StreamError::BufferTooSmall {
                need,
                have: buff.len(),
            });
        }

        if md.has_time_spec && md.time_spec < TimeSpec::ZERO {
            return Err(StreamError::NegativeTime(md.time_spec.to_string()));
        }
        let deadline = crate::deadline_after(timeout);
        let time = md.has_time_spec.then_some(md.time_spec);

        if nsamps == 0 {
            if md.end_of_burst {
                let zeros = vec![0u8; self.cpu_item_size];
                let header = PacketHeader {
                    sob: md.start_of_burst,
                    eob: true,
                    time,
                };
                for index in 0..self.channels.len() {
                    self.send_packet(index, &zeros, 0, 1, &header, deadline)?;
                }
            }
            return Ok(0);
        }

        let mut sent = 0;
        while sent < nsamps {
            let n = self.spp.min(nsamps - sent);
            let header = PacketHeader {
                sob: md.start_of_burst && sent == 0,
                eob: md.end_of_burst && sent + n == nsamps,
                time: if sent == 0 { time } else { None },
            };
            for (index, buff) in buffs.iter().enumerate() {
                if !self.send_packet(index, buff, sent, n, &header, deadline)? {
                    tracing::debug!("TX timed out after {} of {} samples", sent, nsamps);
                    return Ok(sent);
                }
            }
            sent += n;
        }
        Ok(sent)
    }

    /// Wait up to `timeout` for a device report such as a burst ack
    pub fn recv_async_msg(&self, timeout: Duration) -> Option<AsyncMetadata> {
        self.async_queue.pop_with_timed_wait(timeout)
    }

    /// Reports dropped because nobody polled for them
    pub fn dropped_async_msgs(&self) -> usize {
        self.async_queue.evicted_count()
    }

    pub fn is_async_worker_running(&self) -> bool {
        self.async_worker.is_running()
    }

    fn send_packet(
        &mut self,
        index: usize,
        buff: &[u8],
        offset: usize,
        nsamps: usize,
        header: &PacketHeader,
        deadline: Instant,
    ) -> Result<bool, StreamError> {
        let chan = &mut self.channels[index];
        let payload_words = (nsamps * self.otw_item_size).div_ceil(4);

        let mut info = IfPacketInfo::data(chan.sid, payload_words);
        info.packet_count = chan.count;
        info.sob = header.sob;
        info.eob = header.eob;
        if let Some(time) = header.time {
            info.has_tsf = true;
            info.tsf = time.to_ticks(self.tick_rate) as u64;
        }

        let mut frame = BytesMut::zeroed((info.header_words32() + payload_words) * 4);
        vrt::pack(self.order, &mut frame, &mut info)?;

        let payload_start = info.num_header_words32 * 4;
        let inputs = [InputBuffer::with_offset(buff, offset)];
        let mut outputs = [OutputBuffer::new(&mut frame[payload_start..])];
        chan.converter.convert(&inputs, &mut outputs, nsamps);

        let wait = deadline.saturating_duration_since(Instant::now());
        match chan.transport.send(frame.freeze(), wait) {
            Ok(true) => {
                chan.count = (chan.count + 1) & 0xf;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                tracing::warn!("TX transport for channel {} closed: {}", index, e);
                Err(StreamError::TransportClosed)
            }
        }
    }
}
