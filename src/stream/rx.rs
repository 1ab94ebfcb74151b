//! Receive streamer
//!
//! Pulls VRT packets from one transport per channel, checks sequence numbers
//! and time alignment across channels, and converts payloads into the
//! caller's buffers. A packet larger than the request is handed out in
//! fragments over several calls.
//!
//! Streaming conditions (timeout, overflow, dropped packets, misalignment)
//! come back in [`RxMetadata::error_code`]. Only misuse of the API and a
//! closed transport are `Err`.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::metadata::{RxErrorCode, RxMetadata};
use super::time_spec::TimeSpec;
use super::{StreamArgs, StreamCmd, StreamMode};
use crate::config::StreamerConfig;
use crate::convert::{self, ByteOrder, ConvertId, ConvertRegistry, Converter, InputBuffer, OutputBuffer};
use crate::error::StreamError;
use crate::fastpath;
use crate::transport::vrt::{self, IfPacketInfo, PacketType, MAX_IF_HDR_WORDS32};
use crate::transport::RecvTransport;

/// Forwards a stream command to the device channel given as first argument
pub type StreamCmdIssuer = Box<dyn FnMut(usize, &StreamCmd) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Continuous,
    Finite,
}

/// A received data packet not yet fully handed out
struct RxPacket {
    frame: Bytes,
    info: IfPacketInfo,
    nsamps: usize,
    /// Samples already returned
    cursor: usize,
    time: Option<TimeSpec>,
    out_of_sequence: bool,
}

impl RxPacket {
    fn remaining(&self) -> usize {
        self.nsamps - self.cursor
    }

    fn payload(&self) -> &[u8] {
        vrt::payload(&self.frame, &self.info)
    }
}

struct RxChannel {
    transport: Box<dyn RecvTransport>,
    converter: Box<dyn Converter>,
    last_count: Option<u8>,
    current: Option<RxPacket>,
}

/// A condition hit while fetching packets
struct PacketError {
    code: RxErrorCode,
    channel: usize,
    time: Option<TimeSpec>,
}

type Fetched = Result<(), PacketError>;

pub struct RxStreamer {
    channels: Vec<RxChannel>,
    device_channels: Vec<usize>,
    order: ByteOrder,
    otw_item_size: usize,
    cpu_item_size: usize,
    max_spp: usize,
    tick_rate: f64,
    samp_rate: f64,
    alignment_failure_threshold: usize,
    /// Reported by the next call after samples were already accumulated
    pending_error: Option<RxMetadata>,
    issuer: Option<StreamCmdIssuer>,
    state: RxState,
}

impl RxStreamer {
    /// Build a streamer with one transport per entry of `args.channels`.
    ///
    /// Fails when the format pair has no converter, the requested priority
    /// is not registered, or the channel count does not match.
    pub fn new(
        registry: &Arc<ConvertRegistry>,
        args: &StreamArgs,
        config: &StreamerConfig,
        transports: Vec<Box<dyn RecvTransport>>,
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
        let id = ConvertId::single(&otw_format, &args.cpu_format);
        let factory = registry.get_converter(&id, args.convert_priority()?)?;
        let otw_item_size = registry.get_bytes_per_item(&otw_format)?;
        let cpu_item_size = registry.get_bytes_per_item(&args.cpu_format)?;
        let scalar = args.fullscale(config.fullscale)? / convert::otw_peak(&args.otw_format);

        let channels = transports
            .into_iter()
            .map(|transport| {
                let mut converter = (*factory)();
                converter.set_scalar(scalar);
                RxChannel {
                    transport,
                    converter,
                    last_count: None,
                    current: None,
                }
            })
            .collect();

        let frame_spp = (config.recv_frame_size.saturating_sub(MAX_IF_HDR_WORDS32 * 4)) / otw_item_size;
        let max_spp = args
            .arg::<usize>("spp")?
            .unwrap_or(config.samples_per_packet)
            .min(frame_spp);

        tracing::info!(
            "RX streamer: {} on {} channel(s), {} samples per packet",
            id,
            args.channels.len(),
            max_spp
        );

        Ok(Self {
            channels,
            device_channels: args.channels.clone(),
            order,
            otw_item_size,
            cpu_item_size,
            max_spp,
            tick_rate: config.tick_rate,
            samp_rate: args.arg("samp_rate")?.unwrap_or(0.0),
            alignment_failure_threshold: config.alignment_failure_threshold,
            pending_error: None,
            issuer: None,
            state: RxState::Idle,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Largest number of samples a single packet carries
    pub fn max_num_samps(&self) -> usize {
        self.max_spp
    }

    /// Sample rate used to time-stamp fragments; zero leaves fragment times
    /// at the packet time.
    pub fn set_samp_rate(&mut self, samp_rate: f64) {
        self.samp_rate = samp_rate;
    }

    pub fn set_tick_rate(&mut self, tick_rate: f64) {
        self.tick_rate = tick_rate;
    }

    pub fn set_stream_cmd_issuer(&mut self, issuer: StreamCmdIssuer) {
        self.issuer = Some(issuer);
    }

    /// Forward `cmd` to every channel and track the streaming mode
    pub fn issue_stream_cmd(&mut self, cmd: &StreamCmd) {
        self.state = match cmd.mode {
            StreamMode::StartContinuous => RxState::Continuous,
            StreamMode::StopContinuous => RxState::Idle,
            StreamMode::NumSampsAndDone | StreamMode::NumSampsAndMore => RxState::Finite,
        };
        match self.issuer.as_mut() {
            Some(issuer) => {
                for &chan in &self.device_channels {
                    issuer(chan, cmd);
                }
            }
            None => tracing::debug!("No stream command issuer set, {:?} not forwarded", cmd.mode),
        }
    }

    /// Restart continuous streaming after the device reported an overflow
    fn handle_overflow(&mut self) {
        if self.state != RxState::Continuous {
            return;
        }
        if let Some(issuer) = self.issuer.as_mut() {
            let cmd = StreamCmd::new(StreamMode::StartContinuous);
            for &chan in &self.device_channels {
                issuer(chan, &cmd);
            }
        }
    }

    /// Receive up to `nsamps` samples per channel into `buffs`.
    ///
    /// Blocks at most about `timeout`. Returns the number of samples written
    /// to each buffer; `md` describes the first of them. With `one_packet`
    /// the call returns after the samples of a single packet.
    pub fn recv(
        &mut self,
        buffs: &mut [&mut [u8]],
        nsamps: usize,
        md: &mut RxMetadata,
        timeout: Duration,
        one_packet: bool,
    ) -> Result<usize, StreamError> {
        md.reset();
        if let Some(pending) = self.pending_error.take() {
            *md = pending;
            return Ok(0);
        }

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

        let deadline = crate::deadline_after(timeout);
        let mut accum = 0;

        loop {
            if self.channels.iter().any(|c| c.current.is_none()) {
                if let Err(err) = self.fetch_aligned(deadline)? {
                    self.report(err, accum, md);
                    return Ok(accum);
                }
            }

            let packets = || self.channels.iter().filter_map(|c| c.current.as_ref());
            let Some(remaining) = packets().map(RxPacket::remaining).min() else {
                return Ok(accum);
            };
            let out_of_sequence = packets().any(|p| p.out_of_sequence);
            // a gap is reported at the start of a call
            if accum > 0 && out_of_sequence {
                return Ok(accum);
            }

            let take = remaining.min(nsamps - accum);
            if accum == 0 {
                self.describe_first(md);
            }
            self.convert_from_current(buffs, accum, take);
            accum += take;

            let finished = self.advance(take);
            if let Some(eob) = finished {
                if eob {
                    md.end_of_burst = true;
                    if self.state == RxState::Finite {
                        self.state = RxState::Idle;
                    }
                    return Ok(accum);
                }
            } else {
                md.more_fragments = true;
            }

            if one_packet || out_of_sequence || accum == nsamps {
                return Ok(accum);
            }
        }
    }

    /// Fill time, burst flags and fragment offset from the current packet
    fn describe_first(&self, md: &mut RxMetadata) {
        let Some(packet) = &self.channels[0].current else {
            return;
        };
        md.channel = 0;
        md.fragment_offset = packet.cursor;
        md.start_of_burst = packet.info.sob && packet.cursor == 0;
        md.out_of_sequence = self
            .channels
            .iter()
            .filter_map(|c| c.current.as_ref())
            .any(|p| p.out_of_sequence);
        if md.out_of_sequence {
            md.error_code = RxErrorCode::Overflow;
        }
        if let Some(time) = packet.time {
            md.has_time_spec = true;
            md.time_spec = if self.samp_rate > 0.0 && packet.cursor > 0 {
                time + packet.cursor as f64 / self.samp_rate
            } else {
                time
            };
        }
    }

    fn convert_from_current(&mut self, buffs: &mut [&mut [u8]], accum: usize, take: usize) {
        for (chan, buff) in self.channels.iter_mut().zip(buffs.iter_mut()) {
            let Some(packet) = chan.current.as_ref() else {
                continue;
            };
            let inputs = [InputBuffer::with_offset(packet.payload(), packet.cursor)];
            let mut outputs = [OutputBuffer::with_offset(&mut buff[..], accum)];
            chan.converter.convert(&inputs, &mut outputs, take);
        }
    }

    /// Move every channel's cursor forward. Returns `Some(eob)` when the
    /// packets were used up.
    fn advance(&mut self, take: usize) -> Option<bool> {
        let mut finished = None;
        for chan in &mut self.channels {
            if let Some(packet) = chan.current.as_mut() {
                packet.cursor += take;
                packet.out_of_sequence = false;
                if packet.remaining() == 0 {
                    finished = Some(packet.info.eob);
                    chan.current = None;
                }
            }
        }
        finished
    }

    /// Put an error into `md`, or keep it for the next call when samples
    /// were already accumulated
    fn report(&mut self, err: PacketError, accum: usize, md: &mut RxMetadata) {
        let mut err_md = RxMetadata {
            channel: err.channel,
            error_code: err.code,
            ..Default::default()
        };
        if let Some(time) = err.time {
            err_md.has_time_spec = true;
            err_md.time_spec = time;
        }

        if accum == 0 {
            *md = err_md;
        } else if err.code != RxErrorCode::Timeout {
            self.pending_error = Some(err_md);
        }
    }

    /// Make sure every channel holds a packet and that all of them carry
    /// the same timestamp. Older packets are dropped until they line up.
    fn fetch_aligned(&mut self, deadline: Instant) -> Result<Fetched, StreamError> {
        let mut attempts = 0;
        loop {
            for index in 0..self.channels.len() {
                if self.channels[index].current.is_none() {
                    if let Err(err) = self.fetch_packet(index, deadline)? {
                        return Ok(Err(err));
                    }
                }
            }

            let newest = self
                .channels
                .iter()
                .filter_map(|c| c.current.as_ref())
                .filter(|p| p.info.has_tsf)
                .map(|p| p.info.tsf)
                .max();
            let Some(newest) = newest else {
                return Ok(Ok(()));
            };

            let mut aligned = true;
            for chan in &mut self.channels {
                if chan.current.as_ref().is_some_and(|p| p.info.has_tsf && p.info.tsf < newest) {
                    chan.current = None;
                    aligned = false;
                }
            }
            if aligned {
                return Ok(Ok(()));
            }

            attempts += 1;
            if attempts > self.alignment_failure_threshold {
                tracing::warn!("Failed to align {} channels after {} attempts", self.channels.len(), attempts);
                for chan in &mut self.channels {
                    chan.current = None;
                }
                return Ok(Err(PacketError {
                    code: RxErrorCode::Alignment,
                    channel: 0,
                    time: None,
                }));
            }
        }
    }

    /// Receive and classify the next packet of one channel
    fn fetch_packet(&mut self, index: usize, deadline: Instant) -> Result<Fetched, StreamError> {
        let order = self.order;
        let tick_rate = self.tick_rate;
        let otw_item_size = self.otw_item_size;
        let chan = &mut self.channels[index];

        let wait = deadline.saturating_duration_since(Instant::now());
        let frame = match chan.transport.recv(wait) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Ok(Err(PacketError {
                    code: RxErrorCode::Timeout,
                    channel: index,
                    time: None,
                }))
            }
            Err(e) => {
                tracing::warn!("RX transport for channel {} closed: {}", index, e);
                return Err(StreamError::TransportClosed);
            }
        };

        let info = match vrt::unpack(order, &frame) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("Bad packet on channel {}: {}", index, e);
                return Ok(Err(PacketError {
                    code: RxErrorCode::BadPacket,
                    channel: index,
                    time: None,
                }));
            }
        };
        let time = info.has_tsf.then(|| TimeSpec::from_ticks(info.tsf as i64, tick_rate));

        if info.packet_type == PacketType::Context {
            let payload = vrt::payload(&frame, &info);
            let code = if payload.len() >= 4 {
                RxErrorCode::from_raw(order.read_u32(payload) & 0xff).unwrap_or(RxErrorCode::BadPacket)
            } else {
                RxErrorCode::BadPacket
            };
            if code == RxErrorCode::Overflow {
                // the device restarts its packet count after an overflow
                chan.last_count = None;
                fastpath('O');
                self.handle_overflow();
            }
            return Ok(Err(PacketError {
                code,
                channel: index,
                time,
            }));
        }

        let expected = chan.last_count.map(|count| (count + 1) & 0xf);
        let out_of_sequence = expected.is_some_and(|e| e != info.packet_count);
        if out_of_sequence {
            fastpath('D');
            tracing::debug!(
                "Channel {} expected packet {:?}, got {}",
                index,
                expected,
                info.packet_count
            );
        }
        chan.last_count = Some(info.packet_count);

        let nsamps = info.num_payload_bytes / otw_item_size;
        chan.current = Some(RxPacket {
            frame,
            info,
            nsamps,
            cursor: 0,
            time,
            out_of_sequence,
        });
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::metadata::TxMetadata;
    use crate::stream::tx::TxStreamer;
    use crate::transport::{loopback, ChannelSender, SendTransport};
    use parking_lot::Mutex;

    fn registry() -> Arc<ConvertRegistry> {
        Arc::new(ConvertRegistry::with_defaults())
    }

    fn fc32_bytes(samples: &[(f32, f32)]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|(i, q)| i.to_ne_bytes().into_iter().chain(q.to_ne_bytes()))
            .collect()
    }

    fn fc32_samples(bytes: &[u8]) -> Vec<(f32, f32)> {
        bytes
            .chunks_exact(8)
            .map(|c| {
                (
                    f32::from_ne_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_ne_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Device side: sc16 data packets written by hand
    struct FakeDevice {
        tx: ChannelSender,
        order: ByteOrder,
        count: u8,
    }

    impl FakeDevice {
        fn send_data(&mut self, samples: &[(i16, i16)], tsf: Option<u64>, eob: bool) {
            let mut info = IfPacketInfo::data(0x10, samples.len());
            info.packet_count = self.count;
            info.has_tsf = tsf.is_some();
            info.tsf = tsf.unwrap_or(0);
            info.eob = eob;
            self.count = (self.count + 1) & 0xf;

            let mut frame = vec![0u8; (info.header_words32() + samples.len()) * 4];
            vrt::pack(self.order, &mut frame, &mut info).unwrap();
            for (k, (i, q)) in samples.iter().enumerate() {
                let word = ((*i as u16 as u32) << 16) | *q as u16 as u32;
                self.order.write_u32(word, &mut frame[(info.num_header_words32 + k) * 4..]);
            }
            assert!(self.tx.send(frame.into(), Duration::from_millis(100)).unwrap());
        }

        fn send_context(&mut self, code: RxErrorCode) {
            let mut info = IfPacketInfo::context(0, 1);
            let mut frame = vec![0u8; (info.header_words32() + 1) * 4];
            vrt::pack(self.order, &mut frame, &mut info).unwrap();
            self.order.write_u32(code as u32, &mut frame[info.num_header_words32 * 4..]);
            assert!(self.tx.send(frame.into(), Duration::from_millis(100)).unwrap());
        }
    }

    fn sc16_streamer(num_channels: usize) -> (RxStreamer, Vec<FakeDevice>) {
        let mut transports: Vec<Box<dyn RecvTransport>> = Vec::new();
        let mut devices = Vec::new();
        for _ in 0..num_channels {
            let (tx, rx) = loopback(64);
            transports.push(Box::new(rx));
            devices.push(FakeDevice {
                tx,
                order: ByteOrder::Big,
                count: 0,
            });
        }
        let args = StreamArgs::new("fc32", "sc16").with_channels((0..num_channels).collect());
        let config = StreamerConfig {
            alignment_failure_threshold: 4,
            ..Default::default()
        };
        let streamer = RxStreamer::new(&registry(), &args, &config, transports).unwrap();
        (streamer, devices)
    }

    #[test]
    fn test_timeout_returns_zero_samples() {
        let (mut streamer, _devices) = sc16_streamer(1);
        let mut buff = vec![0u8; 100 * 8];
        let mut md = RxMetadata::default();

        let start = Instant::now();
        let n = streamer
            .recv(&mut [&mut buff[..]], 100, &mut md, Duration::from_millis(100), false)
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::Timeout);
        assert!(elapsed >= Duration::from_millis(90), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "returned after {:?}", elapsed);
    }

    #[test]
    fn test_receives_and_scales_sc16() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[(32767, -32767), (0, 16384)], Some(250_000_000), false);

        let mut buff = vec![0u8; 2 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 2, &mut md, Duration::from_secs(1), false)
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(md.error_code, RxErrorCode::None);
        assert!(md.has_time_spec);
        assert_eq!(md.time_spec, TimeSpec::new(2, 0.5));
        let samples = fc32_samples(&buff);
        assert!(close(samples[0].0, 1.0) && close(samples[0].1, -1.0));
        assert!((samples[1].1 - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_unbounded_timeout_returns_ready_packet() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[(100, -100), (200, -200)], None, false);

        let mut buff = vec![0u8; 2 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 2, &mut md, Duration::MAX, false)
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(md.error_code, RxErrorCode::None);
    }

    #[test]
    fn test_fragments_span_calls() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        streamer.set_samp_rate(1e6);
        let samples: Vec<(i16, i16)> = (0..10).map(|n| (n, -n)).collect();
        devices[0].send_data(&samples, Some(100_000_000), true);

        let mut buff = vec![0u8; 4 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 4, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 4);
        assert!(md.more_fragments);
        assert_eq!(md.fragment_offset, 0);
        assert!(!md.end_of_burst);

        let n = streamer
            .recv(&mut [&mut buff[..]], 4, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(md.fragment_offset, 4);
        assert!((md.time_spec.real_secs() - 1.000_004).abs() < 1e-9);
        assert!(close(fc32_samples(&buff)[0].0, 4.0 / 32767.0));

        let n = streamer
            .recv(&mut [&mut buff[..]], 4, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 2);
        assert!(!md.more_fragments);
        assert!(md.end_of_burst);
    }

    #[test]
    fn test_accumulates_across_packets_unless_one_packet() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[(1, 1); 3], None, false);
        devices[0].send_data(&[(2, 2); 3], None, false);
        devices[0].send_data(&[(3, 3); 3], None, false);

        let mut buff = vec![0u8; 6 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 6, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 6);
        assert!(close(fc32_samples(&buff)[3].0, 2.0 / 32767.0));

        let n = streamer
            .recv(&mut [&mut buff[..]], 6, &mut md, Duration::from_secs(1), true)
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_sequence_gap_is_flagged_but_delivered() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[(1, 1); 2], None, false);
        devices[0].count = 5;
        devices[0].send_data(&[(2, 2); 2], None, false);

        let mut buff = vec![0u8; 8 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 8, &mut md, Duration::from_millis(50), false)
            .unwrap();
        assert_eq!(n, 2);
        assert!(!md.out_of_sequence);

        let n = streamer
            .recv(&mut [&mut buff[..]], 8, &mut md, Duration::from_millis(50), false)
            .unwrap();
        assert_eq!(n, 2);
        assert!(md.out_of_sequence);
        assert_eq!(md.error_code, RxErrorCode::Overflow);
        assert!(close(fc32_samples(&buff)[0].0, 2.0 / 32767.0));
    }

    #[test]
    fn test_overflow_restarts_continuous_streaming() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        let issued = Arc::new(Mutex::new(Vec::new()));
        let log = issued.clone();
        streamer.set_stream_cmd_issuer(Box::new(move |chan, cmd| log.lock().push((chan, cmd.mode))));

        streamer.issue_stream_cmd(&StreamCmd::new(StreamMode::StartContinuous));
        devices[0].send_context(RxErrorCode::Overflow);

        let mut buff = vec![0u8; 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 1, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::Overflow);
        assert_eq!(
            *issued.lock(),
            vec![(0, StreamMode::StartContinuous), (0, StreamMode::StartContinuous)]
        );
    }

    #[test]
    fn test_error_after_samples_is_queued() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[(1, 1); 2], None, false);
        devices[0].send_context(RxErrorCode::LateCommand);

        let mut buff = vec![0u8; 4 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 4, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(md.error_code, RxErrorCode::None);

        let n = streamer
            .recv(&mut [&mut buff[..]], 4, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::LateCommand);
    }

    #[test]
    fn test_multi_channel_alignment_drops_older_packets() {
        let (mut streamer, mut devices) = sc16_streamer(2);
        devices[0].send_data(&[(1, 1); 2], Some(100), false);
        devices[0].send_data(&[(2, 2); 2], Some(200), false);
        devices[1].send_data(&[(9, 9); 2], Some(200), false);

        let mut a = vec![0u8; 2 * 8];
        let mut b = vec![0u8; 2 * 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut a[..], &mut b[..]], 2, &mut md, Duration::from_secs(1), false)
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(md.time_spec, TimeSpec::from_ticks(200, 100e6));
        assert!(close(fc32_samples(&a)[0].0, 2.0 / 32767.0));
        assert!(close(fc32_samples(&b)[0].0, 9.0 / 32767.0));
    }

    #[test]
    fn test_multi_channel_alignment_gives_up() {
        let (mut streamer, mut devices) = sc16_streamer(2);
        for n in 0..8u64 {
            devices[0].send_data(&[(1, 1)], Some(n * 2), false);
            devices[1].send_data(&[(1, 1)], Some(n * 2 + 1), false);
        }

        let mut a = vec![0u8; 8];
        let mut b = vec![0u8; 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut a[..], &mut b[..]], 1, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::Alignment);
    }

    #[test]
    fn test_zero_sample_eob() {
        let (mut streamer, mut devices) = sc16_streamer(1);
        devices[0].send_data(&[], None, true);

        let mut buff = vec![0u8; 8];
        let mut md = RxMetadata::default();
        let n = streamer
            .recv(&mut [&mut buff[..]], 1, &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 0);
        assert!(md.end_of_burst);
        assert_eq!(md.error_code, RxErrorCode::None);
    }

    #[test]
    fn test_setup_errors() {
        let (_tx, rx) = loopback(1);
        let args = StreamArgs::new("fc32", "sc7");
        let result = RxStreamer::new(&registry(), &args, &StreamerConfig::default(), vec![Box::new(rx)]);
        assert!(matches!(result, Err(crate::Error::Convert(_))));

        let args = StreamArgs::new("fc32", "sc16").with_channels(vec![0, 1]);
        let (_tx, rx) = loopback(1);
        let result = RxStreamer::new(&registry(), &args, &StreamerConfig::default(), vec![Box::new(rx)]);
        assert!(matches!(
            result,
            Err(crate::Error::Stream(StreamError::ChannelCount { expected: 2, got: 1 }))
        ));

        let (mut streamer, _devices) = sc16_streamer(1);
        let mut small = vec![0u8; 4];
        let mut md = RxMetadata::default();
        assert!(matches!(
            streamer.recv(&mut [&mut small[..]], 2, &mut md, Duration::ZERO, false),
            Err(StreamError::BufferTooSmall { need: 16, have: 4 })
        ));
    }

    #[test]
    fn test_closed_transport_is_an_error() {
        let (mut streamer, devices) = sc16_streamer(1);
        drop(devices);
        let mut buff = vec![0u8; 8];
        let mut md = RxMetadata::default();
        assert!(matches!(
            streamer.recv(&mut [&mut buff[..]], 1, &mut md, Duration::from_millis(10), false),
            Err(StreamError::TransportClosed)
        ));
    }

    #[test]
    fn test_sc12_loopback_from_tx() {
        let registry = registry();
        let config = StreamerConfig::default();
        let (tx_link, rx_link) = loopback(64);
        let (_async_tx, async_rx) = loopback(4);

        let args = StreamArgs::new("fc32", "sc12").with_arg("spp", 8);
        let mut tx = TxStreamer::new(&registry, &args, &config, vec![Box::new(tx_link)], Box::new(async_rx)).unwrap();
        let mut rx = RxStreamer::new(&registry, &args, &config, vec![Box::new(rx_link)]).unwrap();

        let input: Vec<(f32, f32)> = (0..20)
            .map(|n| ((n as f32 / 20.0) - 0.5, 0.5 - (n as f32 / 40.0)))
            .collect();
        let bytes = fc32_bytes(&input);
        let md = TxMetadata {
            start_of_burst: true,
            end_of_burst: true,
            ..Default::default()
        };
        assert_eq!(tx.send(&[&bytes[..]], input.len(), &md, Duration::from_secs(1)).unwrap(), 20);

        let mut out = vec![0u8; 20 * 8];
        let mut received = 0;
        let mut rx_md = RxMetadata::default();
        while received < 20 {
            let mut buffs = [&mut out[received * 8..]];
            let n = rx
                .recv(&mut buffs, 20 - received, &mut rx_md, Duration::from_secs(1), false)
                .unwrap();
            assert_eq!(rx_md.error_code, RxErrorCode::None);
            received += n;
            if rx_md.end_of_burst {
                break;
            }
        }
        assert_eq!(received, 20);
        for (got, want) in fc32_samples(&out).iter().zip(&input) {
            assert!((got.0 - want.0).abs() <= 0.5 / 2047.0 + 1e-6);
            assert!((got.1 - want.1).abs() <= 0.5 / 2047.0 + 1e-6);
        }
    }
}
