//! Transport throughput benchmark
//!
//! Pushes sequence-numbered data packets through a send transport while a
//! second thread drains the matching receive transport and checks every
//! packet. Payload word `i` of packet `seq` carries `seq + i`.

use bytes::BytesMut;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::vrt::{self, IfPacketInfo};
use super::{RecvTransport, SendTransport};
use crate::convert::ByteOrder;
use crate::error::FramingError;

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// How long the send side keeps producing packets
    pub duration: Duration,
    /// Payload length of each packet in 32-bit words
    pub payload_words: usize,
    /// Per-operation transport timeout
    pub timeout: Duration,
    pub byte_order: ByteOrder,
    pub sid: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1),
            payload_words: 256,
            timeout: Duration::from_millis(100),
            byte_order: ByteOrder::Big,
            sid: 0x1000,
        }
    }
}

/// Counters gathered during one run
#[derive(Debug, Clone, Default)]
pub struct BenchmarkReport {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_timeouts: u64,
    pub rx_timeouts: u64,
    /// Packets whose sequence number was not the one expected
    pub seq_errors: u64,
    /// Packets that failed to parse or carried a corrupted payload
    pub data_errors: u64,
    pub rx_bytes: u64,
    pub elapsed: Duration,
}

impl BenchmarkReport {
    /// Received bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rx_bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Packets sent but never seen on the receive side
    pub fn dropped_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark results after {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  TX packets:    {}", self.tx_packets)?;
        writeln!(f, "  RX packets:    {}", self.rx_packets)?;
        writeln!(f, "  TX timeouts:   {}", self.tx_timeouts)?;
        writeln!(f, "  RX timeouts:   {}", self.rx_timeouts)?;
        writeln!(f, "  Seq errors:    {}", self.seq_errors)?;
        writeln!(f, "  Data errors:   {}", self.data_errors)?;
        write!(f, "  Throughput:    {:.2} MB/s", self.throughput() / 1e6)
    }
}

fn build_packet(config: &BenchmarkConfig, seq: u32) -> Result<BytesMut, FramingError> {
    let mut info = IfPacketInfo::data(config.sid, config.payload_words + 1);
    info.packet_count = (seq & 0xf) as u8;

    let words = info.header_words32() + info.num_payload_words32;
    let mut packet = BytesMut::zeroed(words * 4);
    vrt::pack(config.byte_order, &mut packet, &mut info)?;

    let mut offset = info.num_header_words32 * 4;
    config.byte_order.write_u32(seq, &mut packet[offset..]);
    for i in 0..config.payload_words as u32 {
        offset += 4;
        config.byte_order.write_u32(seq.wrapping_add(i), &mut packet[offset..]);
    }
    Ok(packet)
}

/// Check a received packet. Returns its sequence number when the payload is
/// intact.
fn verify_packet(config: &BenchmarkConfig, packet: &[u8]) -> Option<u32> {
    let info = vrt::unpack(config.byte_order, packet).ok()?;
    if info.num_payload_words32 != config.payload_words + 1 {
        return None;
    }
    let payload = vrt::payload(packet, &info);
    let seq = config.byte_order.read_u32(payload);
    if (seq & 0xf) as u8 != info.packet_count {
        return None;
    }
    let intact = payload[4..]
        .chunks_exact(4)
        .zip(0u32..)
        .all(|(word, i)| config.byte_order.read_u32(word) == seq.wrapping_add(i));
    intact.then_some(seq)
}

/// Run the benchmark over a transport pair. Fails up front when the payload
/// cannot be framed.
pub fn benchmark_throughput<S, R>(
    tx: &mut S,
    rx: &mut R,
    config: &BenchmarkConfig,
) -> Result<BenchmarkReport, FramingError>
where
    S: SendTransport + ?Sized,
    R: RecvTransport + ?Sized,
{
    build_packet(config, 0)?;
    let tx_done = AtomicBool::new(false);
    let start = Instant::now();

    let (tx_counts, rx_report) = std::thread::scope(|scope| {
        let tx_done = &tx_done;

        let sender = scope.spawn(move || {
            let mut packets = 0u64;
            let mut timeouts = 0u64;
            let mut seq = 0u32;
            while start.elapsed() < config.duration {
                let packet = match build_packet(config, seq) {
                    Ok(packet) => packet.freeze(),
                    Err(e) => {
                        tracing::error!("Benchmark framing failed: {}", e);
                        break;
                    }
                };
                match tx.send(packet, config.timeout) {
                    Ok(true) => {
                        packets += 1;
                        seq = seq.wrapping_add(1);
                    }
                    Ok(false) => timeouts += 1,
                    Err(e) => {
                        tracing::error!("Benchmark send failed: {}", e);
                        break;
                    }
                }
            }
            tx_done.store(true, Ordering::Release);
            (packets, timeouts)
        });

        let receiver = scope.spawn(move || {
            let mut report = BenchmarkReport::default();
            let mut expected: Option<u32> = None;
            loop {
                match rx.recv(config.timeout) {
                    Ok(Some(packet)) => {
                        report.rx_packets += 1;
                        report.rx_bytes += packet.len() as u64;
                        match verify_packet(config, &packet) {
                            Some(seq) => {
                                if expected.is_some_and(|e| e != seq) {
                                    report.seq_errors += 1;
                                }
                                expected = Some(seq.wrapping_add(1));
                            }
                            None => report.data_errors += 1,
                        }
                    }
                    Ok(None) => {
                        report.rx_timeouts += 1;
                        if tx_done.load(Ordering::Acquire) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Benchmark receive failed: {}", e);
                        break;
                    }
                }
            }
            report
        });

        let tx_counts = sender.join().unwrap_or_default();
        let rx_report = receiver.join().unwrap_or_default();
        (tx_counts, rx_report)
    });

    let report = BenchmarkReport {
        tx_packets: tx_counts.0,
        tx_timeouts: tx_counts.1,
        elapsed: start.elapsed(),
        ..rx_report
    };
    tracing::info!(
        tx = report.tx_packets,
        rx = report.rx_packets,
        seq_errors = report.seq_errors,
        data_errors = report.data_errors,
        "Transport benchmark finished"
    );
    Ok(report)
}
