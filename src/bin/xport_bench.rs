//! Transport Benchmark
//!
//! Measures UDP throughput between two local sockets using sequence-numbered
//! VRT packets.
//!
//! Usage: `xport_bench [duration_secs] [payload_words] [config.toml]`

use anyhow::{Context, Result};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdr_streamer::{
    transport::{
        benchmarker::{benchmark_throughput, BenchmarkConfig},
        create_socket, UdpTransport,
    },
    StreamerConfig,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let duration_secs: f64 = match args.next() {
        Some(arg) => arg.parse().context("duration must be a number of seconds")?,
        None => 2.0,
    };
    let payload_words: usize = match args.next() {
        Some(arg) => arg.parse().context("payload_words must be an integer")?,
        None => 364,
    };
    let config = match args.next() {
        Some(path) => StreamerConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => StreamerConfig::load_default()?,
    };

    let max_words = config.udp.frame_size / 4 - sdr_streamer::transport::vrt::MAX_IF_HDR_WORDS32 - 1;
    anyhow::ensure!(
        payload_words <= max_words,
        "payload of {} words does not fit a {} byte frame",
        payload_words,
        config.udp.frame_size
    );

    let any_local: SocketAddr = "127.0.0.1:0".parse()?;
    let rx_socket: UdpSocket = create_socket(any_local, &config.udp)?.into();
    let rx_addr = rx_socket.local_addr()?;
    let tx_socket: UdpSocket = create_socket(any_local, &config.udp)?.into();
    tx_socket.connect(rx_addr)?;

    tracing::info!(
        "Benchmarking UDP {} -> {} for {:.1}s, {} payload words",
        tx_socket.local_addr()?,
        rx_addr,
        duration_secs,
        payload_words
    );

    let mut tx = UdpTransport::from_socket(tx_socket, config.udp.frame_size);
    let mut rx = UdpTransport::from_socket(rx_socket, config.udp.frame_size);

    let bench = BenchmarkConfig {
        duration: Duration::from_secs_f64(duration_secs),
        payload_words,
        byte_order: config.byte_order,
        ..Default::default()
    };
    let report = benchmark_throughput(&mut tx, &mut rx, &bench)?;

    println!("\n=== Transport Benchmark ===");
    println!("{}", report);
    println!("  Dropped:       {}", report.dropped_packets());

    Ok(())
}
