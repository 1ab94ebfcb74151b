//! Converter throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sdr_streamer::convert::{
    ConvertId, ConvertRegistry, InputBuffer, OutputBuffer, PRIORITY_GENERAL, PRIORITY_TABLE,
};

const NSAMPS: usize = 4096;

fn bench_unpack(c: &mut Criterion) {
    let registry = ConvertRegistry::with_defaults();
    let mut group = c.benchmark_group("otw_to_fc32");
    group.throughput(Throughput::Elements(NSAMPS as u64));

    let cases = [
        ("sc16_item32_be", Some(PRIORITY_GENERAL), 4),
        ("sc16_item32_be", Some(PRIORITY_TABLE), 4),
        ("sc12_item32_le", None, 3),
    ];
    for (otw, priority, item_size) in cases {
        let mut converter = registry
            .make_converter(&ConvertId::single(otw, "fc32"), priority)
            .unwrap();
        converter.set_scalar(1.0 / 32767.0);

        let input: Vec<u8> = (0..NSAMPS * item_size).map(|n| (n * 31) as u8).collect();
        let mut output = vec![0u8; NSAMPS * 8];
        let label = format!("{}@{}", otw, priority.map_or("best".to_string(), |p| p.to_string()));

        group.bench_with_input(BenchmarkId::from_parameter(label), &input, |b, input| {
            b.iter(|| {
                converter.convert(
                    &[InputBuffer::new(black_box(input))],
                    &mut [OutputBuffer::new(&mut output)],
                    NSAMPS,
                );
            })
        });
    }
    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let registry = ConvertRegistry::with_defaults();
    let mut group = c.benchmark_group("fc32_to_otw");
    group.throughput(Throughput::Elements(NSAMPS as u64));

    let input: Vec<u8> = (0..NSAMPS * 2)
        .flat_map(|n| ((n as f32 / NSAMPS as f32) - 1.0).to_ne_bytes())
        .collect();

    for (otw, item_size) in [("sc16_item32_be", 4), ("sc12_item32_le", 3)] {
        let mut converter = registry
            .make_converter(&ConvertId::single("fc32", otw), None)
            .unwrap();
        converter.set_scalar(2047.0);
        let mut output = vec![0u8; NSAMPS * item_size];

        group.bench_function(otw, |b| {
            b.iter(|| {
                converter.convert(
                    &[InputBuffer::new(black_box(&input))],
                    &mut [OutputBuffer::new(&mut output)],
                    NSAMPS,
                );
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_unpack, bench_pack);
criterion_main!(benches);
