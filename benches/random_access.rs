use std::io::{Cursor, Write};

use criterion::{black_box, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use flate2::write::GzEncoder;
use flate2::Compression;

use zseek::{BufferPolicy, RandomAccessReader, ReaderConfig};

const DATA_LEN: usize = 8 * 1024 * 1024;

fn compressed_sample() -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    let data: Vec<u8> = (0..DATA_LEN)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            b'a' + (state % 26) as u8
        })
        .collect();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&data).expect("compress");
    encoder.finish().expect("finish")
}

fn bench_read_at(c: &mut Criterion) {
    let compressed = compressed_sample();
    let mut group = c.benchmark_group("read_at");
    for &spacing in &[256 * 1024_usize, 1024 * 1024] {
        let config = ReaderConfig {
            checkpoint_spacing: spacing,
            ..ReaderConfig::default()
        };
        let mut reader =
            RandomAccessReader::from_handle_with_config(Cursor::new(compressed.clone()), config)
                .expect("reader");
        let mut buf = vec![0u8; 4096];
        let mut offset = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(spacing), &spacing, |b, _| {
            b.iter(|| {
                offset = (offset + 1_234_567) % (DATA_LEN as u64 - 4096);
                reader.read_at(black_box(offset), &mut buf).expect("read_at")
            });
        });
    }
    group.finish();
}

fn bench_byte_at(c: &mut Criterion) {
    let compressed = compressed_sample();
    let mut group = c.benchmark_group("byte_at");
    for policy in [BufferPolicy::FixedMargin, BufferPolicy::IndexAligned] {
        let config = ReaderConfig {
            buffer_policy: policy,
            backward_margin: 64 * 1024,
            forward_margin: 256 * 1024,
            ..ReaderConfig::default()
        };
        let mut reader =
            RandomAccessReader::from_handle_with_config(Cursor::new(compressed.clone()), config)
                .expect("reader");
        let mut pos = 0u64;
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter(|| {
                pos = (pos + 97) % DATA_LEN as u64;
                black_box(reader.byte_at(pos))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_read_at, bench_byte_at);
criterion_main!(benches);
