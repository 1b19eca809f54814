//! Throughput benchmarks for JPEG frame scanning.
//!
//! A 640x480 stream at 15 fps produces roughly 40 KB frames; the relay must
//! scan them far faster than real time.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench frame_scan_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gatehouse_protocol::{FrameScanner, MjpegCodec};
use std::hint::black_box;
use tokio_util::codec::Decoder;

/// Build `count` frames with `body_len` bytes of pseudo-random body each.
fn synthetic_stream(count: usize, body_len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(count * (body_len + 4));
    let mut seed: u32 = 0x9E37_79B9;
    for _ in 0..count {
        stream.extend_from_slice(&[0xFF, 0xD8]);
        for _ in 0..body_len {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            // Keep bodies free of 0xFF so no marker appears inside them.
            stream.push((seed as u8) & 0xFE);
        }
        stream.extend_from_slice(&[0xFF, 0xD9]);
    }
    stream
}

fn bench_scan_by_chunk_size(c: &mut Criterion) {
    let stream = synthetic_stream(30, 40 * 1024);
    let mut group = c.benchmark_group("scan_chunked");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [4 * 1024, 64 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut scanner = FrameScanner::new();
                let mut frames = 0;
                for piece in stream.chunks(chunk) {
                    scanner.feed(black_box(piece));
                    frames += scanner.drain_frames().count();
                }
                black_box(frames);
            });
        });
    }

    group.finish();
}

fn bench_codec_decode(c: &mut Criterion) {
    let stream = synthetic_stream(30, 40 * 1024);
    let mut group = c.benchmark_group("codec_decode");
    group.throughput(Throughput::Elements(30));

    group.bench_function("decode_30_frames", |b| {
        b.iter(|| {
            let mut codec = MjpegCodec::new();
            let mut buffer = BytesMut::from(&stream[..]);
            let mut frames = 0;
            while let Ok(Some(frame)) = codec.decode(&mut buffer) {
                frames += 1;
                black_box(frame);
            }
            black_box(frames);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan_by_chunk_size, bench_codec_decode);
criterion_main!(benches);
