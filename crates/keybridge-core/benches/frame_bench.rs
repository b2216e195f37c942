//! Criterion benchmarks for the frame codec and the device log assembler.
//!
//! Run with:
//! ```bash
//! cargo bench --package keybridge-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keybridge_core::{
    decode_frame, encode_frame, HidEvent, KeyboardFlags, LineAssembler, ModifierFlags,
};

fn bench_encode(c: &mut Criterion) {
    let keyboard = HidEvent::keyboard(
        0x04,
        ModifierFlags(ModifierFlags::LEFT_SHIFT),
        KeyboardFlags::NONE,
        false,
    );
    let consumer = HidEvent::consumer(0x00CD, true);

    let mut group = c.benchmark_group("encode_frame");
    group.bench_function("keyboard", |b| b.iter(|| encode_frame(black_box(&keyboard))));
    group.bench_function("consumer", |b| b.iter(|| encode_frame(black_box(&consumer))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let bytes = *encode_frame(&HidEvent::consumer(0x00E9, false)).as_bytes();
    c.bench_function("decode_frame", |b| b.iter(|| decode_frame(black_box(&bytes))));
}

fn bench_line_assembler(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_assembler");

    // Typical firmware chatter: short CRLF-terminated lines.
    let chatter: Vec<u8> = (0..64)
        .flat_map(|i| format!("hid: report sent seq={i}\r\n").into_bytes())
        .collect();
    // A runaway device that never sends a line feed.
    let runaway = vec![b'x'; 64 * 1024];

    for (name, data) in [("chatter", &chatter), ("runaway", &runaway)] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), data, |b, data| {
            b.iter(|| {
                let mut assembler = LineAssembler::new();
                let mut lines = 0usize;
                for chunk in data.chunks(256) {
                    assembler.feed(chunk, |_| lines += 1);
                }
                black_box(lines)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_line_assembler);
criterion_main!(benches);
