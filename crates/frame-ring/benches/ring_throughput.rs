use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use frame_ring::ring::Ring;
use frame_ring::{ChannelNames, Detection, FrameConsumer, FrameProducer, Image, SlotLayout};
use tempfile::tempdir;

fn sizes() -> [(u32, u32, &'static str); 3] {
    [
        (320, 320, "320"),
        (640, 640, "640"), // deployed size, ~1.2MB per slot
        (1280, 720, "HD"),
    ]
}

fn detections(n: usize) -> Vec<Detection> {
    (0..n)
        .map(|i| Detection {
            class_id: (i % 80) as i32,
            confidence: 0.5,
            x: i as i32,
            y: i as i32,
            width: 32,
            height: 32,
        })
        .collect()
}

/// Produce and consume one frame on an in-memory region, no semaphores.
fn benchmark_ring_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_round_trip");

    for (width, height, label) in sizes() {
        let layout = SlotLayout::new(5, 200, width, height, 3).unwrap();
        let mut region = vec![0u8; layout.total_size()];
        let image = Image::new(width, height, 3, vec![128u8; layout.image_bytes()]);
        let dets = detections(20);

        group.throughput(Throughput::Bytes(layout.image_bytes() as u64));
        group.bench_with_input(BenchmarkId::new("produce_consume", label), &label, |b, _| {
            let mut ring = Ring::new(&mut region, layout).unwrap();
            ring.init();
            let mut frame_id = 0i32;
            b.iter(|| {
                ring.produce(black_box(frame_id), black_box(&image), black_box(&dets))
                    .unwrap();
                let consumed = ring.consume().unwrap();
                black_box(consumed);
                frame_id = frame_id.wrapping_add(1);
            });
        });
    }

    group.finish();
}

/// Full channel path: tokens, mutex, mapped region.
fn benchmark_channel_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_round_trip");

    for (width, height, label) in sizes() {
        let dir = tempdir().unwrap();
        let prefix = format!("frame_ring_bench_{}_{label}", std::process::id());
        let names = ChannelNames::with_prefix_in(dir.path(), &prefix);
        let layout = SlotLayout::new(5, 200, width, height, 3).unwrap();

        let mut producer = FrameProducer::create(&names, layout).unwrap();
        let mut consumer = FrameConsumer::attach(&names, layout).unwrap();
        let image = Image::new(width, height, 3, vec![128u8; layout.image_bytes()]);
        let dets = detections(20);

        group.throughput(Throughput::Bytes(layout.image_bytes() as u64));
        group.bench_with_input(BenchmarkId::new("write_read", label), &label, |b, _| {
            let mut frame_id = 0i32;
            b.iter(|| {
                producer
                    .write_frame(black_box(frame_id), black_box(&image), black_box(&dets))
                    .unwrap();
                black_box(consumer.read_frame().unwrap());
                frame_id = frame_id.wrapping_add(1);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_ring_round_trip,
    benchmark_channel_round_trip
);
criterion_main!(benches);
