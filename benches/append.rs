use criterion::*;
use std::hint::black_box;

use taskstream::PendingStream;

mod common;
use common::*;

fn append_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    group.bench_function("single_lane_100k", |b| {
        b.iter_batched(
            || PendingStream::<Payload>::new(1),
            |mut stream| {
                let mut writer = stream.lane_writer(0).unwrap();
                for index in 0..RECORDS_LARGE {
                    writer.write(payload(index));
                }
                black_box(stream);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("four_lanes_threaded_100k", |b| {
        b.iter_batched(
            || PendingStream::<Payload>::new(4),
            |mut stream| {
                std::thread::scope(|scope| {
                    for writer in stream.split_writers() {
                        scope.spawn(move || {
                            let mut writer = writer;
                            for index in 0..RECORDS_LARGE / 4 {
                                writer.write(payload(index));
                            }
                        });
                    }
                });
                black_box(stream);
            },
            BatchSize::LargeInput,
        );
    });

    // Steady-state frames never allocate: writes land in retained blocks.
    group.bench_function("reused_blocks_10k", |b| {
        let mut stream = PendingStream::<Payload>::new(1);
        b.iter(|| {
            let mut writer = stream.lane_writer(0).unwrap();
            for index in 0..RECORDS_SMALL {
                writer.write(payload(index));
            }
            drop(writer);
            black_box(stream.count());
            stream.clear();
        });
    });

    group.finish();
}

criterion_group!(benches, append_benchmark);
criterion_main!(benches);
