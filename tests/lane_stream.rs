use taskstream::{lane_count_for_pool, LaneBoundsError, PendingStream};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Sample {
    lane_tag: u32,
    sequence: u64,
}

#[test]
fn concurrent_lane_writes_are_never_lost_or_duplicated() {
    let per_lane: [usize; 4] = [1_000, 2_000, 3_000, 4_000];
    let mut stream: PendingStream<Sample> = PendingStream::new(4);

    std::thread::scope(|scope| {
        for (writer, &target) in stream.split_writers().into_iter().zip(per_lane.iter()) {
            scope.spawn(move || {
                let mut writer = writer;
                let lane_tag = writer.lane_index();
                for sequence in 0..target as u64 {
                    writer.write(Sample { lane_tag, sequence });
                }
            });
        }
    });

    let total: usize = per_lane.iter().sum();
    assert_eq!(stream.count(), total);
    for (lane, &target) in per_lane.iter().enumerate() {
        let reader = stream.lane_reader(lane as u32).unwrap();
        assert_eq!(reader.remaining(), target);
    }
}

#[test]
fn unchecked_writers_cover_the_pool_lanes() {
    let lane_count = lane_count_for_pool();
    let stream: PendingStream<u64> = {
        let mut stream = PendingStream::new(lane_count);

        // Main thread owns lane 0; its writer is dropped before the pool
        // broadcast starts, so no two writers are ever live together.
        {
            let mut main_writer = stream.lane_writer(0).unwrap();
            for value in 0..10u64 {
                main_writer.write(value);
            }
        }

        let writer_set = stream.writer_set();
        rayon::broadcast(|ctx| {
            let lane = ctx.index() as u32 + 1;
            let mut writer = unsafe { writer_set.writer_unchecked(lane) };
            for value in 0..1_000u64 {
                writer.write(value);
            }
        });
        stream
    };

    let workers = lane_count as usize - 1;
    assert_eq!(stream.count(), workers * 1_000 + 10);
}

#[test]
fn iteration_is_lane_major_in_write_order() {
    let mut stream: PendingStream<u64> = PendingStream::new(2);

    stream.lane_writer(0).unwrap().write(10); // a
    stream.lane_writer(1).unwrap().write(30); // c, written before b
    stream.lane_writer(0).unwrap().write(20); // b

    // Lane 0 first in write order, then lane 1 — regardless of the
    // interleaving of writes across lanes.
    assert_eq!(stream.to_vec(), vec![10, 20, 30]);
}

#[test]
fn clear_retains_blocks_and_reuses_capacity() {
    let mut stream: PendingStream<u64> = PendingStream::with_block_capacity(2, 4);

    {
        let mut writer = stream.lane_writer(0).unwrap();
        for value in 0..10 {
            writer.write(value);
        }
    }
    {
        let mut writer = stream.lane_writer(1).unwrap();
        for value in 0..5 {
            writer.write(value);
        }
    }

    assert_eq!(stream.count(), 15);
    let blocks_after_first_fill = stream.block_count();
    assert_eq!(blocks_after_first_fill, 3 + 2);

    stream.clear();
    assert_eq!(stream.count(), 0);
    assert!(stream.is_empty());
    assert_eq!(stream.block_count(), blocks_after_first_fill);

    {
        let mut writer = stream.lane_writer(0).unwrap();
        for value in 0..10 {
            writer.write(value);
        }
    }
    {
        let mut writer = stream.lane_writer(1).unwrap();
        for value in 0..5 {
            writer.write(value);
        }
    }

    // Same fill, no new allocation: the retained chains absorbed it.
    assert_eq!(stream.count(), 15);
    assert_eq!(stream.block_count(), blocks_after_first_fill);
}

#[test]
fn reader_peek_does_not_advance() {
    let mut stream: PendingStream<u64> = PendingStream::new(1);
    {
        let mut writer = stream.lane_writer(0).unwrap();
        writer.write(1);
        writer.write(2);
    }

    let mut reader = stream.lane_reader(0).unwrap();
    assert_eq!(reader.peek(), Some(1));
    assert_eq!(reader.peek(), Some(1));
    assert_eq!(reader.read(), Some(1));
    assert_eq!(reader.remaining(), 1);
    assert_eq!(reader.read(), Some(2));
    assert_eq!(reader.read(), None);
    assert_eq!(reader.peek(), None);
}

#[test]
fn empty_lane_reads_return_none() {
    let stream: PendingStream<u64> = PendingStream::new(1);
    let mut reader = stream.lane_reader(0).unwrap();
    assert_eq!(reader.remaining(), 0);
    assert_eq!(reader.read(), None);
    assert_eq!(reader.peek(), None);
}

#[test]
fn lane_indices_are_bounds_checked() {
    let mut stream: PendingStream<u64> = PendingStream::new(2);
    assert_eq!(
        stream.lane_writer(5).unwrap_err(),
        LaneBoundsError { lane: 5, lane_count: 2 }
    );
    assert_eq!(
        stream.lane_reader(2).unwrap_err(),
        LaneBoundsError { lane: 2, lane_count: 2 }
    );
}

#[test]
fn copy_out_round_trips_as_a_multiset() {
    for total in [0usize, 1, 7, 128, 1_000, 100_000] {
        let mut stream: PendingStream<u64> = PendingStream::new(3);
        let mut written: Vec<u64> = Vec::with_capacity(total);

        {
            let mut writers = stream.split_writers();
            for value in 0..total as u64 {
                writers[(value % 3) as usize].write(value);
                written.push(value);
            }
        }

        assert_eq!(stream.count(), total);

        let mut out = vec![0u64; total];
        stream.copy_to(&mut out);
        let mut round_tripped = out.clone();
        round_tripped.sort_unstable();
        written.sort_unstable();
        assert_eq!(round_tripped, written, "multiset mismatch at size {total}");

        // Intra-lane write order survives in the lane-major output.
        for lane in 0..3u64 {
            let lane_values: Vec<u64> = out
                .iter()
                .copied()
                .filter(|value| value % 3 == lane)
                .collect();
            assert!(
                lane_values.windows(2).all(|pair| pair[0] < pair[1]),
                "lane {lane} order broken at size {total}"
            );
        }
    }
}
