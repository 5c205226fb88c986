use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rayon::prelude::*;

use taskstream::{
    lane_for_current_thread, AccessType, CancelBehaviour, CancelComplete, CancelRequestSet,
    DriverGraph, JobBatch, JobConfig, JobGraph, Keyed, OwnerKey, RecordId, TaskStream,
};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tracker {
    owner: OwnerKey,
    channel: u8,
    frames_left: u32,
}

impl Keyed for Tracker {
    fn record_id(&self) -> RecordId {
        RecordId::new(self.owner, self.channel)
    }
}

fn tracker(owner_index: u32, channel: u8, frames_left: u32) -> Tracker {
    Tracker { owner: OwnerKey::new(owner_index, 0), channel, frames_left }
}

#[test]
fn staged_jobs_respect_access_compatibility() {
    let mut jobs = JobGraph::new();
    let requests = CancelRequestSet::new(1);
    let mut stream: TaskStream<Tracker> = TaskStream::new(taskstream::lane_count_for_pool(), CancelBehaviour::Delete);

    {
        let mut writer = stream.writer(0).unwrap();
        for index in 0..50 {
            writer.write(tracker(index, 0, 1));
        }
    }
    stream.consolidate(&mut jobs, &requests).unwrap();
    assert_eq!(stream.live_len(), 50);

    let (controller, reader, writers) = stream.job_views();
    let reader = &reader;
    let writers = &writers;

    let read_total = AtomicU64::new(0);
    let continuations = AtomicUsize::new(0);
    let observed_at_exclusive = AtomicUsize::new(usize::MAX);

    let mut batch = JobBatch::new();

    // Two readers are compatible and share a stage.
    batch.push(JobConfig::new().require(0, AccessType::SharedRead), |_lane| {
        read_total.fetch_add(reader.len() as u64, Ordering::Relaxed);
    });
    batch.push(JobConfig::new().require(0, AccessType::SharedRead), |_lane| {
        read_total.fetch_add(reader.iter().map(|t| t.frames_left as u64).sum::<u64>(), Ordering::Relaxed);
    });

    // A lane-isolated writer conflicts with the readers and runs after
    // them; inside the job, parallelism comes from the pool with each
    // thread appending to its own lane.
    batch.push(JobConfig::new().require(0, AccessType::SharedWrite), |_lane| {
        (0..1_000u32).into_par_iter().for_each(|index| {
            let lane = lane_for_current_thread();
            let mut writer = unsafe { writers.writer_unchecked(lane) };
            writer.write(tracker(1_000 + index, 0, 2));
            continuations.fetch_add(1, Ordering::Relaxed);
        });
    });

    // The exclusive job conflicts with everything, so by the time it runs
    // every continuation has been written.
    batch.push(JobConfig::new().require(0, AccessType::ExclusiveWrite), |_lane| {
        observed_at_exclusive.store(continuations.load(Ordering::Relaxed), Ordering::Relaxed);
    });

    let done = batch.run(&mut jobs, &mut [controller]).unwrap();
    assert!(jobs.is_complete(done));

    assert_eq!(read_total.load(Ordering::Relaxed), 50 + 50);
    assert_eq!(observed_at_exclusive.load(Ordering::Relaxed), 1_000);
    assert_eq!(stream.pending_count(), 1_000);

    // Next frame: the continuations become the live set.
    stream.consolidate(&mut jobs, &requests).unwrap();
    assert_eq!(stream.live_len(), 1_000);
}

#[test]
fn continuations_survive_frames_and_blocks_are_reused() {
    let mut graph = DriverGraph::with_lane_count(1);
    let world = graph.add_root(0, "world");
    let movers = graph.add_child(world, 1, "movers");
    let mut stream: TaskStream<Tracker> = graph.create_stream(movers, CancelBehaviour::Delete);

    assert_eq!(stream.location(), "world/movers#1");

    {
        let mut writer = stream.writer(0).unwrap();
        for index in 0..32 {
            writer.write(tracker(index, 1, 3));
        }
    }

    let mut blocks_after_first_frame = 0;
    for frame in 0..3 {
        graph.begin_frame();
        graph.consolidate_stream(movers, &mut stream).unwrap();

        let expected_live = 32;
        assert_eq!(stream.live_len(), expected_live, "frame {frame}");

        {
            let mut updater = stream.updater(0).unwrap();
            for index in 0..updater.len() {
                let mut current = updater.get(index).unwrap();
                if current.frames_left > 1 {
                    current.frames_left -= 1;
                    updater.set(index, current).unwrap();
                }
                updater.continue_with(current);
            }
        }

        graph.finish_frame();

        if frame == 0 {
            blocks_after_first_frame = stream.pending_block_count();
        } else {
            assert_eq!(
                stream.pending_block_count(),
                blocks_after_first_frame,
                "steady-state frames reuse the retained block chains"
            );
        }
    }
}

#[test]
fn cancelled_work_unwinds_and_reports_at_every_level() {
    let mut graph = DriverGraph::with_lane_count(1);
    let world = graph.add_root(0, "world");
    let movers = graph.add_child(world, 1, "movers");
    let mut stream: TaskStream<Tracker> = graph.create_stream(movers, CancelBehaviour::Unwind);

    {
        let mut writer = stream.writer(0).unwrap();
        for index in 0..8 {
            writer.write(tracker(index, 1, 10));
        }
    }

    // Frame 0: everything consolidates live; continuations written back.
    graph.begin_frame();
    graph.consolidate_stream(movers, &mut stream).unwrap();
    assert_eq!(stream.live_len(), 8);
    {
        let mut updater = stream.updater(0).unwrap();
        for index in 0..updater.len() {
            let current = updater.get(index).unwrap();
            updater.continue_with(current);
        }
    }
    graph.finish_frame();

    // The owner of tracker 3 cancels between frames.
    let cancelled = RecordId::new(OwnerKey::new(3, 0), 1);
    graph.cancel_writer(movers, 0).unwrap().request_cancel(cancelled);

    // Frame 1: the filter diverts the cancelled continuation.
    graph.begin_frame();
    graph.consolidate_stream(movers, &mut stream).unwrap();
    assert_eq!(stream.live_len(), 7);
    let diverted = stream.drain_pending_cancel();
    assert_eq!(diverted.len(), 1);
    assert_eq!(diverted[0].record_id(), cancelled);

    // The unwind job holds the record open this frame.
    graph.mark_processing(movers, cancelled);
    {
        let mut updater = stream.updater(0).unwrap();
        for index in 0..updater.len() {
            let current = updater.get(index).unwrap();
            updater.continue_with(current);
        }
    }
    graph.finish_frame();
    assert!(graph.take_completions(world).is_empty());

    // Frame 2: the unwind job finished and nothing re-marks the id; the
    // settled canary completes and cascades to the root within this frame.
    graph.begin_frame();
    graph.consolidate_stream(movers, &mut stream).unwrap();
    graph.finish_frame();

    let at_movers = graph.take_completions(movers);
    let at_world = graph.take_completions(world);
    assert_eq!(at_movers, vec![CancelComplete { id: cancelled }]);
    assert_eq!(at_world, vec![CancelComplete { id: cancelled }]);

    // The live set keeps running without the cancelled owner.
    assert!(stream
        .reader()
        .iter()
        .all(|t| t.record_id() != cancelled));
}
