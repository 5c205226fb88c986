//! Task streams: pending writes, live snapshots, and consolidation.
//!
//! A [`TaskStream<T>`] is the unit the rest of the layer is built around:
//! a multi-lane pending buffer workers append to in parallel, a live
//! snapshot downstream jobs index into, an access controller serializing
//! the two, and a cancellation behaviour deciding what happens to records
//! whose owner was cancelled.
//!
//! ## Consolidation
//!
//! Producers write in parallel without inter-lane ordering or locking, so
//! the only safe point to establish a deterministic, indexable "this
//! frame's live set" is a single lane-sequential drain. Consolidation is
//! that drain, and since it already performs a full O(n) pass it is also
//! the cheapest place to apply the cancellation filter. Once per frame per
//! stream:
//!
//! 1. Acquire exclusive write on the stream's controller (the frame driver
//!    holds shared read on the cancel request set).
//! 2. Retire the previous live snapshot — deferred behind the exclusive
//!    grant, which already encodes "after all in-flight readers".
//! 3. Size a fresh snapshot to the pending count (worst case; cancelled
//!    records may be filtered out, leaving capacity over logical length).
//! 4. Drain the pending buffer lane-major, diverting or dropping cancelled
//!    records per the stream's [`CancelBehaviour`].
//! 5. Clear the pending buffer; block chains are retained for next frame's
//!    continuations.
//! 6. Release the controller at the consolidation's completion handle.
//!
//! ## Wrapper projections
//!
//! [`StreamWriter`], [`SnapshotReader`], and [`SnapshotUpdater`] are the
//! thin per-role views handed to jobs: lane-bound appends, shared-read
//! iteration, and in-place update plus continuation write-back into the
//! recycling pending buffer.

use crate::sched::access::AccessController;
use crate::sched::buffer::{LaneWriter, LaneWriterSet, PendingStream};
use crate::sched::cancel::{CancelBehaviour, CancelRequestSet};
use crate::sched::error::{SnapshotError, StreamResult};
use crate::sched::handle::{JobGraph, JobHandle};
use crate::sched::snapshot::DeferredArray;
use crate::sched::types::{AccessType, Keyed, LaneIndex};


/// One typed record stream: pending writes, live snapshot, access control,
/// and cancellation behaviour.
pub struct TaskStream<T: Keyed> {
    pending: PendingStream<T>,
    live: DeferredArray<T>,
    controller: AccessController,
    behaviour: CancelBehaviour,
    /// Side stream holding diverted records; present only for
    /// [`CancelBehaviour::Unwind`].
    pending_cancelled: Option<PendingStream<T>>,
    /// Where this stream sits in the owner hierarchy; diagnostics only.
    location: String,
}

impl<T: Keyed> TaskStream<T> {
    /// Creates a stream with `lane_count` pending lanes.
    pub fn new(lane_count: u32, behaviour: CancelBehaviour) -> Self {
        Self::with_location(lane_count, behaviour, String::new())
    }

    /// Creates a stream carrying a debug location string describing its
    /// position in the owner hierarchy.
    pub fn with_location(
        lane_count: u32,
        behaviour: CancelBehaviour,
        location: impl Into<String>,
    ) -> Self {
        let pending_cancelled = match behaviour {
            CancelBehaviour::Unwind => Some(PendingStream::new(1)),
            _ => None,
        };
        TaskStream {
            pending: PendingStream::new(lane_count),
            live: DeferredArray::new(),
            controller: AccessController::new(),
            behaviour,
            pending_cancelled,
            location: location.into(),
        }
    }

    /// Number of pending lanes.
    pub fn lane_count(&self) -> u32 {
        self.pending.lane_count()
    }

    /// This stream's cancellation behaviour.
    pub fn behaviour(&self) -> CancelBehaviour {
        self.behaviour
    }

    /// Debug description of the stream's place in the owner hierarchy.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The stream's access controller, for the scheduling harness.
    pub fn controller_mut(&mut self) -> &mut AccessController {
        &mut self.controller
    }

    /// Elements waiting in the pending buffer.
    pub fn pending_count(&self) -> usize {
        self.pending.count()
    }

    /// Elements in the live snapshot.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Retained pending block count; stable across steady-state frames.
    pub fn pending_block_count(&self) -> usize {
        self.pending.block_count()
    }

    /// Returns a checked lane-bound pending writer.
    pub fn writer(&mut self, lane: LaneIndex) -> StreamResult<StreamWriter<'_, T>> {
        Ok(StreamWriter { inner: self.pending.lane_writer(lane)? })
    }

    /// Returns the unchecked concurrent writer surface for jobs whose lane
    /// comes from the host pool's thread index.
    pub fn writer_set(&self) -> LaneWriterSet<'_, T> {
        self.pending.writer_set()
    }

    /// Returns a shared-read view of the live snapshot.
    pub fn reader(&self) -> SnapshotReader<'_, T> {
        SnapshotReader { live: &self.live }
    }

    /// Returns an updater over the live snapshot that can also write
    /// continuations into the (now recycling) pending buffer for next
    /// frame.
    pub fn updater(&mut self, lane: LaneIndex) -> StreamResult<SnapshotUpdater<'_, T>> {
        let TaskStream { pending, live, .. } = self;
        Ok(SnapshotUpdater { live, next: pending.lane_writer(lane)? })
    }

    /// Mutable access to the live snapshot, for exclusive-write jobs that
    /// partition it.
    pub fn live_mut(&mut self) -> &mut DeferredArray<T> {
        &mut self.live
    }

    /// Splits the stream into the views a job batch needs at once: the
    /// controller for acquire/release bracketing, a snapshot reader, and
    /// the concurrent pending-writer surface.
    ///
    /// The three borrows are disjoint fields, so read jobs and
    /// continuation writers can run against one batch without fighting
    /// over the stream borrow.
    pub fn job_views(
        &mut self,
    ) -> (&mut AccessController, SnapshotReader<'_, T>, LaneWriterSet<'_, T>) {
        let TaskStream { controller, live, pending, .. } = self;
        (controller, SnapshotReader { live }, pending.writer_set())
    }

    /// Drains the pending-cancel side stream for unwind jobs.
    ///
    /// Empty for streams without [`CancelBehaviour::Unwind`].
    pub fn drain_pending_cancel(&mut self) -> Vec<T> {
        match self.pending_cancelled.as_mut() {
            Some(side) => {
                let out = side.to_vec();
                side.clear();
                out
            }
            None => Vec::new(),
        }
    }

    /// Drains pending writes into a fresh live snapshot, applying the
    /// cancellation filter. Runs once per frame per stream.
    ///
    /// Returns the consolidation's completion handle; the controller's
    /// next conflicting grant waits on it.
    pub fn consolidate(
        &mut self,
        graph: &mut JobGraph,
        requests: &CancelRequestSet,
    ) -> StreamResult<JobHandle> {
        let access = self.controller.acquire(graph, AccessType::ExclusiveWrite)?;

        let pending_count = self.pending.count();
        let mut fresh = DeferredArray::new();
        fresh.deferred_create(pending_count)?;
        let retired = std::mem::replace(&mut self.live, fresh);
        if retired.is_created() && !retired.is_empty() {
            // In-flight readers of the retired snapshot are encoded in the
            // exclusive grant; the buffer is freed once it completes.
            let _ = retired.dispose_deferred(graph, access);
        }

        let TaskStream { pending, live, pending_cancelled, behaviour, .. } = self;
        let filter_cancelled = *behaviour != CancelBehaviour::Ignore;
        let mut diverted = pending_cancelled
            .as_mut()
            .map(|side| side.lane_writer(0).expect("side streams always have lane 0"));

        for value in pending.iter() {
            if filter_cancelled && requests.contains(value.record_id()) {
                if let Some(writer) = diverted.as_mut() {
                    writer.write(value);
                }
                continue;
            }
            live.push(value).expect("snapshot sized to the worst-case pending count");
        }
        drop(diverted);

        #[cfg(feature = "validation")]
        {
            if filter_cancelled {
                for value in live.as_slice() {
                    assert!(
                        !requests.contains(value.record_id()),
                        "record {} consolidated as live despite a cancel request in the same pass",
                        value.record_id()
                    );
                }
            }
        }

        pending.clear();

        let job = graph.register(&[access]);
        graph.mark_complete(job);
        self.controller.release(graph, job)?;
        Ok(job)
    }
}

/// Lane-bound writer appending pending records.
pub struct StreamWriter<'a, T: Keyed> {
    inner: LaneWriter<'a, T>,
}

impl<T: Keyed> StreamWriter<'_, T> {
    /// The 0-based lane this writer appends to.
    pub fn lane_index(&self) -> LaneIndex {
        self.inner.lane_index()
    }

    /// Appends a record; it becomes live at the next consolidation.
    pub fn write(&mut self, value: T) {
        self.inner.write(value);
    }
}

/// Shared-read view of a stream's live snapshot.
pub struct SnapshotReader<'a, T: Keyed> {
    live: &'a DeferredArray<T>,
}

impl<T: Keyed> SnapshotReader<'_, T> {
    /// Elements in the snapshot.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Reads the record at `index`.
    pub fn get(&self, index: usize) -> Result<T, SnapshotError> {
        self.live.get(index)
    }

    /// The whole snapshot as a slice.
    pub fn as_slice(&self) -> &[T] {
        self.live.as_slice()
    }

    /// Iterates the snapshot in consolidation order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.live.as_slice().iter()
    }
}

/// Updater over the live snapshot with continuation write-back.
///
/// Continuations land in the pending buffer's retained block chains and
/// become next frame's live set at the following consolidation.
pub struct SnapshotUpdater<'a, T: Keyed> {
    live: &'a mut DeferredArray<T>,
    next: LaneWriter<'a, T>,
}

impl<T: Keyed> SnapshotUpdater<'_, T> {
    /// Elements in the snapshot.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Reads the record at `index`.
    pub fn get(&self, index: usize) -> Result<T, SnapshotError> {
        self.live.get(index)
    }

    /// Overwrites the record at `index` in place.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), SnapshotError> {
        self.live.set(index, value)
    }

    /// Schedules `value` to continue next frame.
    pub fn continue_with(&mut self, value: T) {
        self.next.write(value);
    }
}
