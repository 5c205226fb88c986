//! Driver hierarchy, stream registration, and the per-frame loop.
//!
//! A **driver** is one owner level: the thing that requests work, may
//! cancel it, and wants to hear when cancellation has fully unwound
//! beneath it. Drivers form a tree; every driver owns a cancel-request
//! set and a node in the progress propagation graph.
//!
//! Registration is explicit: the owning code constructs the graph, adds
//! drivers, and creates each stream against a driver. Nothing is
//! discovered by scanning, so a stream that was never registered simply
//! does not exist rather than silently not being wired up.
//!
//! ## Frame order
//!
//! 1. [`DriverGraph::begin_frame`] consolidates every driver's cancel
//!    requests *first*, so stream filters observe up-to-date state, and
//!    seeds progress entries up the ancestor chain.
//! 2. The caller consolidates its streams
//!    ([`DriverGraph::consolidate_stream`]).
//! 3. The caller runs its jobs ([`DriverGraph::run_batch`]) against the
//!    fresh snapshots, writing continuations back into the recycling
//!    pending buffers.
//! 4. [`DriverGraph::finish_frame`] runs the progress cascade bottom-up
//!    and frees retired snapshots whose readers have completed.

use crate::sched::access::AccessController;
use crate::sched::cancel::{
    CancelBehaviour, CancelComplete, CancelRequestSet, CancelWriter, ProgressGraph,
    ProgressNodeId, VersionedLookup,
};
use crate::sched::error::StreamResult;
use crate::sched::handle::{JobGraph, JobHandle};
use crate::sched::schedule::{lane_count_for_pool, JobBatch};
use crate::sched::stream::TaskStream;
use crate::sched::types::{Context, Keyed, LaneIndex, RecordId};
use crate::profiling::profiler;


/// Identifier of a driver in a [`DriverGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DriverId(u32);

struct Driver {
    parent: Option<DriverId>,
    context: Context,
    label: String,
    node: ProgressNodeId,
    requests: CancelRequestSet,
}

/// Arena of drivers plus the scheduler-owned job graph and progress graph.
///
/// All cross-references are integer ids into this arena; no process-wide
/// state exists.
pub struct DriverGraph {
    drivers: Vec<Driver>,
    progress: ProgressGraph,
    jobs: JobGraph,
    lane_count: u32,
}

impl DriverGraph {
    /// Creates a graph sized for the current Rayon pool
    /// (worker count + 1 lanes).
    pub fn new() -> Self {
        Self::with_lane_count(lane_count_for_pool())
    }

    /// Creates a graph with an explicit lane count.
    pub fn with_lane_count(lane_count: u32) -> Self {
        DriverGraph {
            drivers: Vec::new(),
            progress: ProgressGraph::new(),
            jobs: JobGraph::new(),
            lane_count,
        }
    }

    /// Lane count every stream created through this graph uses.
    pub fn lane_count(&self) -> u32 {
        self.lane_count
    }

    /// Adds a top-level driver.
    pub fn add_root(&mut self, context: Context, label: impl Into<String>) -> DriverId {
        let node = self.progress.add_root(context);
        self.push_driver(None, context, label.into(), node)
    }

    /// Adds a driver under `parent`.
    pub fn add_child(
        &mut self,
        parent: DriverId,
        context: Context,
        label: impl Into<String>,
    ) -> DriverId {
        let parent_node = self.drivers[parent.0 as usize].node;
        let node = self.progress.add_child(parent_node, context);
        self.push_driver(Some(parent), context, label.into(), node)
    }

    fn push_driver(
        &mut self,
        parent: Option<DriverId>,
        context: Context,
        label: String,
        node: ProgressNodeId,
    ) -> DriverId {
        let id = DriverId(self.drivers.len() as u32);
        self.drivers.push(Driver {
            parent,
            context,
            label,
            node,
            requests: CancelRequestSet::new(self.lane_count),
        });
        id
    }

    /// Path of a driver in the hierarchy, for diagnostics.
    ///
    /// Labels joined root-first with `/`, suffixed with the driver's
    /// context byte, e.g. `world/ai#3`.
    pub fn location_of(&self, driver: DriverId) -> String {
        let mut labels = Vec::new();
        let mut current = Some(driver);
        while let Some(id) = current {
            let entry = &self.drivers[id.0 as usize];
            labels.push(entry.label.as_str());
            current = entry.parent;
        }
        labels.reverse();
        format!("{}#{}", labels.join("/"), self.drivers[driver.0 as usize].context)
    }

    /// Creates a stream registered to `driver`.
    ///
    /// Unwind streams mark the driver's progress node so the cascade knows
    /// its entries will be kept alive by running unwind jobs.
    pub fn create_stream<T: Keyed>(
        &mut self,
        driver: DriverId,
        behaviour: CancelBehaviour,
    ) -> TaskStream<T> {
        if behaviour == CancelBehaviour::Unwind {
            self.progress.set_unwind_configured(self.drivers[driver.0 as usize].node);
        }
        TaskStream::with_location(self.lane_count, behaviour, self.location_of(driver))
    }

    /// Returns a lane-bound writer queueing cancel requests on `driver`.
    pub fn cancel_writer(
        &mut self,
        driver: DriverId,
        lane: LaneIndex,
    ) -> StreamResult<CancelWriter<'_>> {
        Ok(self.drivers[driver.0 as usize].requests.writer(lane)?)
    }

    /// Consolidates every driver's cancel requests and seeds progress
    /// entries up the ancestor chains. Runs first each frame.
    pub fn begin_frame(&mut self) {
        let _span = profiler::span("DriverGraph::begin_frame");
        for index in 0..self.drivers.len() {
            let fresh = self.drivers[index].requests.consolidate();
            let node = self.drivers[index].node;
            for id in fresh {
                self.progress.mark_cancel_requested(node, id);
            }
            let version = self.drivers[index].requests.version();
            self.progress.set_request_version(node, version);
        }
    }

    /// Consolidates one stream against its driver's request set.
    pub fn consolidate_stream<T: Keyed>(
        &mut self,
        driver: DriverId,
        stream: &mut TaskStream<T>,
    ) -> StreamResult<JobHandle> {
        let _span = profiler::span("TaskStream::consolidate");
        stream.consolidate(&mut self.jobs, &self.drivers[driver.0 as usize].requests)
    }

    /// Runs a job batch against this graph's handle arena.
    pub fn run_batch(
        &mut self,
        batch: JobBatch<'_>,
        controllers: &mut [&mut AccessController],
    ) -> StreamResult<JobHandle> {
        let _span = profiler::span("JobBatch::run");
        batch.run(&mut self.jobs, controllers)
    }

    /// Runs the bottom-up progress cascade and frees retired snapshots
    /// whose handles completed. Runs last each frame.
    pub fn finish_frame(&mut self) {
        let _span = profiler::span("ProgressGraph::run_frame");
        self.progress.run_frame();
        self.jobs.sweep();
    }

    /// Re-marks `id` as actively unwinding at `driver`.
    ///
    /// Unwind jobs call this every frame they keep working on the id.
    pub fn mark_processing(&mut self, driver: DriverId, id: RecordId) {
        let node = self.drivers[driver.0 as usize].node;
        self.progress.mark_processing(node, id);
    }

    /// Drains cancel-completion records emitted at `driver`'s level.
    pub fn take_completions(&mut self, driver: DriverId) -> Vec<CancelComplete> {
        let node = self.drivers[driver.0 as usize].node;
        self.progress.take_completions(node)
    }

    /// Read access to `driver`'s progress lookup.
    pub fn progress_of(&self, driver: DriverId) -> &VersionedLookup<RecordId, bool> {
        self.progress.progress(self.drivers[driver.0 as usize].node)
    }

    /// Read access to `driver`'s consolidated request set.
    pub fn requests_of(&self, driver: DriverId) -> &CancelRequestSet {
        &self.drivers[driver.0 as usize].requests
    }

    /// The scheduler-owned handle arena.
    pub fn job_graph_mut(&mut self) -> &mut JobGraph {
        &mut self.jobs
    }
}

impl Default for DriverGraph {
    fn default() -> Self {
        DriverGraph::new()
    }
}
