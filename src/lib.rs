//! # Task Stream Framework
//!
//! Data-oriented task-scheduling layer for entity-component simulation
//! runtimes.
//!
//! Many parallel workers produce, consume, update, and cancel typed records
//! identified by an owning key; this crate guarantees that access to each
//! shared buffer is correctly serialized or parallelized, and that a
//! record's lifecycle (pending → live → continuing/resolved/cancelled) is
//! preserved across frames without data races or leaks.
//!
//! ## Design Goals
//! - Lock-free multi-lane appends (one lane per worker)
//! - Deterministic lane-major consolidation
//! - Completion-handle access ordering, not locks
//! - Same-frame cancellation cascade up the owner hierarchy

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod sched;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core identity and access types

pub use sched::types::{
    AccessType,
    Context,
    Keyed,
    LaneIndex,
    OwnerKey,
    RecordId,
};

pub use sched::error::{
    AccessError,
    LaneBoundsError,
    SnapshotError,
    StreamError,
    StreamResult,
};

pub use sched::buffer::{
    LaneReader,
    LaneWriter,
    LaneWriterSet,
    PendingStream,
};

pub use sched::handle::{JobGraph, JobHandle};
pub use sched::access::AccessController;
pub use sched::snapshot::{DeferredArray, SnapshotView, SnapshotViewMut};

pub use sched::cancel::{
    CancelBehaviour,
    CancelComplete,
    CancelRequestSet,
    CancelWriter,
    ProgressGraph,
    ProgressNodeId,
    VersionedLookup,
};

pub use sched::stream::{
    SnapshotReader,
    SnapshotUpdater,
    StreamWriter,
    TaskStream,
};

pub use sched::schedule::{
    lane_count_for_pool,
    lane_for_current_thread,
    JobBatch,
    JobConfig,
    ResourceId,
};

pub use sched::driver::{DriverGraph, DriverId};

pub use profiling::profiler;

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used scheduling types.
///
/// Import with:
/// ```rust
/// use taskstream::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AccessType,
        CancelBehaviour,
        DriverGraph,
        JobBatch,
        JobConfig,
        JobGraph,
        Keyed,
        OwnerKey,
        PendingStream,
        RecordId,
        TaskStream,
    };
}
