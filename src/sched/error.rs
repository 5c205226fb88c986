//! Error types for lane buffers, access control, and snapshot storage.
//!
//! This module declares focused, composable error types used across the
//! stream and scheduling pipeline. Each error carries enough context to make
//! failures actionable while remaining small and cheap to pass around or
//! convert into the aggregate [`StreamError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   lane bound violations, acquire/release pairing mistakes, indexing a
//!   snapshot that was never sized).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into
//!   [`StreamError`].
//! * **Actionability:** Structured fields (offending lane and lane count,
//!   held vs. requested access, index vs. restricted range) make logs useful
//!   without reproducing the issue.
//!
//! ## Typical flow
//! Low-level buffer and snapshot operations return small, dedicated error
//! types. Higher-level orchestration code uses `?` to bubble failures into
//! [`StreamError`], which callers can match on for control flow.
//!
//! ## A note on policy
//! Everything in this module is a **programmer-contract violation**: a
//! failed acquire or an out-of-range index is a logic bug to fix, not a
//! transient condition to retry. Nothing here models resource exhaustion —
//! allocation failure while growing a lane's block chain is fatal and
//! propagates as the global allocator's abort.

use std::fmt;

use crate::sched::types::{AccessType, LaneIndex};


/// Returned when a lane index is outside the valid range for a multi-lane
/// buffer.
///
/// ### Fields
/// * `lane` — The 0-based lane index that was requested.
/// * `lane_count` — Number of lanes the buffer was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneBoundsError {
    /// Offending lane index that was requested.
    pub lane: LaneIndex,

    /// Number of lanes in the buffer.
    pub lane_count: u32,
}

impl fmt::Display for LaneBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lane index {} out of bounds (lane count {})",
            self.lane, self.lane_count
        )
    }
}

impl std::error::Error for LaneBoundsError {}

/// Returned when an access controller is used against its acquire/release
/// pairing discipline.
///
/// The controller is driven from the scheduling thread in strict
/// acquire→release alternation; the grant itself may be held by many
/// concurrent jobs, but the *calls* never overlap. Violations mean the
/// schedule construction is wrong, not that the caller should wait and
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// `acquire` was called while a previous grant is still outstanding.
    AlreadyAcquired {
        /// Access type of the outstanding grant.
        held: AccessType,
        /// Access type that was just requested.
        requested: AccessType,
    },

    /// `release` was called with no outstanding grant.
    ReleaseWithoutAcquire,

    /// The controller was used after a `Disposal` grant.
    ///
    /// Disposal is terminal: the guarded resource may already be freed.
    UseAfterDisposal,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::AlreadyAcquired { held, requested } => write!(
                f,
                "acquire({requested}) while a {held} grant is still outstanding"
            ),
            AccessError::ReleaseWithoutAcquire => {
                f.write_str("release called with no outstanding grant")
            }
            AccessError::UseAfterDisposal => {
                f.write_str("access controller used after disposal")
            }
        }
    }
}

impl std::error::Error for AccessError {}

/// Returned by deferred snapshot arrays on lifecycle or indexing misuse.
///
/// The two out-of-range variants are deliberately distinct: an index that is
/// valid for the array but outside a restricted parallel-for sub-range is a
/// partitioning bug, while a genuinely out-of-bounds index is a sizing bug.
/// Diagnostics that conflate the two send the reader to the wrong place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The array is still a placeholder; `deferred_create` has not run.
    NotCreated,

    /// `deferred_create` was called a second time.
    ///
    /// The size of a deferred array is fixed exactly once per lifetime.
    AlreadyCreated {
        /// Capacity the array was already created with.
        capacity: usize,
    },

    /// An index was outside the array's logical length.
    OutOfBounds {
        /// Offending index.
        index: usize,
        /// Logical length of the array.
        length: usize,
    },

    /// An index was within the array's logical length but outside the
    /// sub-range this view is restricted to.
    OutsideRestrictedRange {
        /// Offending index.
        index: usize,
        /// Start of the restricted sub-range (inclusive).
        start: usize,
        /// End of the restricted sub-range (exclusive).
        end: usize,
        /// Logical length of the whole array.
        length: usize,
    },

    /// A sequential fill ran past the capacity the array was created with.
    CapacityExceeded {
        /// Capacity the array was created with.
        capacity: usize,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::NotCreated => {
                f.write_str("deferred array indexed before deferred_create")
            }
            SnapshotError::AlreadyCreated { capacity } => write!(
                f,
                "deferred_create called twice (already created with capacity {capacity})"
            ),
            SnapshotError::OutOfBounds { index, length } => {
                write!(f, "index {index} out of bounds (length {length})")
            }
            SnapshotError::OutsideRestrictedRange { index, start, end, length } => write!(
                f,
                "index {index} is within the array (length {length}) but outside \
                 the restricted sub-range {start}..{end}"
            ),
            SnapshotError::CapacityExceeded { capacity } => {
                write!(f, "sequential fill exceeded created capacity {capacity}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Aggregate error for stream-level operations.
///
/// Wraps the precise low-level failures so orchestration code can use `?`
/// and still return a single expressive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// A lane index was outside the buffer's lane range.
    Lane(LaneBoundsError),

    /// An access controller was driven against its pairing discipline.
    Access(AccessError),

    /// A deferred snapshot array was misused.
    Snapshot(SnapshotError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Lane(e) => write!(f, "{e}"),
            StreamError::Access(e) => write!(f, "{e}"),
            StreamError::Snapshot(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<LaneBoundsError> for StreamError {
    fn from(e: LaneBoundsError) -> Self { StreamError::Lane(e) }
}

impl From<AccessError> for StreamError {
    fn from(e: AccessError) -> Self { StreamError::Access(e) }
}

impl From<SnapshotError> for StreamError {
    fn from(e: SnapshotError) -> Self { StreamError::Snapshot(e) }
}

/// Convenience alias for stream-level results.
pub type StreamResult<T> = Result<T, StreamError>;
