//! Core Identifiers, Access Categories, and Bit-Level Layouts
//!
//! This module defines the **fundamental types, identifiers, and layout
//! constants** shared across the scheduling layer: record identity, lane
//! addressing, access categories, and block sizing.
//!
//! ## Design Philosophy
//!
//! The scheduling layer is designed around:
//!
//! - **Dense, copyable identifiers**
//! - **Stable packed owner handles**
//! - **Explicit access declaration**
//! - **Page-class block sizing**
//!
//! To support these goals efficiently, this module:
//!
//! - Encodes owner handles into a single 64-bit value,
//! - Uses small, copyable numeric IDs for lanes and channels,
//! - Expresses access compatibility as a closed static table,
//! - Avoids heap allocation everywhere.
//!
//! ## Owner Representation
//!
//! Owners are encoded as a packed 64-bit integer with the following layout:
//!
//! ```text
//! | generation | index |
//! ```
//!
//! - **Index** identifies the simulated subject's slot in the host runtime.
//! - **Generation** enables stale-owner detection after the subject is
//!   destroyed and its slot reused.
//!
//! The exact bit widths are controlled by compile-time constants and
//! validated using static assertions. Two `OwnerKey`s are equal exactly when
//! both index and generation match.
//!
//! ## Records and Channels
//!
//! A record's identity is its owner plus a [`Context`] byte naming the
//! logical channel that produced it. Multiple writers may share one buffer
//! and still disambiguate their results through the context byte.
//!
//! ## Lanes
//!
//! Lane indices are **0-based everywhere**. Lane 0 belongs to the main
//! thread; worker `w` of the host pool maps to lane `w + 1`. The mapping is
//! performed in exactly one place (`sched::schedule::lane_for_current_thread`)
//! so no call site ever needs to adjust by one.
//!
//! ## Access Categories
//!
//! [`AccessType`] names the four compatibility classes a guarded resource can
//! be held under. Which categories may co-exist is described by a single
//! closed table rather than scattered match statements, so the rules live in
//! one auditable place.

use std::fmt;
use std::mem::size_of;


/// Bit-width type used for compile-time layout calculations.
pub type Bits = u8;

/// Packed 64-bit owner handle value.
pub type RawOwnerKey = u64;
/// Index portion of an owner handle.
pub type OwnerIndex = u32;
/// Generation counter detecting stale owner handles.
pub type OwnerGeneration = u32;

/// Identifier of the logical channel that produced a record.
pub type Context = u8;

/// 0-based lane index into a multi-lane buffer.
pub type LaneIndex = u32;

/// Monotonic version counter for change detection on lookups.
pub type LookupVersion = u64;

/// Total number of bits in a [`RawOwnerKey`].
pub const OWNER_BITS: Bits = 64;
/// Number of bits reserved for the owner index.
pub const OWNER_INDEX_BITS: Bits = 32;
/// Number of bits reserved for the owner generation.
pub const OWNER_GENERATION_BITS: Bits = OWNER_BITS - OWNER_INDEX_BITS;

const _: [(); 1] = [(); (OWNER_INDEX_BITS > 0) as usize];
const _: [(); 1] = [(); (OWNER_INDEX_BITS < OWNER_BITS) as usize];
const _: [(); 1] = [(); (OWNER_INDEX_BITS + OWNER_GENERATION_BITS == OWNER_BITS) as usize];

const fn mask(bits: Bits) -> RawOwnerKey {
    if bits == 0 { 0 } else { ((1 as RawOwnerKey) << bits) - 1 }
}

/// Mask selecting the index portion of a [`RawOwnerKey`].
pub const OWNER_INDEX_MASK: RawOwnerKey = mask(OWNER_INDEX_BITS);

/// Opaque stable identifier for the simulated subject a record belongs to.
///
/// Equality is by index **and** generation; a handle whose slot was reused by
/// the host runtime compares unequal to the handle of the new subject.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey(pub RawOwnerKey);

impl OwnerKey {
    /// Packs an index and generation into an owner handle.
    #[inline]
    pub const fn new(index: OwnerIndex, generation: OwnerGeneration) -> Self {
        OwnerKey(((generation as RawOwnerKey) << OWNER_INDEX_BITS) | (index as RawOwnerKey))
    }

    /// Returns the index portion of this handle.
    #[inline]
    pub const fn index(self) -> OwnerIndex {
        (self.0 & OWNER_INDEX_MASK) as OwnerIndex
    }

    /// Returns the generation portion of this handle.
    #[inline]
    pub const fn generation(self) -> OwnerGeneration {
        (self.0 >> OWNER_INDEX_BITS) as OwnerGeneration
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerKey({}:{})", self.index(), self.generation())
    }
}

/// Full identity of a record: the owning subject plus the channel that
/// produced it.
///
/// Within one consolidation pass an `OwnerKey` must not appear as "live" if
/// it was also marked cancelled in the same pass; the consolidation job
/// enforces this under the `validation` feature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RecordId {
    /// Owning subject.
    pub owner: OwnerKey,
    /// Logical sub-stream / channel id.
    pub context: Context,
}

impl RecordId {
    /// Builds a record identity from its parts.
    #[inline]
    pub const fn new(owner: OwnerKey, context: Context) -> Self {
        RecordId { owner, context }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.owner.index(), self.owner.generation(), self.context)
    }
}

/// Payload types stored in task streams.
///
/// Records are plain fixed-size values copied in and out of lane buffers and
/// snapshots; `Copy` is the Rust spelling of that contract. The identity a
/// record reports must be stable for its whole lifetime — consolidation and
/// cancellation key every decision off it.
pub trait Keyed: Copy + Send + 'static {
    /// Returns the stable identity of this record.
    fn record_id(&self) -> RecordId;
}

impl Keyed for RecordId {
    #[inline]
    fn record_id(&self) -> RecordId {
        *self
    }
}

/// Target byte footprint of one lane block.
///
/// Blocks are sized so one block spans a single cache/VM page class; the
/// per-type element capacity is derived by [`block_capacity_for`].
pub const BLOCK_BYTES: usize = 16 * 1024;

/// Number of elements of `T` that fit one lane block.
///
/// Always at least 1, so oversized element types still make progress;
/// zero-sized markers get one full block's worth per block.
#[inline]
pub const fn block_capacity_for<T>() -> usize {
    let size = size_of::<T>();
    if size == 0 {
        return BLOCK_BYTES;
    }
    let capacity = BLOCK_BYTES / size;
    if capacity == 0 { 1 } else { capacity }
}

/// Compatibility class an access grant belongs to.
///
/// ## Categories
/// - `SharedRead`: any number of concurrent readers.
/// - `SharedWrite`: any number of concurrent writers, provided the guarded
///   structure is internally lane-isolated (e.g. a multi-lane buffer).
/// - `ExclusiveWrite`: exactly one holder, excludes everything else.
/// - `Disposal`: terminal exclusive access; the resource may be freed after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Read-only access, shared with other readers.
    SharedRead,
    /// Lane-isolated write access, shared with other such writers.
    SharedWrite,
    /// Sole access excluding readers and writers alike.
    ExclusiveWrite,
    /// Terminal sole access; the resource is considered gone afterwards.
    Disposal,
}

/// Closed co-existence table for access categories.
///
/// Rows and columns are in [`AccessType`] declaration order. The table is
/// the single source of truth for which grants may overlap; both the access
/// controller and the job-stage partitioner consult it.
const COMPATIBILITY: [[bool; 4]; 4] = [
    //                 SharedRead  SharedWrite  ExclusiveWrite  Disposal
    /* SharedRead  */ [true,       false,       false,          false],
    /* SharedWrite */ [false,      true,        false,          false],
    /* Exclusive   */ [false,      false,       false,          false],
    /* Disposal    */ [false,      false,       false,          false],
];

impl AccessType {
    /// Returns `true` if a grant of `self` may co-exist with a grant of
    /// `other` on the same resource.
    #[inline]
    pub const fn compatible_with(self, other: AccessType) -> bool {
        COMPATIBILITY[self as usize][other as usize]
    }

    /// Returns `true` if this category requires sole access.
    #[inline]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, AccessType::ExclusiveWrite | AccessType::Disposal)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessType::SharedRead => "shared read",
            AccessType::SharedWrite => "shared write",
            AccessType::ExclusiveWrite => "exclusive write",
            AccessType::Disposal => "disposal",
        };
        f.write_str(name)
    }
}
