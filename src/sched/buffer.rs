//! Growable multi-lane append buffer.
//!
//! This module implements [`PendingStream<T>`], the lock-free pending-write
//! side of a task stream: one append-only sub-buffer (**lane**) per worker,
//! each lane a chain of fixed-size blocks that is *retained* across frames
//! so steady-state appends allocate nothing.
//!
//! # What this module provides
//!
//! - **`PendingStream<T>`**: the buffer itself, constructed with a fixed
//!   lane count and a per-block element capacity derived from a page-class
//!   byte target.
//! - **`LaneWriter`**: an appender bound to exactly one lane, obtained
//!   either per-lane by `&mut` access or split out for scoped threads.
//! - **`LaneWriterSet`**: the unchecked concurrent surface used by the job
//!   harness, where lane = host thread index.
//! - **`LaneReader`**: sequential per-lane reads (`read` advances, `peek`
//!   does not).
//! - Whole-buffer iteration, bulk copy-out, and O(lanes) counting.
//!
//! # Storage model
//!
//! Each lane stores its values as:
//!
//! ```text
//! blocks: Vec<Box<[MaybeUninit<T>]>>   // every block block_capacity long
//! ```
//!
//! Values are written densely from block 0 upward. The lane tracks the
//! current writer block, a cursor into it, and an element count. All blocks
//! before the writer block are fully initialized; the writer block is
//! initialized up to the cursor.
//!
//! # Iteration order contract
//!
//! Whole-buffer iteration concatenates lanes **in lane order**: lane 0's
//! elements first, in write order, then lane 1's, and so on. Consumers must
//! not assume any other order — insertion time *across* lanes is not
//! globally preserved.
//!
//! # Clear and reuse
//!
//! [`PendingStream::clear`] resets every lane's count and rewinds its
//! cursor to the start of its first retained block. Blocks are **not**
//! freed; subsequent writes reuse the existing chain and only allocate once
//! the retained capacity is exceeded. This amortizes allocation across
//! frames, and [`PendingStream::block_count`] exposes the retained chain
//! length so the property is testable.
//!
//! # Safety and invariants
//!
//! Element types are `Copy` ("unmanaged, fixed-size" records), so cleared
//! slots need no destructor runs and reads are plain copies. Soundness
//! rests on:
//!
//! - `count` equals the number of initialized slots in block-major order,
//! - the writer block/cursor always address the first uninitialized slot,
//! - a lane is appended to by **exactly one** logical thread per job
//!   invocation.
//!
//! The safe API enforces the last point with `&mut` (disjoint lane writers
//! split out of one mutable borrow). [`LaneWriterSet::writer_unchecked`] is
//! the deliberate hole: interior mutability through `UnsafeCell`, sound
//! only under the 1:1 thread→lane mapping contract stated there. This is
//! API-discipline territory; the compiler cannot check it for you.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crate::sched::error::LaneBoundsError;
use crate::sched::types::{block_capacity_for, LaneIndex};


/// One worker's append-only sub-buffer.
struct Lane<T> {
    /// Retained block chain; every block is `block_capacity` slots long.
    blocks: Vec<Box<[MaybeUninit<T>]>>,

    /// Index of the block the cursor points into.
    block_index: usize,

    /// Next write offset within the current block; `block_capacity` means
    /// the block is full and the next write moves to a fresh block.
    cursor: usize,

    /// Initialized elements in this lane.
    count: usize,
}

impl<T> Lane<T> {
    fn empty() -> Self {
        Lane { blocks: Vec::new(), block_index: 0, cursor: 0, count: 0 }
    }

    /// Rewinds the lane without freeing its block chain.
    fn rewind(&mut self) {
        self.block_index = 0;
        self.cursor = 0;
        self.count = 0;
    }
}

fn new_block<T>(capacity: usize) -> Box<[MaybeUninit<T>]> {
    (0..capacity).map(|_| MaybeUninit::uninit()).collect()
}

/// Growable multi-lane append buffer for `Copy` records.
///
/// See the module documentation for the storage model and the safety
/// contract. The lane count is fixed at construction (worker count + 1 in
/// the usual configuration); lane indices are 0-based.
pub struct PendingStream<T: Copy> {
    lanes: Box<[UnsafeCell<Lane<T>>]>,
    block_capacity: usize,
}

// A `PendingStream` is shared across the host pool only through
// `LaneWriterSet`, whose contract guarantees disjoint-lane access. With
// that discipline the cells never alias, so cross-thread sharing is sound
// whenever the element type itself may move between threads.
unsafe impl<T: Copy + Send> Sync for PendingStream<T> {}

impl<T: Copy> PendingStream<T> {
    /// Creates a buffer with `lane_count` empty lanes and the default
    /// page-class block capacity for `T`.
    ///
    /// # Panics
    /// Panics if `lane_count` is zero.
    pub fn new(lane_count: u32) -> Self {
        Self::with_block_capacity(lane_count, block_capacity_for::<T>())
    }

    /// Creates a buffer with an explicit per-block element capacity.
    ///
    /// Small capacities are useful in tests to exercise block-chain growth
    /// without writing thousands of elements.
    ///
    /// # Panics
    /// Panics if `lane_count` or `block_capacity` is zero.
    pub fn with_block_capacity(lane_count: u32, block_capacity: usize) -> Self {
        assert!(lane_count > 0, "a pending stream needs at least one lane");
        assert!(block_capacity > 0, "blocks must hold at least one element");
        let lanes = (0..lane_count)
            .map(|_| UnsafeCell::new(Lane::empty()))
            .collect();
        PendingStream { lanes, block_capacity }
    }

    /// Number of lanes this buffer was constructed with.
    #[inline]
    pub fn lane_count(&self) -> u32 {
        self.lanes.len() as u32
    }

    /// Per-block element capacity.
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    #[inline]
    fn check_lane(&self, lane: LaneIndex) -> Result<usize, LaneBoundsError> {
        if (lane as usize) < self.lanes.len() {
            Ok(lane as usize)
        } else {
            Err(LaneBoundsError { lane, lane_count: self.lane_count() })
        }
    }

    /// Shared view of a lane.
    ///
    /// Sound because every path that mutates a lane holds either `&mut
    /// self` or an unchecked writer, and the unchecked writer's contract
    /// forbids concurrent readers of the same buffer.
    #[inline]
    fn lane(&self, index: usize) -> &Lane<T> {
        unsafe { &*self.lanes[index].get() }
    }

    /// Total element count across all lanes. O(lanes).
    pub fn count(&self) -> usize {
        (0..self.lanes.len()).map(|i| self.lane(i).count).sum()
    }

    /// Returns `true` if no lane holds any element.
    ///
    /// Short-circuits on the first non-empty lane.
    pub fn is_empty(&self) -> bool {
        (0..self.lanes.len()).all(|i| self.lane(i).count == 0)
    }

    /// Total number of blocks currently retained across all lanes.
    ///
    /// Stable across a `clear`; only growth beyond retained capacity
    /// increases it.
    pub fn block_count(&self) -> usize {
        (0..self.lanes.len()).map(|i| self.lane(i).blocks.len()).sum()
    }

    /// Returns a writer bound to one lane, checked against the lane range.
    pub fn lane_writer(&mut self, lane: LaneIndex) -> Result<LaneWriter<'_, T>, LaneBoundsError> {
        let index = self.check_lane(lane)?;
        let block_capacity = self.block_capacity;
        Ok(LaneWriter {
            lane: self.lanes[index].get_mut(),
            block_capacity,
            index: lane,
        })
    }

    /// Splits the buffer into one writer per lane.
    ///
    /// The writers borrow disjoint lanes, so they can be handed to scoped
    /// threads for concurrent appends without any further synchronization.
    pub fn split_writers(&mut self) -> Vec<LaneWriter<'_, T>> {
        let block_capacity = self.block_capacity;
        self.lanes
            .iter_mut()
            .enumerate()
            .map(|(index, cell)| LaneWriter {
                lane: cell.get_mut(),
                block_capacity,
                index: index as LaneIndex,
            })
            .collect()
    }

    /// Returns the unchecked concurrent writer surface.
    ///
    /// Used by the job harness where the lane index comes from the host
    /// pool's thread index; see [`LaneWriterSet::writer_unchecked`] for the
    /// contract.
    pub fn writer_set(&self) -> LaneWriterSet<'_, T> {
        LaneWriterSet { stream: self }
    }

    /// Returns a sequential reader over one lane.
    pub fn lane_reader(&self, lane: LaneIndex) -> Result<LaneReader<'_, T>, LaneBoundsError> {
        let index = self.check_lane(lane)?;
        Ok(LaneReader {
            lane: self.lane(index),
            block_capacity: self.block_capacity,
            position: 0,
        })
    }

    /// Iterates every element lane-major: lane 0 in write order, then
    /// lane 1, and so on. This is the canonical consolidation order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let block_capacity = self.block_capacity;
        (0..self.lanes.len()).flat_map(move |lane_index| {
            let lane = self.lane(lane_index);
            (0..lane.count).map(move |i| unsafe {
                lane.blocks[i / block_capacity][i % block_capacity].assume_init_read()
            })
        })
    }

    /// Copies every element into `out` in lane-major order.
    ///
    /// # Panics
    /// Panics unless `out.len()` equals [`PendingStream::count`] exactly.
    pub fn copy_to(&self, out: &mut [T]) {
        assert!(
            out.len() == self.count(),
            "copy_to target length {} does not match element count {}",
            out.len(),
            self.count()
        );
        for (slot, value) in out.iter_mut().zip(self.iter()) {
            *slot = value;
        }
    }

    /// Allocates a vector of exactly [`PendingStream::count`] elements in
    /// lane-major order.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.count());
        out.extend(self.iter());
        out
    }

    /// Resets every lane's count and rewinds its cursor.
    ///
    /// Block chains are retained for reuse; see the module documentation.
    pub fn clear(&mut self) {
        for cell in self.lanes.iter_mut() {
            cell.get_mut().rewind();
        }
    }
}

/// An appender bound to exactly one lane.
///
/// Obtained from [`PendingStream::lane_writer`],
/// [`PendingStream::split_writers`], or (unchecked) from a
/// [`LaneWriterSet`]. Holding a writer is the license to append to that
/// lane; nothing else may touch the lane while the writer lives.
pub struct LaneWriter<'a, T: Copy> {
    lane: &'a mut Lane<T>,
    block_capacity: usize,
    index: LaneIndex,
}

impl<T: Copy> std::fmt::Debug for LaneWriter<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneWriter")
            .field("index", &self.index)
            .field("count", &self.lane.count)
            .finish()
    }
}

impl<T: Copy> LaneWriter<'_, T> {
    /// The 0-based lane this writer appends to.
    #[inline]
    pub fn lane_index(&self) -> LaneIndex {
        self.index
    }

    /// Elements currently in this lane.
    #[inline]
    pub fn count(&self) -> usize {
        self.lane.count
    }

    /// Appends one value to the lane.
    ///
    /// Links a new block onto the chain when the current block is full,
    /// unless a retained block from a previous frame is available to reuse.
    pub fn write(&mut self, value: T) {
        let lane = &mut *self.lane;
        if lane.blocks.is_empty() {
            lane.blocks.push(new_block(self.block_capacity));
        } else if lane.cursor == self.block_capacity {
            lane.block_index += 1;
            if lane.block_index == lane.blocks.len() {
                lane.blocks.push(new_block(self.block_capacity));
            }
            lane.cursor = 0;
        }
        lane.blocks[lane.block_index][lane.cursor].write(value);
        lane.cursor += 1;
        lane.count += 1;
    }
}

/// Unchecked concurrent writer surface over a shared [`PendingStream`].
///
/// The set itself is freely shareable; the unsafety is concentrated in
/// [`LaneWriterSet::writer_unchecked`].
pub struct LaneWriterSet<'a, T: Copy> {
    stream: &'a PendingStream<T>,
}

impl<'a, T: Copy> LaneWriterSet<'a, T> {
    /// Number of lanes in the underlying buffer.
    #[inline]
    pub fn lane_count(&self) -> u32 {
        self.stream.lane_count()
    }

    /// Returns a writer for `lane` without borrow tracking.
    ///
    /// # Safety
    ///
    /// The caller must uphold the 1:1 thread→lane mapping contract for the
    /// duration of the returned writer:
    ///
    /// - no two live writers address the same lane,
    /// - no reader, iterator, or count of the underlying buffer runs while
    ///   any unchecked writer is live.
    ///
    /// The lane index itself is range-checked (out of range panics rather
    /// than touching memory), but aliasing is entirely on the caller.
    pub unsafe fn writer_unchecked(&self, lane: LaneIndex) -> LaneWriter<'a, T> {
        let cell = &self.stream.lanes[lane as usize];
        LaneWriter {
            lane: unsafe { &mut *cell.get() },
            block_capacity: self.stream.block_capacity,
            index: lane,
        }
    }
}

/// Sequential reader over one lane's block chain.
pub struct LaneReader<'a, T: Copy> {
    lane: &'a Lane<T>,
    block_capacity: usize,
    position: usize,
}

impl<T: Copy> std::fmt::Debug for LaneReader<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneReader")
            .field("position", &self.position)
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl<T: Copy> LaneReader<'_, T> {
    /// Elements not yet read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.lane.count - self.position
    }

    #[inline]
    fn value_at(&self, position: usize) -> T {
        unsafe {
            self.lane.blocks[position / self.block_capacity][position % self.block_capacity]
                .assume_init_read()
        }
    }

    /// Returns the next element and advances, or `None` when the lane is
    /// exhausted.
    pub fn read(&mut self) -> Option<T> {
        if self.position == self.lane.count {
            return None;
        }
        let value = self.value_at(self.position);
        self.position += 1;
        Some(value)
    }

    /// Returns the next element without advancing.
    pub fn peek(&self) -> Option<T> {
        if self.position == self.lane.count {
            return None;
        }
        Some(self.value_at(self.position))
    }
}
