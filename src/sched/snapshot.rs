//! Deferred snapshot array.
//!
//! This module implements [`DeferredArray<T>`], a random-access array
//! created *before* its final size is known. The pattern exists because a
//! consolidation job's output size depends on concurrent producer output:
//! downstream parallel work is scheduled against the array while its length
//! is still unknown, and the array is sized exactly once, from inside the
//! producing job, before any consumer touches it.
//!
//! # Lifecycle
//!
//! ```text
//! Placeholder --deferred_create(capacity)--> Created
//! ```
//!
//! - `new()` allocates a 1-element placeholder plus metadata. The array is
//!   not meaningfully indexable; every accessor reports
//!   [`SnapshotError::NotCreated`].
//! - `deferred_create` is callable **exactly once per lifetime**. A second
//!   call reports [`SnapshotError::AlreadyCreated`]; the size of a snapshot
//!   is fixed once per lifetime.
//! - The producing job then fills the array sequentially with
//!   [`DeferredArray::push`]; the logical length is the number of pushed
//!   elements and may be smaller than the created capacity (worst-case
//!   over-allocation is intentional, not a bug).
//!
//! # Restricted-range views
//!
//! Parallel consumers partition the array by index range. The view types
//! returned by [`DeferredArray::range_view`] and
//! [`DeferredArray::partition_mut`] keep enough metadata to distinguish, in
//! diagnostics, "index within the array but outside this view's sub-range"
//! from a genuinely out-of-bounds index.
//!
//! # Safety
//!
//! Backing storage is `MaybeUninit`; the initialized region is exactly
//! `[0, length)`. Every public accessor bounds-checks against the logical
//! length before an `assume_init` access, so no path exposes uninitialized
//! memory.

use std::any::Any;
use std::mem::MaybeUninit;
use std::ops::Range;

use crate::sched::error::SnapshotError;
use crate::sched::handle::{JobGraph, JobHandle};


enum SnapshotState {
    Placeholder,
    Created,
}

/// Random-access array sized exactly once, after construction.
///
/// See the module documentation for the lifecycle.
pub struct DeferredArray<T: Copy> {
    data: Box<[MaybeUninit<T>]>,
    state: SnapshotState,
    /// Initialized prefix; only `[0, length)` is readable.
    length: usize,
}

impl<T: Copy> DeferredArray<T> {
    /// Allocates the placeholder.
    pub fn new() -> Self {
        DeferredArray {
            data: std::iter::once(MaybeUninit::uninit()).collect(),
            state: SnapshotState::Placeholder,
            length: 0,
        }
    }

    /// Sizes the array to its final capacity.
    ///
    /// Callable exactly once per lifetime, typically from inside the
    /// consolidation job once the true element count is known. The
    /// placeholder allocation is released here.
    pub fn deferred_create(&mut self, capacity: usize) -> Result<(), SnapshotError> {
        if matches!(self.state, SnapshotState::Created) {
            return Err(SnapshotError::AlreadyCreated { capacity: self.data.len() });
        }
        self.data = (0..capacity).map(|_| MaybeUninit::uninit()).collect();
        self.state = SnapshotState::Created;
        self.length = 0;
        Ok(())
    }

    /// Returns `true` once `deferred_create` has run.
    pub fn is_created(&self) -> bool {
        matches!(self.state, SnapshotState::Created)
    }

    /// Capacity the array was created with.
    pub fn capacity(&self) -> Result<usize, SnapshotError> {
        match self.state {
            SnapshotState::Placeholder => Err(SnapshotError::NotCreated),
            SnapshotState::Created => Ok(self.data.len()),
        }
    }

    /// Logical length: the initialized prefix.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if no element has been pushed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends the next element of the sequential fill.
    ///
    /// # Errors
    /// - [`SnapshotError::NotCreated`] before `deferred_create`.
    /// - [`SnapshotError::CapacityExceeded`] past the created capacity.
    pub fn push(&mut self, value: T) -> Result<(), SnapshotError> {
        if !self.is_created() {
            return Err(SnapshotError::NotCreated);
        }
        if self.length == self.data.len() {
            return Err(SnapshotError::CapacityExceeded { capacity: self.data.len() });
        }
        self.data[self.length].write(value);
        self.length += 1;
        Ok(())
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<(), SnapshotError> {
        if !self.is_created() {
            return Err(SnapshotError::NotCreated);
        }
        if index >= self.length {
            return Err(SnapshotError::OutOfBounds { index, length: self.length });
        }
        Ok(())
    }

    /// Reads the element at `index`.
    pub fn get(&self, index: usize) -> Result<T, SnapshotError> {
        self.check_index(index)?;
        Ok(unsafe { self.data[index].assume_init_read() })
    }

    /// Overwrites the element at `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), SnapshotError> {
        self.check_index(index)?;
        self.data[index].write(value);
        Ok(())
    }

    /// The initialized prefix as a slice.
    pub fn as_slice(&self) -> &[T] {
        // Initialized-prefix invariant: [0, length) was written by push.
        unsafe {
            std::slice::from_raw_parts(self.data.as_ptr() as *const T, self.length)
        }
    }

    /// The initialized prefix as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe {
            std::slice::from_raw_parts_mut(self.data.as_mut_ptr() as *mut T, self.length)
        }
    }

    /// A read-only view restricted to `range`.
    ///
    /// # Errors
    /// [`SnapshotError::OutOfBounds`] if the range end exceeds the logical
    /// length.
    pub fn range_view(&self, range: Range<usize>) -> Result<SnapshotView<'_, T>, SnapshotError> {
        if !self.is_created() {
            return Err(SnapshotError::NotCreated);
        }
        if range.end > self.length {
            return Err(SnapshotError::OutOfBounds { index: range.end, length: self.length });
        }
        Ok(SnapshotView { array: self, start: range.start, end: range.end })
    }

    /// Splits the initialized prefix into `parts` disjoint mutable views
    /// of near-equal size, suitable for index-range-partitioned parallel
    /// work.
    ///
    /// Fewer than `parts` views are returned when the array is shorter
    /// than `parts`.
    pub fn partition_mut(&mut self, parts: usize) -> Vec<SnapshotViewMut<'_, T>> {
        let length = self.length;
        if length == 0 || parts == 0 {
            return Vec::new();
        }
        let chunk = length.div_ceil(parts);
        let mut views = Vec::with_capacity(parts.min(length));
        let mut start = 0;
        let mut rest = self.as_mut_slice();
        while !rest.is_empty() {
            let take = chunk.min(rest.len());
            let (head, tail) = rest.split_at_mut(take);
            views.push(SnapshotViewMut { slice: head, start, length });
            start += take;
            rest = tail;
        }
        views
    }

    /// Parks this array on the graph to be freed once `after` completes.
    ///
    /// The synchronous disposal path is an ordinary drop; this form exists
    /// for snapshots retired while scheduled readers are still in flight.
    pub fn dispose_deferred(self, graph: &mut JobGraph, after: JobHandle) -> JobHandle
    where
        T: Send + 'static,
    {
        let handle = graph.register(&[after]);
        graph.mark_complete(handle);
        graph.defer_drop(after, Box::new(self) as Box<dyn Any + Send>);
        handle
    }
}

impl<T: Copy> Default for DeferredArray<T> {
    fn default() -> Self {
        DeferredArray::new()
    }
}

/// Read-only view over a restricted index sub-range of a snapshot.
///
/// Indices passed to [`SnapshotView::get`] are **absolute** array indices;
/// the view only narrows which of them are permitted, so partitioned
/// parallel code can keep working in array coordinates.
pub struct SnapshotView<'a, T: Copy> {
    array: &'a DeferredArray<T>,
    start: usize,
    end: usize,
}

impl<T: Copy> SnapshotView<'_, T> {
    /// The restricted sub-range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Reads the element at absolute index `index`.
    ///
    /// # Errors
    /// Distinguishes an index that is valid for the array but outside this
    /// view ([`SnapshotError::OutsideRestrictedRange`]) from one that is
    /// out of bounds entirely ([`SnapshotError::OutOfBounds`]).
    pub fn get(&self, index: usize) -> Result<T, SnapshotError> {
        if index < self.start || index >= self.end {
            if index < self.array.len() {
                return Err(SnapshotError::OutsideRestrictedRange {
                    index,
                    start: self.start,
                    end: self.end,
                    length: self.array.len(),
                });
            }
            return Err(SnapshotError::OutOfBounds { index, length: self.array.len() });
        }
        self.array.get(index)
    }
}

/// Mutable view over a restricted index sub-range of a snapshot.
///
/// Views produced by [`DeferredArray::partition_mut`] borrow disjoint
/// slices, so a batch of them can be consumed by parallel workers directly.
pub struct SnapshotViewMut<'a, T: Copy> {
    slice: &'a mut [T],
    start: usize,
    /// Full logical length of the source array, kept for diagnostics.
    length: usize,
}

impl<T: Copy> SnapshotViewMut<'_, T> {
    /// The restricted sub-range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.slice.len()
    }

    #[inline]
    fn check(&self, index: usize) -> Result<usize, SnapshotError> {
        let end = self.start + self.slice.len();
        if index >= self.start && index < end {
            return Ok(index - self.start);
        }
        if index < self.length {
            Err(SnapshotError::OutsideRestrictedRange {
                index,
                start: self.start,
                end,
                length: self.length,
            })
        } else {
            Err(SnapshotError::OutOfBounds { index, length: self.length })
        }
    }

    /// Reads the element at absolute index `index`.
    pub fn get(&self, index: usize) -> Result<T, SnapshotError> {
        let local = self.check(index)?;
        Ok(self.slice[local])
    }

    /// Overwrites the element at absolute index `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), SnapshotError> {
        let local = self.check(index)?;
        self.slice[local] = value;
        Ok(())
    }

    /// The view's elements as a mutable slice in local coordinates.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.slice
    }
}
