use rayon::prelude::*;

use taskstream::{DeferredArray, JobGraph, SnapshotError};

#[test]
fn placeholder_is_not_indexable() {
    let array: DeferredArray<u32> = DeferredArray::new();
    assert!(!array.is_created());
    assert_eq!(array.len(), 0);
    assert_eq!(array.get(0), Err(SnapshotError::NotCreated));
    assert_eq!(array.capacity(), Err(SnapshotError::NotCreated));
    assert!(array.range_view(0..0).is_err());
}

#[test]
fn size_is_fixed_exactly_once() {
    let mut array: DeferredArray<u32> = DeferredArray::new();
    array.deferred_create(8).unwrap();
    assert_eq!(
        array.deferred_create(16),
        Err(SnapshotError::AlreadyCreated { capacity: 8 })
    );
    assert_eq!(array.capacity(), Ok(8));
}

#[test]
fn sequential_fill_tracks_logical_length() {
    let mut array: DeferredArray<u32> = DeferredArray::new();
    array.deferred_create(10).unwrap();

    for value in 0..7 {
        array.push(value).unwrap();
    }

    // Over-allocation is intentional: capacity stays at the worst case
    // while the logical length reflects what was actually written.
    assert_eq!(array.len(), 7);
    assert_eq!(array.capacity(), Ok(10));
    assert_eq!(array.get(6), Ok(6));
    assert_eq!(array.get(7), Err(SnapshotError::OutOfBounds { index: 7, length: 7 }));

    array.set(0, 99).unwrap();
    assert_eq!(array.as_slice()[0], 99);
}

#[test]
fn fill_cannot_exceed_created_capacity() {
    let mut array: DeferredArray<u32> = DeferredArray::new();
    array.deferred_create(2).unwrap();
    array.push(1).unwrap();
    array.push(2).unwrap();
    assert_eq!(
        array.push(3),
        Err(SnapshotError::CapacityExceeded { capacity: 2 })
    );
}

#[test]
fn restricted_range_misses_are_distinguished_from_out_of_bounds() {
    let mut array: DeferredArray<u32> = DeferredArray::new();
    array.deferred_create(10).unwrap();
    for value in 0..10 {
        array.push(value * 10).unwrap();
    }

    let view = array.range_view(2..5).unwrap();
    assert_eq!(view.range(), 2..5);
    assert_eq!(view.get(3), Ok(30));

    // Valid for the array, invalid for this view: a partitioning bug.
    assert_eq!(
        view.get(7),
        Err(SnapshotError::OutsideRestrictedRange { index: 7, start: 2, end: 5, length: 10 })
    );

    // Invalid for the array altogether: a sizing bug.
    assert_eq!(
        view.get(12),
        Err(SnapshotError::OutOfBounds { index: 12, length: 10 })
    );
}

#[test]
fn partitions_cover_the_array_disjointly() {
    let mut array: DeferredArray<u64> = DeferredArray::new();
    array.deferred_create(10).unwrap();
    for value in 0..10 {
        array.push(value).unwrap();
    }

    let views = array.partition_mut(3);
    let ranges: Vec<_> = views.iter().map(|view| view.range()).collect();
    assert_eq!(ranges, vec![0..4, 4..8, 8..10]);

    // Disjoint mutable views are exactly what batched parallel updates
    // consume.
    views.into_par_iter().for_each(|mut view| {
        for index in view.range() {
            let value = view.get(index).unwrap();
            view.set(index, value * 2).unwrap();
        }
    });

    let doubled: Vec<u64> = array.as_slice().to_vec();
    assert_eq!(doubled, (0..10).map(|value| value * 2).collect::<Vec<_>>());
}

#[test]
fn mutable_views_keep_the_range_diagnostics() {
    let mut array: DeferredArray<u64> = DeferredArray::new();
    array.deferred_create(6).unwrap();
    for value in 0..6 {
        array.push(value).unwrap();
    }

    let mut views = array.partition_mut(2);
    let mut tail = views.pop().unwrap();
    assert_eq!(tail.range(), 3..6);
    assert_eq!(
        tail.set(0, 9),
        Err(SnapshotError::OutsideRestrictedRange { index: 0, start: 3, end: 6, length: 6 })
    );
    assert_eq!(tail.get(6), Err(SnapshotError::OutOfBounds { index: 6, length: 6 }));
    tail.set(5, 50).unwrap();
    drop(views);
    assert_eq!(array.get(5), Ok(50));
}

#[test]
fn deferred_disposal_waits_for_in_flight_readers() {
    let mut graph = JobGraph::new();

    let mut array: DeferredArray<u64> = DeferredArray::new();
    array.deferred_create(4).unwrap();
    for value in 0..4 {
        array.push(value).unwrap();
    }

    let readers = graph.register(&[]);
    let disposed = array.dispose_deferred(&mut graph, readers);

    assert!(!graph.is_complete(disposed));
    assert_eq!(graph.sweep(), 0);
    assert_eq!(graph.parked_count(), 1);

    graph.mark_complete(readers);
    assert!(graph.is_complete(disposed));
    assert_eq!(graph.sweep(), 1);
    assert_eq!(graph.parked_count(), 0);
}
