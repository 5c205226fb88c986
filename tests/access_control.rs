use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskstream::{AccessController, AccessError, AccessType, JobGraph, JobHandle};

#[test]
fn combined_handles_complete_only_after_all_inputs() {
    let mut graph = JobGraph::new();

    let first = graph.register(&[]);
    let second = graph.register(&[]);
    let joined = graph.combine(&[first, second]);

    assert!(!graph.is_complete(joined));
    graph.mark_complete(first);
    assert!(!graph.is_complete(joined));
    graph.mark_complete(second);
    assert!(graph.is_complete(joined));

    assert_eq!(graph.combine(&[]), JobHandle::COMPLETE);
    assert!(graph.is_complete(JobHandle::COMPLETE));
}

#[test]
fn registered_work_waits_for_dependencies() {
    let mut graph = JobGraph::new();

    let dependency = graph.register(&[]);
    let dependent = graph.register(&[dependency]);

    graph.mark_complete(dependent);
    assert!(
        !graph.is_complete(dependent),
        "a marked node is still incomplete while its dependency is open"
    );
    graph.mark_complete(dependency);
    assert!(graph.is_complete(dependent));
}

#[test]
fn exclusive_write_waits_for_an_outstanding_reader() {
    let mut graph = JobGraph::new();
    let mut controller = AccessController::new();

    let read_grant = controller.acquire(&mut graph, AccessType::SharedRead).unwrap();
    assert!(graph.is_complete(read_grant));
    let read_job = graph.register(&[read_grant]);
    controller.release(&mut graph, read_job).unwrap();

    // The reader's completion has not fired yet; an exclusive writer must
    // wait for it.
    let write_grant = controller
        .acquire(&mut graph, AccessType::ExclusiveWrite)
        .unwrap();
    assert!(!graph.is_complete(write_grant));

    graph.mark_complete(read_job);
    assert!(graph.is_complete(write_grant));
}

#[test]
fn shared_reads_do_not_serialize_against_each_other() {
    let mut graph = JobGraph::new();
    let mut controller = AccessController::new();

    let first_grant = controller.acquire(&mut graph, AccessType::SharedRead).unwrap();
    let first_job = graph.register(&[first_grant]);
    controller.release(&mut graph, first_job).unwrap();

    // The first read job is still running; a second read may start anyway.
    let second_grant = controller.acquire(&mut graph, AccessType::SharedRead).unwrap();
    assert!(graph.is_complete(second_grant));
    controller.release(&mut graph, second_grant).unwrap();
}

#[test]
fn shared_writes_coexist_but_fence_readers() {
    let mut graph = JobGraph::new();
    let mut controller = AccessController::new();

    let first_grant = controller.acquire(&mut graph, AccessType::SharedWrite).unwrap();
    let first_job = graph.register(&[first_grant]);
    controller.release(&mut graph, first_job).unwrap();

    let second_grant = controller.acquire(&mut graph, AccessType::SharedWrite).unwrap();
    assert!(
        graph.is_complete(second_grant),
        "lane-isolated writers may overlap"
    );
    let second_job = graph.register(&[second_grant]);
    controller.release(&mut graph, second_job).unwrap();

    let read_grant = controller.acquire(&mut graph, AccessType::SharedRead).unwrap();
    assert!(!graph.is_complete(read_grant), "readers wait for both writers");
    graph.mark_complete(first_job);
    assert!(!graph.is_complete(read_grant));
    graph.mark_complete(second_job);
    assert!(graph.is_complete(read_grant));
}

#[test]
fn pairing_violations_are_reported() {
    let mut graph = JobGraph::new();
    let mut controller = AccessController::new();

    let grant = controller.acquire(&mut graph, AccessType::SharedRead).unwrap();
    assert_eq!(
        controller.acquire(&mut graph, AccessType::ExclusiveWrite),
        Err(AccessError::AlreadyAcquired {
            held: AccessType::SharedRead,
            requested: AccessType::ExclusiveWrite,
        })
    );
    controller.release(&mut graph, grant).unwrap();

    assert_eq!(
        controller.release(&mut graph, grant),
        Err(AccessError::ReleaseWithoutAcquire)
    );
}

#[test]
fn disposal_is_terminal() {
    let mut graph = JobGraph::new();
    let mut controller = AccessController::new();

    let grant = controller.acquire(&mut graph, AccessType::Disposal).unwrap();
    controller.release(&mut graph, grant).unwrap();

    assert_eq!(
        controller.acquire(&mut graph, AccessType::SharedRead),
        Err(AccessError::UseAfterDisposal)
    );
}

struct DropProbe {
    drops: Arc<AtomicUsize>,
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn deferred_drops_wait_for_their_handle() {
    let mut graph = JobGraph::new();
    let drops = Arc::new(AtomicUsize::new(0));

    let gate = graph.register(&[]);
    graph.defer_drop(gate, Box::new(DropProbe { drops: Arc::clone(&drops) }));

    assert_eq!(graph.sweep(), 0);
    assert_eq!(graph.parked_count(), 1);
    assert_eq!(drops.load(Ordering::Relaxed), 0);

    graph.mark_complete(gate);
    assert_eq!(graph.sweep(), 1);
    assert_eq!(graph.parked_count(), 0);
    assert_eq!(drops.load(Ordering::Relaxed), 1);
}
