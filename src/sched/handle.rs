//! Completion handles and the handle dependency arena.
//!
//! A [`JobHandle`] is a lightweight copyable token standing for "some unit
//! of work has finished". Handles are allocated from a [`JobGraph`] — an
//! arena owned by the top-level scheduler and referenced by integer index,
//! never by instance identity in process-wide state.
//!
//! ## Model
//!
//! Nothing in this module runs work. A handle is complete when its own node
//! has been marked finished **and** every handle it depends on is complete;
//! a pure join produced by [`JobGraph::combine`] is finished from birth and
//! completes exactly when all of its inputs do. The access controller and
//! the job harness build their ordering guarantees entirely out of these
//! two operations.
//!
//! ## Deferred disposal
//!
//! Resources whose teardown must wait for in-flight work (e.g. a retired
//! live snapshot with readers still scheduled against it) are parked on the
//! graph with [`JobGraph::defer_drop`] and freed by [`JobGraph::sweep`]
//! once their handle completes.
//!
//! ## Lifetime
//!
//! Nodes accumulate for the lifetime of the graph; a frame-oriented caller
//! calls [`JobGraph::reset`] at a point where no handle from the previous
//! frame is still referenced. Handles from before a reset are invalidated
//! and must not be queried again.

use std::any::Any;

use smallvec::SmallVec;


/// Copyable completion token allocated from a [`JobGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct JobHandle(u32);

impl JobHandle {
    /// The always-complete sentinel handle.
    ///
    /// Useful as the initial value of dependency accumulators and as the
    /// dependency of work with no predecessors.
    pub const COMPLETE: JobHandle = JobHandle(0);
}

impl Default for JobHandle {
    fn default() -> Self {
        JobHandle::COMPLETE
    }
}

struct JobNode {
    dependencies: SmallVec<[JobHandle; 4]>,
    finished: bool,
}

struct ParkedValue {
    after: JobHandle,
    value: Box<dyn Any + Send>,
}

/// Arena of completion-handle nodes.
///
/// ## Role
/// Owns every handle's dependency list and finished flag, and the parked
/// values awaiting deferred disposal. One graph exists per top-level
/// scheduler; subsystems receive `&mut JobGraph` rather than holding their
/// own, so handle identity is always interpretable in one arena.
pub struct JobGraph {
    nodes: Vec<JobNode>,
    parked: Vec<ParkedValue>,
}

impl JobGraph {
    /// Creates an empty graph containing only the [`JobHandle::COMPLETE`]
    /// sentinel.
    pub fn new() -> Self {
        JobGraph {
            nodes: vec![JobNode { dependencies: SmallVec::new(), finished: true }],
            parked: Vec::new(),
        }
    }

    fn push_node(&mut self, dependencies: &[JobHandle], finished: bool) -> JobHandle {
        let index = self.nodes.len() as u32;
        self.nodes.push(JobNode {
            dependencies: SmallVec::from_slice(dependencies),
            finished,
        });
        JobHandle(index)
    }

    /// Registers a unit of work depending on `dependencies`.
    ///
    /// The returned handle completes only after [`JobGraph::mark_complete`]
    /// is called for it *and* every dependency has completed.
    pub fn register(&mut self, dependencies: &[JobHandle]) -> JobHandle {
        self.push_node(dependencies, false)
    }

    /// Combines several handles into one.
    ///
    /// The result is a pure join: it completes exactly when all inputs
    /// have. Combining nothing yields [`JobHandle::COMPLETE`]; combining a
    /// single handle returns it unchanged rather than allocating a node.
    pub fn combine(&mut self, dependencies: &[JobHandle]) -> JobHandle {
        match dependencies {
            [] => JobHandle::COMPLETE,
            [single] => *single,
            _ if dependencies.iter().all(|&d| d == JobHandle::COMPLETE) => JobHandle::COMPLETE,
            _ => self.push_node(dependencies, true),
        }
    }

    /// Marks a work node's own portion as finished.
    ///
    /// The handle still does not report complete until its dependencies do.
    pub fn mark_complete(&mut self, handle: JobHandle) {
        self.nodes[handle.0 as usize].finished = true;
    }

    /// Returns `true` if the handle and its whole dependency closure have
    /// completed.
    pub fn is_complete(&self, handle: JobHandle) -> bool {
        // Iterative walk; dependency edges always point at older nodes, so
        // the closure is acyclic by construction.
        let mut stack: SmallVec<[JobHandle; 8]> = SmallVec::new();
        stack.push(handle);
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0 as usize];
            if !node.finished {
                return false;
            }
            stack.extend(node.dependencies.iter().copied());
        }
        true
    }

    /// Parks a value to be dropped once `after` completes.
    ///
    /// Used for retired snapshot buffers whose readers are still in flight;
    /// the synchronous disposal path is an ordinary drop at the call site.
    pub fn defer_drop(&mut self, after: JobHandle, value: Box<dyn Any + Send>) {
        self.parked.push(ParkedValue { after, value });
    }

    /// Drops every parked value whose handle has completed.
    ///
    /// Returns the number of values freed.
    pub fn sweep(&mut self) -> usize {
        let before = self.parked.len();
        let mut index = 0;
        while index < self.parked.len() {
            if self.is_complete(self.parked[index].after) {
                drop(self.parked.swap_remove(index).value);
            } else {
                index += 1;
            }
        }
        before - self.parked.len()
    }

    /// Number of values still awaiting deferred disposal.
    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    /// Clears every node back to the sentinel-only state.
    ///
    /// Parked values that never saw their handle complete are dropped here;
    /// at a frame boundary everything scheduled during the frame has
    /// retired. Handles issued before the reset must not be used again.
    pub fn reset(&mut self) {
        self.parked.clear();
        self.nodes.truncate(1);
    }

    /// Number of nodes allocated, including the sentinel.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for JobGraph {
    fn default() -> Self {
        JobGraph::new()
    }
}
