//! Cancellation subsystem: request sets and the progress propagation graph.
//!
//! Cancellation here is a **domain concept** (cancelling a long-running
//! simulated task), not a scheduling primitive. In-flight jobs always run
//! to completion; a cancel request only prevents future scheduling of
//! continuation work for a record id, via the consolidation-time filter.
//!
//! ## Request sets
//!
//! [`CancelRequestSet`] queues `request_cancel` writes into a multi-lane
//! pending stream and rebuilds a hash lookup from them once per frame.
//! The lookup is *not* additive across frames: each consolidation clears
//! and repopulates it, so stream filters always observe exactly the
//! requests of the current pass.
//!
//! ## Progress propagation
//!
//! [`ProgressGraph`] tracks when all in-flight cancellation work under an
//! owner level has finished. Nodes form a tree mirroring the owner
//! hierarchy; each node's progress lookup maps `RecordId →
//! still_processing`.
//!
//! The per-frame check runs **bottom-up by depth, deepest first**, so a
//! completion can cascade through multiple levels within a single frame
//! instead of paying one frame of latency per level.
//!
//! Per entry the check plays a canary game: a `true` flag is flipped to
//! `false` and the entry is treated as not-yet-complete; any still-active
//! unwind job flips it back to `true` before the next check. An entry
//! found `false` therefore means every job for that id finished (or none
//! ever existed): the entry is removed and a [`CancelComplete`] record is
//! emitted to the node's completion stream.
//!
//! When a node has a parent, the **parent's** keys (scoped by this node's
//! context) drive the iteration rather than the node's own: one owner
//! level may have several children sharing it, and iterating a child
//! directly would misattribute completions across siblings. A child with
//! work still in flight re-marks the parent entry as processing; a child
//! about to complete leaves it alone, so a parent can only complete an id
//! once no child keeps it alive.
//!
//! ## Soft-lock prevention
//!
//! A request that arrives at a node with no unwind work configured has
//! nothing that will ever touch its progress entries again. The node flags
//! itself for a follow-up check so the flipped canaries are collected next
//! frame regardless of further changes. Structural prevention, not error
//! signaling.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::sched::buffer::{LaneWriter, PendingStream};
use crate::sched::error::LaneBoundsError;
use crate::sched::types::{Context, Keyed, LaneIndex, LookupVersion, RecordId};


/// Hash lookup that bumps a version counter on every observable mutation.
///
/// The version drives the progress graph's skip optimization: a node whose
/// inputs report unchanged versions is not re-checked.
pub struct VersionedLookup<K, V> {
    map: FxHashMap<K, V>,
    version: LookupVersion,
}

impl<K: std::hash::Hash + Eq, V> VersionedLookup<K, V> {
    /// Creates an empty lookup at version 0.
    pub fn new() -> Self {
        VersionedLookup { map: FxHashMap::default(), version: 0 }
    }

    /// Current version; monotonic, bumped by every mutation that changed
    /// the contents.
    #[inline]
    pub fn version(&self) -> LookupVersion {
        self.version
    }

    /// Inserts or overwrites an entry.
    pub fn insert(&mut self, key: K, value: V) {
        self.version += 1;
        self.map.insert(key, value);
    }

    /// Removes an entry, bumping the version only if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.map.remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Looks up an entry.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Returns `true` if the key is present.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Iterates the keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the lookup holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clears the lookup, bumping the version only if it held entries.
    pub fn clear(&mut self) {
        if !self.map.is_empty() {
            self.version += 1;
            self.map.clear();
        }
    }
}

impl<K: std::hash::Hash + Eq, V> Default for VersionedLookup<K, V> {
    fn default() -> Self {
        VersionedLookup::new()
    }
}

/// How a stream treats records whose id has a pending cancel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelBehaviour {
    /// Cancelled records are dropped during consolidation with no trace.
    Delete,
    /// The stream is not cancellable; requests are ignored for it.
    Ignore,
    /// Cancelled records are diverted to a pending-cancel side stream for
    /// explicit unwind jobs instead of being dropped.
    Unwind,
}

/// Emitted when every unwind job for a cancelled id has finished at one
/// owner level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelComplete {
    /// Identity of the record whose cancellation completed.
    pub id: RecordId,
}

impl Keyed for CancelComplete {
    #[inline]
    fn record_id(&self) -> RecordId {
        self.id
    }
}

/// Queued cancel requests plus the per-frame lookup rebuilt from them.
pub struct CancelRequestSet {
    queued: PendingStream<RecordId>,
    lookup: VersionedLookup<RecordId, bool>,
}

impl CancelRequestSet {
    /// Creates a request set whose queue has `lane_count` lanes.
    pub fn new(lane_count: u32) -> Self {
        CancelRequestSet {
            queued: PendingStream::new(lane_count),
            lookup: VersionedLookup::new(),
        }
    }

    /// Returns a lane-bound writer for queueing requests.
    pub fn writer(&mut self, lane: LaneIndex) -> Result<CancelWriter<'_>, LaneBoundsError> {
        Ok(CancelWriter { inner: self.queued.lane_writer(lane)? })
    }

    /// Rebuilds the lookup from the queued requests.
    ///
    /// Runs once per frame, before any stream consolidation, so filters
    /// observe up-to-date state. Returns the ids consolidated this pass in
    /// lane-major queue order (duplicates collapsed).
    pub fn consolidate(&mut self) -> Vec<RecordId> {
        self.lookup.clear();
        let mut fresh = Vec::with_capacity(self.queued.count());
        for id in self.queued.iter() {
            if !self.lookup.contains_key(&id) {
                self.lookup.insert(id, true);
                fresh.push(id);
            }
        }
        self.queued.clear();
        fresh
    }

    /// Returns `true` if a cancel request for `id` is pending this frame.
    #[inline]
    pub fn contains(&self, id: RecordId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Version of the consolidated lookup.
    #[inline]
    pub fn version(&self) -> LookupVersion {
        self.lookup.version()
    }

    /// Number of requests pending this frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Returns `true` if no request is pending this frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// Lane-bound writer queueing cancel requests.
pub struct CancelWriter<'a> {
    inner: LaneWriter<'a, RecordId>,
}

impl CancelWriter<'_> {
    /// Queues a cancel request for `id`; it takes effect at the next
    /// request-set consolidation.
    pub fn request_cancel(&mut self, id: RecordId) {
        self.inner.write(id);
    }
}

/// Identifier of a node in the progress propagation graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ProgressNodeId(u32);

struct ProgressNode {
    parent: Option<ProgressNodeId>,
    depth: u32,
    /// Contexts produced anywhere in this node's subtree. A parent key is
    /// driven by the unique child whose coverage contains its context, so
    /// sibling subtrees must not share context bytes.
    covered: SmallVec<[Context; 8]>,
    progress: VersionedLookup<RecordId, bool>,
    completions: PendingStream<CancelComplete>,
    /// Latest request-set version reported by the owning driver.
    request_version: LookupVersion,
    seen_request_version: LookupVersion,
    seen_progress_version: LookupVersion,
    seen_parent_version: LookupVersion,
    follow_up_required: bool,
    unwind_configured: bool,
}

/// Tree of per-owner-level progress nodes, checked bottom-up once per
/// frame.
///
/// Nodes are arena entries referenced by [`ProgressNodeId`]; a child's
/// index is always greater than its parent's, which both fixes the
/// bottom-up ordering ties and lets the frame check split borrows safely.
pub struct ProgressGraph {
    nodes: Vec<ProgressNode>,
    order: Vec<u32>,
    order_dirty: bool,
}

impl ProgressGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        ProgressGraph { nodes: Vec::new(), order: Vec::new(), order_dirty: false }
    }

    fn push_node(&mut self, parent: Option<ProgressNodeId>, depth: u32, scope: Context) -> ProgressNodeId {
        let id = ProgressNodeId(self.nodes.len() as u32);
        let mut covered = SmallVec::new();
        covered.push(scope);
        self.nodes.push(ProgressNode {
            parent,
            depth,
            covered,
            progress: VersionedLookup::new(),
            completions: PendingStream::new(1),
            request_version: 0,
            seen_request_version: 0,
            seen_progress_version: 0,
            seen_parent_version: 0,
            follow_up_required: false,
            unwind_configured: false,
        });
        self.order_dirty = true;
        id
    }

    /// Adds a root node (depth 0).
    pub fn add_root(&mut self, scope: Context) -> ProgressNodeId {
        self.push_node(None, 0, scope)
    }

    /// Adds a child under `parent`.
    ///
    /// The child's context is added to every ancestor's coverage so parent
    /// keys produced in this subtree are attributed to it.
    pub fn add_child(&mut self, parent: ProgressNodeId, scope: Context) -> ProgressNodeId {
        let depth = self.nodes[parent.0 as usize].depth + 1;
        let id = self.push_node(Some(parent), depth, scope);
        let mut current = Some(parent);
        while let Some(node_id) = current {
            let ancestor = &mut self.nodes[node_id.0 as usize];
            if !ancestor.covered.contains(&scope) {
                ancestor.covered.push(scope);
            }
            current = ancestor.parent;
        }
        id
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Records that unwind work is configured at `node`, so its progress
    /// entries will be kept alive by running jobs.
    pub fn set_unwind_configured(&mut self, node: ProgressNodeId) {
        self.nodes[node.0 as usize].unwind_configured = true;
    }

    /// Reports the owning driver's request-set version for `node`.
    pub fn set_request_version(&mut self, node: ProgressNodeId, version: LookupVersion) {
        self.nodes[node.0 as usize].request_version = version;
    }

    /// Inserts `id → still_processing` at `node` and every ancestor.
    ///
    /// Called when a cancel request consolidates, so a parent level cannot
    /// complete the id while any descendant still tracks it.
    pub fn mark_cancel_requested(&mut self, node: ProgressNodeId, id: RecordId) {
        let mut current = Some(node);
        while let Some(node_id) = current {
            let entry = &mut self.nodes[node_id.0 as usize];
            entry.progress.insert(id, true);
            current = entry.parent;
        }
    }

    /// Re-marks an id as actively being processed at `node`.
    ///
    /// Unwind jobs call this every frame they are still working on the id;
    /// it is what keeps the canary alive between frame checks.
    pub fn mark_processing(&mut self, node: ProgressNodeId, id: RecordId) {
        self.nodes[node.0 as usize].progress.insert(id, true);
    }

    /// Read access to a node's progress lookup.
    pub fn progress(&self, node: ProgressNodeId) -> &VersionedLookup<RecordId, bool> {
        &self.nodes[node.0 as usize].progress
    }

    /// Drains the completion records emitted at `node`.
    pub fn take_completions(&mut self, node: ProgressNodeId) -> Vec<CancelComplete> {
        let stream = &mut self.nodes[node.0 as usize].completions;
        let out = stream.to_vec();
        stream.clear();
        out
    }

    fn rebuild_order(&mut self) {
        self.order = (0..self.nodes.len() as u32).collect();
        // Deepest first; the stable sort keeps arena order inside one
        // depth, which keeps sibling checks deterministic.
        self.order.sort_by_key(|&i| std::cmp::Reverse(self.nodes[i as usize].depth));
        self.order_dirty = false;
    }

    /// Runs the per-frame completion check over every node, deepest first.
    ///
    /// Holding `&mut self` here is the exclusive access the check needs to
    /// each node's progress lookup and completion stream; jobs that mutate
    /// progress lookups run earlier in the frame under their own access
    /// grants.
    pub fn run_frame(&mut self) {
        if self.order_dirty {
            self.rebuild_order();
        }
        let order = std::mem::take(&mut self.order);
        for &index in &order {
            self.check_node(index as usize);
        }
        self.order = order;
    }

    fn check_node(&mut self, index: usize) {
        // A parent always precedes its children in the arena, so splitting
        // at the node's index yields the parent on the left.
        let (head, tail) = self.nodes.split_at_mut(index);
        let node = &mut tail[0];
        let mut parent = match node.parent {
            Some(p) => Some(&mut head[p.0 as usize]),
            None => None,
        };

        let parent_version = parent.as_ref().map(|p| p.progress.version());
        let progress_version = node.progress.version();
        let progress_changed = node.seen_progress_version != progress_version;
        let parent_changed = parent_version
            .map(|v| v != node.seen_parent_version)
            .unwrap_or(false);
        let requests_changed = node.seen_request_version != node.request_version;

        if !progress_changed && !parent_changed && !requests_changed && !node.follow_up_required {
            return;
        }

        // Versions are recorded as of the *start* of this check, so the
        // check's own flips and removals count as changes and re-drive the
        // node next frame until it settles.
        node.seen_progress_version = progress_version;
        node.seen_request_version = node.request_version;
        if let Some(v) = parent_version {
            node.seen_parent_version = v;
        }

        // A request with no unwind work configured will never see its
        // canaries touched again; force one more check next frame so they
        // are collected instead of soft-locking.
        node.follow_up_required = requests_changed && !node.unwind_configured;

        let keys: Vec<RecordId> = match parent.as_ref() {
            Some(p) => p
                .progress
                .keys()
                .filter(|id| node.covered.contains(&id.context))
                .copied()
                .collect(),
            None => node.progress.keys().copied().collect(),
        };

        let mut completed: Vec<RecordId> = Vec::new();
        for id in keys {
            match node.progress.get(&id).copied() {
                Some(true) => {
                    // Canary: an active job re-marks before the next check.
                    node.progress.insert(id, false);
                    if let Some(p) = parent.as_mut() {
                        p.progress.insert(id, true);
                    }
                }
                Some(false) => {
                    node.progress.remove(&id);
                    completed.push(id);
                    // The parent entry is left alone: this level no longer
                    // keeps it alive, and the parent's own check (later
                    // this frame) decides whether it completes too.
                }
                None => {}
            }
        }

        if !completed.is_empty() {
            let mut writer = node
                .completions
                .lane_writer(0)
                .expect("completion streams always have lane 0");
            for id in completed {
                writer.write(CancelComplete { id });
            }
        }
    }
}

impl Default for ProgressGraph {
    fn default() -> Self {
        ProgressGraph::new()
    }
}
