//! Dynamic Bounding Volume Hierarchy (Broad Phase)
//!
//! A binary tree of AABBs that maintains a spatial index of moving entries
//! and reports overlapping pairs. Nodes live in an index-addressable arena
//! (`Vec<Node>` plus a free list), so rebalancing and subtree rebuilds are
//! index reassignments rather than pointer surgery.
//!
//! # Per-step flow
//!
//! Hosts mutate entry bounding boxes, then call [`DynamicHierarchy::update`]
//! (or the looper-driven variant): a bottom-up refit recomputes every cached
//! box and volume, opportunistically rebuilding subtrees whose volume has
//! drifted past the revalidation threshold, and a self-overlap traversal
//! reports each intersecting unordered pair exactly once.
//!
//! # Multithreaded update
//!
//! At a caller-chosen split depth the subtrees are independent: refit and
//! self-overlap run as parallel jobs over job-local buffers, merged in job
//! order so pair output is deterministic. Overlaps spanning two subtrees are
//! collected as explicit work items by a single-threaded partition pass and
//! solved alongside the per-subtree jobs. The nodes above the split get a
//! cheap single-threaded refit.

use crate::bounds::Aabb;
use crate::fixed::Fix64;
use crate::looper::ParallelLooper;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Null node sentinel
const NULL: u32 = u32::MAX;

/// Contract every spatial client must satisfy: expose a bounding box, and be
/// able to refresh it on demand. The hierarchy only calls
/// `update_bounding_box` when it detects a degenerate (zero-volume) box at
/// insertion time.
pub trait BroadPhaseEntry {
    /// Current bounding box of the entry.
    fn bounding_box(&self) -> Aabb;

    /// Recompute the bounding box from the entry's own state.
    fn update_bounding_box(&mut self);
}

/// Handle to an entry held by the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u32);

impl EntryId {
    /// Slot index of this entry.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tree node: a leaf owns exactly one entry, an internal node owns exactly
/// two children plus the merged box and cached volume metric.
#[derive(Clone, Copy, Debug)]
struct Node {
    parent: u32,
    left: u32,
    right: u32,
    /// Entry slot for leaves, `NULL` for internal nodes.
    entry: u32,
    aabb: Aabb,
    /// Cached metric of `aabb`, used by the insertion heuristic.
    volume: Fix64,
    /// Volume at the time this node was (re)built; refit compares against it
    /// to decide when the subtree has degraded enough to revalidate.
    rebuild_volume: Fix64,
}

impl Node {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.entry != NULL
    }
}

/// Per-job refit output for the multithreaded path: recomputed node state
/// plus any subtrees that crossed the revalidation threshold.
struct RefitJob {
    updates: Vec<(u32, Aabb, Fix64)>,
    rebuilds: Vec<u32>,
}

/// Dynamic bounding volume hierarchy over entries of type `E`.
pub struct DynamicHierarchy<E: BroadPhaseEntry> {
    nodes: Vec<Node>,
    free_nodes: Vec<u32>,
    root: u32,
    entries: Vec<Option<E>>,
    free_entries: Vec<u32>,
    pairs: Vec<(EntryId, EntryId)>,
    stale_removals: u64,
    /// Multiplier on a node's as-built volume beyond which refit tears the
    /// subtree down and rebuilds it.
    pub revalidation_factor: Fix64,
}

impl<E: BroadPhaseEntry> Default for DynamicHierarchy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BroadPhaseEntry> DynamicHierarchy<E> {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: NULL,
            entries: Vec::new(),
            free_entries: Vec::new(),
            pairs: Vec::new(),
            stale_removals: 0,
            revalidation_factor: Fix64::TWO,
        }
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.entries.len() - self.free_entries.len()
    }

    /// Check if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live node count, leaves plus internal nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Tree height; an empty tree and a lone leaf both have height 0.
    pub fn height(&self) -> usize {
        fn walk<E: BroadPhaseEntry>(h: &DynamicHierarchy<E>, id: u32) -> usize {
            let node = &h.nodes[id as usize];
            if node.is_leaf() {
                0
            } else {
                1 + walk(h, node.left).max(walk(h, node.right))
            }
        }
        if self.root == NULL {
            0
        } else {
            walk(self, self.root)
        }
    }

    /// Times the fast removal path missed and fell back to the brute-force
    /// search. Frequent hits mean entries are moving without their tree
    /// location being updated — a host bug signal, not expected behavior.
    pub fn stale_removals(&self) -> u64 {
        self.stale_removals
    }

    /// Borrow an entry.
    pub fn entry(&self, id: EntryId) -> Option<&E> {
        self.entries.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Mutably borrow an entry (hosts update boxes through this between
    /// steps).
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut E> {
        self.entries
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
    }

    /// Pairs reported by the most recent update.
    pub fn pairs(&self) -> &[(EntryId, EntryId)] {
        &self.pairs
    }

    // ------------------------------------------------------------------
    // Add / remove
    // ------------------------------------------------------------------

    /// Insert an entry, wrapping it in a new leaf.
    ///
    /// A degenerate (zero-volume) incoming box gets one
    /// `update_bounding_box` call before insertion so it cannot poison the
    /// volume heuristic.
    pub fn add(&mut self, mut entry: E) -> EntryId {
        if entry.bounding_box().is_degenerate() {
            entry.update_bounding_box();
        }
        let aabb = entry.bounding_box();
        let entry_slot = self.alloc_entry(entry);
        let leaf = self.alloc_node(Node {
            parent: NULL,
            left: NULL,
            right: NULL,
            entry: entry_slot,
            aabb,
            volume: aabb.volume(),
            rebuild_volume: aabb.volume(),
        });
        self.insert_leaf(leaf);
        EntryId(entry_slot)
    }

    /// Remove an entry and return it.
    ///
    /// Tries the bounding-box-guided fast search first; if the entry's
    /// current box no longer locates its leaf (it moved without the tree
    /// being updated), falls back to a brute-force full-tree search.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not present — the caller has violated the
    /// hierarchy's invariant and continuing would corrupt the index.
    pub fn remove(&mut self, id: EntryId) -> E {
        let slot = id.0;
        let target_box = match self.entries.get(slot as usize) {
            Some(Some(entry)) => entry.bounding_box(),
            _ => panic!("removed entry {} is not present in the hierarchy", slot),
        };
        let leaf = match self.find_leaf_guided(slot, &target_box) {
            Some(leaf) => leaf,
            None => {
                self.stale_removals += 1;
                self.find_leaf_brute(slot)
                    .unwrap_or_else(|| panic!("entry {} has a leaf nowhere in the tree", slot))
            }
        };
        self.remove_leaf(leaf);
        self.free_node(leaf);
        let entry = self.entries[slot as usize].take().expect("entry checked above");
        self.free_entries.push(slot);
        entry
    }

    fn alloc_entry(&mut self, entry: E) -> u32 {
        if let Some(slot) = self.free_entries.pop() {
            self.entries[slot as usize] = Some(entry);
            slot
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u32
        }
    }

    fn alloc_node(&mut self, node: Node) -> u32 {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, id: u32) {
        self.nodes[id as usize].entry = NULL;
        self.nodes[id as usize].left = NULL;
        self.nodes[id as usize].right = NULL;
        self.nodes[id as usize].parent = NULL;
        self.free_nodes.push(id);
    }

    /// Walk from the root, at each internal node descending into the child
    /// whose volume grows least when merged with the new box (ties broken by
    /// smaller existing volume), merging boxes top-down along the way. The
    /// leaf reached becomes the new leaf's sibling under a fresh internal
    /// node.
    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL;
            return;
        }
        let leaf_box = self.nodes[leaf as usize].aabb;
        let mut current = self.root;
        while !self.nodes[current as usize].is_leaf() {
            let merged = Aabb::merged(&self.nodes[current as usize].aabb, &leaf_box);
            self.nodes[current as usize].aabb = merged;
            self.nodes[current as usize].volume = merged.volume();

            let left = self.nodes[current as usize].left;
            let right = self.nodes[current as usize].right;
            let left_node = &self.nodes[left as usize];
            let right_node = &self.nodes[right as usize];
            let left_grown = Aabb::merged(&left_node.aabb, &leaf_box)
                .volume()
                .saturating_sub(left_node.volume);
            let right_grown = Aabb::merged(&right_node.aabb, &leaf_box)
                .volume()
                .saturating_sub(right_node.volume);
            current = if left_grown < right_grown {
                left
            } else if right_grown < left_grown {
                right
            } else if left_node.volume <= right_node.volume {
                left
            } else {
                right
            };
        }

        // Convert the chosen leaf into an internal node's left child, with
        // the new leaf as its sibling.
        let old_parent = self.nodes[current as usize].parent;
        let merged = Aabb::merged(&self.nodes[current as usize].aabb, &leaf_box);
        let volume = merged.volume();
        let internal = self.alloc_node(Node {
            parent: old_parent,
            left: current,
            right: leaf,
            entry: NULL,
            aabb: merged,
            volume,
            rebuild_volume: volume,
        });
        if old_parent == NULL {
            self.root = internal;
        } else if self.nodes[old_parent as usize].left == current {
            self.nodes[old_parent as usize].left = internal;
        } else {
            self.nodes[old_parent as usize].right = internal;
        }
        self.nodes[current as usize].parent = internal;
        self.nodes[leaf as usize].parent = internal;
    }

    /// Remove a leaf, collapsing its parent and promoting the sibling.
    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL;
            return;
        }
        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };
        if grandparent == NULL {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL;
        } else {
            if self.nodes[grandparent as usize].left == parent {
                self.nodes[grandparent as usize].left = sibling;
            } else {
                self.nodes[grandparent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.refit_upward(grandparent);
        }
        self.free_node(parent);
    }

    fn refit_upward(&mut self, start: u32) {
        let mut id = start;
        while id != NULL {
            let left = self.nodes[id as usize].left;
            let right = self.nodes[id as usize].right;
            let merged = Aabb::merged(
                &self.nodes[left as usize].aabb,
                &self.nodes[right as usize].aabb,
            );
            self.nodes[id as usize].aabb = merged;
            self.nodes[id as usize].volume = merged.volume();
            id = self.nodes[id as usize].parent;
        }
    }

    /// Descend only into nodes whose cached box intersects the entry's
    /// current box. Fails when the entry moved away from its recorded
    /// location.
    fn find_leaf_guided(&self, entry: u32, target: &Aabb) -> Option<u32> {
        if self.root == NULL {
            return None;
        }
        let mut stack = Vec::with_capacity(32);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.aabb.intersects(target) {
                continue;
            }
            if node.is_leaf() {
                if node.entry == entry {
                    return Some(id);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        None
    }

    fn find_leaf_brute(&self, entry: u32) -> Option<u32> {
        if self.root == NULL {
            return None;
        }
        let mut stack = Vec::with_capacity(32);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                if node.entry == entry {
                    return Some(id);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Single-threaded update
    // ------------------------------------------------------------------

    /// Refit the whole tree bottom-up, then run the self-overlap traversal.
    /// Returns the overlapping pairs, each unordered pair exactly once.
    pub fn update(&mut self) -> &[(EntryId, EntryId)] {
        if self.root != NULL {
            self.refit_node(self.root);
        }
        let mut pairs = core::mem::take(&mut self.pairs);
        pairs.clear();
        if self.root != NULL {
            self.overlaps_within(self.root, &mut pairs);
        }
        self.pairs = pairs;
        &self.pairs
    }

    /// Bottom-up refit of one subtree. Leaves re-read their entry's box;
    /// internal nodes remerge children and revalidate (rebuild in place)
    /// when their volume outgrows the as-built volume by the configured
    /// factor. Returns the node's final box.
    fn refit_node(&mut self, id: u32) -> Aabb {
        if self.nodes[id as usize].is_leaf() {
            let entry = self.nodes[id as usize].entry;
            let aabb = self.entries[entry as usize]
                .as_ref()
                .expect("leaf references a live entry")
                .bounding_box();
            self.nodes[id as usize].aabb = aabb;
            self.nodes[id as usize].volume = aabb.volume();
            return aabb;
        }
        let left = self.nodes[id as usize].left;
        let right = self.nodes[id as usize].right;
        let left_box = self.refit_node(left);
        let right_box = self.refit_node(right);
        let merged = Aabb::merged(&left_box, &right_box);
        let volume = merged.volume();
        let node = &mut self.nodes[id as usize];
        node.aabb = merged;
        node.volume = volume;
        if volume > node.rebuild_volume.saturating_mul(self.revalidation_factor)
            && volume > Fix64::EPSILON
        {
            self.rebuild_subtree(id);
        }
        merged
    }

    /// Self-overlap of one subtree: every intersecting leaf pair under
    /// `id`, each exactly once.
    fn overlaps_within(&self, id: u32, out: &mut Vec<(EntryId, EntryId)>) {
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            return;
        }
        self.overlaps_within(node.left, out);
        self.overlaps_within(node.right, out);
        self.overlaps_between(node.left, node.right, out);
    }

    /// Overlaps with one leaf in each of two disjoint subtrees. Prunes
    /// branches whose merged boxes do not intersect; recurses into the 2x2
    /// child cross product when both sides are internal.
    fn overlaps_between(&self, a: u32, b: u32, out: &mut Vec<(EntryId, EntryId)>) {
        let node_a = &self.nodes[a as usize];
        let node_b = &self.nodes[b as usize];
        if !node_a.aabb.intersects(&node_b.aabb) {
            return;
        }
        match (node_a.is_leaf(), node_b.is_leaf()) {
            (true, true) => {
                let (x, y) = if node_a.entry < node_b.entry {
                    (node_a.entry, node_b.entry)
                } else {
                    (node_b.entry, node_a.entry)
                };
                out.push((EntryId(x), EntryId(y)));
            }
            (true, false) => {
                self.overlaps_between(a, node_b.left, out);
                self.overlaps_between(a, node_b.right, out);
            }
            (false, true) => {
                self.overlaps_between(node_a.left, b, out);
                self.overlaps_between(node_a.right, b, out);
            }
            (false, false) => {
                self.overlaps_between(node_a.left, node_b.left, out);
                self.overlaps_between(node_a.left, node_b.right, out);
                self.overlaps_between(node_a.right, node_b.left, out);
                self.overlaps_between(node_a.right, node_b.right, out);
            }
        }
    }

    // ------------------------------------------------------------------
    // Multithreaded update
    // ------------------------------------------------------------------

    /// Looper-driven update. Subtrees rooted at `split_depth` refit and
    /// self-overlap as independent parallel jobs; cross-subtree overlap work
    /// items come from a single-threaded partition pass; the nodes above the
    /// split get a cheap single-threaded refit. Pair output is concatenated
    /// in job order, so it is deterministic for a given insertion history.
    pub fn update_with_looper<L>(&mut self, looper: &L, split_depth: usize) -> &[(EntryId, EntryId)]
    where
        L: ParallelLooper,
        E: Sync,
    {
        if self.root == NULL {
            self.pairs.clear();
            return &self.pairs;
        }

        let mut subtree_roots = Vec::new();
        self.collect_at_depth(self.root, 0, split_depth, &mut subtree_roots);

        // Parallel refit: jobs read the tree and write job-local buffers.
        let jobs: Vec<RefitJob> = {
            let this: &Self = &*self;
            let roots = &subtree_roots;
            looper.map_range(roots.len(), |i| {
                let mut job = RefitJob {
                    updates: Vec::new(),
                    rebuilds: Vec::new(),
                };
                this.compute_refit(roots[i], &mut job);
                job
            })
        };
        for job in &jobs {
            for &(id, aabb, volume) in &job.updates {
                self.nodes[id as usize].aabb = aabb;
                self.nodes[id as usize].volume = volume;
            }
        }
        // Revalidation requests are recorded post-order within each job, so
        // descendants rebuild before their ancestors. A rebuild of a subtree
        // root replaces its node id; the roots list must follow.
        for job in &jobs {
            for &id in &job.rebuilds {
                let new_id = self.rebuild_subtree(id);
                if new_id != id {
                    if let Some(slot) = subtree_roots.iter().position(|&r| r == id) {
                        subtree_roots[slot] = new_id;
                    }
                }
            }
        }
        self.refit_above(self.root, 0, split_depth);

        // Partition pass: cross-subtree overlap work items.
        let mut unit = Vec::new();
        unit.resize(self.nodes.len(), false);
        for &id in &subtree_roots {
            unit[id as usize] = true;
        }
        let mut cross_items = Vec::new();
        self.partition_within(self.root, &unit, &mut cross_items);

        // Parallel overlap: per-subtree self jobs plus the cross items.
        let self_jobs = subtree_roots.len();
        let results: Vec<Vec<(EntryId, EntryId)>> = {
            let this: &Self = &*self;
            let roots = &subtree_roots;
            let cross = &cross_items;
            looper.map_range(self_jobs + cross.len(), |i| {
                let mut out = Vec::new();
                if i < self_jobs {
                    this.overlaps_within(roots[i], &mut out);
                } else {
                    let (a, b) = cross[i - self_jobs];
                    this.overlaps_between(a, b, &mut out);
                }
                out
            })
        };
        self.pairs.clear();
        for chunk in results {
            self.pairs.extend(chunk);
        }
        &self.pairs
    }

    fn collect_at_depth(&self, id: u32, depth: usize, split: usize, out: &mut Vec<u32>) {
        let node = &self.nodes[id as usize];
        if depth == split || node.is_leaf() {
            out.push(id);
            return;
        }
        self.collect_at_depth(node.left, depth + 1, split, out);
        self.collect_at_depth(node.right, depth + 1, split, out);
    }

    /// Read-only refit of one subtree into a job buffer, post-order.
    fn compute_refit(&self, id: u32, job: &mut RefitJob) -> Aabb {
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            let aabb = self.entries[node.entry as usize]
                .as_ref()
                .expect("leaf references a live entry")
                .bounding_box();
            job.updates.push((id, aabb, aabb.volume()));
            return aabb;
        }
        let left_box = self.compute_refit(node.left, job);
        let right_box = self.compute_refit(node.right, job);
        let merged = Aabb::merged(&left_box, &right_box);
        let volume = merged.volume();
        job.updates.push((id, merged, volume));
        if volume > node.rebuild_volume.saturating_mul(self.revalidation_factor)
            && volume > Fix64::EPSILON
        {
            job.rebuilds.push(id);
        }
        merged
    }

    /// Single-threaded refit of the shallow nodes above the split depth;
    /// subtree roots already carry fresh boxes from the parallel jobs.
    fn refit_above(&mut self, id: u32, depth: usize, split: usize) -> Aabb {
        let node = &self.nodes[id as usize];
        if depth == split || node.is_leaf() {
            return node.aabb;
        }
        let left = node.left;
        let right = node.right;
        let left_box = self.refit_above(left, depth + 1, split);
        let right_box = self.refit_above(right, depth + 1, split);
        let merged = Aabb::merged(&left_box, &right_box);
        self.nodes[id as usize].aabb = merged;
        self.nodes[id as usize].volume = merged.volume();
        merged
    }

    /// Walk the region above the split depth, emitting an (a, b) work item
    /// for every pair of work units (subtree roots or bare leaves) whose
    /// boxes intersect. Self-overlap of each unit is its own job and is not
    /// emitted here.
    fn partition_within(&self, id: u32, unit: &[bool], out: &mut Vec<(u32, u32)>) {
        if unit[id as usize] {
            return;
        }
        let node = &self.nodes[id as usize];
        self.partition_within(node.left, unit, out);
        self.partition_within(node.right, unit, out);
        self.partition_between(node.left, node.right, unit, out);
    }

    fn partition_between(&self, a: u32, b: u32, unit: &[bool], out: &mut Vec<(u32, u32)>) {
        let node_a = &self.nodes[a as usize];
        let node_b = &self.nodes[b as usize];
        if !node_a.aabb.intersects(&node_b.aabb) {
            return;
        }
        let a_unit = unit[a as usize] || node_a.is_leaf();
        let b_unit = unit[b as usize] || node_b.is_leaf();
        match (a_unit, b_unit) {
            (true, true) => out.push((a, b)),
            (true, false) => {
                self.partition_between(a, node_b.left, unit, out);
                self.partition_between(a, node_b.right, unit, out);
            }
            (false, true) => {
                self.partition_between(node_a.left, b, unit, out);
                self.partition_between(node_a.right, b, unit, out);
            }
            (false, false) => {
                self.partition_between(node_a.left, node_b.left, unit, out);
                self.partition_between(node_a.left, node_b.right, unit, out);
                self.partition_between(node_a.right, node_b.left, unit, out);
                self.partition_between(node_a.right, node_b.right, unit, out);
            }
        }
    }

    // ------------------------------------------------------------------
    // Rebuild
    // ------------------------------------------------------------------

    /// Rebuild the whole tree from its leaves. Expensive; a maintenance
    /// operation for recovering from pathological tree quality, not a
    /// per-frame call.
    pub fn force_rebuild(&mut self) {
        if self.root == NULL || self.nodes[self.root as usize].is_leaf() {
            return;
        }
        self.rebuild_subtree(self.root);
    }

    /// Tear one subtree down to its leaves and rebuild it by median split,
    /// rewiring the parent (or root). Returns the new subtree root.
    fn rebuild_subtree(&mut self, id: u32) -> u32 {
        let parent = self.nodes[id as usize].parent;
        let was_left = parent != NULL && self.nodes[parent as usize].left == id;
        let mut leaves = Vec::new();
        self.collect_leaf_nodes(id, &mut leaves);
        self.free_internal_nodes(id);
        let new_root = self.build_from_leaves(&mut leaves);
        self.nodes[new_root as usize].parent = parent;
        if parent == NULL {
            self.root = new_root;
        } else if was_left {
            self.nodes[parent as usize].left = new_root;
        } else {
            self.nodes[parent as usize].right = new_root;
        }
        new_root
    }

    fn collect_leaf_nodes(&self, id: u32, out: &mut Vec<u32>) {
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            out.push(id);
        } else {
            self.collect_leaf_nodes(node.left, out);
            self.collect_leaf_nodes(node.right, out);
        }
    }

    fn free_internal_nodes(&mut self, id: u32) {
        let node = self.nodes[id as usize];
        if node.is_leaf() {
            return;
        }
        self.free_internal_nodes(node.left);
        self.free_internal_nodes(node.right);
        self.free_node(id);
    }

    /// Median-split construction: sort leaves along the longest axis of the
    /// aggregate box (entry index as tiebreak, keeping the order a pure
    /// function of the input set) and recurse on the halves.
    fn build_from_leaves(&mut self, leaves: &mut [u32]) -> u32 {
        if leaves.len() == 1 {
            return leaves[0];
        }
        let mut aggregate = self.nodes[leaves[0] as usize].aabb;
        for &leaf in leaves[1..].iter() {
            aggregate = Aabb::merged(&aggregate, &self.nodes[leaf as usize].aabb);
        }
        let extents = aggregate.max - aggregate.min;
        let nodes = &self.nodes;
        if extents.x >= extents.y && extents.x >= extents.z {
            leaves.sort_unstable_by_key(|&leaf| {
                let n = &nodes[leaf as usize];
                (n.aabb.min.x + n.aabb.max.x, n.entry)
            });
        } else if extents.y >= extents.z {
            leaves.sort_unstable_by_key(|&leaf| {
                let n = &nodes[leaf as usize];
                (n.aabb.min.y + n.aabb.max.y, n.entry)
            });
        } else {
            leaves.sort_unstable_by_key(|&leaf| {
                let n = &nodes[leaf as usize];
                (n.aabb.min.z + n.aabb.max.z, n.entry)
            });
        }
        let mid = leaves.len() / 2;
        let (left_half, right_half) = leaves.split_at_mut(mid);
        let left = self.build_from_leaves(left_half);
        let right = self.build_from_leaves(right_half);
        let volume = aggregate.volume();
        let id = self.alloc_node(Node {
            parent: NULL,
            left,
            right,
            entry: NULL,
            aabb: aggregate,
            volume,
            rebuild_volume: volume,
        });
        self.nodes[left as usize].parent = id;
        self.nodes[right as usize].parent = id;
        id
    }

    // ------------------------------------------------------------------
    // Queries and validation
    // ------------------------------------------------------------------

    /// Visit every entry whose cached box intersects `aabb`.
    pub fn query<F: FnMut(EntryId)>(&self, aabb: &Aabb, mut callback: F) {
        if self.root == NULL {
            return;
        }
        let mut stack = Vec::with_capacity(32);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                callback(EntryId(node.entry));
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Walk the tree checking the structural invariants. Valid directly
    /// after a refit: every internal box equals the merge of its children,
    /// every leaf box equals its entry's current box, and the link structure
    /// is consistent. Debugging aid; not called by the pipeline.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.root == NULL {
            return if self.len() == 0 {
                Ok(())
            } else {
                Err("empty tree but entries remain")
            };
        }
        if self.nodes[self.root as usize].parent != NULL {
            return Err("root has a parent");
        }
        let mut leaves = 0usize;
        self.validate_node(self.root, &mut leaves)?;
        if leaves != self.len() {
            return Err("leaf count does not match entry count");
        }
        Ok(())
    }

    fn validate_node(&self, id: u32, leaves: &mut usize) -> Result<(), &'static str> {
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            *leaves += 1;
            let entry = self.entries[node.entry as usize]
                .as_ref()
                .ok_or("leaf references a freed entry")?;
            if node.aabb != entry.bounding_box() {
                return Err("leaf box differs from its entry's box");
            }
            return Ok(());
        }
        if node.left == NULL || node.right == NULL {
            return Err("internal node missing a child");
        }
        if self.nodes[node.left as usize].parent != id
            || self.nodes[node.right as usize].parent != id
        {
            return Err("child parent link broken");
        }
        let merged = Aabb::merged(
            &self.nodes[node.left as usize].aabb,
            &self.nodes[node.right as usize].aabb,
        );
        if node.aabb != merged {
            return Err("internal box differs from merge of children");
        }
        if node.volume != merged.volume() {
            return Err("cached volume is stale");
        }
        self.validate_node(node.left, leaves)?;
        self.validate_node(node.right, leaves)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::SequentialLooper;
    use crate::math::Vec3;
    use crate::rng::DeterministicRng;

    /// Minimal spatial client for the tests.
    struct TestEntry {
        aabb: Aabb,
        refreshed: bool,
    }

    impl TestEntry {
        fn unit(x: i32, y: i32, z: i32) -> Self {
            Self {
                aabb: Aabb::new(Vec3::from_int(x, y, z), Vec3::from_int(x + 1, y + 1, z + 1)),
                refreshed: false,
            }
        }

        fn from_aabb(aabb: Aabb) -> Self {
            Self {
                aabb,
                refreshed: false,
            }
        }
    }

    impl BroadPhaseEntry for TestEntry {
        fn bounding_box(&self) -> Aabb {
            self.aabb
        }

        fn update_bounding_box(&mut self) {
            self.refreshed = true;
            self.aabb = self.aabb.expand(Fix64::from_ratio(1, 10));
        }
    }

    fn sorted_pairs(pairs: &[(EntryId, EntryId)]) -> Vec<(EntryId, EntryId)> {
        let mut v = pairs.to_vec();
        v.sort_unstable();
        v
    }

    fn brute_force_pairs<E: BroadPhaseEntry>(
        tree: &DynamicHierarchy<E>,
        ids: &[EntryId],
    ) -> Vec<(EntryId, EntryId)> {
        let mut out = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let a = tree.entry(ids[i]).unwrap().bounding_box();
                let b = tree.entry(ids[j]).unwrap().bounding_box();
                if a.intersects(&b) {
                    let (x, y) = if ids[i] < ids[j] {
                        (ids[i], ids[j])
                    } else {
                        (ids[j], ids[i])
                    };
                    out.push((x, y));
                }
            }
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn test_add_and_query() {
        let mut tree = DynamicHierarchy::new();
        let a = tree.add(TestEntry::unit(0, 0, 0));
        let _b = tree.add(TestEntry::unit(10, 10, 10));
        let c = tree.add(TestEntry::unit(20, 20, 20));
        assert_eq!(tree.len(), 3);

        let mut hits = Vec::new();
        tree.query(
            &Aabb::new(Vec3::from_int(-1, -1, -1), Vec3::from_int(2, 2, 2)),
            |id| hits.push(id),
        );
        assert!(hits.contains(&a));
        assert!(!hits.contains(&c));
    }

    #[test]
    fn test_remove_collapses() {
        let mut tree = DynamicHierarchy::new();
        let a = tree.add(TestEntry::unit(0, 0, 0));
        let b = tree.add(TestEntry::unit(5, 5, 5));
        let c = tree.add(TestEntry::unit(10, 10, 10));
        assert_eq!(tree.node_count(), 5);

        tree.remove(b);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.node_count(), 3);
        tree.update();
        tree.validate().unwrap();

        tree.remove(a);
        tree.remove(c);
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    #[should_panic(expected = "not present")]
    fn test_double_remove_panics() {
        let mut tree = DynamicHierarchy::new();
        let a = tree.add(TestEntry::unit(0, 0, 0));
        tree.add(TestEntry::unit(3, 0, 0));
        tree.remove(a);
        tree.remove(a);
    }

    #[test]
    fn test_degenerate_box_is_refreshed() {
        let mut tree = DynamicHierarchy::new();
        let id = tree.add(TestEntry::from_aabb(Aabb::from_point(Vec3::from_int(
            1, 2, 3,
        ))));
        let entry = tree.entry(id).unwrap();
        assert!(entry.refreshed, "degenerate insert must refresh the box");
        assert!(!entry.bounding_box().is_degenerate());
    }

    #[test]
    fn test_invariant_after_churn() {
        let mut tree = DynamicHierarchy::new();
        let mut rng = DeterministicRng::new(42);
        let mut ids = Vec::new();
        for _ in 0..64 {
            let aabb = rng.next_aabb(
                Fix64::from_int(-40),
                Fix64::from_int(40),
                Fix64::from_int(3),
            );
            ids.push(tree.add(TestEntry::from_aabb(aabb)));
        }
        // Remove every third entry, then add some more.
        for i in (0..ids.len()).rev().step_by(3) {
            tree.remove(ids.remove(i));
        }
        for _ in 0..16 {
            let aabb = rng.next_aabb(
                Fix64::from_int(-40),
                Fix64::from_int(40),
                Fix64::from_int(3),
            );
            ids.push(tree.add(TestEntry::from_aabb(aabb)));
        }
        tree.update();
        tree.validate().unwrap();
    }

    #[test]
    fn test_overlap_matches_brute_force() {
        let mut tree = DynamicHierarchy::new();
        let mut rng = DeterministicRng::new(7);
        let mut ids = Vec::new();
        for _ in 0..80 {
            let aabb = rng.next_aabb(
                Fix64::from_int(-25),
                Fix64::from_int(25),
                Fix64::from_int(6),
            );
            ids.push(tree.add(TestEntry::from_aabb(aabb)));
        }
        let pairs = sorted_pairs(tree.update());
        let expected = brute_force_pairs(&tree, &ids);
        assert_eq!(pairs, expected);
        // Exactly once: no duplicates even before sorting/dedup.
        let mut deduped = pairs.clone();
        deduped.dedup();
        assert_eq!(pairs.len(), deduped.len());
    }

    #[test]
    fn test_overlap_after_motion() {
        let mut tree = DynamicHierarchy::new();
        let a = tree.add(TestEntry::unit(0, 0, 0));
        let b = tree.add(TestEntry::unit(10, 0, 0));
        assert!(tree.update().is_empty());

        // Move b onto a and update: the refit must re-read the entry box.
        tree.entry_mut(b).unwrap().aabb = TestEntry::unit(0, 0, 0).aabb;
        let pairs = sorted_pairs(tree.update());
        assert_eq!(pairs, vec![(a, b)]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_stale_removal_falls_back() {
        let mut tree = DynamicHierarchy::new();
        let mut ids = Vec::new();
        for i in 0..16 {
            ids.push(tree.add(TestEntry::unit(i * 4, 0, 0)));
        }
        // Teleport one entry far away without updating the tree; the guided
        // search cannot find it any more.
        tree.entry_mut(ids[3]).unwrap().aabb = TestEntry::unit(500, 500, 500).aabb;
        assert_eq!(tree.stale_removals(), 0);
        tree.remove(ids[3]);
        assert_eq!(tree.stale_removals(), 1);
        assert_eq!(tree.len(), 15);
        tree.update();
        tree.validate().unwrap();
    }

    #[test]
    fn test_force_rebuild_preserves_leaves() {
        let mut tree = DynamicHierarchy::new();
        let mut ids = Vec::new();
        // Insert along a line to build a lopsided tree.
        for i in 0..40 {
            ids.push(tree.add(TestEntry::unit(i * 2, 0, 0)));
        }
        let before = sorted_pairs(tree.update());
        tree.force_rebuild();
        tree.update();
        tree.validate().unwrap();
        let after = sorted_pairs(tree.pairs());
        assert_eq!(before, after);
        assert_eq!(tree.len(), 40);
        // A median-split tree over a line is near-optimally shallow.
        assert!(tree.height() <= 7, "height={}", tree.height());
    }

    #[test]
    fn test_multithreaded_matches_single() {
        for split_depth in [0, 1, 2, 4, 16] {
            let mut tree = DynamicHierarchy::new();
            let mut rng = DeterministicRng::new(1234);
            for _ in 0..72 {
                let aabb = rng.next_aabb(
                    Fix64::from_int(-30),
                    Fix64::from_int(30),
                    Fix64::from_int(5),
                );
                tree.add(TestEntry::from_aabb(aabb));
            }
            let single = sorted_pairs(tree.update());
            tree.validate().unwrap();
            let multi = sorted_pairs(tree.update_with_looper(&SequentialLooper, split_depth));
            tree.validate().unwrap();
            assert_eq!(single, multi, "split_depth={split_depth}");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_update_matches_single() {
        use crate::looper::RayonLooper;
        let mut tree = DynamicHierarchy::new();
        let mut rng = DeterministicRng::new(555);
        for _ in 0..100 {
            let aabb = rng.next_aabb(
                Fix64::from_int(-30),
                Fix64::from_int(30),
                Fix64::from_int(5),
            );
            tree.add(TestEntry::from_aabb(aabb));
        }
        let single = sorted_pairs(tree.update());
        let parallel = sorted_pairs(tree.update_with_looper(&RayonLooper, 3));
        assert_eq!(single, parallel);
    }

    #[test]
    fn test_empty_tree() {
        let mut tree: DynamicHierarchy<TestEntry> = DynamicHierarchy::new();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert!(tree.update().is_empty());
        assert!(tree
            .update_with_looper(&SequentialLooper, 2)
            .is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn test_node_reuse_after_remove() {
        let mut tree = DynamicHierarchy::new();
        let a = tree.add(TestEntry::unit(0, 0, 0));
        let b = tree.add(TestEntry::unit(4, 0, 0));
        let nodes_before = tree.node_count();
        tree.remove(b);
        let c = tree.add(TestEntry::unit(8, 0, 0));
        // The freed leaf and internal slots are recycled, not leaked.
        assert_eq!(tree.node_count(), nodes_before);
        tree.update();
        tree.validate().unwrap();
        tree.remove(a);
        tree.remove(c);
        assert_eq!(tree.node_count(), 0);
    }
}
