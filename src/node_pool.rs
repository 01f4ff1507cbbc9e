//! Search-node pool and indexed open list (C10).
//!
//! The pool is a fixed-capacity arena hashed by `(PolyRef, crossing state)`
//! so a query can allocate at most `max_nodes` search nodes regardless of
//! how much of the mesh the search fans out into; callers that exhaust it
//! set `Status::OUT_OF_NODES` and keep going with whatever nodes already
//! exist (§4.9, §7). The open list is a classic indexed binary min-heap
//! keyed by `total`, mirroring the teacher's hand-rolled sorted-`Vec` open
//! list in spirit but bounded and O(log n) per operation (§4.9, P4).

use glam::Vec3;

use crate::runtime::PolyRef;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        const OPEN = 1 << 0;
        const CLOSED = 1 << 1;
        const PARENT_DETACHED = 1 << 2;
    }
}

/// One A* search node. `parent_index` is the parent's pool index plus one
/// (`0` means "no parent"), matching the spec's `pidx` field so a plain
/// `u32` can stand in for `Option<usize>` without an extra enum tag.
#[derive(Clone, Copy, Debug)]
pub struct SearchNode {
    pub pos: Vec3,
    pub cost: f32,
    pub total: f32,
    pub poly_ref: PolyRef,
    /// Disambiguates multiple visits to the same polygon via different
    /// tile-boundary crossings (`link.side >> 1`), letting portal-split
    /// re-entries coexist as distinct nodes.
    pub state: u8,
    pub parent_index: u32,
    pub flags: NodeFlags,
    /// Index into the open-list heap while `flags` contains `OPEN`; stale
    /// once the node is popped.
    heap_index: u32,
}

impl SearchNode {
    pub fn parent(&self) -> Option<usize> {
        (self.parent_index != 0).then(|| self.parent_index as usize - 1)
    }
}

const NULL_BUCKET: u32 = u32::MAX;

/// Hashed fixed-capacity arena. `first[hash]` heads a chain threaded
/// through `next[]`; a logical key is `(ref, state)`, so up to four nodes
/// (2-bit state) can coexist per polygon (§3 "Search node").
pub struct NodePool {
    nodes: Vec<SearchNode>,
    next: Vec<u32>,
    first: Vec<u32>,
    capacity: usize,
}

fn hash_ref(poly_ref: PolyRef) -> u32 {
    // Multiply-xor-shift avalanche, as specified for the node-pool hash (§4.9).
    let mut h = poly_ref.0.wrapping_mul(0x9E3779B1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85EBCA6B);
    h ^= h >> 13;
    h
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        let bucket_count = (capacity.max(1)).next_power_of_two();
        Self {
            nodes: Vec::with_capacity(capacity),
            next: Vec::with_capacity(capacity),
            first: vec![NULL_BUCKET; bucket_count],
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next.clear();
        self.first.iter_mut().for_each(|b| *b = NULL_BUCKET);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn bucket(&self, poly_ref: PolyRef) -> usize {
        (hash_ref(poly_ref) as usize) & (self.first.len() - 1)
    }

    pub fn find(&self, poly_ref: PolyRef, state: u8) -> Option<usize> {
        let mut cursor = self.first[self.bucket(poly_ref)];
        while cursor != NULL_BUCKET {
            let node = &self.nodes[cursor as usize];
            if node.poly_ref == poly_ref && node.state == state {
                return Some(cursor as usize);
            }
            cursor = self.next[cursor as usize];
        }
        None
    }

    /// Returns the existing node for `(ref, state)`, or allocates a fresh
    /// one seeded at `pos` with `OPEN`-less default state. The `bool` is
    /// `true` when the node was freshly allocated, so callers (`find_path`)
    /// know to set a first-visit-only position such as a portal mid-point.
    /// Returns `None` when the pool is at capacity and no existing node
    /// matches — the caller should set `Status::OUT_OF_NODES` and skip this
    /// neighbor.
    pub fn get_or_allocate(&mut self, poly_ref: PolyRef, state: u8, pos: Vec3) -> Option<(usize, bool)> {
        if let Some(index) = self.find(poly_ref, state) {
            return Some((index, false));
        }
        if self.nodes.len() >= self.capacity {
            return None;
        }

        let index = self.nodes.len() as u32;
        self.nodes.push(SearchNode {
            pos,
            cost: 0.0,
            total: 0.0,
            poly_ref,
            state,
            parent_index: 0,
            flags: NodeFlags::empty(),
            heap_index: u32::MAX,
        });
        let bucket = self.bucket(poly_ref);
        self.next.push(self.first[bucket]);
        self.first[bucket] = index;
        Some((index as usize, true))
    }

    pub fn node(&self, index: usize) -> &SearchNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut SearchNode {
        &mut self.nodes[index]
    }
}

/// Indexed binary min-heap over `NodePool` indices, keyed by `total`.
/// Membership (`OPEN`/`CLOSED`) is tracked on the node itself so `modify`
/// can re-bubble a node already in the heap without a linear search.
#[derive(Default)]
pub struct OpenList {
    heap: Vec<u32>,
}

impl OpenList {
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn total(pool: &NodePool, heap_slot: u32) -> f32 {
        pool.node(heap_slot as usize).total
    }

    fn swap(&mut self, pool: &mut NodePool, a: usize, b: usize) {
        self.heap.swap(a, b);
        pool.node_mut(self.heap[a] as usize).heap_index = a as u32;
        pool.node_mut(self.heap[b] as usize).heap_index = b as u32;
    }

    fn bubble_up(&mut self, pool: &mut NodePool, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::total(pool, self.heap[i]) < Self::total(pool, self.heap[parent]) {
                self.swap(pool, i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn bubble_down(&mut self, pool: &mut NodePool, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.heap.len()
                && Self::total(pool, self.heap[left]) < Self::total(pool, self.heap[smallest])
            {
                smallest = left;
            }
            if right < self.heap.len()
                && Self::total(pool, self.heap[right]) < Self::total(pool, self.heap[smallest])
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(pool, i, smallest);
            i = smallest;
        }
    }

    pub fn push(&mut self, pool: &mut NodePool, node_index: usize) {
        let slot = self.heap.len();
        self.heap.push(node_index as u32);
        pool.node_mut(node_index).heap_index = slot as u32;
        pool.node_mut(node_index).flags.insert(NodeFlags::OPEN);
        self.bubble_up(pool, slot);
    }

    /// Re-bubbles a node already present in the heap after its `total`
    /// decreased (§4.9 "modify").
    pub fn modify(&mut self, pool: &mut NodePool, node_index: usize) {
        let slot = pool.node(node_index).heap_index as usize;
        debug_assert!(slot < self.heap.len() && self.heap[slot] == node_index as u32);
        self.bubble_up(pool, slot);
    }

    pub fn pop(&mut self, pool: &mut NodePool) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(pool, 0, last);
        let popped = self.heap.pop().unwrap();
        if !self.heap.is_empty() {
            self.bubble_down(pool, 0);
        }
        pool.node_mut(popped as usize).flags.remove(NodeFlags::OPEN);
        Some(popped as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PolyRef;

    #[test]
    fn heap_pops_in_ascending_total_order() {
        let mut pool = NodePool::new(16);
        let mut open = OpenList::new();

        let totals = [5.0, 1.0, 4.0, 2.0, 3.0];
        for (i, &t) in totals.iter().enumerate() {
            let (idx, _) = pool
                .get_or_allocate(PolyRef(i as u32 + 1), 0, Vec3::ZERO)
                .unwrap();
            pool.node_mut(idx).total = t;
            open.push(&mut pool, idx);
        }

        let mut popped = Vec::new();
        while let Some(idx) = open.pop(&mut pool) {
            popped.push(pool.node(idx).total);
        }
        assert_eq!(popped, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn get_or_allocate_reuses_existing_state() {
        let mut pool = NodePool::new(4);
        let (a, a_fresh) = pool.get_or_allocate(PolyRef(7), 0, Vec3::ZERO).unwrap();
        let (b, b_fresh) = pool.get_or_allocate(PolyRef(7), 0, Vec3::ZERO).unwrap();
        let (c, c_fresh) = pool.get_or_allocate(PolyRef(7), 1, Vec3::ZERO).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a_fresh);
        assert!(!b_fresh);
        assert!(c_fresh);
    }

    #[test]
    fn pool_exhaustion_returns_none_for_new_keys() {
        let mut pool = NodePool::new(2);
        assert!(pool.get_or_allocate(PolyRef(1), 0, Vec3::ZERO).is_some());
        assert!(pool.get_or_allocate(PolyRef(2), 0, Vec3::ZERO).is_some());
        assert!(pool.get_or_allocate(PolyRef(3), 0, Vec3::ZERO).is_none());
        // Existing keys still resolve even once the pool is full.
        assert!(pool.get_or_allocate(PolyRef(1), 0, Vec3::ZERO).is_some());
    }
}
