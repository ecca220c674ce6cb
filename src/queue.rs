//! Min-priority queue of edge collapses with lazy invalidation.
//!
//! `BinaryHeap` has no decrease-key operation. Instead, every push gets a new
//! stamp which is remembered per edge. Entries whose stamp is not the
//! remembered one are stale and silently dropped when they reach the top.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
};

use fxhash::FxHashMap;

use crate::{
    handle::EdgeHandle,
    math::{Point, Scalar},
    metric::{CollapseCost, Placement},
};


/// One candidate collapse.
#[derive(Debug, Clone)]
pub struct Entry<P> {
    pub edge: EdgeHandle,
    pub error: Scalar,
    pub position: Point,
    pub primitive: P,
    pub placement: Placement,
    stamp: u64,
}

impl<P> Entry<P> {
    pub fn into_cost(self) -> CollapseCost<P> {
        CollapseCost {
            error: self.error,
            position: self.position,
            primitive: self.primitive,
            placement: self.placement,
        }
    }
}

// `BinaryHeap` is a max-heap, so the order is reversed: the smallest error is
// the "greatest" entry. Ties are broken by edge handle to make the pop order
// deterministic.
impl<P> Ord for Entry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.error.total_cmp(&self.error)
            .then_with(|| other.edge.cmp(&self.edge))
            .then_with(|| other.stamp.cmp(&self.stamp))
    }
}

impl<P> PartialOrd for Entry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> PartialEq for Entry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for Entry<P> {}


/// Priority queue over edges, ordered by ascending error.
///
/// Every edge has at most one *live* entry. Updating an edge pushes a new
/// entry and makes the old one stale; invalidating an edge makes its entry
/// stale without a replacement.
#[derive(Debug, Clone)]
pub struct PriorityQueue<P> {
    heap: BinaryHeap<Entry<P>>,
    stamps: FxHashMap<EdgeHandle, u64>,
    next_stamp: u64,
}

impl<P> PriorityQueue<P> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            stamps: FxHashMap::default(),
            next_stamp: 0,
        }
    }

    /// Adds an entry for an edge that does not have a live one yet.
    pub fn push(&mut self, edge: EdgeHandle, cost: CollapseCost<P>) {
        debug_assert!(
            !self.stamps.contains_key(&edge),
            "bug: pushed {:?} which already has a live entry",
            edge,
        );
        self.update_or_insert(edge, cost);
    }

    /// Replaces the live entry of `edge` (if any) with a new one.
    pub fn update_or_insert(&mut self, edge: EdgeHandle, cost: CollapseCost<P>) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.stamps.insert(edge, stamp);

        self.heap.push(Entry {
            edge,
            error: cost.error,
            position: cost.position,
            primitive: cost.primitive,
            placement: cost.placement,
            stamp,
        });
    }

    /// Makes the live entry of `edge` stale. Returns whether there was one.
    pub fn invalidate(&mut self, edge: EdgeHandle) -> bool {
        self.stamps.remove(&edge).is_some()
    }

    pub fn is_live(&self, edge: EdgeHandle) -> bool {
        self.stamps.contains_key(&edge)
    }

    /// Drops stale entries from the top of the heap. Entries are also
    /// considered stale if `exists` returns `false` for their edge.
    fn discard_stale(&mut self, mut exists: impl FnMut(EdgeHandle) -> bool) {
        while let Some(top) = self.heap.peek() {
            let live = self.stamps.get(&top.edge) == Some(&top.stamp);
            if live && exists(top.edge) {
                break;
            }

            let edge = top.edge;
            if live {
                self.stamps.remove(&edge);
            }
            self.heap.pop();
        }
    }

    /// Removes and returns the live entry with the smallest error.
    pub fn pop_min(&mut self, exists: impl FnMut(EdgeHandle) -> bool) -> Option<Entry<P>> {
        self.discard_stale(exists);
        let entry = self.heap.pop()?;
        self.stamps.remove(&entry.edge);
        Some(entry)
    }

    /// The smallest error of all live entries.
    pub fn peek_error(&mut self, exists: impl FnMut(EdgeHandle) -> bool) -> Option<Scalar> {
        self.discard_stale(exists);
        self.heap.peek().map(|e| e.error)
    }

    /// Number of entries in the heap, including stale ones.
    pub fn len_hint(&self) -> usize {
        self.heap.len()
    }

    /// Number of live entries.
    pub fn num_live(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.stamps.clear();
    }
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use crate::{handle::Handle, test_utils::lcg_points};
    use super::*;

    fn cost(error: Scalar) -> CollapseCost<()> {
        CollapseCost {
            error,
            position: Point::new(0.0, 0.0, 0.0),
            primitive: (),
            placement: Placement::Optimal,
        }
    }

    fn e(i: u32) -> EdgeHandle {
        EdgeHandle::new(i)
    }

    #[test]
    fn empty() {
        let mut q = PriorityQueue::<()>::new();
        assert!(q.is_empty());
        assert_eq!(q.num_live(), 0);
        assert!(q.pop_min(|_| true).is_none());
        assert_eq!(q.peek_error(|_| true), None);
    }

    #[test]
    fn pops_in_ascending_order() {
        let mut q = PriorityQueue::new();
        q.push(e(0), cost(3.0));
        q.push(e(1), cost(1.0));
        q.push(e(2), cost(2.0));
        q.push(e(3), cost(1.0));

        assert_eq!(q.peek_error(|_| true), Some(1.0));
        let order: Vec<_> = std::iter::from_fn(|| q.pop_min(|_| true))
            .map(|entry| (entry.edge, entry.error))
            .collect();
        assert_eq!(order, vec![(e(1), 1.0), (e(3), 1.0), (e(2), 2.0), (e(0), 3.0)]);
        assert!(q.is_empty());
    }

    #[test]
    fn update_and_invalidate() {
        let mut q = PriorityQueue::new();
        q.push(e(0), cost(1.0));
        q.push(e(1), cost(2.0));
        q.push(e(2), cost(3.0));

        q.update_or_insert(e(0), cost(5.0));
        assert!(q.invalidate(e(1)));
        assert!(!q.invalidate(e(1)));
        assert!(!q.is_live(e(1)));
        assert_eq!(q.num_live(), 2);
        assert_eq!(q.len_hint(), 4);

        let first = q.pop_min(|_| true).unwrap();
        assert_eq!((first.edge, first.error), (e(2), 3.0));
        let second = q.pop_min(|_| true).unwrap();
        assert_eq!((second.edge, second.error), (e(0), 5.0));
        assert!(q.pop_min(|_| true).is_none());
        assert_eq!(q.len_hint(), 0);
    }

    #[test]
    fn entries_of_removed_edges_are_skipped() {
        let mut q = PriorityQueue::new();
        q.push(e(0), cost(1.0));
        q.push(e(1), cost(2.0));

        let top = q.pop_min(|edge| edge != e(0)).unwrap();
        assert_eq!(top.edge, e(1));
        assert!(!q.is_live(e(0)));
        assert!(q.is_empty());
    }

    #[test]
    fn matches_brute_force() {
        let errors: Vec<Scalar> = lcg_points(200, 7).iter().map(|p| p.x.abs()).collect();
        let mut q = PriorityQueue::new();
        let mut expected = std::collections::BTreeMap::new();

        for (i, &error) in errors.iter().enumerate() {
            let edge = e(i as u32 % 50);
            q.update_or_insert(edge, cost(error));
            expected.insert(edge, error);
            if i % 7 == 0 {
                q.invalidate(edge);
                expected.remove(&edge);
            }
        }
        assert_eq!(q.num_live(), expected.len());

        while let Some(entry) = q.pop_min(|_| true) {
            let (&edge, &min) = expected.iter()
                .min_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .unwrap();
            assert_eq!((entry.edge, entry.error), (edge, min));
            expected.remove(&edge);
        }
        assert!(expected.is_empty());
    }
}
