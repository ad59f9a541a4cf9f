//! Per-depth "in use" marks.
//!
//! Depth 0 is the positive pattern; each negative pattern level adds one.
//! A mark records which pattern element bound a host element at a depth,
//! or that the element belongs to an enclosing level (`Owner::Foreign`).
//! Marks are pushed and popped in strict stack order, so backtracking
//! restores exactly the state a step started from.
//!
//! Foreign marks block every element of the nested pattern except the ones
//! it shares with its parent, which arrive pre-bound.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::Element;
use crate::pattern::{Homomorphy, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    /// Bound by this pattern element at the mark's depth.
    Element(usize),
    /// In use by an enclosing pattern.
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mark {
    depth: usize,
    owner: Owner,
}

#[derive(Debug, Default)]
pub(crate) struct Marks {
    table: HashMap<Element, SmallVec<[Mark; 2]>>,
    /// Marks made per depth, in marking order.
    log: Vec<Vec<(Element, Owner)>>,
}

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, depth: usize, key: Element, owner: Owner) {
        self.table.entry(key).or_default().push(Mark { depth, owner });
        if self.log.len() <= depth {
            self.log.resize_with(depth + 1, Vec::new);
        }
        self.log[depth].push((key, owner));
    }

    /// Undo the most recent `mark(depth, key, _)`.
    pub fn unmark(&mut self, depth: usize, key: Element) {
        if let Some(log) = self.log.get_mut(depth) {
            debug_assert_eq!(log.last().map(|(k, _)| *k), Some(key));
            log.pop();
        }
        self.drop_mark(depth, key);
    }

    fn drop_mark(&mut self, depth: usize, key: Element) {
        if let Some(marks) = self.table.get_mut(&key) {
            if let Some(pos) = marks.iter().rposition(|m| m.depth == depth) {
                marks.remove(pos);
            }
            if marks.is_empty() {
                self.table.remove(&key);
            }
        }
    }

    /// Would binding `key` to pattern element `index` at `depth` violate
    /// injectivity under `hom`? A `shared` element stands for one of the
    /// parent's and is exempt from foreign marks.
    pub fn forbids(&self, depth: usize, key: Element, index: usize, hom: &Homomorphy, shared: bool) -> bool {
        self.table.get(&key).is_some_and(|marks| {
            marks.iter().any(|m| {
                m.depth == depth
                    && match m.owner {
                        Owner::Foreign => !shared,
                        Owner::Element(other) => !hom.allows(other, index),
                    }
            })
        })
    }

    /// Mark everything in use at `from` as foreign at `to`, except marks
    /// owned by the parent elements in `shared`. A host that a shared and a
    /// non-shared element both bind stays foreign.
    pub fn inherit(&mut self, from: usize, to: usize, shared: &[Slot]) {
        let keys: SmallVec<[Element; 16]> = self
            .log
            .get(from)
            .map(|l| {
                l.iter()
                    .filter(|(key, owner)| !is_shared(*key, *owner, shared))
                    .map(|(key, _)| *key)
                    .collect()
            })
            .unwrap_or_default();
        for key in keys {
            self.mark(to, key, Owner::Foreign);
        }
    }

    /// Pop every mark left at `depth`.
    pub fn release(&mut self, depth: usize) {
        let Some(log) = self.log.get_mut(depth) else { return };
        let marks = std::mem::take(log);
        for (key, _) in marks.into_iter().rev() {
            self.drop_mark(depth, key);
        }
    }

    pub fn is_clear(&self) -> bool {
        self.table.is_empty() && self.log.iter().all(Vec::is_empty)
    }
}

fn is_shared(key: Element, owner: Owner, shared: &[Slot]) -> bool {
    match (key, owner) {
        (Element::Node(_), Owner::Element(i)) => shared.contains(&Slot::Node(i)),
        (Element::Edge(_), Owner::Element(i)) => shared.contains(&Slot::Edge(i)),
        (_, Owner::Foreign) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    fn n(slot: u32) -> Element {
        Element::Node(NodeId::new(slot, 0))
    }

    #[test]
    fn test_mark_forbids_only_at_same_depth() {
        let hom = Homomorphy::identity(3);
        let mut m = Marks::new();
        m.mark(0, n(1), Owner::Element(0));
        assert!(m.forbids(0, n(1), 1, &hom, false));
        assert!(!m.forbids(0, n(1), 0, &hom, false));
        assert!(!m.forbids(1, n(1), 1, &hom, false));
        assert!(!m.forbids(0, n(2), 1, &hom, false));
        m.unmark(0, n(1));
        assert!(m.is_clear());
    }

    #[test]
    fn test_homomorphic_elements_may_share() {
        let mut hom = Homomorphy::identity(3);
        hom.permit(0, 1);
        let mut m = Marks::new();
        m.mark(0, n(1), Owner::Element(0));
        assert!(!m.forbids(0, n(1), 1, &hom, false));
        // every owner is consulted, not just the latest
        m.mark(0, n(1), Owner::Element(1));
        assert!(m.forbids(0, n(1), 2, &hom, false));
    }

    #[test]
    fn test_nested_marks_restore_outer_state() {
        let hom = Homomorphy::identity(2);
        let mut m = Marks::new();
        m.mark(0, n(1), Owner::Element(0));
        m.mark(0, n(2), Owner::Element(1));
        m.inherit(0, 1, &[Slot::Node(1)]);
        assert!(m.forbids(1, n(1), 0, &hom, false));
        assert!(!m.forbids(1, n(2), 0, &hom, false));
        m.mark(1, n(3), Owner::Element(1));
        m.unmark(1, n(3));
        m.release(1);
        assert!(!m.forbids(1, n(1), 0, &hom, false));
        assert!(m.forbids(0, n(1), 1, &hom, false));
        m.unmark(0, n(2));
        m.unmark(0, n(1));
        assert!(m.is_clear());
    }

    #[test]
    fn test_host_of_shared_and_unshared_element_stays_foreign() {
        // parent elements 0 and 1 are homomorphic and both bind n(1); only 0 is shared
        let hom = Homomorphy::identity(2);
        let mut m = Marks::new();
        m.mark(0, n(1), Owner::Element(0));
        m.mark(0, n(1), Owner::Element(1));
        m.inherit(0, 1, &[Slot::Node(0)]);
        // a local element of the nested pattern may not take it
        assert!(m.forbids(1, n(1), 1, &hom, false));
        // the element standing for parent 0 still binds it
        assert!(!m.forbids(1, n(1), 0, &hom, true));
        m.release(1);
        m.unmark(0, n(1));
        m.unmark(0, n(1));
        assert!(m.is_clear());
    }

    #[test]
    fn test_node_and_edge_owners_are_distinct() {
        let hom = Homomorphy::identity(1);
        let mut m = Marks::new();
        let e = Element::Edge(crate::model::EdgeId::new(4, 0));
        m.mark(0, e, Owner::Element(0));
        // sharing node 0 does not share edge 0
        m.inherit(0, 1, &[Slot::Node(0)]);
        assert!(m.forbids(1, e, 0, &hom, false));
        m.release(1);
        m.unmark(0, e);
        assert!(m.is_clear());
    }
}
