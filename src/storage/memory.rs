//! In-memory graph store.
//!
//! Nodes and edges live in slot arenas with free lists. Membership lists are
//! index-linked rings (see `ring`), so every structural edit is O(1):
//!
//! ```text
//!   node_type_heads[ty] ──▶ ring over node slots   (node_type_links)
//!   edge_type_heads[ty] ──▶ ring over edge slots   (edge_type_links)
//!   out_heads[node]     ──▶ ring over edge slots   (out_links)
//!   in_heads[node]      ──▶ ring over edge slots   (in_links)
//! ```
//!
//! ## Limitations
//!
//! - **Single owner**: mutation goes through `&mut self`; there is no
//!   internal locking and no transaction log.
//! - **No attribute indexes**: attribute lookups are per element only.

use std::sync::Arc;

use tracing::debug;

use crate::model::*;
use crate::{Error, Result};
use super::ring::{self, Head, Link, RingIter};

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Clone)]
struct NodeSlot {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Debug, Clone)]
struct NodeData {
    ty: TypeId,
    attributes: AttributeMap,
}

#[derive(Debug, Clone)]
struct EdgeSlot {
    generation: u32,
    data: Option<EdgeData>,
}

#[derive(Debug, Clone)]
struct EdgeData {
    ty: TypeId,
    ends: EdgeEnds,
    attributes: AttributeMap,
}

/// One move-to-front request: the list is implied by the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Splice {
    /// The node's type list.
    NodeType(NodeId),
    /// The edge's type list.
    EdgeType(EdgeId),
    /// The outgoing list of the edge's source.
    Outgoing(EdgeId),
    /// The incoming list of the edge's target.
    Incoming(EdgeId),
}

// ============================================================================
// MemoryGraph
// ============================================================================

/// In-memory typed multigraph.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    model: Arc<TypeModel>,
    nodes: Vec<NodeSlot>,
    edges: Vec<EdgeSlot>,
    free_nodes: Vec<u32>,
    free_edges: Vec<u32>,
    node_type_links: Vec<Link>,
    node_type_heads: Vec<Head>,
    edge_type_links: Vec<Link>,
    edge_type_heads: Vec<Head>,
    out_links: Vec<Link>,
    in_links: Vec<Link>,
    out_heads: Vec<Head>,
    in_heads: Vec<Head>,
    node_count: usize,
    edge_count: usize,
}

impl MemoryGraph {
    pub fn new(model: Arc<TypeModel>) -> Self {
        let node_types = model.nodes.len();
        let edge_types = model.edges.len();
        Self {
            model,
            nodes: Vec::new(),
            edges: Vec::new(),
            free_nodes: Vec::new(),
            free_edges: Vec::new(),
            node_type_links: Vec::new(),
            node_type_heads: vec![None; node_types],
            edge_type_links: Vec::new(),
            edge_type_heads: vec![None; edge_types],
            out_links: Vec::new(),
            in_links: Vec::new(),
            out_heads: Vec::new(),
            in_heads: Vec::new(),
            node_count: 0,
            edge_count: 0,
        }
    }

    pub fn model(&self) -> &Arc<TypeModel> {
        &self.model
    }

    pub fn node_count(&self) -> usize { self.node_count }
    pub fn edge_count(&self) -> usize { self.edge_count }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node of `ty`, initialised with the type's attribute defaults.
    pub fn create_node(&mut self, ty: TypeId) -> Result<NodeId> {
        let defaults = self
            .model
            .nodes
            .defaults(ty)
            .ok_or_else(|| Error::UnknownType(format!("node type {ty}")))?
            .clone();
        let data = NodeData { ty, attributes: defaults };

        let id = match self.free_nodes.pop() {
            Some(slot) => {
                let entry = &mut self.nodes[slot as usize];
                entry.data = Some(data);
                NodeId::new(slot, entry.generation)
            }
            None => {
                let slot = self.nodes.len() as u32;
                self.nodes.push(NodeSlot { generation: 0, data: Some(data) });
                self.node_type_links.push(Link::DETACHED);
                self.out_heads.push(None);
                self.in_heads.push(None);
                NodeId::new(slot, 0)
            }
        };

        ring::push_back(&mut self.node_type_heads[ty.index()], &mut self.node_type_links, id.slot);
        self.node_count += 1;
        Ok(id)
    }

    /// Delete a node together with all of its incident edges.
    /// Returns the edges removed by the cascade.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Vec<EdgeId>> {
        self.node_data(id)?;
        let incident: Vec<EdgeId> = self
            .outgoing(id, None)
            .chain(self.incoming(id, None))
            .collect();
        let mut removed = Vec::with_capacity(incident.len());
        for edge in incident {
            // self-loops show up in both lists
            if self.contains_edge(edge) {
                self.unlink_edge(edge);
                removed.push(edge);
            }
        }
        if !removed.is_empty() {
            debug!(node = %id, edges = removed.len(), "cascading node deletion to incident edges");
        }
        self.unlink_node(id);
        Ok(removed)
    }

    /// Delete a node that has no incident edges left.
    pub fn delete_isolated_node(&mut self, id: NodeId) -> Result<()> {
        self.node_data(id)?;
        if self.out_heads[id.slot as usize].is_some() || self.in_heads[id.slot as usize].is_some() {
            return Err(Error::DanglingEdge(format!(
                "node {id} still has incident edges"
            )));
        }
        self.unlink_node(id);
        Ok(())
    }

    fn unlink_node(&mut self, id: NodeId) {
        let slot = id.slot as usize;
        let Some(data) = self.nodes[slot].data.take() else { return };
        ring::unlink(&mut self.node_type_heads[data.ty.index()], &mut self.node_type_links, id.slot);
        let entry = &mut self.nodes[slot];
        entry.generation = entry.generation.wrapping_add(1);
        self.free_nodes.push(id.slot);
        self.node_count -= 1;
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_data(id).is_ok()
    }

    pub fn node_type(&self, id: NodeId) -> Option<TypeId> {
        self.node_data(id).ok().map(|d| d.ty)
    }

    fn node_data(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes
            .get(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_ref())
            .ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    fn node_data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_mut())
            .ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Create a directed edge `source -[ty]-> target`.
    pub fn create_edge(&mut self, ty: TypeId, source: NodeId, target: NodeId) -> Result<EdgeId> {
        let defaults = self
            .model
            .edges
            .defaults(ty)
            .ok_or_else(|| Error::UnknownType(format!("edge type {ty}")))?
            .clone();
        self.node_data(source)?;
        self.node_data(target)?;
        let data = EdgeData { ty, ends: EdgeEnds { source, target }, attributes: defaults };

        let id = match self.free_edges.pop() {
            Some(slot) => {
                let entry = &mut self.edges[slot as usize];
                entry.data = Some(data);
                EdgeId::new(slot, entry.generation)
            }
            None => {
                let slot = self.edges.len() as u32;
                self.edges.push(EdgeSlot { generation: 0, data: Some(data) });
                self.edge_type_links.push(Link::DETACHED);
                self.out_links.push(Link::DETACHED);
                self.in_links.push(Link::DETACHED);
                EdgeId::new(slot, 0)
            }
        };

        ring::push_back(&mut self.edge_type_heads[ty.index()], &mut self.edge_type_links, id.slot);
        ring::push_back(&mut self.out_heads[source.slot as usize], &mut self.out_links, id.slot);
        ring::push_back(&mut self.in_heads[target.slot as usize], &mut self.in_links, id.slot);
        self.edge_count += 1;
        Ok(id)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        self.edge_data(id)?;
        self.unlink_edge(id);
        Ok(())
    }

    fn unlink_edge(&mut self, id: EdgeId) {
        let slot = id.slot as usize;
        let Some(data) = self.edges[slot].data.take() else { return };
        ring::unlink(&mut self.edge_type_heads[data.ty.index()], &mut self.edge_type_links, id.slot);
        ring::unlink(&mut self.out_heads[data.ends.source.slot as usize], &mut self.out_links, id.slot);
        ring::unlink(&mut self.in_heads[data.ends.target.slot as usize], &mut self.in_links, id.slot);
        let entry = &mut self.edges[slot];
        entry.generation = entry.generation.wrapping_add(1);
        self.free_edges.push(id.slot);
        self.edge_count -= 1;
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge_data(id).is_ok()
    }

    pub fn edge_type(&self, id: EdgeId) -> Option<TypeId> {
        self.edge_data(id).ok().map(|d| d.ty)
    }

    pub fn ends(&self, id: EdgeId) -> Option<EdgeEnds> {
        self.edge_data(id).ok().map(|d| d.ends)
    }

    pub fn source(&self, id: EdgeId) -> Option<NodeId> {
        self.ends(id).map(|e| e.source)
    }

    pub fn target(&self, id: EdgeId) -> Option<NodeId> {
        self.ends(id).map(|e| e.target)
    }

    fn edge_data(&self, id: EdgeId) -> Result<&EdgeData> {
        self.edges
            .get(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_ref())
            .ok_or_else(|| Error::NotFound(format!("Edge {id}")))
    }

    fn edge_data_mut(&mut self, id: EdgeId) -> Result<&mut EdgeData> {
        self.edges
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_mut())
            .ok_or_else(|| Error::NotFound(format!("Edge {id}")))
    }

    // ========================================================================
    // Elements and attributes
    // ========================================================================

    pub fn contains(&self, element: Element) -> bool {
        match element {
            Element::Node(n) => self.contains_node(n),
            Element::Edge(e) => self.contains_edge(e),
        }
    }

    pub fn element_type(&self, element: Element) -> Option<TypeId> {
        match element {
            Element::Node(n) => self.node_type(n),
            Element::Edge(e) => self.edge_type(e),
        }
    }

    pub fn attributes(&self, element: Element) -> Result<&AttributeMap> {
        match element {
            Element::Node(n) => self.node_data(n).map(|d| &d.attributes),
            Element::Edge(e) => self.edge_data(e).map(|d| &d.attributes),
        }
    }

    fn attributes_mut(&mut self, element: Element) -> Result<&mut AttributeMap> {
        match element {
            Element::Node(n) => self.node_data_mut(n).map(|d| &mut d.attributes),
            Element::Edge(e) => self.edge_data_mut(e).map(|d| &mut d.attributes),
        }
    }

    pub fn get_attribute(&self, element: impl Into<Element>, key: &str) -> Result<Option<&Value>> {
        Ok(self.attributes(element.into())?.get(key))
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        element: impl Into<Element>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        Ok(self.attributes_mut(element.into())?.insert(key.into(), value.into()))
    }

    pub fn remove_attribute(&mut self, element: impl Into<Element>, key: &str) -> Result<Option<Value>> {
        Ok(self.attributes_mut(element.into())?.remove(key))
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Nodes whose type is exactly `ty`, in list order.
    pub fn nodes_of_type(&self, ty: TypeId) -> NodeIter<'_> {
        let head = self.node_type_heads.get(ty.index()).copied().flatten();
        NodeIter { slots: &self.nodes, ring: RingIter::new(head, &self.node_type_links) }
    }

    /// Nodes whose type is `ty` or a subtype of it.
    pub fn nodes_of_kind(&self, ty: TypeId) -> impl Iterator<Item = NodeId> + '_ {
        self.model.nodes.subtypes_of(ty).flat_map(move |t| self.nodes_of_type(t))
    }

    /// Edges whose type is exactly `ty`, in list order.
    pub fn edges_of_type(&self, ty: TypeId) -> EdgeIter<'_> {
        let head = self.edge_type_heads.get(ty.index()).copied().flatten();
        EdgeIter { slots: &self.edges, ring: RingIter::new(head, &self.edge_type_links) }
    }

    /// Every live node, grouped by type.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.model.nodes.types().flat_map(move |t| self.nodes_of_type(t))
    }

    /// Every live edge, grouped by type.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.model.edges.types().flat_map(move |t| self.edges_of_type(t))
    }

    /// Incident edges of `node` in one direction, unfiltered, in list order.
    /// A dead node yields nothing.
    pub fn incident(&self, node: NodeId, direction: Direction) -> EdgeIter<'_> {
        let (heads, links) = match direction {
            Direction::Outgoing => (&self.out_heads, &self.out_links),
            Direction::Incoming => (&self.in_heads, &self.in_links),
        };
        let head = if self.contains_node(node) {
            heads.get(node.slot as usize).copied().flatten()
        } else {
            None
        };
        EdgeIter { slots: &self.edges, ring: RingIter::new(head, links) }
    }

    /// Outgoing edges of `node`, optionally restricted to edges whose type
    /// is `ty` or one of its subtypes.
    pub fn outgoing(&self, node: NodeId, ty: Option<TypeId>) -> impl Iterator<Item = EdgeId> + '_ {
        self.filtered(node, Direction::Outgoing, ty)
    }

    /// Incoming edges of `node`, optionally filtered like `outgoing`.
    pub fn incoming(&self, node: NodeId, ty: Option<TypeId>) -> impl Iterator<Item = EdgeId> + '_ {
        self.filtered(node, Direction::Incoming, ty)
    }

    fn filtered(
        &self,
        node: NodeId,
        direction: Direction,
        ty: Option<TypeId>,
    ) -> impl Iterator<Item = EdgeId> + '_ {
        self.incident(node, direction).filter(move |&e| match ty {
            None => true,
            Some(want) => self.edge_type(e).is_some_and(|have| self.model.edges.is_a(have, want)),
        })
    }

    // ========================================================================
    // Locality
    // ========================================================================

    /// Move one element to the front of the list named by `splice`.
    /// Dead elements are ignored.
    pub fn splice_to_front(&mut self, splice: Splice) {
        match splice {
            Splice::NodeType(n) => {
                if let Some(ty) = self.node_type(n) {
                    ring::move_to_front(&mut self.node_type_heads[ty.index()], &mut self.node_type_links, n.slot);
                }
            }
            Splice::EdgeType(e) => {
                if let Some(ty) = self.edge_type(e) {
                    ring::move_to_front(&mut self.edge_type_heads[ty.index()], &mut self.edge_type_links, e.slot);
                }
            }
            Splice::Outgoing(e) => {
                if let Some(ends) = self.ends(e) {
                    ring::move_to_front(&mut self.out_heads[ends.source.slot as usize], &mut self.out_links, e.slot);
                }
            }
            Splice::Incoming(e) => {
                if let Some(ends) = self.ends(e) {
                    ring::move_to_front(&mut self.in_heads[ends.target.slot as usize], &mut self.in_links, e.slot);
                }
            }
        }
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Verify the list invariants: every live node sits in its type list
    /// exactly once, every live edge sits in its type list, its source's
    /// outgoing list and its target's incoming list, and every list only
    /// holds live members that belong there.
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Inconsistent(msg));

        let mut seen_nodes = vec![0u32; self.nodes.len()];
        for ty in self.model.nodes.types() {
            for n in self.nodes_of_type(ty) {
                if self.node_type(n) != Some(ty) {
                    return fail(format!("node {n} listed under type {ty}"));
                }
                seen_nodes[n.slot as usize] += 1;
            }
        }
        let live_nodes = self.nodes.iter().filter(|s| s.data.is_some()).count();
        if live_nodes != self.node_count {
            return fail(format!("node count {} but {live_nodes} live", self.node_count));
        }
        for (slot, s) in self.nodes.iter().enumerate() {
            let expected = u32::from(s.data.is_some());
            if seen_nodes[slot] != expected {
                return fail(format!("node slot {slot} listed {} times", seen_nodes[slot]));
            }
        }

        let mut seen_edges = vec![0u32; self.edges.len()];
        for ty in self.model.edges.types() {
            for e in self.edges_of_type(ty) {
                if self.edge_type(e) != Some(ty) {
                    return fail(format!("edge {e} listed under type {ty}"));
                }
                seen_edges[e.slot as usize] += 1;
            }
        }
        for (slot, s) in self.nodes.iter().enumerate() {
            if s.data.is_none() {
                if self.out_heads[slot].is_some() || self.in_heads[slot].is_some() {
                    return fail(format!("dead node slot {slot} still has adjacency"));
                }
                continue;
            }
            let node = NodeId::new(slot as u32, s.generation);
            for e in self.incident(node, Direction::Outgoing) {
                if self.source(e) != Some(node) {
                    return fail(format!("edge {e} in outgoing list of {node}"));
                }
                seen_edges[e.slot as usize] += 1;
            }
            for e in self.incident(node, Direction::Incoming) {
                if self.target(e) != Some(node) {
                    return fail(format!("edge {e} in incoming list of {node}"));
                }
                seen_edges[e.slot as usize] += 1;
            }
        }
        let live_edges = self.edges.iter().filter(|s| s.data.is_some()).count();
        if live_edges != self.edge_count {
            return fail(format!("edge count {} but {live_edges} live", self.edge_count));
        }
        for (slot, s) in self.edges.iter().enumerate() {
            let expected = if s.data.is_some() { 3 } else { 0 };
            if seen_edges[slot] != expected {
                return fail(format!("edge slot {slot} linked {} times", seen_edges[slot]));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Iterators
// ============================================================================

/// Node ids along one list.
#[derive(Debug, Clone)]
pub struct NodeIter<'a> {
    slots: &'a [NodeSlot],
    ring: RingIter<'a>,
}

impl Iterator for NodeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let slot = self.ring.next()?;
        Some(NodeId::new(slot, self.slots[slot as usize].generation))
    }
}

/// Edge ids along one list.
#[derive(Debug, Clone)]
pub struct EdgeIter<'a> {
    slots: &'a [EdgeSlot],
    ring: RingIter<'a>,
}

impl Iterator for EdgeIter<'_> {
    type Item = EdgeId;

    fn next(&mut self) -> Option<EdgeId> {
        let slot = self.ring.next()?;
        Some(EdgeId::new(slot, self.slots[slot as usize].generation))
    }
}
