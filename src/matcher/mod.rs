//! # Matcher
//!
//! One generic backtracking engine interprets a pattern's search plan:
//!
//! ```text
//!   Preset ──▶ bind caller element (or fall back to Lookup)
//!   Lookup ──▶ scan type lists ─────────────┐
//!   Extend ──▶ walk adjacency of bound node ├──▶ type + injectivity check ──▶ next step
//!   Endpoint ─▶ read end of a bound edge ───┘
//!   Condition / Negative ──▶ veto or continue
//! ```
//!
//! Every step either rejects a candidate and tries the next one in the same
//! list, or recurses to the next step. Reaching the end of the plan emits a
//! match. Injectivity is enforced with per-depth marks (see `marks`), and
//! negative patterns run the same engine one depth further down (see
//! `negative`).
//!
//! The matcher never changes graph content. When it stops early because
//! enough matches were found, it asks the store to move the elements of
//! the last match to the front of the lists they were found in.

mod marks;
mod negative;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::model::{Direction, EdgeId, Element, NodeId};
use crate::pattern::{Bindings, End, PatternGraph, SearchOp, Slot};
use crate::storage::{MemoryGraph, Splice};
use crate::{Error, Result};

use marks::{Marks, Owner};

// ============================================================================
// MatchLimit
// ============================================================================

/// How many matches to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchLimit {
    /// Every match.
    #[default]
    All,
    /// Stop after this many. `AtMost(0)` means all.
    AtMost(usize),
}

impl MatchLimit {
    fn reached(self, found: usize) -> bool {
        match self {
            MatchLimit::All => false,
            MatchLimit::AtMost(k) => k > 0 && found >= k,
        }
    }
}

/// Non-positive counts mean "all".
impl From<i32> for MatchLimit {
    fn from(v: i32) -> Self {
        if v <= 0 { MatchLimit::All } else { MatchLimit::AtMost(v as usize) }
    }
}

// ============================================================================
// Match
// ============================================================================

/// One binding of a pattern's elements to host elements.
#[derive(Debug, Clone)]
pub struct Match {
    nodes: SmallVec<[Option<NodeId>; 8]>,
    edges: SmallVec<[Option<EdgeId>; 8]>,
    pattern: Arc<PatternGraph>,
}

impl Match {
    /// Assemble a match by hand. Slots left `None` make the match malformed
    /// for any rewrite that reads them.
    pub fn new(
        pattern: Arc<PatternGraph>,
        nodes: impl IntoIterator<Item = Option<NodeId>>,
        edges: impl IntoIterator<Item = Option<EdgeId>>,
    ) -> Self {
        Self { nodes: nodes.into_iter().collect(), edges: edges.into_iter().collect(), pattern }
    }

    pub fn pattern(&self) -> &Arc<PatternGraph> { &self.pattern }
    pub fn nodes(&self) -> &[Option<NodeId>] { &self.nodes }
    pub fn edges(&self) -> &[Option<EdgeId>] { &self.edges }

    pub fn node(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied().flatten()
    }

    pub fn edge(&self, index: usize) -> Option<EdgeId> {
        self.edges.get(index).copied().flatten()
    }

    pub fn node_named(&self, name: &str) -> Option<NodeId> {
        self.node(self.pattern.node_index(name)?)
    }

    pub fn edge_named(&self, name: &str) -> Option<EdgeId> {
        self.edge(self.pattern.edge_index(name)?)
    }

    pub fn element(&self, slot: Slot) -> Option<Element> {
        match slot {
            Slot::Node(i) => self.node(i).map(Element::Node),
            Slot::Edge(i) => self.edge(i).map(Element::Edge),
            Slot::NewNode(_) | Slot::NewEdge(_) => None,
        }
    }
}

impl Bindings for Match {
    fn resolve(&self, slot: Slot) -> Option<Element> {
        self.element(slot)
    }
}

/// Same pattern (by identity) and same bindings.
impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pattern, &other.pattern)
            && self.nodes == other.nodes
            && self.edges == other.edges
    }
}

impl Eq for Match {}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.pattern.name())?;
        let mut first = true;
        for (pn, n) in self.pattern.nodes().iter().zip(&self.nodes) {
            if !first { write!(f, ", ")?; }
            first = false;
            match n {
                Some(n) => write!(f, "{}: {n}", pn.name())?,
                None => write!(f, "{}: _", pn.name())?,
            }
        }
        for (pe, e) in self.pattern.edges().iter().zip(&self.edges) {
            if !first { write!(f, ", ")?; }
            first = false;
            match e {
                Some(e) => write!(f, "{}: {e}", pe.name())?,
                None => write!(f, "{}: _", pe.name())?,
            }
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Matcher for one pattern. Keeps its mark table between calls.
#[derive(Debug)]
pub struct Matcher {
    pattern: Arc<PatternGraph>,
    marks: Marks,
    locality: bool,
}

impl Matcher {
    pub fn new(pattern: Arc<PatternGraph>, locality: bool) -> Self {
        Self { pattern, marks: Marks::new(), locality }
    }

    pub fn pattern(&self) -> &Arc<PatternGraph> {
        &self.pattern
    }

    /// Check preset count, kind and type against the pattern's inputs.
    pub fn check_presets(&self, graph: &MemoryGraph, presets: &[Option<Element>]) -> Result<()> {
        let pattern = &self.pattern;
        let mismatch = |message: String| Error::TypeMismatch { rule: pattern.name().to_owned(), message };

        if presets.len() != pattern.inputs().len() {
            return Err(mismatch(format!(
                "expected {} presets, got {}",
                pattern.inputs().len(),
                presets.len()
            )));
        }
        let model = graph.model();
        for (k, (slot, preset)) in pattern.inputs().iter().zip(presets).enumerate() {
            let Some(element) = preset else { continue };
            match (*slot, *element) {
                (Slot::Node(i), Element::Node(n)) => {
                    let pn = &pattern.nodes()[i];
                    let ty = graph.node_type(n).ok_or_else(|| Error::NotFound(format!("Node {n}")))?;
                    if !pn.accepts(ty) {
                        return Err(mismatch(format!(
                            "preset {k} ('{}') expects {}, got {}",
                            pn.name(),
                            pn.constraint().describe(&model.nodes),
                            model.nodes.describe(ty)
                        )));
                    }
                }
                (Slot::Edge(i), Element::Edge(e)) => {
                    let pe = &pattern.edges()[i];
                    let ty = graph.edge_type(e).ok_or_else(|| Error::NotFound(format!("Edge {e}")))?;
                    if !pe.accepts(ty) {
                        return Err(mismatch(format!(
                            "preset {k} ('{}') expects {}, got {}",
                            pe.name(),
                            pe.constraint().describe(&model.edges),
                            model.edges.describe(ty)
                        )));
                    }
                }
                (slot, element) => {
                    return Err(mismatch(format!(
                        "preset {k} expects a {}, got {} {element}",
                        if slot.is_node() { "node" } else { "edge" },
                        element.kind()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Enumerate matches in plan order. With locality on and an early stop,
    /// the elements of the last match are spliced to the front of the lists
    /// they were found in.
    pub fn find_matches(
        &mut self,
        graph: &mut MemoryGraph,
        presets: &[Option<Element>],
        limit: impl Into<MatchLimit>,
    ) -> Result<Vec<Match>> {
        let (found, promote) = self.enumerate(graph, presets, limit.into())?;
        if self.locality {
            for splice in promote {
                graph.splice_to_front(splice);
            }
        }
        Ok(found)
    }

    /// Enumerate without touching list order.
    pub fn find_matches_frozen(
        &mut self,
        graph: &MemoryGraph,
        presets: &[Option<Element>],
        limit: impl Into<MatchLimit>,
    ) -> Result<Vec<Match>> {
        Ok(self.enumerate(graph, presets, limit.into())?.0)
    }

    fn enumerate(
        &mut self,
        graph: &MemoryGraph,
        presets: &[Option<Element>],
        limit: MatchLimit,
    ) -> Result<(Vec<Match>, Vec<Splice>)> {
        self.check_presets(graph, presets)?;
        let pattern = Arc::clone(&self.pattern);
        let mut search = Search {
            graph,
            marks: &mut self.marks,
            root: &pattern,
            limit,
            found: Vec::new(),
            trail: vec![None; pattern.plan().len()],
            promote: Vec::new(),
        };
        let mut frame = Frame::new(&pattern, 0, presets);
        let outcome = search.descend(&mut frame, 0);
        let Search { found, promote, .. } = search;
        debug_assert!(self.marks.is_clear());
        outcome?;
        trace!(pattern = pattern.name(), matches = found.len(), "enumeration finished");
        Ok((found, promote))
    }
}

// ============================================================================
// Search engine
// ============================================================================

/// Whether to keep enumerating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Partial binding of one pattern level.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    nodes: SmallVec<[Option<NodeId>; 8]>,
    edges: SmallVec<[Option<EdgeId>; 8]>,
}

impl Binding {
    fn for_pattern(pattern: &PatternGraph) -> Self {
        Self {
            nodes: SmallVec::from_elem(None, pattern.nodes().len()),
            edges: SmallVec::from_elem(None, pattern.edges().len()),
        }
    }
}

impl Bindings for Binding {
    fn resolve(&self, slot: Slot) -> Option<Element> {
        match slot {
            Slot::Node(i) => self.nodes.get(i).copied().flatten().map(Element::Node),
            Slot::Edge(i) => self.edges.get(i).copied().flatten().map(Element::Edge),
            Slot::NewNode(_) | Slot::NewEdge(_) => None,
        }
    }
}

/// One pattern level being searched.
pub(crate) struct Frame<'p> {
    pattern: &'p PatternGraph,
    depth: usize,
    presets: &'p [Option<Element>],
    binding: Binding,
}

impl<'p> Frame<'p> {
    fn new(pattern: &'p PatternGraph, depth: usize, presets: &'p [Option<Element>]) -> Self {
        Self { pattern, depth, presets, binding: Binding::for_pattern(pattern) }
    }

    /// Inside a negative pattern, the inputs stand for the parent's elements.
    fn shares(&self, slot: Slot) -> bool {
        self.depth > 0 && self.pattern.input_position(slot).is_some()
    }
}

pub(crate) struct Search<'a> {
    graph: &'a MemoryGraph,
    marks: &'a mut Marks,
    root: &'a Arc<PatternGraph>,
    limit: MatchLimit,
    found: Vec<Match>,
    /// List position used at each top-level step of the current candidate.
    trail: Vec<Option<Splice>>,
    promote: Vec<Splice>,
}

impl Search<'_> {
    fn descend(&mut self, frame: &mut Frame<'_>, pc: usize) -> Result<Flow> {
        let pattern = frame.pattern;
        let graph = self.graph;
        let Some(&op) = pattern.plan().ops().get(pc) else {
            return Ok(self.complete(frame));
        };

        match op {
            SearchOp::Preset(slot) => {
                let preset = pattern
                    .input_position(slot)
                    .and_then(|k| frame.presets.get(k).copied().flatten());
                match (slot, preset) {
                    (Slot::Node(i), Some(Element::Node(n))) => self.try_node(frame, i, n, pc),
                    (Slot::Edge(i), Some(Element::Edge(e))) => self.try_edge(frame, i, e, pc, None),
                    (_, None) => self.lookup(frame, slot, pc),
                    // kind mismatches are rejected before the search starts
                    _ => Ok(Flow::Continue),
                }
            }

            SearchOp::Lookup(slot) => self.lookup(frame, slot, pc),

            SearchOp::Extend { edge, direction } => {
                let pe = &pattern.edges()[edge];
                let (from_idx, far_idx) = match direction {
                    Direction::Outgoing => (pe.source(), pe.target()),
                    Direction::Incoming => (pe.target(), pe.source()),
                };
                let from = frame.binding.nodes[from_idx].ok_or_else(|| {
                    Error::InvalidPattern(format!("{}: extend from unbound node[{from_idx}]", pattern.name()))
                })?;
                for candidate in graph.incident(from, direction) {
                    let Some(ends) = graph.ends(candidate) else { continue };
                    let far = ends.far_end(direction);
                    let splice = match direction {
                        Direction::Outgoing => Splice::Outgoing(candidate),
                        Direction::Incoming => Splice::Incoming(candidate),
                    };
                    let bound_far = frame.binding.nodes[far_idx];
                    if bound_far.is_some_and(|b| b != far) {
                        continue;
                    }
                    let then_far = if bound_far.is_some() { None } else { Some((far_idx, far)) };
                    self.record(frame, pc, splice);
                    if self.try_edge(frame, edge, candidate, pc, then_far)? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
                Ok(Flow::Continue)
            }

            SearchOp::Endpoint { edge, end } => {
                let pe = &pattern.edges()[edge];
                let host = frame.binding.edges[edge].and_then(|e| graph.ends(e)).ok_or_else(|| {
                    Error::InvalidPattern(format!("{}: endpoint of unbound edge[{edge}]", pattern.name()))
                })?;
                let (idx, node) = match end {
                    End::Source => (pe.source(), host.source),
                    End::Target => (pe.target(), host.target),
                };
                match frame.binding.nodes[idx] {
                    Some(bound) if bound == node => self.descend(frame, pc + 1),
                    Some(_) => Ok(Flow::Continue),
                    None => self.try_node(frame, idx, node, pc),
                }
            }

            SearchOp::Condition(i) => {
                let condition = &pattern.conditions()[i];
                if condition.expr().eval(graph, &frame.binding)?.is_truthy() {
                    self.descend(frame, pc + 1)
                } else {
                    Ok(Flow::Continue)
                }
            }

            SearchOp::Negative(i) => {
                if self.negative_exists(frame, i)? {
                    trace!(pattern = pattern.name(), negative = i, "negative pattern vetoed candidate");
                    Ok(Flow::Continue)
                } else {
                    self.descend(frame, pc + 1)
                }
            }
        }
    }

    /// End of plan: emit a match (top level) or report existence (nested).
    fn complete(&mut self, frame: &Frame<'_>) -> Flow {
        if frame.depth > 0 {
            return Flow::Stop;
        }
        let m = Match {
            nodes: frame.binding.nodes.clone(),
            edges: frame.binding.edges.clone(),
            pattern: Arc::clone(self.root),
        };
        trace!(found = %m, "match");
        self.found.push(m);
        if self.limit.reached(self.found.len()) {
            self.promote = self.trail.iter().flatten().copied().collect();
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn lookup(&mut self, frame: &mut Frame<'_>, slot: Slot, pc: usize) -> Result<Flow> {
        let pattern = frame.pattern;
        let graph = self.graph;
        match slot {
            Slot::Node(i) => {
                for &ty in pattern.nodes()[i].types.scan() {
                    for candidate in graph.nodes_of_type(ty) {
                        self.record(frame, pc, Splice::NodeType(candidate));
                        if self.try_node(frame, i, candidate, pc)? == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                }
            }
            Slot::Edge(i) => {
                for &ty in pattern.edges()[i].types.scan() {
                    for candidate in graph.edges_of_type(ty) {
                        self.record(frame, pc, Splice::EdgeType(candidate));
                        if self.try_edge(frame, i, candidate, pc, None)? == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                }
            }
            Slot::NewNode(_) | Slot::NewEdge(_) => {}
        }
        Ok(Flow::Continue)
    }

    fn record(&mut self, frame: &Frame<'_>, pc: usize, splice: Splice) {
        if frame.depth == 0 {
            self.trail[pc] = Some(splice);
        }
    }

    /// Bind pattern node `index` to `candidate` if type and injectivity
    /// allow it, then continue with the next step.
    fn try_node(&mut self, frame: &mut Frame<'_>, index: usize, candidate: NodeId, pc: usize) -> Result<Flow> {
        let pattern = frame.pattern;
        let accepted = self
            .graph
            .node_type(candidate)
            .is_some_and(|ty| pattern.nodes()[index].accepts(ty));
        let key = Element::Node(candidate);
        let shared = frame.shares(Slot::Node(index));
        if !accepted || self.marks.forbids(frame.depth, key, index, pattern.node_homomorphy(), shared) {
            return Ok(Flow::Continue);
        }

        frame.binding.nodes[index] = Some(candidate);
        self.marks.mark(frame.depth, key, Owner::Element(index));
        let flow = self.descend(frame, pc + 1);
        self.marks.unmark(frame.depth, key);
        frame.binding.nodes[index] = None;
        flow
    }

    /// Bind pattern edge `index` to `candidate`. With `then_far`, also bind
    /// the far endpoint reached by an extend step before continuing.
    fn try_edge(
        &mut self,
        frame: &mut Frame<'_>,
        index: usize,
        candidate: EdgeId,
        pc: usize,
        then_far: Option<(usize, NodeId)>,
    ) -> Result<Flow> {
        let pattern = frame.pattern;
        let accepted = self
            .graph
            .edge_type(candidate)
            .is_some_and(|ty| pattern.edges()[index].accepts(ty));
        let key = Element::Edge(candidate);
        let shared = frame.shares(Slot::Edge(index));
        if !accepted || self.marks.forbids(frame.depth, key, index, pattern.edge_homomorphy(), shared) {
            return Ok(Flow::Continue);
        }

        frame.binding.edges[index] = Some(candidate);
        self.marks.mark(frame.depth, key, Owner::Element(index));
        let flow = match then_far {
            Some((far_idx, far)) => self.try_node(frame, far_idx, far, pc),
            None => self.descend(frame, pc + 1),
        };
        self.marks.unmark(frame.depth, key);
        frame.binding.edges[index] = None;
        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TypeHierarchy, TypeId, TypeModel};
    use crate::pattern::{PatternBuilder, TypeConstraint};

    fn model() -> (Arc<TypeModel>, TypeId, TypeId) {
        let mut nodes = TypeHierarchy::builder("Node");
        let a = nodes.add_type("A", &[TypeId::ROOT]).unwrap();
        let mut edges = TypeHierarchy::builder("Edge");
        let r = edges.add_type("r", &[TypeId::ROOT]).unwrap();
        (Arc::new(TypeModel::new(nodes.build(), edges.build())), a, r)
    }

    fn pair_pattern(model: &TypeModel, a: TypeId, r: TypeId) -> Arc<PatternGraph> {
        let mut p = PatternBuilder::new("pair");
        let x = p.node("x", a.into());
        let y = p.node("y", a.into());
        p.edge("xy", r.into(), x, y);
        Arc::new(p.build(model).unwrap())
    }

    #[test]
    fn test_match_limit_from_int() {
        assert_eq!(MatchLimit::from(-1), MatchLimit::All);
        assert_eq!(MatchLimit::from(0), MatchLimit::All);
        assert_eq!(MatchLimit::from(3), MatchLimit::AtMost(3));
        assert!(MatchLimit::AtMost(2).reached(2));
        assert!(!MatchLimit::AtMost(0).reached(100));
    }

    #[test]
    fn test_finds_every_edge() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let n: Vec<NodeId> = (0..3).map(|_| g.create_node(a).unwrap()).collect();
        let e1 = g.create_edge(r, n[0], n[1]).unwrap();
        let e2 = g.create_edge(r, n[1], n[2]).unwrap();
        let mut m = Matcher::new(pair_pattern(&model, a, r), true);
        let found = m.find_matches(&mut g, &[], -1).unwrap();
        let edges: Vec<_> = found.iter().map(|m| m.edge(0).unwrap()).collect();
        assert_eq!(edges, vec![e1, e2]);
        assert_eq!(found[0].node_named("y"), Some(n[1]));
    }

    #[test]
    fn test_injective_self_loop_rejected() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let x = g.create_node(a).unwrap();
        g.create_edge(r, x, x).unwrap();
        let mut m = Matcher::new(pair_pattern(&model, a, r), true);
        assert!(m.find_matches(&mut g, &[], -1).unwrap().is_empty());
    }

    #[test]
    fn test_homomorphic_self_loop_accepted() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let x = g.create_node(a).unwrap();
        g.create_edge(r, x, x).unwrap();
        let mut p = PatternBuilder::new("pair");
        let px = p.node("x", a.into());
        let py = p.node("y", a.into());
        p.edge("xy", r.into(), px, py);
        p.homomorphic_nodes(px, py);
        let mut m = Matcher::new(Arc::new(p.build(&model).unwrap()), true);
        let found = m.find_matches(&mut g, &[], -1).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node(0), found[0].node(1));
    }

    #[test]
    fn test_preset_kind_and_arity_mismatch() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let x = g.create_node(a).unwrap();
        let e = g.create_edge(r, x, x).unwrap();
        let mut p = PatternBuilder::new("one");
        let px = p.node("x", a.into());
        p.input(Slot::Node(px));
        let mut m = Matcher::new(Arc::new(p.build(&model).unwrap()), true);
        assert!(matches!(m.find_matches(&mut g, &[], -1), Err(Error::TypeMismatch { .. })));
        assert!(matches!(
            m.find_matches(&mut g, &[Some(Element::Edge(e))], -1),
            Err(Error::TypeMismatch { .. })
        ));
        let root = g.create_node(TypeId::ROOT).unwrap();
        assert!(matches!(
            m.find_matches(&mut g, &[Some(Element::Node(root))], -1),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(m.find_matches(&mut g, &[Some(Element::Node(x))], -1).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_preset_falls_back_to_lookup() {
        let (model, a, _) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        for _ in 0..3 {
            g.create_node(a).unwrap();
        }
        let mut p = PatternBuilder::new("one");
        let px = p.node("x", TypeConstraint::Exact(a));
        p.input(Slot::Node(px));
        let mut m = Matcher::new(Arc::new(p.build(&model).unwrap()), true);
        assert_eq!(m.find_matches(&mut g, &[None], -1).unwrap().len(), 3);
    }

    #[test]
    fn test_cutoff_splices_last_match_to_front() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let n: Vec<NodeId> = (0..3).map(|_| g.create_node(a).unwrap()).collect();
        // only n[2] has an outgoing edge
        g.create_edge(r, n[2], n[0]).unwrap();
        let mut m = Matcher::new(pair_pattern(&model, a, r), true);
        let found = m.find_matches(&mut g, &[], 1).unwrap();
        assert_eq!(found[0].node(0), Some(n[2]));
        assert_eq!(g.nodes_of_type(a).next(), Some(n[2]));

        let mut frozen = Matcher::new(pair_pattern(&model, a, r), false);
        let mut g2 = MemoryGraph::new(Arc::clone(&model));
        let n2: Vec<NodeId> = (0..3).map(|_| g2.create_node(a).unwrap()).collect();
        g2.create_edge(r, n2[2], n2[0]).unwrap();
        frozen.find_matches(&mut g2, &[], 1).unwrap();
        assert_eq!(g2.nodes_of_type(a).collect::<Vec<_>>(), n2);
    }
}
