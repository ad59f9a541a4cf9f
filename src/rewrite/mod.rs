//! # Rewrite Executor
//!
//! Applies a rule's edit script to one match, in four phases:
//!
//! 1. creations, in order; each new element gets a `NewNode`/`NewEdge` slot
//! 2. attribute updates; every value is computed before any is written
//! 3. deletions; edges first, then nodes (which cascade to incident edges)
//! 4. outputs, assembled from match slots and new slots
//!
//! Every match slot the script touches is checked before the first edit,
//! so a malformed match leaves the graph untouched.

mod script;

use std::sync::Arc;

use tracing::debug;

use crate::matcher::Match;
use crate::model::{EdgeId, Element, NodeId, Value};
use crate::pattern::{Bindings, PatternGraph, Slot};
use crate::storage::MemoryGraph;
use crate::{Error, Result};

pub use script::{AttributeUpdate, Creation, Deletion, EditScript, EditScriptBuilder};

// ============================================================================
// Statistics
// ============================================================================

/// Counters for matching and rewriting work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub matches_found: u64,
    pub rewrites_performed: u64,
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub edges_created: u64,
    pub edges_deleted: u64,
    pub attributes_set: u64,
}

impl std::ops::AddAssign for ExecutionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.matches_found += rhs.matches_found;
        self.rewrites_performed += rhs.rewrites_performed;
        self.nodes_created += rhs.nodes_created;
        self.nodes_deleted += rhs.nodes_deleted;
        self.edges_created += rhs.edges_created;
        self.edges_deleted += rhs.edges_deleted;
        self.attributes_set += rhs.attributes_set;
    }
}

/// Result of one rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub outputs: Vec<Element>,
    pub stats: ExecutionStats,
}

// ============================================================================
// Rewriter
// ============================================================================

/// Executes one edit script against matches of one pattern.
#[derive(Debug, Clone)]
pub struct Rewriter {
    pattern: Arc<PatternGraph>,
    script: EditScript,
}

/// Match slots plus the elements created so far.
struct Scope<'m> {
    matched: &'m Match,
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

impl Bindings for Scope<'_> {
    fn resolve(&self, slot: Slot) -> Option<Element> {
        match slot {
            Slot::Node(_) | Slot::Edge(_) => self.matched.element(slot),
            Slot::NewNode(i) => self.nodes.get(i).copied().map(Element::Node),
            Slot::NewEdge(i) => self.edges.get(i).copied().map(Element::Edge),
        }
    }
}

impl Scope<'_> {
    fn node(&self, slot: Slot) -> Result<NodeId> {
        self.resolve(slot)
            .and_then(|e| e.as_node())
            .ok_or_else(|| Error::MalformedMatch(format!("{slot} does not resolve to a node")))
    }

    fn element(&self, slot: Slot) -> Result<Element> {
        self.resolve(slot)
            .ok_or_else(|| Error::MalformedMatch(format!("{slot} is not bound")))
    }
}

impl Rewriter {
    pub fn new(pattern: Arc<PatternGraph>, script: EditScript) -> Result<Self> {
        script.check_shape(&pattern)?;
        Ok(Self { pattern, script })
    }

    pub fn pattern(&self) -> &Arc<PatternGraph> { &self.pattern }
    pub fn script(&self) -> &EditScript { &self.script }

    /// Every referenced match slot must be set and alive.
    fn validate(&self, graph: &MemoryGraph, m: &Match) -> Result<()> {
        if !Arc::ptr_eq(m.pattern(), &self.pattern) {
            return Err(Error::MalformedMatch(format!(
                "match of '{}' applied to a rewrite of '{}'",
                m.pattern().name(),
                self.pattern.name()
            )));
        }
        for &slot in self.script.referenced() {
            let element = m
                .element(slot)
                .ok_or_else(|| Error::MalformedMatch(format!("{slot} is not set")))?;
            if !graph.contains(element) {
                return Err(Error::MalformedMatch(format!("{slot} refers to deleted {element}")));
            }
        }
        Ok(())
    }

    pub fn apply(&self, graph: &mut MemoryGraph, m: &Match) -> Result<RewriteOutcome> {
        self.validate(graph, m)?;
        let mut stats = ExecutionStats { rewrites_performed: 1, ..Default::default() };
        let mut scope = Scope { matched: m, nodes: Vec::new(), edges: Vec::new() };

        // (a) creations
        for creation in self.script.creations() {
            match creation {
                Creation::Node { ty, .. } => {
                    scope.nodes.push(graph.create_node(*ty)?);
                    stats.nodes_created += 1;
                }
                Creation::Edge { ty, source, target, .. } => {
                    let (s, t) = (scope.node(*source)?, scope.node(*target)?);
                    scope.edges.push(graph.create_edge(*ty, s, t)?);
                    stats.edges_created += 1;
                }
            }
        }

        // (b) updates against the pre-update state
        let values: Vec<Value> = self
            .script
            .updates()
            .iter()
            .map(|u| u.value.eval(graph, &scope))
            .collect::<Result<_>>()?;
        for (update, value) in self.script.updates().iter().zip(values) {
            let target = scope.element(update.target)?;
            graph.set_attribute(target, update.key.as_str(), value)?;
            stats.attributes_set += 1;
        }

        // (c) deletions
        for deletion in self.script.deletions() {
            if let Deletion::Edge(i) = deletion {
                let Some(edge) = m.edge(*i) else { continue };
                if graph.contains_edge(edge) {
                    graph.delete_edge(edge)?;
                    stats.edges_deleted += 1;
                }
            }
        }
        for deletion in self.script.deletions() {
            if let Deletion::Node(i) = deletion {
                let Some(node) = m.node(*i) else { continue };
                if graph.contains_node(node) {
                    let cascaded = graph.delete_node(node)?;
                    stats.nodes_deleted += 1;
                    stats.edges_deleted += cascaded.len() as u64;
                }
            }
        }

        // (d) outputs
        let outputs = self
            .script
            .outputs()
            .iter()
            .map(|slot| scope.element(*slot))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            pattern = self.pattern.name(),
            nodes_created = stats.nodes_created,
            edges_created = stats.edges_created,
            attributes_set = stats.attributes_set,
            nodes_deleted = stats.nodes_deleted,
            edges_deleted = stats.edges_deleted,
            "rewrite applied"
        );
        Ok(RewriteOutcome { outputs, stats })
    }
}
