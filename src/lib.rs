//! # rulegraph: typed graph pattern matching and rewriting
//!
//! Rules are pairs of a pattern graph and an edit script. The engine finds
//! matches of a pattern in a typed, attributed host graph and rewrites the
//! match the control program picks.
//!
//! ## Design Principles
//!
//! 1. **Data-driven matching**: one backtracking engine interprets each
//!    pattern's fixed search plan; there is no per-rule generated code
//! 2. **Self-organizing lists**: type and adjacency lists are index-linked
//!    rings with O(1) edits and move-to-front after a cut-off search
//! 3. **Borrow-checked staleness**: matching and rewriting take `&mut` on the
//!    graph, so nothing else can mutate it in between
//! 4. **Negative conditions are patterns too**: a NAC runs the same engine
//!    one nesting level down, sharing elements with its parent
//!
//! ## Quick Start
//!
//! ```rust
//! use rulegraph::turing;
//!
//! # fn main() -> rulegraph::Result<()> {
//! let mut engine = turing::engine()?;
//! let machine = turing::busy_beaver_3().build(engine.graph_mut())?;
//! let start = machine.state("A").unwrap();
//!
//! let outcome = turing::run(&mut engine, start, machine.start_cell(), 100)?;
//! assert!(outcome.halted);
//! assert_eq!(outcome.steps, 14);
//! assert_eq!(turing::read_tape(engine.graph(), outcome.cell)?, vec![1; 6]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `model` | ids, values, type hierarchies |
//! | `storage` | arena graph store with ring lists |
//! | `pattern` | pattern graphs, conditions, search plans |
//! | `matcher` | backtracking search and negative conditions |
//! | `rewrite` | edit scripts and their execution |
//! | `actions` | rule registry |
//! | `turing` | Turing machines on top of the engine |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod pattern;
pub mod matcher;
pub mod rewrite;
pub mod actions;
pub mod config;
pub mod turing;

use std::sync::Arc;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    NodeId, EdgeId, Element, Direction, Value, AttributeMap,
    TypeId, TypeHierarchy, TypeModel,
};

// ============================================================================
// Re-exports: Engine parts
// ============================================================================

pub use storage::MemoryGraph;
pub use pattern::{PatternBuilder, PatternGraph, Slot, Expr, BinaryOp, TypeConstraint};
pub use matcher::{Match, MatchLimit, Matcher};
pub use rewrite::{EditScript, EditScriptBuilder, ExecutionStats};
pub use actions::{Actions, Rule};
pub use config::EngineConfig;

// ============================================================================
// Top-level Engine handle
// ============================================================================

/// A host graph together with the rules that rewrite it.
#[derive(Debug)]
pub struct Engine {
    graph: MemoryGraph,
    actions: Actions,
}

impl Engine {
    pub fn new(model: Arc<TypeModel>) -> Self {
        Self::with_config(model, EngineConfig::default())
    }

    pub fn with_config(model: Arc<TypeModel>, config: EngineConfig) -> Self {
        Self {
            graph: MemoryGraph::new(Arc::clone(&model)),
            actions: Actions::with_config(model, config),
        }
    }

    pub fn model(&self) -> &Arc<TypeModel> { self.graph.model() }
    pub fn graph(&self) -> &MemoryGraph { &self.graph }
    pub fn graph_mut(&mut self) -> &mut MemoryGraph { &mut self.graph }
    pub fn actions(&self) -> &Actions { &self.actions }
    pub fn actions_mut(&mut self) -> &mut Actions { &mut self.actions }
    pub fn stats(&self) -> ExecutionStats { self.actions.stats() }

    // ========================================================================
    // Graph edits
    // ========================================================================

    pub fn create_node(&mut self, ty: TypeId) -> Result<NodeId> {
        self.graph.create_node(ty)
    }

    pub fn create_edge(&mut self, ty: TypeId, source: NodeId, target: NodeId) -> Result<EdgeId> {
        self.graph.create_edge(ty, source, target)
    }

    /// Delete a node and its incident edges; returns the edges removed.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Vec<EdgeId>> {
        self.graph.delete_node(id)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        self.graph.delete_edge(id)
    }

    pub fn get_attribute(&self, element: impl Into<Element>, key: &str) -> Result<Option<&Value>> {
        self.graph.get_attribute(element, key)
    }

    pub fn set_attribute(
        &mut self,
        element: impl Into<Element>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        self.graph.set_attribute(element, key, value)
    }

    // ========================================================================
    // Rules
    // ========================================================================

    pub fn register_rule(&mut self, name: impl Into<String>, pattern: PatternGraph, script: EditScript) -> Result<()> {
        self.actions.register_rule(name, pattern, script)
    }

    pub fn find_matches(
        &mut self,
        rule: &str,
        presets: &[Option<Element>],
        limit: impl Into<MatchLimit>,
    ) -> Result<Vec<Match>> {
        self.actions.find_matches(&mut self.graph, rule, presets, limit)
    }

    pub fn apply(&mut self, rule: &str, m: &Match) -> Result<Vec<Element>> {
        self.actions.apply(&mut self.graph, rule, m)
    }

    pub fn apply_first(&mut self, rule: &str, presets: &[Option<Element>]) -> Result<Option<Vec<Element>>> {
        self.actions.apply_first(&mut self.graph, rule, presets)
    }

    pub fn apply_repeatedly(
        &mut self,
        rule: &str,
        presets: &[Option<Element>],
        max: Option<usize>,
    ) -> Result<usize> {
        self.actions.apply_repeatedly(&mut self.graph, rule, presets, max)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Type mismatch in rule '{rule}': {message}")]
    TypeMismatch { rule: String, message: String },

    #[error("Malformed match: {0}")]
    MalformedMatch(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Rule already registered: {0}")]
    DuplicateRule(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dangling edge: {0}")]
    DanglingEdge(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid edit script: {0}")]
    InvalidScript(String),

    #[error("Negative patterns nested {depth} deep, limit is {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store inconsistent: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
