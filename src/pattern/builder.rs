//! Incremental construction of pattern graphs.

use crate::model::TypeModel;
use crate::{Error, Result};
use super::plan::{self, SearchOp, Shape};
use super::{
    Condition, Expr, Homomorphy, NegativePattern, PatternEdge, PatternGraph, PatternNode,
    ResolvedTypes, Role, Slot, TypeConstraint,
};

#[derive(Debug, Clone)]
struct NodeDecl {
    name: String,
    constraint: TypeConstraint,
}

#[derive(Debug, Clone)]
struct EdgeDecl {
    name: String,
    constraint: TypeConstraint,
    source: usize,
    target: usize,
}

/// Builder for a [`PatternGraph`] or for one of its negative patterns.
///
/// ```rust
/// use rulegraph::model::TypeModel;
/// use rulegraph::pattern::{PatternGraph, Slot, TypeConstraint};
///
/// let model = TypeModel::untyped();
/// let mut p = PatternGraph::builder("selfLoop");
/// let a = p.node("a", TypeConstraint::any());
/// p.edge("loop", TypeConstraint::any(), a, a);
/// p.input(Slot::Node(a));
/// let pattern = p.build(&model).unwrap();
/// assert_eq!(pattern.plan().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    name: String,
    nodes: Vec<NodeDecl>,
    edges: Vec<EdgeDecl>,
    node_pairs: Vec<(usize, usize)>,
    edge_pairs: Vec<(usize, usize)>,
    conditions: Vec<Expr>,
    negatives: Vec<PatternBuilder>,
    inputs: Vec<Slot>,
    /// Only set on negative builders: enclosing slot per input.
    shared: Vec<Slot>,
    plan: Option<Vec<SearchOp>>,
}

impl PatternBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            node_pairs: Vec::new(),
            edge_pairs: Vec::new(),
            conditions: Vec::new(),
            negatives: Vec::new(),
            inputs: Vec::new(),
            shared: Vec::new(),
            plan: None,
        }
    }

    /// Add a pattern node; returns its index.
    pub fn node(&mut self, name: impl Into<String>, constraint: TypeConstraint) -> usize {
        self.nodes.push(NodeDecl { name: name.into(), constraint });
        self.nodes.len() - 1
    }

    /// Add a pattern edge `source -> target`; returns its index.
    pub fn edge(
        &mut self,
        name: impl Into<String>,
        constraint: TypeConstraint,
        source: usize,
        target: usize,
    ) -> usize {
        self.edges.push(EdgeDecl { name: name.into(), constraint, source, target });
        self.edges.len() - 1
    }

    /// Declare the next input position.
    pub fn input(&mut self, slot: Slot) -> &mut Self {
        self.inputs.push(slot);
        self
    }

    /// Allow nodes `a` and `b` to bind the same host node.
    pub fn homomorphic_nodes(&mut self, a: usize, b: usize) -> &mut Self {
        self.node_pairs.push((a, b));
        self
    }

    /// Allow edges `a` and `b` to bind the same host edge.
    pub fn homomorphic_edges(&mut self, a: usize, b: usize) -> &mut Self {
        self.edge_pairs.push((a, b));
        self
    }

    pub fn condition(&mut self, expr: Expr) -> &mut Self {
        self.conditions.push(expr);
        self
    }

    /// Use a ready-made search plan instead of deriving one.
    pub fn plan(&mut self, ops: Vec<SearchOp>) -> &mut Self {
        self.plan = Some(ops);
        self
    }

    /// Start a negative pattern nested in this one. Attach it with
    /// [`add_negative`](Self::add_negative) once its elements are declared.
    pub fn negative(&self, name: impl Into<String>) -> PatternBuilder {
        PatternBuilder::new(name)
    }

    /// Inside a negative pattern: a node standing for enclosing node
    /// `parent`. Returns its local index; it becomes the next input.
    pub fn shared_node(&mut self, name: impl Into<String>, parent: usize) -> usize {
        let local = self.node(name, TypeConstraint::any());
        self.inputs.push(Slot::Node(local));
        self.shared.push(Slot::Node(parent));
        local
    }

    /// Inside a negative pattern: an edge standing for enclosing edge
    /// `parent`, between the given local nodes.
    pub fn shared_edge(
        &mut self,
        name: impl Into<String>,
        parent: usize,
        source: usize,
        target: usize,
    ) -> usize {
        let local = self.edge(name, TypeConstraint::any(), source, target);
        self.inputs.push(Slot::Edge(local));
        self.shared.push(Slot::Edge(parent));
        local
    }

    pub fn add_negative(&mut self, negative: PatternBuilder) -> &mut Self {
        self.negatives.push(negative);
        self
    }

    /// Validate against `model` and freeze.
    pub fn build(self, model: &TypeModel) -> Result<PatternGraph> {
        if !self.shared.is_empty() {
            return Err(self.invalid("shared elements outside a negative pattern"));
        }
        self.build_inner(model)
    }

    fn invalid(&self, msg: impl std::fmt::Display) -> Error {
        Error::InvalidPattern(format!("{}: {msg}", self.name))
    }

    fn build_inner(self, model: &TypeModel) -> Result<PatternGraph> {
        let node_count = self.nodes.len();
        let edge_count = self.edges.len();

        check_unique(self.nodes.iter().map(|n| n.name.as_str()))
            .map_err(|n| self.invalid(format!("duplicate node name '{n}'")))?;
        check_unique(self.edges.iter().map(|e| e.name.as_str()))
            .map_err(|n| self.invalid(format!("duplicate edge name '{n}'")))?;

        let in_range = |slot: &Slot| match *slot {
            Slot::Node(i) => i < node_count,
            Slot::Edge(i) => i < edge_count,
            Slot::NewNode(_) | Slot::NewEdge(_) => false,
        };

        for (k, slot) in self.inputs.iter().enumerate() {
            if !in_range(slot) {
                return Err(self.invalid(format!("input {k} ({slot}) is not a pattern element")));
            }
            if self.inputs[..k].contains(slot) {
                return Err(self.invalid(format!("{slot} declared as input twice")));
            }
        }
        let role_of = |slot: Slot| {
            self.inputs
                .iter()
                .position(|s| *s == slot)
                .map_or(Role::Local, Role::Input)
        };

        let mut nodes = Vec::with_capacity(node_count);
        for (i, decl) in self.nodes.iter().enumerate() {
            let types = ResolvedTypes::resolve(&decl.constraint, &model.nodes).ok_or_else(|| {
                Error::UnknownType(format!("{}: node '{}' constraint {:?}", self.name, decl.name, decl.constraint))
            })?;
            nodes.push(PatternNode {
                name: decl.name.clone(),
                constraint: decl.constraint.clone(),
                role: role_of(Slot::Node(i)),
                types,
            });
        }

        let mut edges = Vec::with_capacity(edge_count);
        for (i, decl) in self.edges.iter().enumerate() {
            if decl.source >= node_count || decl.target >= node_count {
                return Err(self.invalid(format!("edge '{}' connects unknown nodes", decl.name)));
            }
            let types = ResolvedTypes::resolve(&decl.constraint, &model.edges).ok_or_else(|| {
                Error::UnknownType(format!("{}: edge '{}' constraint {:?}", self.name, decl.name, decl.constraint))
            })?;
            edges.push(PatternEdge {
                name: decl.name.clone(),
                constraint: decl.constraint.clone(),
                source: decl.source,
                target: decl.target,
                role: role_of(Slot::Edge(i)),
                types,
            });
        }

        let mut node_hom = Homomorphy::identity(node_count);
        for &(a, b) in &self.node_pairs {
            if a >= node_count || b >= node_count {
                return Err(self.invalid(format!("homomorphic nodes ({a}, {b}) out of range")));
            }
            node_hom.permit(a, b);
        }
        let mut edge_hom = Homomorphy::identity(edge_count);
        for &(a, b) in &self.edge_pairs {
            if a >= edge_count || b >= edge_count {
                return Err(self.invalid(format!("homomorphic edges ({a}, {b}) out of range")));
            }
            edge_hom.permit(a, b);
        }

        let mut conditions = Vec::with_capacity(self.conditions.len());
        for expr in &self.conditions {
            let needs = expr.slots();
            if let Some(bad) = needs.iter().find(|s| !in_range(s)) {
                return Err(self.invalid(format!("condition reads {bad}")));
            }
            conditions.push(Condition { expr: expr.clone(), needs });
        }

        let edge_ends: Vec<(usize, usize)> = edges.iter().map(|e| (e.source, e.target)).collect();
        let condition_needs: Vec<Vec<Slot>> = conditions.iter().map(|c| c.needs.clone()).collect();
        let negative_needs: Vec<Vec<Slot>> = self.negatives.iter().map(|n| n.shared.clone()).collect();
        for (i, needs) in negative_needs.iter().enumerate() {
            if let Some(bad) = needs.iter().find(|s| !in_range(s)) {
                return Err(self.invalid(format!("negative pattern {i} shares {bad}")));
            }
        }

        let shape = Shape {
            node_count,
            edges: &edge_ends,
            inputs: &self.inputs,
            condition_needs: &condition_needs,
            negative_needs: &negative_needs,
        };
        let plan = match &self.plan {
            Some(ops) => plan::normalize(&shape, ops.clone()).map_err(|msg| self.invalid(msg))?,
            None => plan::derive(&shape),
        };

        let name = self.name;
        let inputs = self.inputs;
        let mut negatives = Vec::with_capacity(self.negatives.len());
        for child in self.negatives {
            let bindings = child.shared.clone();
            negatives.push(NegativePattern { pattern: child.build_inner(model)?, bindings });
        }

        Ok(PatternGraph {
            name,
            nodes,
            edges,
            node_hom,
            edge_hom,
            conditions,
            negatives,
            inputs,
            plan,
        })
    }
}

/// First name that occurs twice, ignoring empty names.
fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> std::result::Result<(), String> {
    let mut seen = hashbrown::HashSet::new();
    for n in names.filter(|n| !n.is_empty()) {
        if !seen.insert(n) {
            return Err(n.to_owned());
        }
    }
    Ok(())
}
