//! # Pattern Model
//!
//! Immutable description of what a rule searches for:
//!
//! - pattern nodes and directed pattern edges with type constraints,
//! - node and edge homomorphism matrices (which elements may coincide),
//! - attribute conditions over bound elements,
//! - nested negative patterns (NACs) sharing some elements with their parent,
//! - the declared inputs and the fixed search plan.
//!
//! Patterns are assembled with [`PatternBuilder`] and checked against a
//! [`TypeModel`](crate::model::TypeModel) when built. After that nothing in
//! them changes.

pub mod expr;
pub mod plan;
mod builder;

use crate::model::{TypeHierarchy, TypeId};

pub use builder::PatternBuilder;
pub use expr::{BinaryOp, Bindings, Expr, Slot, UnaryOp};
pub use plan::{End, SearchOp, SearchPlan};

// ============================================================================
// Element descriptions
// ============================================================================

/// How a pattern element gets bound and whether the caller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Supplied by the caller at this input position.
    Input(usize),
    /// Matched by the search and returned as a rule output.
    Output,
    /// Matched by the search and discarded after the rewrite.
    Local,
}

/// Which host types a pattern element accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeConstraint {
    /// Exactly this type.
    Exact(TypeId),
    /// This type or any of its subtypes.
    Subtypes(TypeId),
    /// Any of the listed types, each exactly.
    OneOf(Vec<TypeId>),
}

impl TypeConstraint {
    /// Matches every element.
    pub fn any() -> Self {
        TypeConstraint::Subtypes(TypeId::ROOT)
    }

    pub(crate) fn describe(&self, types: &TypeHierarchy) -> String {
        match self {
            TypeConstraint::Exact(t) => types.describe(*t),
            TypeConstraint::Subtypes(t) => format!("{}+", types.describe(*t)),
            TypeConstraint::OneOf(ts) => {
                let names: Vec<String> = ts.iter().map(|t| types.describe(*t)).collect();
                format!("one of [{}]", names.join(", "))
            }
        }
    }
}

impl From<TypeId> for TypeConstraint {
    fn from(ty: TypeId) -> Self {
        TypeConstraint::Exact(ty)
    }
}

/// A constraint resolved against a hierarchy: an O(1) membership table plus
/// the exact type lists a lookup has to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedTypes {
    allowed: Vec<bool>,
    scan: Vec<TypeId>,
}

impl ResolvedTypes {
    pub(crate) fn resolve(constraint: &TypeConstraint, types: &TypeHierarchy) -> Option<Self> {
        let mut allowed = vec![false; types.len()];
        match constraint {
            TypeConstraint::Exact(t) => *allowed.get_mut(t.index())? = true,
            TypeConstraint::Subtypes(t) => {
                if !types.contains(*t) {
                    return None;
                }
                for sub in types.subtypes_of(*t) {
                    allowed[sub.index()] = true;
                }
            }
            TypeConstraint::OneOf(ts) => {
                for t in ts {
                    *allowed.get_mut(t.index())? = true;
                }
            }
        }
        let scan = types.types().filter(|t| allowed[t.index()]).collect();
        Some(Self { allowed, scan })
    }

    pub(crate) fn accepts(&self, ty: TypeId) -> bool {
        self.allowed.get(ty.index()).copied().unwrap_or(false)
    }

    pub(crate) fn scan(&self) -> &[TypeId] {
        &self.scan
    }
}

#[derive(Debug, Clone)]
pub struct PatternNode {
    pub(crate) name: String,
    pub(crate) constraint: TypeConstraint,
    pub(crate) role: Role,
    pub(crate) types: ResolvedTypes,
}

impl PatternNode {
    pub fn name(&self) -> &str { &self.name }
    pub fn constraint(&self) -> &TypeConstraint { &self.constraint }
    pub fn role(&self) -> Role { self.role }

    pub fn accepts(&self, ty: TypeId) -> bool {
        self.types.accepts(ty)
    }
}

#[derive(Debug, Clone)]
pub struct PatternEdge {
    pub(crate) name: String,
    pub(crate) constraint: TypeConstraint,
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) role: Role,
    pub(crate) types: ResolvedTypes,
}

impl PatternEdge {
    pub fn name(&self) -> &str { &self.name }
    pub fn constraint(&self) -> &TypeConstraint { &self.constraint }
    pub fn role(&self) -> Role { self.role }
    /// Pattern node index of the source.
    pub fn source(&self) -> usize { self.source }
    /// Pattern node index of the target.
    pub fn target(&self) -> usize { self.target }

    pub fn accepts(&self, ty: TypeId) -> bool {
        self.types.accepts(ty)
    }
}

// ============================================================================
// Homomorphism matrix
// ============================================================================

/// Symmetric boolean table: `allows(i, j)` means pattern elements i and j
/// may bind to the same host element. The diagonal is always true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Homomorphy {
    size: usize,
    cells: Vec<bool>,
}

impl Homomorphy {
    /// Strictly injective: only the diagonal is set.
    pub fn identity(size: usize) -> Self {
        let mut cells = vec![false; size * size];
        for i in 0..size {
            cells[i * size + i] = true;
        }
        Self { size, cells }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allows(&self, i: usize, j: usize) -> bool {
        i == j || (i < self.size && j < self.size && self.cells[i * self.size + j])
    }

    pub(crate) fn permit(&mut self, i: usize, j: usize) {
        self.cells[i * self.size + j] = true;
        self.cells[j * self.size + i] = true;
    }
}

// ============================================================================
// Conditions and negative patterns
// ============================================================================

/// A boolean attribute condition and the pattern slots it reads.
#[derive(Debug, Clone)]
pub struct Condition {
    pub(crate) expr: Expr,
    pub(crate) needs: Vec<Slot>,
}

impl Condition {
    pub fn expr(&self) -> &Expr { &self.expr }
    pub fn needs(&self) -> &[Slot] { &self.needs }
}

/// A forbidden sub-pattern. Its inputs are bound from the enclosing pattern:
/// `bindings[k]` is the enclosing slot feeding the NAC's input `k`.
#[derive(Debug, Clone)]
pub struct NegativePattern {
    pub(crate) pattern: PatternGraph,
    pub(crate) bindings: Vec<Slot>,
}

impl NegativePattern {
    pub fn pattern(&self) -> &PatternGraph { &self.pattern }
    pub fn bindings(&self) -> &[Slot] { &self.bindings }
}

// ============================================================================
// PatternGraph
// ============================================================================

/// A complete, validated pattern.
#[derive(Debug, Clone)]
pub struct PatternGraph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<PatternNode>,
    pub(crate) edges: Vec<PatternEdge>,
    pub(crate) node_hom: Homomorphy,
    pub(crate) edge_hom: Homomorphy,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) negatives: Vec<NegativePattern>,
    pub(crate) inputs: Vec<Slot>,
    pub(crate) plan: SearchPlan,
}

impl PatternGraph {
    pub fn builder(name: impl Into<String>) -> PatternBuilder {
        PatternBuilder::new(name)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn nodes(&self) -> &[PatternNode] { &self.nodes }
    pub fn edges(&self) -> &[PatternEdge] { &self.edges }
    pub fn node_homomorphy(&self) -> &Homomorphy { &self.node_hom }
    pub fn edge_homomorphy(&self) -> &Homomorphy { &self.edge_hom }
    pub fn conditions(&self) -> &[Condition] { &self.conditions }
    pub fn negatives(&self) -> &[NegativePattern] { &self.negatives }
    pub fn inputs(&self) -> &[Slot] { &self.inputs }
    pub fn plan(&self) -> &SearchPlan { &self.plan }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn edge_index(&self, name: &str) -> Option<usize> {
        self.edges.iter().position(|e| e.name == name)
    }

    pub fn input_position(&self, slot: Slot) -> Option<usize> {
        self.inputs.iter().position(|s| *s == slot)
    }

    /// Levels of negative patterns below this one (0 without NACs).
    pub fn nesting_depth(&self) -> usize {
        self.negatives
            .iter()
            .map(|n| n.pattern.nesting_depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Mark non-input pattern elements listed in `outputs` as outputs.
    pub(crate) fn mark_outputs(&mut self, outputs: &[Slot]) {
        for slot in outputs {
            match *slot {
                Slot::Node(i) => {
                    if let Some(n) = self.nodes.get_mut(i)
                        && n.role == Role::Local
                    {
                        n.role = Role::Output;
                    }
                }
                Slot::Edge(i) => {
                    if let Some(e) = self.edges.get_mut(i)
                        && e.role == Role::Local
                    {
                        e.role = Role::Output;
                    }
                }
                Slot::NewNode(_) | Slot::NewEdge(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeHierarchy;

    #[test]
    fn test_homomorphy_identity_and_permit() {
        let mut h = Homomorphy::identity(3);
        assert!(h.allows(1, 1));
        assert!(!h.allows(0, 2));
        h.permit(0, 2);
        assert!(h.allows(2, 0));
        assert!(!h.allows(0, 1));
    }

    #[test]
    fn test_resolved_types() {
        let mut b = TypeHierarchy::builder("Node");
        let a = b.add_type("A", &[TypeId::ROOT]).unwrap();
        let sub = b.add_type("SubA", &[a]).unwrap();
        let other = b.add_type("B", &[TypeId::ROOT]).unwrap();
        let h = b.build();

        let exact = ResolvedTypes::resolve(&TypeConstraint::Exact(a), &h).unwrap();
        assert!(exact.accepts(a) && !exact.accepts(sub));
        assert_eq!(exact.scan(), &[a]);

        let subs = ResolvedTypes::resolve(&TypeConstraint::Subtypes(a), &h).unwrap();
        assert!(subs.accepts(sub) && !subs.accepts(other));
        assert_eq!(subs.scan(), &[a, sub]);

        let one_of = ResolvedTypes::resolve(&TypeConstraint::OneOf(vec![other, a]), &h).unwrap();
        assert_eq!(one_of.scan(), &[a, other]);

        assert!(ResolvedTypes::resolve(&TypeConstraint::Exact(TypeId(40)), &h).is_none());
    }
}
