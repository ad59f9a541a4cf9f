//! Edit scripts: what a rule does to a match.

use crate::model::{TypeId, TypeModel};
use crate::pattern::{Expr, PatternGraph, Slot};
use crate::{Error, Result};

/// Element to create. Edge endpoints may be match nodes or earlier creations.
#[derive(Debug, Clone, PartialEq)]
pub enum Creation {
    Node { name: String, ty: TypeId },
    Edge { name: String, ty: TypeId, source: Slot, target: Slot },
}

/// `target.key := value`, evaluated against the state before any update.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    pub target: Slot,
    pub key: String,
    pub value: Expr,
}

/// Matched element to delete, by pattern index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deletion {
    Node(usize),
    Edge(usize),
}

/// A validated edit script for one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct EditScript {
    creations: Vec<Creation>,
    updates: Vec<AttributeUpdate>,
    deletions: Vec<Deletion>,
    outputs: Vec<Slot>,
    /// Match slots read or written by the script, deduplicated.
    referenced: Vec<Slot>,
    node_count: usize,
    edge_count: usize,
}

impl EditScript {
    pub fn builder() -> EditScriptBuilder {
        EditScriptBuilder::default()
    }

    pub fn creations(&self) -> &[Creation] { &self.creations }
    pub fn updates(&self) -> &[AttributeUpdate] { &self.updates }
    pub fn deletions(&self) -> &[Deletion] { &self.deletions }
    pub fn outputs(&self) -> &[Slot] { &self.outputs }
    pub fn referenced(&self) -> &[Slot] { &self.referenced }

    /// Was this script built for a pattern of `pattern`'s size?
    pub(crate) fn check_shape(&self, pattern: &PatternGraph) -> Result<()> {
        if self.node_count != pattern.nodes().len() || self.edge_count != pattern.edges().len() {
            return Err(Error::InvalidScript(format!(
                "script built for {} nodes / {} edges, pattern '{}' has {} / {}",
                self.node_count,
                self.edge_count,
                pattern.name(),
                pattern.nodes().len(),
                pattern.edges().len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditScriptBuilder {
    creations: Vec<Creation>,
    updates: Vec<AttributeUpdate>,
    deletions: Vec<Deletion>,
    outputs: Vec<Slot>,
    new_nodes: usize,
    new_edges: usize,
}

impl EditScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node; returns the slot later steps refer to it by.
    pub fn create_node(&mut self, name: impl Into<String>, ty: TypeId) -> Slot {
        self.creations.push(Creation::Node { name: name.into(), ty });
        self.new_nodes += 1;
        Slot::NewNode(self.new_nodes - 1)
    }

    pub fn create_edge(&mut self, name: impl Into<String>, ty: TypeId, source: Slot, target: Slot) -> Slot {
        self.creations.push(Creation::Edge { name: name.into(), ty, source, target });
        self.new_edges += 1;
        Slot::NewEdge(self.new_edges - 1)
    }

    pub fn set_attribute(&mut self, target: Slot, key: impl Into<String>, value: Expr) -> &mut Self {
        self.updates.push(AttributeUpdate { target, key: key.into(), value });
        self
    }

    pub fn delete_node(&mut self, index: usize) -> &mut Self {
        self.deletions.push(Deletion::Node(index));
        self
    }

    pub fn delete_edge(&mut self, index: usize) -> &mut Self {
        self.deletions.push(Deletion::Edge(index));
        self
    }

    pub fn output(&mut self, slot: Slot) -> &mut Self {
        self.outputs.push(slot);
        self
    }

    /// Validate against the pattern it rewrites and the type model.
    pub fn build(self, pattern: &PatternGraph, model: &TypeModel) -> Result<EditScript> {
        let node_count = pattern.nodes().len();
        let edge_count = pattern.edges().len();
        let invalid = |msg: String| Error::InvalidScript(format!("{}: {msg}", pattern.name()));

        // Creations may only refer to elements created before them.
        let (mut made_nodes, mut made_edges) = (0, 0);
        let in_scope = |slot: Slot, made_nodes: usize, made_edges: usize| match slot {
            Slot::Node(i) => i < node_count,
            Slot::Edge(i) => i < edge_count,
            Slot::NewNode(i) => i < made_nodes,
            Slot::NewEdge(i) => i < made_edges,
        };
        for creation in &self.creations {
            match creation {
                Creation::Node { name, ty } => {
                    if !model.nodes.contains(*ty) {
                        return Err(Error::UnknownType(format!("{}: new node '{name}' has type {ty}", pattern.name())));
                    }
                    made_nodes += 1;
                }
                Creation::Edge { name, ty, source, target } => {
                    if !model.edges.contains(*ty) {
                        return Err(Error::UnknownType(format!("{}: new edge '{name}' has type {ty}", pattern.name())));
                    }
                    for end in [source, target] {
                        if !end.is_node() || !in_scope(*end, made_nodes, made_edges) {
                            return Err(invalid(format!("new edge '{name}' attaches to {end}")));
                        }
                    }
                    made_edges += 1;
                }
            }
        }

        let mut referenced: Vec<Slot> = Vec::new();
        let mut reference = |slot: Slot| {
            if !slot.is_created() && !referenced.contains(&slot) {
                referenced.push(slot);
            }
        };

        for creation in &self.creations {
            if let Creation::Edge { source, target, .. } = creation {
                reference(*source);
                reference(*target);
            }
        }
        for update in &self.updates {
            if !in_scope(update.target, made_nodes, made_edges) {
                return Err(invalid(format!("update writes {}", update.target)));
            }
            reference(update.target);
            for slot in update.value.slots() {
                if !in_scope(slot, made_nodes, made_edges) {
                    return Err(invalid(format!("update of {} reads {slot}", update.target)));
                }
                reference(slot);
            }
        }
        for deletion in &self.deletions {
            let slot = match *deletion {
                Deletion::Node(i) => Slot::Node(i),
                Deletion::Edge(i) => Slot::Edge(i),
            };
            if !in_scope(slot, 0, 0) {
                return Err(invalid(format!("deletes {slot}")));
            }
            reference(slot);
        }

        let deleted_node = |i: usize| self.deletions.contains(&Deletion::Node(i));
        for &slot in &self.outputs {
            if !in_scope(slot, made_nodes, made_edges) {
                return Err(invalid(format!("outputs {slot}")));
            }
            match slot {
                Slot::Node(i) if deleted_node(i) => {
                    return Err(invalid(format!("outputs deleted {slot}")));
                }
                Slot::Edge(i) => {
                    let pe = &pattern.edges()[i];
                    if self.deletions.contains(&Deletion::Edge(i))
                        || deleted_node(pe.source())
                        || deleted_node(pe.target())
                    {
                        return Err(invalid(format!("outputs deleted {slot}")));
                    }
                }
                Slot::NewEdge(k) => {
                    let mut ends = self.creations.iter().filter_map(|c| match c {
                        Creation::Edge { source, target, .. } => Some((*source, *target)),
                        Creation::Node { .. } => None,
                    });
                    if let Some((source, target)) = ends.nth(k) {
                        let doomed = |end: Slot| matches!(end, Slot::Node(i) if deleted_node(i));
                        if doomed(source) || doomed(target) {
                            return Err(invalid(format!("outputs {slot}, attached to a deleted node")));
                        }
                    }
                }
                _ => {}
            }
            reference(slot);
        }

        Ok(EditScript {
            creations: self.creations,
            updates: self.updates,
            deletions: self.deletions,
            outputs: self.outputs,
            referenced,
            node_count,
            edge_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TypeHierarchy, TypeId};
    use crate::pattern::PatternBuilder;

    fn setup() -> (TypeModel, PatternGraph, TypeId, TypeId) {
        let mut nodes = TypeHierarchy::builder("Node");
        let a = nodes.add_type("A", &[TypeId::ROOT]).unwrap();
        let mut edges = TypeHierarchy::builder("Edge");
        let r = edges.add_type("r", &[TypeId::ROOT]).unwrap();
        let model = TypeModel::new(nodes.build(), edges.build());
        let mut p = PatternBuilder::new("p");
        let x = p.node("x", a.into());
        let y = p.node("y", a.into());
        p.edge("xy", r.into(), x, y);
        let pattern = p.build(&model).unwrap();
        (model, pattern, a, r)
    }

    #[test]
    fn test_referenced_slots_are_deduplicated_match_slots() {
        let (model, pattern, a, r) = setup();
        let mut s = EditScript::builder();
        let n = s.create_node("n", a);
        s.create_edge("e", r, Slot::Node(0), n);
        s.set_attribute(Slot::Node(0), "k", Expr::attr(Slot::Node(1), "k"));
        s.output(Slot::Node(1));
        let script = s.build(&pattern, &model).unwrap();
        assert_eq!(script.referenced(), &[Slot::Node(0), Slot::Node(1)]);
        assert_eq!(script.creations().len(), 2);
    }

    #[test]
    fn test_rejects_forward_and_out_of_range_references() {
        let (model, pattern, a, r) = setup();
        let mut s = EditScript::builder();
        s.create_edge("e", r, Slot::Node(0), Slot::NewNode(0));
        s.create_node("n", a);
        assert!(matches!(s.build(&pattern, &model), Err(Error::InvalidScript(_))));

        let mut s = EditScript::builder();
        s.delete_node(5);
        assert!(matches!(s.build(&pattern, &model), Err(Error::InvalidScript(_))));

        let mut s = EditScript::builder();
        s.create_node("n", TypeId(99));
        assert!(matches!(s.build(&pattern, &model), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_rejects_outputs_that_get_deleted() {
        let (model, pattern, _, _) = setup();
        let mut s = EditScript::builder();
        s.delete_node(0).output(Slot::Edge(0));
        assert!(matches!(s.build(&pattern, &model), Err(Error::InvalidScript(_))));

        let mut s = EditScript::builder();
        s.delete_edge(0).output(Slot::Node(0));
        assert!(s.build(&pattern, &model).is_ok());
    }

    #[test]
    fn test_rejects_new_edge_output_on_deleted_node() {
        let (model, pattern, a, r) = setup();
        let mut s = EditScript::builder();
        let n = s.create_node("n", a);
        let e = s.create_edge("e", r, Slot::Node(0), n);
        s.delete_node(0).output(e);
        assert!(matches!(s.build(&pattern, &model), Err(Error::InvalidScript(_))));

        // the same edge survives when only the other match node goes
        let mut s = EditScript::builder();
        let n = s.create_node("n", a);
        let e = s.create_edge("e", r, Slot::Node(0), n);
        s.delete_node(1).output(e);
        assert!(s.build(&pattern, &model).is_ok());
    }
}
