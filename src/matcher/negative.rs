//! Negative application conditions.
//!
//! A NAC is searched with the same engine one depth below its parent.
//! Everything in use at the parent's depth is marked foreign at the NAC's
//! depth, except what the NAC's shared elements bind; those arrive as
//! presets. The NAC step runs after the parent's last binding step, so the
//! foreign marks cover the whole parent match.
//! The search stops at the first completion.

use smallvec::SmallVec;

use crate::model::Element;
use crate::pattern::Bindings;
use crate::Result;
use super::{Flow, Frame, Search};

impl Search<'_> {
    /// Does negative pattern `index` of the frame's pattern have a
    /// completion under the frame's current binding?
    pub(super) fn negative_exists(&mut self, frame: &Frame<'_>, index: usize) -> Result<bool> {
        let nac = &frame.pattern.negatives()[index];
        let depth = frame.depth + 1;

        let presets: SmallVec<[Option<Element>; 4]> = nac
            .bindings()
            .iter()
            .map(|slot| frame.binding.resolve(*slot))
            .collect();
        self.marks.inherit(frame.depth, depth, nac.bindings());
        let mut inner = Frame::new(nac.pattern(), depth, &presets);
        let flow = self.descend(&mut inner, 0);
        self.marks.release(depth);

        Ok(flow? == Flow::Stop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::matcher::Matcher;
    use crate::model::{NodeId, TypeHierarchy, TypeId, TypeModel};
    use crate::pattern::{PatternBuilder, Slot};
    use crate::storage::MemoryGraph;

    fn model() -> (Arc<TypeModel>, TypeId, TypeId) {
        let mut nodes = TypeHierarchy::builder("Node");
        let a = nodes.add_type("A", &[TypeId::ROOT]).unwrap();
        let mut edges = TypeHierarchy::builder("Edge");
        let r = edges.add_type("r", &[TypeId::ROOT]).unwrap();
        (Arc::new(TypeModel::new(nodes.build(), edges.build())), a, r)
    }

    /// Nodes `x` with no incoming `r` edge.
    fn sources_only(model: &TypeModel, a: TypeId, r: TypeId) -> Matcher {
        let mut p = PatternBuilder::new("source");
        let x = p.node("x", a.into());
        let mut neg = p.negative("hasPred");
        let nx = neg.shared_node("x", x);
        let pred = neg.node("pred", a.into());
        neg.edge("in", r.into(), pred, nx);
        p.add_negative(neg);
        Matcher::new(Arc::new(p.build(model).unwrap()), false)
    }

    #[test]
    fn test_negative_vetoes_matches() {
        let (model, a, r) = model();
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let n: Vec<NodeId> = (0..3).map(|_| g.create_node(a).unwrap()).collect();
        g.create_edge(r, n[0], n[1]).unwrap();
        g.create_edge(r, n[1], n[2]).unwrap();
        let mut m = sources_only(&model, a, r);
        let found = m.find_matches(&mut g, &[], -1).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node(0), Some(n[0]));
    }

    #[test]
    fn test_negative_cannot_reuse_enclosing_elements() {
        // pattern: x -r-> y ; NAC: some z -r-> x, z distinct from y
        let (model, a, r) = model();
        let mut p = PatternBuilder::new("p");
        let x = p.node("x", a.into());
        let y = p.node("y", a.into());
        p.edge("xy", r.into(), x, y);
        let mut neg = p.negative("n");
        let nx = neg.shared_node("x", x);
        let z = neg.node("z", a.into());
        neg.edge("zx", r.into(), z, nx);
        p.add_negative(neg);
        let mut m = Matcher::new(Arc::new(p.build(&model).unwrap()), false);

        // two-cycle: the only predecessor of x is y, which the positive match uses
        let mut g = MemoryGraph::new(Arc::clone(&model));
        let u = g.create_node(a).unwrap();
        let v = g.create_node(a).unwrap();
        g.create_edge(r, u, v).unwrap();
        g.create_edge(r, v, u).unwrap();
        assert_eq!(m.find_matches(&mut g, &[], -1).unwrap().len(), 2);

        // a third node feeding u vetoes the match with x = u
        let w = g.create_node(a).unwrap();
        g.create_edge(r, w, u).unwrap();
        let found = m.find_matches(&mut g, &[], -1).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node(0), Some(v));
    }

    #[test]
    fn test_nested_negative() {
        // x with no predecessor that itself has no predecessor
        let (model, a, r) = model();
        let mut p = PatternBuilder::new("p");
        let x = p.node("x", a.into());
        p.input(Slot::Node(x));
        let mut neg = p.negative("rootPred");
        let nx = neg.shared_node("x", x);
        let pred = neg.node("pred", a.into());
        neg.edge("in", r.into(), pred, nx);
        let mut inner = neg.negative("predHasPred");
        let ip = inner.shared_node("pred", pred);
        let pp = inner.node("pp", a.into());
        inner.edge("in", r.into(), pp, ip);
        neg.add_negative(inner);
        p.add_negative(neg);
        let pattern = p.build(&model).unwrap();
        assert_eq!(pattern.nesting_depth(), 2);
        let mut m = Matcher::new(Arc::new(pattern), false);

        let mut g = MemoryGraph::new(Arc::clone(&model));
        let n: Vec<NodeId> = (0..3).map(|_| g.create_node(a).unwrap()).collect();
        g.create_edge(r, n[0], n[1]).unwrap();
        g.create_edge(r, n[1], n[2]).unwrap();
        let at = |g: &mut MemoryGraph, m: &mut Matcher, node: NodeId| {
            m.find_matches(g, &[Some(node.into())], -1).unwrap().len()
        };
        // n0: no predecessor at all
        assert_eq!(at(&mut g, &mut m, n[0]), 1);
        // n1: predecessor n0 has no predecessor, so the NAC holds
        assert_eq!(at(&mut g, &mut m, n[1]), 0);
        // n2: predecessor n1 has predecessor n0, the inner NAC vetoes the outer one
        assert_eq!(at(&mut g, &mut m, n[2]), 1);
    }
}
