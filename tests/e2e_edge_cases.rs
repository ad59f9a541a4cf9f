//! End-to-end tests for edge cases.
//!
//! Stale handles, deleted elements, empty patterns, self-loops, negative
//! patterns with their own conditions, shared edges, configuration parsing
//! and registration errors.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rulegraph::{
    EditScript, Element, Engine, EngineConfig, Error, Expr, MemoryGraph, Matcher, NodeId,
    PatternBuilder, Slot, TypeConstraint, TypeHierarchy, TypeId, TypeModel, Value,
};

// ============================================================================
// Helper: Item > Box, edge `in`
// ============================================================================

struct Store {
    model: Arc<TypeModel>,
    item: TypeId,
    bx: TypeId,
    inside: TypeId,
}

fn store() -> Store {
    let mut nodes = TypeHierarchy::builder("Node");
    let item = nodes.add_type("Item", &[TypeId::ROOT]).unwrap();
    nodes.default_attribute(item, "weight", 1).unwrap();
    let bx = nodes.add_type("Box", &[item]).unwrap();
    nodes.default_attribute(bx, "open", false).unwrap();
    let mut edges = TypeHierarchy::builder("Edge");
    let inside = edges.add_type("in", &[TypeId::ROOT]).unwrap();
    Store { model: Arc::new(TypeModel::new(nodes.build(), edges.build())), item, bx, inside }
}

// ============================================================================
// 1. Store: stale handles and deleted elements
// ============================================================================

#[test]
fn test_operations_on_deleted_elements() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let a = g.create_node(s.item).unwrap();
    let b = g.create_node(s.item).unwrap();
    let e = g.create_edge(s.inside, a, b).unwrap();
    g.delete_edge(e).unwrap();

    assert!(matches!(g.delete_edge(e), Err(Error::NotFound(_))));
    assert!(matches!(g.get_attribute(e, "x"), Err(Error::NotFound(_))));
    g.delete_node(a).unwrap();
    assert!(matches!(g.set_attribute(a, "weight", 3), Err(Error::NotFound(_))));
    assert!(matches!(g.create_edge(s.inside, a, b), Err(Error::NotFound(_))));

    // the freed slot is reused under a new generation
    let c = g.create_node(s.item).unwrap();
    assert_eq!(c.slot, a.slot);
    assert_ne!(c, a);
    assert!(!g.contains_node(a));
    assert!(g.contains_node(c));
    g.check_consistency().unwrap();
}

#[test]
fn test_delete_isolated_node_refuses_connected_nodes() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let a = g.create_node(s.item).unwrap();
    let b = g.create_node(s.bx).unwrap();
    let e = g.create_edge(s.inside, a, b).unwrap();
    assert!(matches!(g.delete_isolated_node(b), Err(Error::DanglingEdge(_))));
    g.delete_edge(e).unwrap();
    g.delete_isolated_node(b).unwrap();
    assert_eq!(g.node_count(), 1);
}

#[test]
fn test_defaults_are_inherited_and_copied() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let b1 = g.create_node(s.bx).unwrap();
    let b2 = g.create_node(s.bx).unwrap();
    g.set_attribute(b1, "weight", 5).unwrap();
    assert_eq!(g.get_attribute(b1, "weight").unwrap(), Some(&Value::Int(5)));
    assert_eq!(g.get_attribute(b2, "weight").unwrap(), Some(&Value::Int(1)));
    assert_eq!(g.get_attribute(b2, "open").unwrap(), Some(&Value::Bool(false)));
    assert!(matches!(g.create_node(TypeId(9)), Err(Error::UnknownType(_))));
}

// ============================================================================
// 2. Degenerate patterns
// ============================================================================

#[test]
fn test_empty_pattern_matches_once() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let pattern = PatternBuilder::new("nothing").build(&s.model).unwrap();
    assert!(pattern.plan().is_empty());
    let mut m = Matcher::new(Arc::new(pattern), true);
    assert_eq!(m.find_matches(&mut g, &[], -1).unwrap().len(), 1);
}

#[test]
fn test_self_loop_pattern() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let a = g.create_node(s.item).unwrap();
    let b = g.create_node(s.item).unwrap();
    g.create_edge(s.inside, a, b).unwrap();
    let l = g.create_edge(s.inside, b, b).unwrap();

    let mut p = PatternBuilder::new("loop");
    let x = p.node("x", TypeConstraint::Subtypes(s.item));
    p.edge("l", s.inside.into(), x, x);
    let mut m = Matcher::new(Arc::new(p.build(&s.model).unwrap()), false);
    let found = m.find_matches(&mut g, &[], -1).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].node(0), found[0].edge(0)), (Some(b), Some(l)));
}

#[test]
fn test_pattern_builder_errors() {
    let s = store();
    let mut p = PatternBuilder::new("dup");
    p.node("x", s.item.into());
    p.node("x", s.item.into());
    assert!(matches!(p.build(&s.model), Err(Error::InvalidPattern(_))));

    let mut p = PatternBuilder::new("sharedAtTop");
    p.shared_node("x", 0);
    assert!(matches!(p.build(&s.model), Err(Error::InvalidPattern(_))));

    let mut p = PatternBuilder::new("badCondition");
    p.node("x", s.item.into());
    p.condition(Expr::attr_eq(Slot::Node(3), "weight", 1));
    assert!(matches!(p.build(&s.model), Err(Error::InvalidPattern(_))));

    let mut p = PatternBuilder::new("badInput");
    p.input(Slot::Node(0));
    assert!(matches!(p.build(&s.model), Err(Error::InvalidPattern(_))));
}

// ============================================================================
// 3. Negative patterns
// ============================================================================

/// Items not inside any open box.
fn loose_items(s: &Store) -> Matcher {
    let mut p = PatternBuilder::new("loose");
    let x = p.node("x", TypeConstraint::Exact(s.item));
    let mut neg = p.negative("inOpenBox");
    let nx = neg.shared_node("x", x);
    let b = neg.node("b", s.bx.into());
    neg.edge("in", s.inside.into(), nx, b);
    neg.condition(Expr::attr_eq(Slot::Node(b), "open", true));
    p.add_negative(neg);
    Matcher::new(Arc::new(p.build(&s.model).unwrap()), false)
}

#[test]
fn test_negative_with_condition() {
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let free = g.create_node(s.item).unwrap();
    let in_closed = g.create_node(s.item).unwrap();
    let in_open = g.create_node(s.item).unwrap();
    let closed = g.create_node(s.bx).unwrap();
    let open = g.create_node(s.bx).unwrap();
    g.set_attribute(open, "open", true).unwrap();
    g.create_edge(s.inside, in_closed, closed).unwrap();
    g.create_edge(s.inside, in_open, open).unwrap();

    let mut m = loose_items(&s);
    let found: Vec<NodeId> = m.find_matches(&mut g, &[], -1).unwrap().iter().filter_map(|m| m.node(0)).collect();
    assert_eq!(found, vec![free, in_closed]);

    // closing the box lifts the veto
    g.set_attribute(open, "open", false).unwrap();
    assert_eq!(m.find_matches(&mut g, &[], -1).unwrap().len(), 3);
}

#[test]
fn test_negative_sharing_an_edge() {
    // x -e-> y, unless another `in` edge runs parallel to e
    let s = store();
    let mut g = MemoryGraph::new(Arc::clone(&s.model));
    let a = g.create_node(s.item).unwrap();
    let b = g.create_node(s.bx).unwrap();
    let c = g.create_node(s.bx).unwrap();
    g.create_edge(s.inside, a, b).unwrap();
    g.create_edge(s.inside, a, b).unwrap();
    let single = g.create_edge(s.inside, a, c).unwrap();

    let mut p = PatternBuilder::new("unique");
    let x = p.node("x", s.item.into());
    let y = p.node("y", s.bx.into());
    let e = p.edge("e", s.inside.into(), x, y);
    let mut neg = p.negative("parallel");
    let nx = neg.shared_node("x", x);
    let ny = neg.shared_node("y", y);
    neg.shared_edge("e", e, nx, ny);
    neg.edge("other", s.inside.into(), nx, ny);
    p.add_negative(neg);
    let mut m = Matcher::new(Arc::new(p.build(&s.model).unwrap()), false);

    let found = m.find_matches(&mut g, &[], -1).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].edge(0), Some(single));
}

// ============================================================================
// 4. Engine configuration and registration
// ============================================================================

#[test]
fn test_engine_config_json() {
    let config = EngineConfig::from_json(r#"{ "locality": false, "max_repeat": 3 }"#).unwrap();
    assert!(!config.locality);
    assert_eq!(config.max_repeat, 3);
    assert_eq!(config.max_negative_depth, EngineConfig::default().max_negative_depth);
    assert!(matches!(EngineConfig::from_json("[]"), Err(Error::Config(_))));
}

#[test]
fn test_engine_registration_errors() {
    let s = store();
    let mut engine = Engine::new(Arc::clone(&s.model));
    let make = || {
        let mut p = PatternBuilder::new("grab");
        p.node("x", s.item.into());
        let pattern = p.build(&s.model).unwrap();
        let script = EditScript::builder().build(&pattern, &s.model).unwrap();
        (pattern, script)
    };
    let (p, sc) = make();
    engine.register_rule("grab", p, sc).unwrap();
    let (p, sc) = make();
    assert!(matches!(engine.register_rule("grab", p, sc), Err(Error::DuplicateRule(_))));
    assert!(matches!(engine.find_matches("drop", &[], -1), Err(Error::UnknownRule(_))));

    // presets of the wrong kind
    let a = engine.create_node(s.item).unwrap();
    let mut p = PatternBuilder::new("edgeInput");
    let x = p.node("x", s.item.into());
    let y = p.node("y", s.item.into());
    let e = p.edge("e", s.inside.into(), x, y);
    p.input(Slot::Edge(e));
    let pattern = p.build(&s.model).unwrap();
    let script = EditScript::builder().build(&pattern, &s.model).unwrap();
    engine.register_rule("edgeInput", pattern, script).unwrap();
    let err = engine.find_matches("edgeInput", &[Some(Element::Node(a))], -1).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn test_dead_preset_is_not_found() {
    let s = store();
    let mut engine = Engine::new(Arc::clone(&s.model));
    let mut p = PatternBuilder::new("one");
    let x = p.node("x", s.item.into());
    p.input(Slot::Node(x));
    let pattern = p.build(&s.model).unwrap();
    let script = EditScript::builder().build(&pattern, &s.model).unwrap();
    engine.register_rule("one", pattern, script).unwrap();

    let a = engine.create_node(s.item).unwrap();
    engine.delete_node(a).unwrap();
    assert!(matches!(engine.find_matches("one", &[Some(a.into())], -1), Err(Error::NotFound(_))));
}
