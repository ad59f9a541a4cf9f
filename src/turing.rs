//! # Turing machines as graph rewriting
//!
//! The tape is a chain of `BandPosition` nodes linked by `right` edges, each
//! holding its cell `value`. The machine is a set of `State` nodes; for every
//! (state, symbol) pair a `readZero`/`readOne` edge leads to a `WriteValue`
//! node carrying the symbol to write and a `moveLeft`/`moveRight` edge to the
//! next state.
//!
//! One step of the machine is a short sequence of rule applications:
//!
//! ```text
//!   readOneRule | readZeroRule        (state, cell)  -> write value
//!   ensureMoveLeftValidRule           grow the tape to the left if needed
//!   moveLeftRule                      (wv, cell)     -> (state', cell')
//!   else ensureMoveRightValidRule, moveRightRule
//! ```
//!
//! A state without outgoing read edges halts the machine.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::actions::Actions;
use crate::model::{Element, NodeId, TypeHierarchy, TypeId, TypeModel, Value};
use crate::pattern::{Expr, PatternBuilder, Slot};
use crate::rewrite::EditScript;
use crate::storage::MemoryGraph;
use crate::{Engine, Error, Result};

// ============================================================================
// Type model
// ============================================================================

pub const BAND_POSITION: TypeId = TypeId(1);
pub const STATE: TypeId = TypeId(2);
pub const WRITE_VALUE: TypeId = TypeId(3);

pub const RIGHT: TypeId = TypeId(1);
pub const READ_ZERO: TypeId = TypeId(2);
pub const READ_ONE: TypeId = TypeId(3);
pub const MOVE_LEFT: TypeId = TypeId(4);
pub const MOVE_RIGHT: TypeId = TypeId(5);

/// Integer cell / symbol attribute.
pub const VALUE: &str = "value";

pub const READ_ZERO_RULE: &str = "readZeroRule";
pub const READ_ONE_RULE: &str = "readOneRule";
pub const ENSURE_MOVE_LEFT_VALID_RULE: &str = "ensureMoveLeftValidRule";
pub const ENSURE_MOVE_RIGHT_VALID_RULE: &str = "ensureMoveRightValidRule";
pub const MOVE_LEFT_RULE: &str = "moveLeftRule";
pub const MOVE_RIGHT_RULE: &str = "moveRightRule";

/// Node types `Node > {BandPosition, State, WriteValue}` and edge types
/// `Edge > {right, readZero, readOne, moveLeft, moveRight}`.
pub fn model() -> Result<TypeModel> {
    let mut nodes = TypeHierarchy::builder("Node");
    let bp = nodes.add_type("BandPosition", &[TypeId::ROOT])?;
    nodes.add_type("State", &[TypeId::ROOT])?;
    let wv = nodes.add_type("WriteValue", &[TypeId::ROOT])?;
    nodes.default_attribute(bp, VALUE, 0)?;
    nodes.default_attribute(wv, VALUE, 0)?;

    let mut edges = TypeHierarchy::builder("Edge");
    for name in ["right", "readZero", "readOne", "moveLeft", "moveRight"] {
        edges.add_type(name, &[TypeId::ROOT])?;
    }

    let model = TypeModel::new(nodes.build(), edges.build());
    debug_assert_eq!(model.nodes.by_name("WriteValue"), Some(WRITE_VALUE));
    debug_assert_eq!(model.edges.by_name("moveRight"), Some(MOVE_RIGHT));
    Ok(model)
}

// ============================================================================
// Rules
// ============================================================================

/// `(s:State) -[read]-> (wv:WriteValue)`, `bp.value == symbol`:
/// write `wv.value` into `bp`, return `wv`.
fn register_read(actions: &mut Actions, name: &str, read: TypeId, symbol: i64) -> Result<()> {
    let mut p = PatternBuilder::new(name);
    let s = p.node("s", STATE.into());
    let wv = p.node("wv", WRITE_VALUE.into());
    let bp = p.node("bp", BAND_POSITION.into());
    p.edge("rv", read.into(), s, wv);
    p.input(Slot::Node(s)).input(Slot::Node(bp));
    p.condition(Expr::attr_eq(Slot::Node(bp), VALUE, symbol));
    let pattern = p.build(actions.model())?;

    let mut script = EditScript::builder();
    script
        .set_attribute(Slot::Node(bp), VALUE, Expr::attr(Slot::Node(wv), VALUE))
        .output(Slot::Node(wv));
    let script = script.build(&pattern, actions.model())?;
    actions.register_rule(name, pattern, script)
}

/// `(wv) -[movement]-> (:State)` and no neighbor of `bp` on that side:
/// add a fresh `BandPosition` there.
fn register_ensure(actions: &mut Actions, name: &str, movement: TypeId, left: bool) -> Result<()> {
    let mut p = PatternBuilder::new(name);
    let wv = p.node("wv", WRITE_VALUE.into());
    let next = p.node("_node0", STATE.into());
    let bp = p.node("bp", BAND_POSITION.into());
    p.edge("_edge0", movement.into(), wv, next);
    p.input(Slot::Node(wv)).input(Slot::Node(bp));

    let mut neg = p.negative("neg_0");
    let nbp = neg.shared_node("bp", bp);
    let other = neg.node("_node0", BAND_POSITION.into());
    if left {
        neg.edge("_edge0", RIGHT.into(), other, nbp);
    } else {
        neg.edge("_edge0", RIGHT.into(), nbp, other);
    }
    p.add_negative(neg);
    let pattern = p.build(actions.model())?;

    let mut script = EditScript::builder();
    let fresh = script.create_node("_node1", BAND_POSITION);
    if left {
        script.create_edge("_edge1", RIGHT, fresh, Slot::Node(bp));
    } else {
        script.create_edge("_edge1", RIGHT, Slot::Node(bp), fresh);
    }
    let script = script.build(&pattern, actions.model())?;
    actions.register_rule(name, pattern, script)
}

/// `(wv) -[movement]-> (s:State)` and the neighbor cell of `bp`:
/// return `(s, neighbor)` without editing.
fn register_move(actions: &mut Actions, name: &str, movement: TypeId, left: bool) -> Result<()> {
    let mut p = PatternBuilder::new(name);
    let wv = p.node("wv", WRITE_VALUE.into());
    let s = p.node("s", STATE.into());
    let (neighbor, bp) = if left {
        let lbp = p.node("lbp", BAND_POSITION.into());
        let bp = p.node("bp", BAND_POSITION.into());
        p.edge("_edge0", movement.into(), wv, s);
        p.edge("_edge1", RIGHT.into(), lbp, bp);
        (lbp, bp)
    } else {
        let bp = p.node("bp", BAND_POSITION.into());
        let rbp = p.node("rbp", BAND_POSITION.into());
        p.edge("_edge0", movement.into(), wv, s);
        p.edge("_edge1", RIGHT.into(), bp, rbp);
        (rbp, bp)
    };
    p.input(Slot::Node(wv)).input(Slot::Node(bp));
    let pattern = p.build(actions.model())?;

    let mut script = EditScript::builder();
    script.output(Slot::Node(s)).output(Slot::Node(neighbor));
    let script = script.build(&pattern, actions.model())?;
    actions.register_rule(name, pattern, script)
}

/// Register the six Turing rules.
pub fn register_rules(actions: &mut Actions) -> Result<()> {
    register_read(actions, READ_ZERO_RULE, READ_ZERO, 0)?;
    register_read(actions, READ_ONE_RULE, READ_ONE, 1)?;
    register_ensure(actions, ENSURE_MOVE_LEFT_VALID_RULE, MOVE_LEFT, true)?;
    register_ensure(actions, ENSURE_MOVE_RIGHT_VALID_RULE, MOVE_RIGHT, false)?;
    register_move(actions, MOVE_LEFT_RULE, MOVE_LEFT, true)?;
    register_move(actions, MOVE_RIGHT_RULE, MOVE_RIGHT, false)?;
    Ok(())
}

/// A fresh engine over the Turing model with all six rules registered.
pub fn engine() -> Result<Engine> {
    let mut engine = Engine::new(Arc::new(model()?));
    register_rules(engine.actions_mut())?;
    Ok(engine)
}

// ============================================================================
// Machine description
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Left,
    Right,
}

/// One entry of a transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: String,
    pub read: i64,
    pub write: i64,
    pub movement: Move,
    pub next: String,
}

/// Transition table, turned into graph form by [`MachineBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct MachineBuilder {
    transitions: Vec<Transition>,
}

/// A machine laid out in a graph, with a one-cell blank tape.
#[derive(Debug, Clone)]
pub struct Machine {
    states: HashMap<String, NodeId>,
    start_cell: NodeId,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// In `state` reading `read`: write `write`, move, continue in `next`.
    pub fn transition(
        &mut self,
        state: impl Into<String>,
        read: i64,
        write: i64,
        movement: Move,
        next: impl Into<String>,
    ) -> &mut Self {
        self.transitions.push(Transition {
            state: state.into(),
            read,
            write,
            movement,
            next: next.into(),
        });
        self
    }

    pub fn build(&self, graph: &mut MemoryGraph) -> Result<Machine> {
        let mut states: HashMap<String, NodeId> = HashMap::new();
        for t in &self.transitions {
            if !matches!(t.read, 0 | 1) {
                return Err(Error::InvalidPattern(format!(
                    "state {} reads {}, only 0 and 1 are supported",
                    t.state, t.read
                )));
            }
            for name in [&t.state, &t.next] {
                if !states.contains_key(name.as_str()) {
                    let node = graph.create_node(STATE)?;
                    graph.set_attribute(node, "name", name.as_str())?;
                    states.insert(name.clone(), node);
                }
            }
        }

        let mut seen = hashbrown::HashSet::new();
        for t in &self.transitions {
            if !seen.insert((t.state.as_str(), t.read)) {
                return Err(Error::InvalidPattern(format!(
                    "state {} has two transitions reading {}",
                    t.state, t.read
                )));
            }
            let from = states[&t.state];
            let to = states[&t.next];
            let wv = graph.create_node(WRITE_VALUE)?;
            graph.set_attribute(wv, VALUE, t.write)?;
            let read = if t.read == 0 { READ_ZERO } else { READ_ONE };
            graph.create_edge(read, from, wv)?;
            let movement = match t.movement {
                Move::Left => MOVE_LEFT,
                Move::Right => MOVE_RIGHT,
            };
            graph.create_edge(movement, wv, to)?;
        }

        let start_cell = graph.create_node(BAND_POSITION)?;
        debug!(states = states.len(), transitions = self.transitions.len(), "machine built");
        Ok(Machine { states, start_cell })
    }
}

impl Machine {
    pub fn state(&self, name: &str) -> Option<NodeId> {
        self.states.get(name).copied()
    }

    pub fn start_cell(&self) -> NodeId {
        self.start_cell
    }
}

/// The 3-state, 2-symbol busy beaver (halting state `H`).
pub fn busy_beaver_3() -> MachineBuilder {
    let mut b = MachineBuilder::new();
    b.transition("A", 0, 1, Move::Right, "B")
        .transition("A", 1, 1, Move::Right, "H")
        .transition("B", 0, 0, Move::Right, "C")
        .transition("B", 1, 1, Move::Right, "B")
        .transition("C", 0, 1, Move::Left, "C")
        .transition("C", 1, 1, Move::Left, "A");
    b
}

// ============================================================================
// Control program
// ============================================================================

/// Where a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Read steps performed.
    pub steps: usize,
    /// Whether the machine reached a state with no applicable read.
    pub halted: bool,
    pub state: NodeId,
    pub cell: NodeId,
}

fn expect_node(outputs: &[Element], index: usize, rule: &str) -> Result<NodeId> {
    outputs
        .get(index)
        .and_then(Element::as_node)
        .ok_or_else(|| Error::MalformedMatch(format!("{rule}: output {index} is not a node")))
}

/// One read/write/move step. `None` when no read rule applies.
pub fn step(engine: &mut Engine, state: NodeId, cell: NodeId) -> Result<Option<(NodeId, NodeId)>> {
    let presets = [Some(Element::Node(state)), Some(Element::Node(cell))];
    let (read, outputs) = match engine.apply_first(READ_ONE_RULE, &presets)? {
        Some(out) => (READ_ONE_RULE, out),
        None => match engine.apply_first(READ_ZERO_RULE, &presets)? {
            Some(out) => (READ_ZERO_RULE, out),
            None => return Ok(None),
        },
    };
    let wv = expect_node(&outputs, 0, read)?;
    let (_, next, cell) = apply_move(engine, wv, cell)?;
    Ok(Some((next, cell)))
}

/// Grow the tape if needed and follow the move edge of `wv`. Returns the
/// move rule that fired with the next state and cell.
fn apply_move(engine: &mut Engine, wv: NodeId, cell: NodeId) -> Result<(&'static str, NodeId, NodeId)> {
    let presets = [Some(Element::Node(wv)), Some(Element::Node(cell))];
    engine.apply_first(ENSURE_MOVE_LEFT_VALID_RULE, &presets)?;
    let (rule, moved) = match engine.apply_first(MOVE_LEFT_RULE, &presets)? {
        Some(out) => (MOVE_LEFT_RULE, out),
        None => {
            engine.apply_first(ENSURE_MOVE_RIGHT_VALID_RULE, &presets)?;
            let out = engine
                .apply_first(MOVE_RIGHT_RULE, &presets)?
                .ok_or_else(|| Error::MalformedMatch(format!("write value {wv} has no move edge")))?;
            (MOVE_RIGHT_RULE, out)
        }
    };
    Ok((rule, expect_node(&moved, 0, rule)?, expect_node(&moved, 1, rule)?))
}

/// Run from `state` on `cell` for at most `max_steps` read steps.
pub fn run(engine: &mut Engine, state: NodeId, cell: NodeId, max_steps: usize) -> Result<RunOutcome> {
    let (mut state, mut cell) = (state, cell);
    let mut steps = 0;
    while steps < max_steps {
        match step(engine, state, cell)? {
            Some((s, c)) => {
                state = s;
                cell = c;
                steps += 1;
            }
            None => {
                debug!(steps, "machine halted");
                return Ok(RunOutcome { steps, halted: true, state, cell });
            }
        }
    }
    Ok(RunOutcome { steps, halted: false, state, cell })
}

/// Cell values from the leftmost cell of the tape containing `cell`.
pub fn read_tape(graph: &MemoryGraph, cell: NodeId) -> Result<Vec<i64>> {
    let left_of = |n: NodeId| graph.incoming(n, Some(RIGHT)).find_map(|e| graph.source(e));
    let right_of = |n: NodeId| graph.outgoing(n, Some(RIGHT)).find_map(|e| graph.target(e));

    let mut leftmost = cell;
    let mut guard = graph.node_count();
    while let Some(prev) = left_of(leftmost) {
        leftmost = prev;
        guard = guard
            .checked_sub(1)
            .ok_or_else(|| Error::Inconsistent("tape has a cycle".into()))?;
    }

    let mut tape = Vec::new();
    let mut current = Some(leftmost);
    while let Some(n) = current {
        let value = match graph.get_attribute(n, VALUE)? {
            Some(Value::Int(v)) => *v,
            Some(other) => {
                return Err(Error::Inconsistent(format!("cell {n} holds {}", other.type_name())));
            }
            None => 0,
        };
        tape.push(value);
        if tape.len() > graph.node_count() {
            return Err(Error::Inconsistent("tape has a cycle".into()));
        }
        current = right_of(n);
    }
    Ok(tape)
}
