//! Attribute expressions for conditions and rewrite updates.
//!
//! Expressions read attributes of bound elements and combine them with
//! NULL-propagating operators. They never fail on data: a missing attribute
//! is NULL, and so is an ill-typed operation. The only error is reading
//! through a slot that nothing is bound to.

use serde::{Deserialize, Serialize};

use crate::model::{Element, Value};
use crate::storage::MemoryGraph;
use crate::{Error, Result};

/// A reference to an element a pattern or rewrite talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// Pattern node by index.
    Node(usize),
    /// Pattern edge by index.
    Edge(usize),
    /// Node created by the rewrite, in creation order.
    NewNode(usize),
    /// Edge created by the rewrite, in creation order.
    NewEdge(usize),
}

impl Slot {
    pub fn is_created(&self) -> bool {
        matches!(self, Slot::NewNode(_) | Slot::NewEdge(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Slot::Node(_) | Slot::NewNode(_))
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Node(i) => write!(f, "node[{i}]"),
            Slot::Edge(i) => write!(f, "edge[{i}]"),
            Slot::NewNode(i) => write!(f, "new node[{i}]"),
            Slot::NewEdge(i) => write!(f, "new edge[{i}]"),
        }
    }
}

/// Resolves slots to host elements during evaluation.
pub trait Bindings {
    fn resolve(&self, slot: Slot) -> Option<Element>;
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Neq, Lt, Lte, Gt, Gte,
    // Logical
    And, Or, Xor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Attribute { slot: Slot, key: String },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn attr(slot: Slot, key: impl Into<String>) -> Self {
        Expr::Attribute { slot, key: key.into() }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary { op, operand: Box::new(operand) }
    }

    /// `slot.key == value`
    pub fn attr_eq(slot: Slot, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::binary(BinaryOp::Eq, Expr::attr(slot, key), Expr::lit(value))
    }

    /// Every slot the expression reads, in first-use order.
    pub fn slots(&self) -> Vec<Slot> {
        let mut out = Vec::new();
        self.collect_slots(&mut out);
        out
    }

    fn collect_slots(&self, out: &mut Vec<Slot>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Attribute { slot, .. } => {
                if !out.contains(slot) {
                    out.push(*slot);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_slots(out),
            Expr::Binary { left, right, .. } => {
                left.collect_slots(out);
                right.collect_slots(out);
            }
        }
    }

    pub fn eval(&self, graph: &MemoryGraph, bindings: &impl Bindings) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Attribute { slot, key } => {
                let element = bindings
                    .resolve(*slot)
                    .ok_or_else(|| Error::MalformedMatch(format!("{slot} is not bound")))?;
                Ok(graph.get_attribute(element, key)?.cloned().unwrap_or(Value::Null))
            }
            Expr::Unary { op, operand } => Ok(eval_unary(*op, operand.eval(graph, bindings)?)),
            Expr::Binary { op, left, right } => {
                let l = left.eval(graph, bindings)?;
                // short-circuit on a decided left operand
                match (op, &l) {
                    (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = right.eval(graph, bindings)?;
                Ok(eval_binary(*op, &l, &r))
            }
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Value {
    match (op, v) {
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Negate, Value::Int(i)) => i.checked_neg().map_or(Value::Null, Value::Int),
        (UnaryOp::Negate, Value::Float(f)) => Value::Float(-f),
        _ => Value::Null,
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Eq => l.loose_eq(r),
        BinaryOp::Neq => eval_unary(UnaryOp::Not, l.loose_eq(r)),
        BinaryOp::Lt => compare(l, r, |o| o == Ordering::Less),
        BinaryOp::Lte => compare(l, r, |o| o != Ordering::Greater),
        BinaryOp::Gt => compare(l, r, |o| o == Ordering::Greater),
        BinaryOp::Gte => compare(l, r, |o| o != Ordering::Less),
        BinaryOp::And => match (l, r) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinaryOp::Or => match (l, r) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        BinaryOp::Xor => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a ^ b),
            _ => Value::Null,
        },
        BinaryOp::Add => match (l, r) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            _ => arithmetic(l, r, i64::checked_add, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(l, r, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(l, r, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => arithmetic(l, r, i64::checked_div, |a, b| a / b),
        BinaryOp::Mod => arithmetic(l, r, i64::checked_rem, |a, b| a % b),
    }
}

fn compare(l: &Value, r: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    l.partial_compare(r).map_or(Value::Null, |o| Value::Bool(accept(o)))
}

fn arithmetic(
    l: &Value,
    r: &Value,
    int: impl Fn(i64, i64) -> Option<i64>,
    float: impl Fn(f64, f64) -> f64,
) -> Value {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int(*a, *b).map_or(Value::Null, Value::Int),
        (a, b) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) if a.is_numeric() && b.is_numeric() => Value::Float(float(x, y)),
            _ => Value::Null,
        },
    }
}
