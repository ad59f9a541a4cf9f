//! Search plans.
//!
//! A plan is the fixed sequence of steps the matcher executes for one
//! pattern. Each step binds one more element (or checks one condition or
//! negative pattern), and every later step may rely on what earlier steps
//! bound. Plans are either handed over ready-made or derived once when the
//! pattern is built:
//!
//! 1. inputs first, in declaration order;
//! 2. endpoint checks of edges bound without their endpoints;
//! 3. extends that only close a cycle (both endpoints bound);
//! 4. extends from a bound endpoint, preferring outgoing edges;
//! 5. a lookup when nothing bound reaches the rest of the pattern.
//!
//! Conditions go right after the step that binds the last element they
//! read. Negative patterns go after the last binding step: a NAC must see
//! every host element the positive pattern uses, or its own elements could
//! take one the positive pattern binds later.

use crate::model::Direction;
use super::Slot;

/// Which endpoint of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum End {
    Source,
    Target,
}

/// One matcher step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOp {
    /// Bind an input from the caller's presets. An absent preset falls back
    /// to a lookup.
    Preset(Slot),
    /// Scan the type lists of the element's allowed types.
    Lookup(Slot),
    /// Walk the adjacency list of an already bound endpoint of pattern edge
    /// `edge`: `Outgoing` starts at the edge's source, `Incoming` at its
    /// target. Binds the edge and the far endpoint, or checks the far
    /// endpoint when it is bound already.
    Extend { edge: usize, direction: Direction },
    /// Bind or check one endpoint of an edge that was bound by preset or lookup.
    Endpoint { edge: usize, end: End },
    /// Evaluate attribute condition `i`.
    Condition(usize),
    /// Evaluate negative pattern `i`.
    Negative(usize),
}

/// A validated step sequence covering every element, condition and
/// negative pattern exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPlan {
    ops: Vec<SearchOp>,
}

impl SearchPlan {
    pub fn ops(&self) -> &[SearchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a plan has to cover.
pub(crate) struct Shape<'a> {
    pub node_count: usize,
    /// `(source, target)` per pattern edge.
    pub edges: &'a [(usize, usize)],
    pub inputs: &'a [Slot],
    pub condition_needs: &'a [Vec<Slot>],
    pub negative_needs: &'a [Vec<Slot>],
}

#[derive(Debug)]
struct Progress {
    nodes: Vec<bool>,
    edges: Vec<bool>,
    sources: Vec<bool>,
    targets: Vec<bool>,
    conditions: Vec<bool>,
    negatives: Vec<bool>,
}

impl Progress {
    fn new(shape: &Shape<'_>) -> Self {
        Self {
            nodes: vec![false; shape.node_count],
            edges: vec![false; shape.edges.len()],
            sources: vec![false; shape.edges.len()],
            targets: vec![false; shape.edges.len()],
            conditions: vec![false; shape.condition_needs.len()],
            negatives: vec![false; shape.negative_needs.len()],
        }
    }

    fn is_bound(&self, slot: Slot) -> bool {
        match slot {
            Slot::Node(i) => self.nodes.get(i).copied().unwrap_or(false),
            Slot::Edge(i) => self.edges.get(i).copied().unwrap_or(false),
            Slot::NewNode(_) | Slot::NewEdge(_) => false,
        }
    }

    fn all_bound(&self, needs: &[Slot]) -> bool {
        needs.iter().all(|s| self.is_bound(*s))
    }

    fn end_checked(&mut self, edge: usize, end: End) -> &mut bool {
        match end {
            End::Source => &mut self.sources[edge],
            End::Target => &mut self.targets[edge],
        }
    }

    /// Every element bound and every edge's endpoints checked.
    fn complete(&self) -> bool {
        self.nodes.iter().all(|b| *b)
            && self.edges.iter().all(|b| *b)
            && self.sources.iter().all(|b| *b)
            && self.targets.iter().all(|b| *b)
    }

    /// Conditions whose inputs are all bound, not yet placed.
    fn flush_conditions(&mut self, shape: &Shape<'_>, ops: &mut Vec<SearchOp>) {
        for (i, needs) in shape.condition_needs.iter().enumerate() {
            if !self.conditions[i] && self.all_bound(needs) {
                self.conditions[i] = true;
                ops.push(SearchOp::Condition(i));
            }
        }
    }

    /// Conditions, then negatives, still missing once the binding is complete.
    fn flush_all(&mut self, shape: &Shape<'_>, ops: &mut Vec<SearchOp>) {
        self.flush_conditions(shape, ops);
        for i in 0..shape.negative_needs.len() {
            if !self.negatives[i] {
                self.negatives[i] = true;
                ops.push(SearchOp::Negative(i));
            }
        }
    }
}

/// Derive the default plan for a pattern.
pub(crate) fn derive(shape: &Shape<'_>) -> SearchPlan {
    let mut progress = Progress::new(shape);
    let mut ops = Vec::new();

    for &input in shape.inputs {
        ops.push(SearchOp::Preset(input));
        match input {
            Slot::Node(i) => progress.nodes[i] = true,
            Slot::Edge(i) => progress.edges[i] = true,
            Slot::NewNode(_) | Slot::NewEdge(_) => {}
        }
    }

    loop {
        progress.flush_conditions(shape, &mut ops);
        let Some(op) = next_step(shape, &progress) else { break };
        apply_step(shape, &mut progress, op);
        ops.push(op);
    }
    progress.flush_all(shape, &mut ops);
    SearchPlan { ops }
}

fn next_step(shape: &Shape<'_>, p: &Progress) -> Option<SearchOp> {
    for (e, _) in shape.edges.iter().enumerate() {
        if p.edges[e] {
            if !p.sources[e] {
                return Some(SearchOp::Endpoint { edge: e, end: End::Source });
            }
            if !p.targets[e] {
                return Some(SearchOp::Endpoint { edge: e, end: End::Target });
            }
        }
    }
    for (e, &(s, t)) in shape.edges.iter().enumerate() {
        if !p.edges[e] && p.nodes[s] && p.nodes[t] {
            return Some(SearchOp::Extend { edge: e, direction: Direction::Outgoing });
        }
    }
    for (e, &(s, t)) in shape.edges.iter().enumerate() {
        if !p.edges[e] {
            if p.nodes[s] {
                return Some(SearchOp::Extend { edge: e, direction: Direction::Outgoing });
            }
            if p.nodes[t] {
                return Some(SearchOp::Extend { edge: e, direction: Direction::Incoming });
            }
        }
    }
    p.nodes.iter().position(|b| !b).map(|n| SearchOp::Lookup(Slot::Node(n)))
}

fn apply_step(shape: &Shape<'_>, p: &mut Progress, op: SearchOp) {
    match op {
        SearchOp::Preset(slot) | SearchOp::Lookup(slot) => match slot {
            Slot::Node(i) => p.nodes[i] = true,
            Slot::Edge(i) => p.edges[i] = true,
            Slot::NewNode(_) | Slot::NewEdge(_) => {}
        },
        SearchOp::Extend { edge, .. } => {
            let (s, t) = shape.edges[edge];
            p.edges[edge] = true;
            p.sources[edge] = true;
            p.targets[edge] = true;
            p.nodes[s] = true;
            p.nodes[t] = true;
        }
        SearchOp::Endpoint { edge, end } => {
            let (s, t) = shape.edges[edge];
            *p.end_checked(edge, end) = true;
            match end {
                End::Source => p.nodes[s] = true,
                End::Target => p.nodes[t] = true,
            }
        }
        SearchOp::Condition(i) => p.conditions[i] = true,
        SearchOp::Negative(i) => p.negatives[i] = true,
    }
}

/// Check a supplied plan and append conditions or negatives it left out.
pub(crate) fn normalize(shape: &Shape<'_>, ops: Vec<SearchOp>) -> Result<SearchPlan, String> {
    let mut p = Progress::new(shape);
    let mut out = Vec::with_capacity(ops.len());

    for (step, op) in ops.into_iter().enumerate() {
        match op {
            SearchOp::Preset(slot) | SearchOp::Lookup(slot) => {
                let in_range = match slot {
                    Slot::Node(i) => i < shape.node_count,
                    Slot::Edge(i) => i < shape.edges.len(),
                    Slot::NewNode(_) | Slot::NewEdge(_) => false,
                };
                if !in_range {
                    return Err(format!("step {step}: {slot} is not a pattern element"));
                }
                if p.is_bound(slot) {
                    return Err(format!("step {step}: {slot} bound twice"));
                }
                let is_input = shape.inputs.contains(&slot);
                if matches!(op, SearchOp::Preset(_)) != is_input {
                    return Err(format!("step {step}: inputs must be bound by preset steps and only they ({slot})"));
                }
            }
            SearchOp::Extend { edge, direction } => {
                let Some(&(s, t)) = shape.edges.get(edge) else {
                    return Err(format!("step {step}: no pattern edge {edge}"));
                };
                if p.edges[edge] {
                    return Err(format!("step {step}: edge[{edge}] bound twice"));
                }
                let from = if direction == Direction::Outgoing { s } else { t };
                if !p.nodes[from] {
                    return Err(format!("step {step}: extend from unbound node[{from}]"));
                }
            }
            SearchOp::Endpoint { edge, end } => {
                if !p.edges.get(edge).copied().unwrap_or(false) {
                    return Err(format!("step {step}: endpoint of unbound edge[{edge}]"));
                }
                if *p.end_checked(edge, end) {
                    return Err(format!("step {step}: endpoint of edge[{edge}] checked twice"));
                }
            }
            SearchOp::Condition(i) => {
                let Some(needs) = shape.condition_needs.get(i) else {
                    return Err(format!("step {step}: no condition {i}"));
                };
                if p.conditions[i] || !p.all_bound(needs) {
                    return Err(format!("step {step}: condition {i} placed twice or too early"));
                }
            }
            SearchOp::Negative(i) => {
                let Some(needs) = shape.negative_needs.get(i) else {
                    return Err(format!("step {step}: no negative pattern {i}"));
                };
                if p.negatives[i] || !p.all_bound(needs) {
                    return Err(format!("step {step}: negative {i} placed twice or too early"));
                }
                if !p.complete() {
                    return Err(format!("step {step}: negative {i} placed before the last binding step"));
                }
            }
        }
        apply_step(shape, &mut p, op);
        out.push(op);
    }

    if let Some(n) = p.nodes.iter().position(|b| !b) {
        return Err(format!("node[{n}] is never bound"));
    }
    if let Some(e) = p.edges.iter().position(|b| !b) {
        return Err(format!("edge[{e}] is never bound"));
    }
    if let Some(e) = (0..shape.edges.len()).find(|&e| !p.sources[e] || !p.targets[e]) {
        return Err(format!("endpoints of edge[{e}] are never checked"));
    }
    p.flush_all(shape, &mut out);
    Ok(SearchPlan { ops: out })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_inputs_then_extends() {
        // wv -> s, lbp -> bp ; inputs wv, bp
        let edges = [(0, 1), (2, 3)];
        let inputs = [Slot::Node(0), Slot::Node(3)];
        let shape = Shape {
            node_count: 4,
            edges: &edges,
            inputs: &inputs,
            condition_needs: &[],
            negative_needs: &[],
        };
        let plan = derive(&shape);
        assert_eq!(
            plan.ops(),
            &[
                SearchOp::Preset(Slot::Node(0)),
                SearchOp::Preset(Slot::Node(3)),
                SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
                SearchOp::Extend { edge: 1, direction: Direction::Incoming },
            ]
        );
    }

    #[test]
    fn test_derive_places_conditions_early() {
        let edges = [(0, 1)];
        let inputs = [Slot::Node(0), Slot::Node(2)];
        let needs = [vec![Slot::Node(2)]];
        let shape = Shape {
            node_count: 3,
            edges: &edges,
            inputs: &inputs,
            condition_needs: &needs,
            negative_needs: &[],
        };
        let plan = derive(&shape);
        assert_eq!(plan.ops()[2], SearchOp::Condition(0));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_derive_lookup_without_inputs() {
        let edges = [(0, 1), (1, 0)];
        let shape = Shape {
            node_count: 2,
            edges: &edges,
            inputs: &[],
            condition_needs: &[],
            negative_needs: &[],
        };
        let plan = derive(&shape);
        assert_eq!(
            plan.ops(),
            &[
                SearchOp::Lookup(Slot::Node(0)),
                SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
                SearchOp::Extend { edge: 1, direction: Direction::Outgoing },
            ]
        );
    }

    #[test]
    fn test_normalize_appends_missing_checks() {
        let edges = [(0, 1)];
        let needs = [vec![Slot::Node(1)]];
        let shape = Shape {
            node_count: 2,
            edges: &edges,
            inputs: &[],
            condition_needs: &needs,
            negative_needs: &[],
        };
        let ops = vec![
            SearchOp::Lookup(Slot::Edge(0)),
            SearchOp::Endpoint { edge: 0, end: End::Target },
            SearchOp::Endpoint { edge: 0, end: End::Source },
        ];
        let plan = normalize(&shape, ops).unwrap();
        assert_eq!(plan.ops().last(), Some(&SearchOp::Condition(0)));
    }

    #[test]
    fn test_normalize_rejects_bad_plans() {
        let edges = [(0, 1)];
        let inputs = [Slot::Node(0)];
        let shape = Shape {
            node_count: 2,
            edges: &edges,
            inputs: &inputs,
            condition_needs: &[],
            negative_needs: &[],
        };
        // extend from unbound node
        assert!(normalize(&shape, vec![SearchOp::Extend { edge: 0, direction: Direction::Incoming }]).is_err());
        // input bound by lookup
        assert!(normalize(&shape, vec![
            SearchOp::Lookup(Slot::Node(0)),
            SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
        ]).is_err());
        // edge never bound
        assert!(normalize(&shape, vec![
            SearchOp::Preset(Slot::Node(0)),
            SearchOp::Lookup(Slot::Node(1)),
        ]).is_err());
    }

    fn shared_nac_shape<'a>(edges: &'a [(usize, usize)], needs: &'a [Vec<Slot>]) -> Shape<'a> {
        Shape { node_count: 2, edges, inputs: &[], condition_needs: &[], negative_needs: needs }
    }

    #[test]
    fn test_derive_places_negatives_after_last_binding() {
        // x -> y ; the NAC only shares x
        let edges = [(0, 1)];
        let needs = [vec![Slot::Node(0)]];
        let plan = derive(&shared_nac_shape(&edges, &needs));
        assert_eq!(
            plan.ops(),
            &[
                SearchOp::Lookup(Slot::Node(0)),
                SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
                SearchOp::Negative(0),
            ]
        );
    }

    #[test]
    fn test_normalize_rejects_early_negative() {
        let edges = [(0, 1)];
        let needs = [vec![Slot::Node(0)]];
        let shape = shared_nac_shape(&edges, &needs);
        assert!(normalize(&shape, vec![
            SearchOp::Lookup(Slot::Node(0)),
            SearchOp::Negative(0),
            SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
        ]).is_err());
        let plan = normalize(&shape, vec![
            SearchOp::Lookup(Slot::Node(0)),
            SearchOp::Extend { edge: 0, direction: Direction::Outgoing },
        ]).unwrap();
        assert_eq!(plan.ops().last(), Some(&SearchOp::Negative(0)));
    }
}
