//! Edge handles and traversal direction.

use serde::{Deserialize, Serialize};
use super::NodeId;

/// Opaque edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    pub slot: u32,
    pub generation: u32,
}

impl EdgeId {
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.slot)?;
        if self.generation > 0 {
            write!(f, "'{}", self.generation)?;
        }
        Ok(())
    }
}

/// Traversal direction, seen from the node the walk starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
        }
    }
}

/// Source and target of a directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeEnds {
    pub source: NodeId,
    pub target: NodeId,
}

impl EdgeEnds {
    /// The endpoint reached when walking the edge in `direction`.
    pub fn far_end(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Outgoing => self.target,
            Direction::Incoming => self.source,
        }
    }

    /// The "other" end of the edge from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.source { Some(self.target) }
        else if from == self.target { Some(self.source) }
        else { None }
    }
}
