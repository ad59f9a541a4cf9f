//! A host graph element: either a node or an edge.

use serde::{Deserialize, Serialize};
use super::{EdgeId, NodeId};

/// Node-or-edge reference, used for presets, outputs and attribute access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Element {
    Node(NodeId),
    Edge(EdgeId),
}

impl Element {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Element::Node(n) => Some(*n),
            Element::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<EdgeId> {
        match self {
            Element::Edge(e) => Some(*e),
            Element::Node(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Element::Node(_) => "node",
            Element::Edge(_) => "edge",
        }
    }
}

impl From<NodeId> for Element { fn from(v: NodeId) -> Self { Element::Node(v) } }
impl From<EdgeId> for Element { fn from(v: EdgeId) -> Self { Element::Edge(v) } }

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Node(n) => write!(f, "{n}"),
            Element::Edge(e) => write!(f, "{e}"),
        }
    }
}
