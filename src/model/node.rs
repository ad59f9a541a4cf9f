//! Node handles.

use serde::{Deserialize, Serialize};

/// Opaque node identifier.
///
/// A node lives in an arena slot; the generation tells a live handle apart
/// from one whose slot has since been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub slot: u32,
    pub generation: u32,
}

impl NodeId {
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.slot)?;
        if self.generation > 0 {
            write!(f, "'{}", self.generation)?;
        }
        Ok(())
    }
}
