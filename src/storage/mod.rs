//! # Graph Store
//!
//! Owns every node and edge and the lists the matcher walks:
//!
//! | List | Keyed by | Used by |
//! |------|----------|---------|
//! | type list | node or edge type | lookup steps |
//! | outgoing list | source node | extend steps (forward) |
//! | incoming list | target node | extend steps (backward) |
//!
//! Lists are self-organizing: the matcher asks the store to splice the
//! elements of the last match it emitted to the front, so the next search
//! starting from the same neighbourhood finds them first.

pub(crate) mod ring;
pub mod memory;

pub use memory::{MemoryGraph, NodeIter, EdgeIter, Splice};
