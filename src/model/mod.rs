//! # Graph Model
//!
//! Plain data shared by the store, the pattern model, the matcher and the
//! rewriter: element handles, attribute values and type hierarchies.
//!
//! Design rule: this module is pure data, with no graph or search state.

pub mod node;
pub mod edge;
pub mod element;
pub mod value;
pub mod attributes;
pub mod types;

pub use node::NodeId;
pub use edge::{EdgeId, EdgeEnds, Direction};
pub use element::Element;
pub use value::Value;
pub use attributes::{AttributeMap, attributes};
pub use types::{TypeId, TypeHierarchy, TypeHierarchyBuilder, TypeModel};
