//! Workflow graph snapshot types.
//!
//! The graph model here is a read-only view over a host engine's
//! workflow: nodes keyed by string ID, each holding a class tag and a
//! slot map whose values are either literals or links to another
//! node's output socket. All transformation happens on copies made by
//! the rewriter; nothing in this module mutates a snapshot.

mod catalog;
mod id;
mod model;
mod node;
mod transfer;
mod value;

pub use catalog::{
    CaptureSpec, MARKER_KIND_SLOT, MARKER_NAME_SLOT, MARKER_VALUE_SLOT, NodeCatalog,
};
pub use id::{NodeId, OutputName};
pub use model::GraphModel;
pub use node::GraphNode;
pub use transfer::{TransferClass, TransferKind};
pub use value::{InputValue, Link};
