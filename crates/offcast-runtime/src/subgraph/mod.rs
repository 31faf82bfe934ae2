//! Subgraph extraction.
//!
//! Computes the upstream closure of a start node and classifies every
//! value crossing the closure's boundary, producing the inputs the
//! rewriter needs to build a standalone prompt document.

mod boundary;
mod extract;

pub use boundary::{BoundaryInput, BoundaryOrigin, OutputMarker};
pub use extract::Subgraph;
