//! Boundary crossing types.

use crate::graph::{Link, NodeId, OutputName, TransferKind};

/// Where a boundary input's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryOrigin {
    /// A link whose source lies outside the closure; the host engine
    /// supplies the computed value at dispatch time.
    Link(Link),
    /// A literal reference held by an entry-point node, naming local
    /// resource bytes that must be re-bound on the remote side.
    Literal(serde_json::Value),
}

/// A node/slot pair at the edge of a closure whose value originates
/// outside it.
///
/// Classification is by the declared kind of the consuming slot, never
/// by inspecting the runtime value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryInput {
    /// Consuming node inside the closure.
    pub node: NodeId,
    /// Consuming input slot.
    pub slot: String,
    /// Declared kind of the slot.
    pub kind: TransferKind,
    /// Where the value comes from.
    pub origin: BoundaryOrigin,
}

impl BoundaryInput {
    /// Returns whether this input crosses as resource bytes.
    pub fn is_resource(&self) -> bool {
        self.kind.is_resource()
    }
}

/// A marker node designating one named job output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMarker {
    /// The marker node's ID.
    pub node: NodeId,
    /// Caller-chosen output name, unique within the job.
    pub name: OutputName,
    /// Declared kind of the captured value.
    pub kind: TransferKind,
    /// Link to the value the marker captures.
    pub source: Link,
}
