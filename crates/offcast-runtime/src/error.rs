//! Offload error types.

use thiserror::Error;

use crate::graph::{NodeId, OutputName};

/// Result type for offload operations.
pub type OffloadResult<T> = Result<T, OffloadError>;

/// Errors that can occur while extracting, rewriting, dispatching, or
/// fetching a delegated subgraph.
///
/// Structural errors (`NodeNotFound` through `UnresolvedLink`) are
/// raised before any network call is issued and are never retried.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// A link or lookup referenced a node absent from the graph snapshot.
    #[error("node {node} not found in graph")]
    NodeNotFound {
        /// ID of the missing node.
        node: NodeId,
    },

    /// The traversal re-entered a node whose ancestor chain is still open.
    #[error("cycle detected at node {node}")]
    CycleDetected {
        /// Node at which the cycle was observed.
        node: NodeId,
    },

    /// The extracted closure contains no output marker.
    #[error("subgraph defines no output")]
    NoOutputDefined,

    /// Two output markers in one closure declared the same name.
    #[error("duplicate output name {name:?}")]
    DuplicateOutputName {
        /// The colliding output name.
        name: OutputName,
    },

    /// A node does not match the shape its class requires.
    #[error("malformed node {node}: {message}")]
    MalformedNode {
        /// ID of the malformed node.
        node: NodeId,
        /// What was wrong with it.
        message: String,
    },

    /// A boundary input has no resolved value or resource reference.
    #[error("unresolved boundary input on node {node}, slot {slot:?}")]
    IncompleteBoundary {
        /// Consuming node.
        node: NodeId,
        /// Consuming input slot.
        slot: String,
    },

    /// The rewritten document still links to a node outside itself.
    #[error("node {node} slot {slot:?} links to {target}, which is outside the rewritten document")]
    UnresolvedLink {
        /// Node holding the dangling link.
        node: NodeId,
        /// Input slot holding the dangling link.
        slot: String,
        /// Link target missing from the document.
        target: NodeId,
    },

    /// A fetch requested an output name the job never declared.
    #[error("unknown output {name:?}")]
    UnknownOutput {
        /// The unrecognized output name.
        name: OutputName,
    },

    /// A local-mode fetch was issued without a local value to serve.
    #[error("local mode requires a local value for output {name:?}")]
    MissingLocalValue {
        /// Output the caller asked for.
        name: OutputName,
    },

    /// A resource upload was rejected or the connection failed.
    #[error("upload failed: {message}")]
    Upload {
        /// Remote response or connection error.
        message: String,
    },

    /// The remote rejected the submitted prompt document.
    #[error("remote rejected prompt: {message}")]
    DispatchRejected {
        /// Remote response, verbatim.
        message: String,
    },

    /// A result resource could not be downloaded.
    #[error("fetch failed: {message}")]
    Fetch {
        /// Remote response or missing-resource detail.
        message: String,
    },

    /// A connection-level failure; transient while polling.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying connection error.
        message: String,
    },

    /// Polling exhausted its overall deadline.
    #[error("remote job timed out")]
    TimedOut,

    /// The caller cancelled before the job reached a terminal state.
    #[error("remote job cancelled")]
    Cancelled,

    /// The remote job itself reported an error.
    #[error("remote execution failed: {message}")]
    RemoteExecutionFailed {
        /// Remote error message, verbatim.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OffloadError {
    /// Returns whether this error is a connection-level failure that
    /// polling may retry until its deadline.
    pub const fn is_transport(&self) -> bool {
        matches!(self, OffloadError::Transport { .. })
    }
}
