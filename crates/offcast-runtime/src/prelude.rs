//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use offcast_runtime::prelude::*;
//! ```

pub use crate::dispatch::{
    BoundaryValue, BoundaryValues, DispatchConfig, DispatchHandle, DispatchMode, Dispatcher,
    FetchOutcome, OutputValue, ResultCoordinator,
};
pub use crate::error::{OffloadError, OffloadResult};
pub use crate::graph::{
    GraphModel, GraphNode, InputValue, Link, NodeCatalog, NodeId, OutputName, TransferKind,
};
pub use crate::remote::{ClientId, JobId, PromptId, RemoteQueue};
pub use crate::rewrite::PromptDocument;
pub use crate::subgraph::Subgraph;
