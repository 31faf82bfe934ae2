#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod dispatch;
mod error;
pub mod graph;
pub mod remote;
pub mod rewrite;
pub mod subgraph;

#[doc(hidden)]
pub mod prelude;

pub use error::{OffloadError, OffloadResult};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "offcast_runtime";
