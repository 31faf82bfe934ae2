#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;

pub use client::RemoteClient;
pub use config::RemoteClientConfig;
pub use error::{Error, Result};

/// Tracing target for client operations.
pub const TRACING_TARGET: &str = "offcast_reqwest";
