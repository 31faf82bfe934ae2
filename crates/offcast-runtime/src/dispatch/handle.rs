//! Dispatch handles and fetch results.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::graph::OutputName;
use crate::remote::{JobId, PromptId};
use crate::rewrite::CaptureTarget;

/// Where a delegated region executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchMode {
    /// Execute remotely; fetches serve remote results.
    Remote,
    /// Skip dispatch entirely; fetches serve the local value.
    Local,
    /// Execute remotely while the local graph also runs; fetches serve
    /// both values for comparison.
    Both,
}

/// Cache key of one remote job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Endpoint the job was submitted to.
    pub endpoint: String,
    /// Local job identity.
    pub job: JobId,
}

/// Everything needed to fetch a dispatched job's outputs later,
/// without re-resolving the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHandle {
    /// Endpoint the job was submitted to.
    pub endpoint: String,
    /// Local job identity.
    pub job_id: JobId,
    /// The remote's identity for the job.
    pub prompt_id: PromptId,
    /// Capture node per output name.
    pub captures: HashMap<OutputName, CaptureTarget>,
}

impl RemoteHandle {
    /// Returns the job's cache key.
    pub fn key(&self) -> JobKey {
        JobKey {
            endpoint: self.endpoint.clone(),
            job: self.job_id,
        }
    }
}

/// Result of a dispatch: either a live remote job or the sentinel
/// meaning no remote job exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchHandle {
    /// No remote job; fetches serve the local value.
    Local,
    /// A remote job to fetch from.
    Remote(RemoteHandle),
    /// A remote job fetched alongside the local value.
    Both(RemoteHandle),
}

impl DispatchHandle {
    /// Returns the dispatch mode this handle was created under.
    pub const fn mode(&self) -> DispatchMode {
        match self {
            DispatchHandle::Local => DispatchMode::Local,
            DispatchHandle::Remote(_) => DispatchMode::Remote,
            DispatchHandle::Both(_) => DispatchMode::Both,
        }
    }

    /// Returns the remote handle, if a remote job exists.
    pub const fn remote(&self) -> Option<&RemoteHandle> {
        match self {
            DispatchHandle::Local => None,
            DispatchHandle::Remote(handle) | DispatchHandle::Both(handle) => Some(handle),
        }
    }
}

/// One resolved output value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Downloaded resource bytes, one buffer per recorded file.
    Resource(Vec<Bytes>),
    /// An inline primitive.
    Primitive(serde_json::Value),
}

impl OutputValue {
    /// Returns the resource buffers, if this is a resource value.
    pub fn as_resource(&self) -> Option<&[Bytes]> {
        match self {
            OutputValue::Resource(buffers) => Some(buffers),
            OutputValue::Primitive(_) => None,
        }
    }

    /// Returns the primitive, if this is a primitive value.
    pub fn as_primitive(&self) -> Option<&serde_json::Value> {
        match self {
            OutputValue::Primitive(value) => Some(value),
            OutputValue::Resource(_) => None,
        }
    }
}

/// A served fetch: the local value, the remote value, or both,
/// depending on the dispatch mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Locally computed value, present in local and both modes.
    pub local: Option<OutputValue>,
    /// Remotely computed value, present in remote and both modes.
    pub remote: Option<OutputValue>,
}

impl FetchOutcome {
    /// Collapses to a single value, preferring the remote one.
    pub fn into_value(self) -> Option<OutputValue> {
        self.remote.or(self.local)
    }
}
