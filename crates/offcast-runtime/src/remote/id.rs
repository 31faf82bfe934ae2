//! Remote job identifier types.

use std::sync::OnceLock;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-process session identifier.
///
/// Stable for the process lifetime so an operator can bulk-cancel all
/// jobs submitted from one session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a new random client ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns this process's session identifier.
    pub fn process() -> Self {
        static PROCESS: OnceLock<ClientId> = OnceLock::new();
        *PROCESS.get_or_init(Self::new)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

/// Locally assigned identity of one dispatched job.
///
/// Travels with the submission as metadata so history entries can be
/// matched back to the dispatch that created them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// The remote's own identity for a submitted job.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    /// Creates a prompt ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PromptId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
