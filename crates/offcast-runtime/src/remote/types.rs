//! Wire types shared between the engine and queue implementations.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::id::{ClientId, JobId};
use crate::graph::NodeId;
use crate::rewrite::PromptDocument;

/// Storage area a resource lives in on the remote worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StorageArea {
    /// Uploaded inputs.
    Input,
    /// Job outputs.
    Output,
    /// Scratch space.
    Temp,
}

impl Default for StorageArea {
    fn default() -> Self {
        Self::Input
    }
}

/// Canonical reference to a resource stored on the remote worker.
///
/// Returned by uploads and found in history output records; always
/// used verbatim, never reconstructed from a locally chosen name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Stored filename.
    pub filename: String,
    /// Subfolder within the storage area.
    #[serde(default)]
    pub subfolder: String,
    /// Storage area holding the file.
    #[serde(rename = "type", default)]
    pub area: StorageArea,
}

impl ResourceRef {
    /// Creates a reference in the input area with no subfolder.
    pub fn input(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            area: StorageArea::Input,
        }
    }

    /// Returns the annotated slot form of this reference: the bare
    /// filename for input-area files, `name[area]` otherwise.
    pub fn annotated(&self) -> String {
        let mut name = if self.subfolder.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.subfolder, self.filename)
        };
        if self.area != StorageArea::Input {
            name.push_str(&format!("[{}]", self.area));
        }
        name
    }
}

/// Payload of one resource upload.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    /// Raw resource bytes.
    pub bytes: Bytes,
    /// Name offered to the remote; the stored name is authoritative.
    pub suggested_name: String,
    /// Target storage area.
    pub area: StorageArea,
    /// Whether the remote may overwrite an existing file of that name.
    pub overwrite: bool,
}

impl UploadPayload {
    /// Creates an input-area upload that overwrites on collision.
    pub fn input(bytes: Bytes, suggested_name: impl Into<String>) -> Self {
        Self {
            bytes,
            suggested_name: suggested_name.into(),
            area: StorageArea::Input,
            overwrite: true,
        }
    }
}

/// Job submission body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// The standalone prompt document.
    pub prompt: PromptDocument,
    /// Submitting session.
    pub client_id: ClientId,
    /// Metadata echoed back in history entries.
    pub extra_data: ExtraData,
}

/// Submission metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraData {
    /// Local identity of the dispatched job.
    pub job_id: JobId,
}

impl SubmitRequest {
    /// Creates a submission for one job.
    pub fn new(prompt: PromptDocument, client_id: ClientId, job_id: JobId) -> Self {
        Self {
            prompt,
            client_id,
            extra_data: ExtraData { job_id },
        }
    }
}

/// Remote-reported state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Queued or executing.
    Running,
    /// Finished; outputs are recorded.
    Completed,
    /// The remote execution itself failed.
    Failed {
        /// Remote error message, verbatim.
        message: String,
    },
}

/// Recorded outputs of one node in a completed job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutputs {
    /// Stored resource files, in recording order.
    pub files: Vec<ResourceRef>,
    /// Inline metadata values.
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl NodeOutputs {
    /// Returns the recorded primitive value, if any.
    ///
    /// Capture nodes record primitives under `value`; a single-entry
    /// record is accepted under any key.
    pub fn primitive(&self) -> Option<&serde_json::Value> {
        self.values.get("value").or_else(|| {
            if self.values.len() == 1 {
                self.values.values().next()
            } else {
                None
            }
        })
    }
}

/// One job's history record.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Reported status.
    pub status: RemoteStatus,
    /// Recorded outputs by node, populated once completed.
    pub outputs: HashMap<NodeId, NodeOutputs>,
}

impl HistoryEntry {
    /// Returns the outputs recorded for one node.
    pub fn outputs_of(&self, node: &NodeId) -> Option<&NodeOutputs> {
        self.outputs.get(node)
    }
}

/// Remote host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOs {
    /// Windows; path separator `\`.
    Windows,
    /// Unix-like; path separator `/`.
    Posix,
}

impl RemoteOs {
    /// Maps the worker's OS identifier to a family.
    pub fn from_identifier(id: &str) -> Self {
        if id == "nt" { Self::Windows } else { Self::Posix }
    }

    /// Returns the family's path separator.
    pub const fn separator(&self) -> char {
        match self {
            Self::Windows => '\\',
            Self::Posix => '/',
        }
    }
}
