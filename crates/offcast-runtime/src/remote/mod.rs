//! Remote worker abstraction.
//!
//! The engine talks to a remote worker as an opaque job queue: submit
//! a prompt document, poll its history, move resource bytes, cancel a
//! session's queued work. The [`RemoteQueue`] trait is that contract;
//! `offcast-reqwest` implements it over HTTP, and tests substitute
//! scripted fakes.

mod id;
mod types;

use bytes::Bytes;

pub use id::{ClientId, JobId, PromptId};
pub use types::{
    ExtraData, HistoryEntry, NodeOutputs, RemoteOs, RemoteStatus, ResourceRef, StorageArea,
    SubmitRequest, UploadPayload,
};

use crate::error::OffloadResult;

/// A remote worker's job queue.
///
/// Implementations bind one endpoint for their lifetime; the engine
/// keys job state by [`RemoteQueue::endpoint`] plus job ID. All calls
/// are subject to the implementation's own per-call timeouts: short
/// for control-plane calls, longer for data-plane transfers.
#[async_trait::async_trait]
pub trait RemoteQueue: Send + Sync {
    /// Returns the endpoint label this queue is bound to.
    fn endpoint(&self) -> &str;

    /// Submits a prompt document and returns the remote's job identity.
    ///
    /// A rejection (malformed document) surfaces as
    /// [`crate::OffloadError::DispatchRejected`] and is never retried.
    async fn submit(&self, request: &SubmitRequest) -> OffloadResult<PromptId>;

    /// Returns the job's history entry, or `None` while the remote has
    /// not recorded it yet.
    async fn history(&self, prompt: &PromptId) -> OffloadResult<Option<HistoryEntry>>;

    /// Uploads resource bytes and returns the canonical stored
    /// reference, which may differ from the suggested name.
    async fn upload(&self, payload: UploadPayload) -> OffloadResult<ResourceRef>;

    /// Downloads the bytes of a stored resource.
    async fn download(&self, resource: &ResourceRef) -> OffloadResult<Bytes>;

    /// Cancels all queued work submitted under the given session.
    /// Best-effort; failures are logged by callers, never fatal.
    async fn cancel_session(&self, client: &ClientId) -> OffloadResult<()>;

    /// Reports the remote host's operating system family.
    async fn system_os(&self) -> OffloadResult<RemoteOs>;
}
