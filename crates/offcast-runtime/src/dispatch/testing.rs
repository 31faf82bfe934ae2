//! Scripted queue doubles for dispatch tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::error::{OffloadError, OffloadResult};
use crate::remote::{
    ClientId, HistoryEntry, PromptId, RemoteOs, RemoteQueue, ResourceRef, SubmitRequest,
    UploadPayload,
};

/// A scripted [`RemoteQueue`]: configure the responses up front, then
/// assert on recorded calls.
#[derive(Default)]
pub(crate) struct MockQueue {
    /// Leading `history` calls that fail with a transport error.
    history_failures: usize,
    /// Subsequent `history` calls that report the job as not yet recorded.
    running_polls: usize,
    /// Terminal history entry; `None` keeps the job unrecorded forever.
    entry: Option<HistoryEntry>,
    /// Canonical name uploads are stored under; defaults to the
    /// suggested name.
    upload_name: Option<String>,
    /// Leading `download` calls that fail with a fetch error.
    download_failures: AtomicUsize,
    /// Downloadable files by filename.
    files: HashMap<String, Bytes>,

    history_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    download_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    submitted: Mutex<Vec<SubmitRequest>>,
    uploaded: Mutex<Vec<UploadPayload>>,
}

impl MockQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_running_polls(mut self, polls: usize) -> Self {
        self.running_polls = polls;
        self
    }

    pub(crate) fn with_history_failures(mut self, failures: usize) -> Self {
        self.history_failures = failures;
        self
    }

    pub(crate) fn with_entry(mut self, entry: HistoryEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub(crate) fn with_upload_name(mut self, name: impl Into<String>) -> Self {
        self.upload_name = Some(name.into());
        self
    }

    pub(crate) fn with_file(mut self, filename: impl Into<String>, bytes: Bytes) -> Self {
        self.files.insert(filename.into(), bytes);
        self
    }

    pub(crate) fn with_download_failures(self, failures: usize) -> Self {
        self.download_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub(crate) fn history_count(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_count(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn download_count(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_submit(&self) -> Option<SubmitRequest> {
        self.submitted.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl RemoteQueue for MockQueue {
    fn endpoint(&self) -> &str {
        "http://remote:8188"
    }

    async fn submit(&self, request: &SubmitRequest) -> OffloadResult<PromptId> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());
        Ok(PromptId::from("42"))
    }

    async fn history(&self, _prompt: &PromptId) -> OffloadResult<Option<HistoryEntry>> {
        let call = self.history_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.history_failures {
            return Err(OffloadError::Transport {
                message: "connection refused".into(),
            });
        }
        if call < self.history_failures + self.running_polls {
            return Ok(None);
        }
        Ok(self.entry.clone())
    }

    async fn upload(&self, payload: UploadPayload) -> OffloadResult<ResourceRef> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let name = self
            .upload_name
            .clone()
            .unwrap_or_else(|| payload.suggested_name.clone());
        self.uploaded.lock().unwrap().push(payload);
        Ok(ResourceRef::input(name))
    }

    async fn download(&self, resource: &ResourceRef) -> OffloadResult<Bytes> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.download_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.download_failures.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(OffloadError::Fetch {
                message: format!("{} not flushed yet", resource.filename),
            });
        }
        self.files
            .get(&resource.filename)
            .cloned()
            .ok_or_else(|| OffloadError::Fetch {
                message: format!("{} not found", resource.filename),
            })
    }

    async fn cancel_session(&self, _client: &ClientId) -> OffloadResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn system_os(&self) -> OffloadResult<RemoteOs> {
        Ok(RemoteOs::Posix)
    }
}

/// A queue that fails the test on any network call; used to prove
/// local mode never touches the network.
pub(crate) struct PanicQueue;

#[async_trait::async_trait]
impl RemoteQueue for PanicQueue {
    fn endpoint(&self) -> &str {
        "http://unreachable"
    }

    async fn submit(&self, _request: &SubmitRequest) -> OffloadResult<PromptId> {
        unreachable!("local mode must not submit")
    }

    async fn history(&self, _prompt: &PromptId) -> OffloadResult<Option<HistoryEntry>> {
        unreachable!("local mode must not poll")
    }

    async fn upload(&self, _payload: UploadPayload) -> OffloadResult<ResourceRef> {
        unreachable!("local mode must not upload")
    }

    async fn download(&self, _resource: &ResourceRef) -> OffloadResult<Bytes> {
        unreachable!("local mode must not download")
    }

    async fn cancel_session(&self, _client: &ClientId) -> OffloadResult<()> {
        unreachable!("local mode must not cancel")
    }

    async fn system_os(&self) -> OffloadResult<RemoteOs> {
        unreachable!("local mode must not query the remote")
    }
}
