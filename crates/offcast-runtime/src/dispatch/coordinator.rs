//! Result coordination.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell, watch};

use super::config::DispatchConfig;
use super::handle::{DispatchHandle, FetchOutcome, JobKey, OutputValue, RemoteHandle};
use super::poller::{JobPoller, RemoteOutcome};
use crate::error::{OffloadError, OffloadResult};
use crate::graph::{OutputName, TransferClass};
use crate::remote::{ClientId, NodeOutputs, RemoteQueue, ResourceRef};

/// Tracing target for coordination operations.
const TRACING_TARGET: &str = "offcast_runtime::coordinator";

/// Per-job shared state: the single-flight poll outcome and the
/// per-output download cache.
#[derive(Default)]
struct JobEntry {
    outcome: OnceCell<RemoteOutcome>,
    downloads: Mutex<HashMap<OutputName, Arc<OnceCell<Vec<Bytes>>>>>,
}

/// Serves named outputs of dispatched jobs to concurrent fetchers.
///
/// Guarantees at most one active poll sequence per job regardless of
/// how many outputs are requested concurrently: the first fetch polls,
/// everyone else awaits the same outcome. Resource outputs download at
/// most once per distinct output and are cached for the job's
/// lifetime.
pub struct ResultCoordinator {
    queue: Arc<dyn RemoteQueue>,
    config: DispatchConfig,
    client_id: ClientId,
    jobs: Mutex<HashMap<JobKey, Arc<JobEntry>>>,
    cancel: watch::Sender<bool>,
}

impl ResultCoordinator {
    /// Creates a coordinator bound to one queue, using the process
    /// session identifier.
    pub fn new(queue: Arc<dyn RemoteQueue>, config: DispatchConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            queue,
            config,
            client_id: ClientId::process(),
            jobs: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Overrides the session identifier.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    /// Fetches one named output of a dispatched job.
    ///
    /// In local mode no network operation occurs; the caller-supplied
    /// `local` value is served. In both mode the local value is served
    /// alongside the independently fetched remote value.
    pub async fn fetch(
        &self,
        handle: &DispatchHandle,
        name: &OutputName,
        local: Option<OutputValue>,
    ) -> OffloadResult<FetchOutcome> {
        match handle {
            DispatchHandle::Local => {
                let local = local.ok_or_else(|| OffloadError::MissingLocalValue {
                    name: name.clone(),
                })?;
                Ok(FetchOutcome {
                    local: Some(local),
                    remote: None,
                })
            }
            DispatchHandle::Remote(remote) => Ok(FetchOutcome {
                local: None,
                remote: Some(self.fetch_remote(remote, name).await?),
            }),
            DispatchHandle::Both(remote) => {
                let local = local.ok_or_else(|| OffloadError::MissingLocalValue {
                    name: name.clone(),
                })?;
                let remote = self.fetch_remote(remote, name).await?;
                Ok(FetchOutcome {
                    local: Some(local),
                    remote: Some(remote),
                })
            }
        }
    }

    /// Cancels every poll in progress; waiters observe `Cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Drops a job's cached state once no further fetch is expected.
    pub async fn release(&self, handle: &RemoteHandle) {
        self.jobs.lock().await.remove(&handle.key());
    }

    /// Returns the number of jobs currently cached.
    pub async fn tracked_jobs(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Resolves one output from the job's single-flight outcome.
    async fn fetch_remote(
        &self,
        handle: &RemoteHandle,
        name: &OutputName,
    ) -> OffloadResult<OutputValue> {
        let target = handle
            .captures
            .get(name)
            .ok_or_else(|| OffloadError::UnknownOutput { name: name.clone() })?;

        let entry = self.entry(handle.key()).await;
        let outcome = entry
            .outcome
            .get_or_try_init(|| async {
                tracing::debug!(
                    target: TRACING_TARGET,
                    job_id = %handle.job_id,
                    prompt_id = %handle.prompt_id,
                    "First fetch, polling remote job"
                );
                let mut poller = JobPoller::new(
                    self.queue.clone(),
                    self.config.clone(),
                    self.cancel.subscribe(),
                    self.client_id,
                );
                poller.poll(&handle.prompt_id).await
            })
            .await?;

        let history = match outcome {
            RemoteOutcome::Failed(message) => {
                return Err(OffloadError::RemoteExecutionFailed {
                    message: message.clone(),
                });
            }
            RemoteOutcome::Completed(history) => history,
        };

        let outputs = history.outputs_of(&target.node).ok_or_else(|| {
            OffloadError::Fetch {
                message: format!("no recorded output for capture node {}", target.node),
            }
        })?;

        match target.kind.class() {
            TransferClass::Primitive => self.resolve_primitive(outputs, name),
            TransferClass::Resource => self.resolve_resource(&entry, outputs, name).await,
        }
    }

    /// Reads a primitive output from the job's recorded metadata.
    fn resolve_primitive(
        &self,
        outputs: &NodeOutputs,
        name: &OutputName,
    ) -> OffloadResult<OutputValue> {
        outputs
            .primitive()
            .cloned()
            .map(OutputValue::Primitive)
            .ok_or_else(|| OffloadError::Fetch {
                message: format!("output {name:?} recorded no primitive value"),
            })
    }

    /// Downloads a resource output, at most once per output name.
    async fn resolve_resource(
        &self,
        entry: &JobEntry,
        outputs: &NodeOutputs,
        name: &OutputName,
    ) -> OffloadResult<OutputValue> {
        let cell = {
            let mut downloads = entry.downloads.lock().await;
            downloads.entry(name.clone()).or_default().clone()
        };

        let buffers = cell
            .get_or_try_init(|| self.download_all(&outputs.files, name))
            .await?;
        Ok(OutputValue::Resource(buffers.clone()))
    }

    /// Downloads every file recorded for one output, in order.
    async fn download_all(
        &self,
        files: &[ResourceRef],
        name: &OutputName,
    ) -> OffloadResult<Vec<Bytes>> {
        if files.is_empty() {
            return Err(OffloadError::Fetch {
                message: format!("output {name:?} recorded no files"),
            });
        }

        let mut buffers = Vec::with_capacity(files.len());
        for file in files {
            buffers.push(self.download_with_retry(file).await?);
        }
        Ok(buffers)
    }

    /// Downloads one resource, retrying the completed-but-not-flushed
    /// race a bounded number of times.
    async fn download_with_retry(&self, resource: &ResourceRef) -> OffloadResult<Bytes> {
        let mut attempt = 0u32;
        loop {
            match self.queue.download(resource).await {
                Ok(bytes) => return Ok(bytes),
                Err(err @ OffloadError::Fetch { .. }) if attempt < self.config.download_retries => {
                    attempt += 1;
                    tracing::warn!(
                        target: TRACING_TARGET,
                        filename = %resource.filename,
                        attempt,
                        error = %err,
                        "Resource not available yet, retrying"
                    );
                    tokio::time::sleep(self.config.download_retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Returns the shared entry for one job, creating it on first use.
    async fn entry(&self, key: JobKey) -> Arc<JobEntry> {
        let mut jobs = self.jobs.lock().await;
        jobs.entry(key).or_default().clone()
    }
}

impl std::fmt::Debug for ResultCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCoordinator")
            .field("endpoint", &self.queue.endpoint())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
