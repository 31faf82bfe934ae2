//! Remote job polling.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use super::config::DispatchConfig;
use crate::error::{OffloadError, OffloadResult};
use crate::remote::{ClientId, HistoryEntry, PromptId, RemoteQueue, RemoteStatus};

/// Tracing target for polling operations.
const TRACING_TARGET: &str = "offcast_runtime::poller";

/// Terminal state the remote reported for one job.
///
/// Captured exactly once per job and never re-queried; a timeout or a
/// cancellation is an error of the poll attempt, not a job state, and
/// leaves the job eligible for a later poll.
#[derive(Debug, Clone)]
pub enum RemoteOutcome {
    /// The job completed; outputs are recorded in the entry.
    Completed(HistoryEntry),
    /// The remote execution failed with this message.
    Failed(String),
}

/// Drives one submitted job to a terminal state.
///
/// Polls at a fixed interval until the remote reports completion or
/// failure, the overall deadline elapses, or the caller cancels.
/// Connection errors are transient and retried until the deadline.
pub struct JobPoller {
    queue: Arc<dyn RemoteQueue>,
    config: DispatchConfig,
    cancel: watch::Receiver<bool>,
    client_id: ClientId,
}

impl JobPoller {
    /// Creates a poller for one queue and session.
    pub fn new(
        queue: Arc<dyn RemoteQueue>,
        config: DispatchConfig,
        cancel: watch::Receiver<bool>,
        client_id: ClientId,
    ) -> Self {
        Self {
            queue,
            config,
            cancel,
            client_id,
        }
    }

    /// Polls until the job is terminal, the deadline elapses
    /// (`TimedOut`), or the caller cancels (`Cancelled`).
    pub async fn poll(&mut self, prompt: &PromptId) -> OffloadResult<RemoteOutcome> {
        let deadline = Instant::now() + self.config.poll_deadline;

        loop {
            if *self.cancel.borrow() {
                return self.cancelled(prompt).await;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    target: TRACING_TARGET,
                    prompt_id = %prompt,
                    "Polling deadline elapsed"
                );
                return Err(OffloadError::TimedOut);
            }

            match self.queue.history(prompt).await {
                Ok(Some(entry)) => match &entry.status {
                    RemoteStatus::Completed => {
                        tracing::debug!(
                            target: TRACING_TARGET,
                            prompt_id = %prompt,
                            output_len = entry.outputs.len(),
                            "Remote job completed"
                        );
                        return Ok(RemoteOutcome::Completed(entry));
                    }
                    RemoteStatus::Failed { message } => {
                        return Ok(RemoteOutcome::Failed(message.clone()));
                    }
                    RemoteStatus::Running => {}
                },
                Ok(None) => {}
                Err(err) if err.is_transport() => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        prompt_id = %prompt,
                        error = %err,
                        "Transient polling error"
                    );
                }
                Err(err) => return Err(err),
            }

            tokio::time::sleep(self.config.poll_interval).await;

            if *self.cancel.borrow() {
                return self.cancelled(prompt).await;
            }
        }
    }

    /// Attempts to cancel remote work before surfacing `Cancelled`,
    /// so an abandoned poll does not leave the job orphaned.
    async fn cancelled(&self, prompt: &PromptId) -> OffloadResult<RemoteOutcome> {
        if let Err(err) = self.queue.cancel_session(&self.client_id).await {
            tracing::warn!(
                target: TRACING_TARGET,
                prompt_id = %prompt,
                error = %err,
                "Session cancellation failed"
            );
        }
        Err(OffloadError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::testing::MockQueue;
    use super::*;
    use std::time::Duration;

    fn config(deadline: Duration) -> DispatchConfig {
        DispatchConfig {
            poll_interval: Duration::from_millis(500),
            poll_deadline: deadline,
            ..DispatchConfig::default()
        }
    }

    fn completed_entry() -> HistoryEntry {
        HistoryEntry {
            status: RemoteStatus::Completed,
            outputs: HashMap::new(),
        }
    }

    fn poller(queue: Arc<MockQueue>, deadline: Duration) -> (JobPoller, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let poller = JobPoller::new(queue, config(deadline), rx, ClientId::new());
        (poller, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_waits_through_running_states() {
        let queue = Arc::new(
            MockQueue::new()
                .with_running_polls(2)
                .with_entry(completed_entry()),
        );
        let (mut poller, _tx) = poller(queue.clone(), Duration::from_secs(60));

        let outcome = poller.poll(&PromptId::from("42")).await.unwrap();
        assert!(matches!(outcome, RemoteOutcome::Completed(_)));
        assert_eq!(queue.history_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_terminal() {
        let queue = Arc::new(MockQueue::new().with_entry(HistoryEntry {
            status: RemoteStatus::Failed {
                message: "CUDA out of memory".into(),
            },
            outputs: HashMap::new(),
        }));
        let (mut poller, _tx) = poller(queue, Duration::from_secs(60));

        let outcome = poller.poll(&PromptId::from("42")).await.unwrap();
        match outcome {
            RemoteOutcome::Failed(message) => assert_eq!(message, "CUDA out of memory"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses_to_timed_out() {
        // No entry ever appears.
        let queue = Arc::new(MockQueue::new());
        let (mut poller, _tx) = poller(queue.clone(), Duration::from_secs(2));

        let err = poller.poll(&PromptId::from("42")).await.unwrap_err();
        assert!(matches!(err, OffloadError::TimedOut));
        assert!(queue.history_count() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_until_success() {
        let queue = Arc::new(
            MockQueue::new()
                .with_history_failures(2)
                .with_entry(completed_entry()),
        );
        let (mut poller, _tx) = poller(queue.clone(), Duration::from_secs(60));

        let outcome = poller.poll(&PromptId::from("42")).await.unwrap();
        assert!(matches!(outcome, RemoteOutcome::Completed(_)));
        assert_eq!(queue.history_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_attempts_session_cancel() {
        let queue = Arc::new(MockQueue::new());
        let (mut poller, tx) = poller(queue.clone(), Duration::from_secs(60));
        tx.send(true).unwrap();

        let err = poller.poll(&PromptId::from("42")).await.unwrap_err();
        assert!(matches!(err, OffloadError::Cancelled));
        assert_eq!(queue.cancel_count(), 1);
        assert_eq!(queue.history_count(), 0);
    }
}
