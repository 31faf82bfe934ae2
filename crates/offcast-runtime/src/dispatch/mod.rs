//! Dispatch orchestration.
//!
//! Drives a delegated subgraph through its remote lifetime: resolve
//! boundary values, submit the rewritten prompt, poll the job to a
//! terminal state, and serve its named outputs to any number of
//! concurrent fetchers with a single poll sequence per job.

mod config;
mod coordinator;
mod dispatcher;
mod handle;
mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use coordinator::ResultCoordinator;
pub use dispatcher::{BoundaryValue, BoundaryValues, Dispatcher};
pub use handle::{DispatchHandle, DispatchMode, FetchOutcome, JobKey, OutputValue, RemoteHandle};
pub use poller::{JobPoller, RemoteOutcome};
