//! Job dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use super::config::DispatchConfig;
use super::handle::{DispatchHandle, DispatchMode, RemoteHandle};
use crate::error::OffloadResult;
use crate::graph::{GraphModel, NodeCatalog, NodeId};
use crate::remote::{ClientId, JobId, RemoteQueue, SubmitRequest, UploadPayload};
use crate::rewrite::{self, BoundaryBindings, ResolvedBoundary};
use crate::subgraph::Subgraph;

/// Tracing target for dispatch operations.
const TRACING_TARGET: &str = "offcast_runtime::dispatch";

/// A host-supplied value for one boundary input.
#[derive(Debug, Clone)]
pub enum BoundaryValue {
    /// Resource bytes to upload before dispatch.
    Bytes(Bytes),
    /// A primitive to inline into the document.
    Json(serde_json::Value),
}

/// Boundary values keyed by consuming node and slot.
///
/// The host engine's dependency scheduling guarantees these are ready
/// before dispatch runs; a missing resource value is a sequencing
/// error surfaced by the rewriter.
#[derive(Debug, Clone, Default)]
pub struct BoundaryValues {
    values: HashMap<(NodeId, String), BoundaryValue>,
}

impl BoundaryValues {
    /// Creates an empty value set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the value of one boundary slot.
    pub fn supply(
        &mut self,
        node: impl Into<NodeId>,
        slot: impl Into<String>,
        value: BoundaryValue,
    ) {
        self.values.insert((node.into(), slot.into()), value);
    }

    /// Returns the value of one boundary slot.
    pub fn get(&self, node: &NodeId, slot: &str) -> Option<&BoundaryValue> {
        self.values
            .iter()
            .find(|((n, s), _)| n == node && s == slot)
            .map(|(_, value)| value)
    }
}

/// Extracts, rewrites, and submits delegated subgraphs to one remote
/// queue.
pub struct Dispatcher {
    queue: Arc<dyn RemoteQueue>,
    catalog: Arc<NodeCatalog>,
    config: DispatchConfig,
    client_id: ClientId,
}

impl Dispatcher {
    /// Creates a dispatcher bound to one queue, using the process
    /// session identifier.
    pub fn new(queue: Arc<dyn RemoteQueue>, catalog: Arc<NodeCatalog>, config: DispatchConfig) -> Self {
        Self {
            queue,
            catalog,
            config,
            client_id: ClientId::process(),
        }
    }

    /// Overrides the session identifier.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    /// Returns the session identifier jobs are tagged with.
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Dispatches the upstream closure of `start` according to `mode`.
    ///
    /// Local mode returns [`DispatchHandle::Local`] without touching
    /// the network. Otherwise: extract, upload boundary resources,
    /// rewrite, submit, and return a handle carrying the remote job's
    /// identity and capture map.
    pub async fn dispatch(
        &self,
        graph: &GraphModel,
        start: &NodeId,
        mode: DispatchMode,
        values: &BoundaryValues,
    ) -> OffloadResult<DispatchHandle> {
        if mode == DispatchMode::Local {
            tracing::debug!(target: TRACING_TARGET, start = %start, "Local mode, skipping dispatch");
            return Ok(DispatchHandle::Local);
        }

        let subgraph = Subgraph::extract(graph, &self.catalog, start)?;
        let job_id = JobId::new();

        let bindings = self.resolve_boundaries(&subgraph, values, &job_id).await?;
        let mut rewritten = rewrite::rewrite(graph, &self.catalog, &subgraph, &bindings)?;

        if self.config.normalize_paths
            && self.catalog.has_path_slots(rewritten.document.nodes())
        {
            match self.queue.system_os().await {
                Ok(os) => {
                    rewrite::normalize_model_paths(&mut rewritten.document, &self.catalog, os)
                }
                Err(err) => {
                    // The job may still run if both hosts agree anyway.
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Could not discover remote OS, skipping path normalization"
                    );
                }
            }
        }

        let request = SubmitRequest::new(rewritten.document, self.client_id, job_id);
        let prompt_id = self.queue.submit(&request).await?;

        tracing::info!(
            target: TRACING_TARGET,
            job_id = %job_id,
            prompt_id = %prompt_id,
            endpoint = self.queue.endpoint(),
            "Subgraph dispatched"
        );

        let handle = RemoteHandle {
            endpoint: self.queue.endpoint().to_owned(),
            job_id,
            prompt_id,
            captures: rewritten.captures,
        };
        Ok(if mode == DispatchMode::Both {
            DispatchHandle::Both(handle)
        } else {
            DispatchHandle::Remote(handle)
        })
    }

    /// Uploads resource boundary values and inlines primitive ones.
    async fn resolve_boundaries(
        &self,
        subgraph: &Subgraph,
        values: &BoundaryValues,
        job_id: &JobId,
    ) -> OffloadResult<BoundaryBindings> {
        let mut bindings = BoundaryBindings::new();

        for input in &subgraph.boundary {
            match values.get(&input.node, &input.slot) {
                Some(BoundaryValue::Bytes(bytes)) => {
                    let extension = input.kind.file_extension().unwrap_or("bin");
                    let suggested =
                        format!("{}_{}_{}.{}", job_id, input.node, input.slot, extension);

                    tracing::debug!(
                        target: TRACING_TARGET,
                        node = %input.node,
                        slot = %input.slot,
                        size = bytes.len(),
                        "Uploading boundary resource"
                    );

                    let resource = self
                        .queue
                        .upload(UploadPayload::input(bytes.clone(), suggested))
                        .await?;
                    bindings.bind(
                        input.node.clone(),
                        input.slot.clone(),
                        ResolvedBoundary::Resource(resource),
                    );
                }
                Some(BoundaryValue::Json(value)) => {
                    bindings.bind(
                        input.node.clone(),
                        input.slot.clone(),
                        ResolvedBoundary::Inline(value.clone()),
                    );
                }
                // The rewriter rejects unresolved resource boundaries.
                None => {}
            }
        }

        Ok(bindings)
    }

    /// Cancels all queued work submitted under this session.
    /// Best-effort: a failure is logged and swallowed.
    pub async fn cancel_session(&self) {
        if let Err(err) = self.queue.cancel_session(&self.client_id).await {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %err,
                endpoint = self.queue.endpoint(),
                "Session cancellation failed"
            );
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.queue.endpoint())
            .field("client_id", &self.client_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::testing::{MockQueue, PanicQueue};
    use super::*;
    use crate::graph::{GraphNode, Link, MARKER_KIND_SLOT, MARKER_NAME_SLOT, MARKER_VALUE_SLOT, OutputName};
    use crate::graph::InputValue;

    fn scenario_graph() -> GraphModel {
        GraphModel::from_nodes([
            (
                NodeId::from("a"),
                GraphNode::new("LoadImage").with_input("image", json!("cat.png")),
            ),
            (
                NodeId::from("b"),
                GraphNode::new("Upscale").with_input("image", Link::new("a", 0)),
            ),
            (
                NodeId::from("c"),
                GraphNode::new("RemoteOutput")
                    .with_input(MARKER_VALUE_SLOT, Link::new("b", 0))
                    .with_input(MARKER_NAME_SLOT, json!("result"))
                    .with_input(MARKER_KIND_SLOT, json!("image")),
            ),
        ])
    }

    fn dispatcher(queue: Arc<dyn RemoteQueue>) -> Dispatcher {
        Dispatcher::new(
            queue,
            Arc::new(NodeCatalog::standard()),
            DispatchConfig::default(),
        )
        .with_client_id(ClientId::new())
    }

    #[tokio::test]
    async fn test_local_mode_never_touches_the_network() {
        let dispatcher = dispatcher(Arc::new(PanicQueue));
        let handle = dispatcher
            .dispatch(
                &scenario_graph(),
                &NodeId::from("c"),
                DispatchMode::Local,
                &BoundaryValues::new(),
            )
            .await
            .unwrap();
        assert!(matches!(handle, DispatchHandle::Local));
    }

    #[tokio::test]
    async fn test_dispatch_uploads_then_submits() {
        let queue = Arc::new(MockQueue::new().with_upload_name("cat_0001.png"));
        let dispatcher = dispatcher(queue.clone());

        let mut values = BoundaryValues::new();
        values.supply("a", "image", BoundaryValue::Bytes(Bytes::from_static(b"png")));

        let handle = dispatcher
            .dispatch(
                &scenario_graph(),
                &NodeId::from("c"),
                DispatchMode::Remote,
                &values,
            )
            .await
            .unwrap();

        assert_eq!(queue.upload_count(), 1);
        assert_eq!(queue.submit_count(), 1);

        let remote = handle.remote().unwrap();
        assert!(remote.captures.contains_key(&OutputName::from("result")));

        let submitted = queue.last_submit().unwrap();
        assert_eq!(submitted.extra_data.job_id, remote.job_id);
        let loader = submitted.prompt.get(&NodeId::from("a")).unwrap();
        assert_eq!(
            loader.input("image"),
            Some(&InputValue::Literal(json!("cat_0001.png")))
        );
    }

    #[tokio::test]
    async fn test_missing_resource_value_fails_before_submit() {
        let queue = Arc::new(MockQueue::new());
        let dispatcher = dispatcher(queue.clone());

        let err = dispatcher
            .dispatch(
                &scenario_graph(),
                &NodeId::from("c"),
                DispatchMode::Remote,
                &BoundaryValues::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, crate::OffloadError::IncompleteBoundary { .. }));
        assert_eq!(queue.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_both_mode_dispatches_remotely() {
        let queue = Arc::new(MockQueue::new());
        let dispatcher = dispatcher(queue.clone());

        let mut values = BoundaryValues::new();
        values.supply("a", "image", BoundaryValue::Bytes(Bytes::from_static(b"png")));

        let handle = dispatcher
            .dispatch(
                &scenario_graph(),
                &NodeId::from("c"),
                DispatchMode::Both,
                &values,
            )
            .await
            .unwrap();

        assert!(matches!(handle, DispatchHandle::Both(_)));
        assert_eq!(handle.mode(), DispatchMode::Both);
        assert_eq!(queue.submit_count(), 1);
    }
}
