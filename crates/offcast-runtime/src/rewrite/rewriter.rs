//! Closure-to-document rewriting.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::document::PromptDocument;
use crate::error::{OffloadError, OffloadResult};
use crate::graph::{
    GraphModel, GraphNode, InputValue, NodeCatalog, NodeId, OutputName, TransferClass,
    TransferKind,
};
use crate::remote::{RemoteOs, ResourceRef};
use crate::subgraph::{BoundaryOrigin, Subgraph};

/// Tracing target for rewrite operations.
const TRACING_TARGET: &str = "offcast_runtime::rewrite";

/// A resolved boundary value, ready to splice into the document.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBoundary {
    /// An inlined primitive value.
    Inline(serde_json::Value),
    /// A canonical reference to uploaded resource bytes.
    Resource(ResourceRef),
}

/// Resolved values for a subgraph's boundary inputs, keyed by the
/// consuming node and slot.
#[derive(Debug, Clone, Default)]
pub struct BoundaryBindings {
    bindings: HashMap<(NodeId, String), ResolvedBoundary>,
}

impl BoundaryBindings {
    /// Creates an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds one boundary slot.
    pub fn bind(
        &mut self,
        node: impl Into<NodeId>,
        slot: impl Into<String>,
        resolved: ResolvedBoundary,
    ) {
        self.bindings.insert((node.into(), slot.into()), resolved);
    }

    /// Returns the binding for one boundary slot.
    pub fn get(&self, node: &NodeId, slot: &str) -> Option<&ResolvedBoundary> {
        // Borrowed-pair lookups need an owned key; bindings are few.
        self.bindings
            .iter()
            .find(|((n, s), _)| n == node && s == slot)
            .map(|(_, resolved)| resolved)
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns whether no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One output's capture node in the rewritten document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureTarget {
    /// ID of the capture node.
    pub node: NodeId,
    /// Declared kind of the captured value.
    pub kind: TransferKind,
}

/// A rewritten, self-contained prompt plus its output capture map.
#[derive(Debug, Clone)]
pub struct RewrittenPrompt {
    /// The standalone document, link-closed.
    pub document: PromptDocument,
    /// Capture node per output name.
    pub captures: HashMap<OutputName, CaptureTarget>,
}

/// Rewrites an extracted closure into a standalone document.
///
/// Boundary slots are replaced by their resolved bindings, markers by
/// capture nodes, and local-only plumbing downstream of a marker is
/// pruned. Internal links among the remaining nodes are preserved
/// unchanged; IDs are stable.
pub fn rewrite(
    graph: &GraphModel,
    catalog: &NodeCatalog,
    subgraph: &Subgraph,
    bindings: &BoundaryBindings,
) -> OffloadResult<RewrittenPrompt> {
    let mut document: PromptDocument = subgraph
        .closure
        .iter()
        .map(|id| Ok((id.clone(), graph.get_node(id)?.clone())))
        .collect::<OffloadResult<_>>()?;

    splice_boundaries(&mut document, subgraph, bindings)?;
    let captures = splice_captures(&mut document, catalog, subgraph)?;
    prune_marker_consumers(&mut document, subgraph, &captures);

    document.validate_links()?;

    tracing::debug!(
        target: TRACING_TARGET,
        node_len = document.len(),
        capture_len = captures.len(),
        "Prompt rewritten"
    );

    Ok(RewrittenPrompt { document, captures })
}

/// Replaces each boundary slot with its resolved value.
fn splice_boundaries(
    document: &mut PromptDocument,
    subgraph: &Subgraph,
    bindings: &BoundaryBindings,
) -> OffloadResult<()> {
    for input in &subgraph.boundary {
        let resolved = match bindings.get(&input.node, &input.slot) {
            Some(resolved) => resolved,
            None => {
                // A primitive already inlined in the graph needs no
                // binding; everything else must be resolved first.
                let inline_already = input.kind.class() == TransferClass::Primitive
                    && matches!(input.origin, BoundaryOrigin::Literal(_));
                if inline_already {
                    continue;
                }
                return Err(OffloadError::IncompleteBoundary {
                    node: input.node.clone(),
                    slot: input.slot.clone(),
                });
            }
        };

        let value = match resolved {
            ResolvedBoundary::Inline(value) => InputValue::Literal(value.clone()),
            ResolvedBoundary::Resource(resource) => {
                InputValue::Literal(serde_json::Value::String(resource.annotated()))
            }
        };

        let node = document
            .get_mut(&input.node)
            .ok_or_else(|| OffloadError::NodeNotFound {
                node: input.node.clone(),
            })?;
        node.inputs.insert(input.slot.clone(), value);
    }

    Ok(())
}

/// Replaces each marker with a capture node keyed by a fresh ID.
fn splice_captures(
    document: &mut PromptDocument,
    catalog: &NodeCatalog,
    subgraph: &Subgraph,
) -> OffloadResult<HashMap<OutputName, CaptureTarget>> {
    let mut captures = HashMap::new();

    for marker in &subgraph.outputs {
        document.remove(&marker.node);

        let spec = catalog.capture_for(marker.kind).ok_or_else(|| {
            OffloadError::MalformedNode {
                node: marker.node.clone(),
                message: format!("no capture node registered for kind {}", marker.kind),
            }
        })?;

        let capture_id = fresh_capture_id(document, &marker.name);
        let capture = GraphNode::new(spec.class_type.clone())
            .with_input(spec.input_slot.clone(), marker.source.clone());
        document.insert(capture_id.clone(), capture);

        captures.insert(
            marker.name.clone(),
            CaptureTarget {
                node: capture_id,
                kind: marker.kind,
            },
        );
    }

    Ok(captures)
}

/// Picks a capture node ID that cannot collide with existing IDs.
fn fresh_capture_id(document: &PromptDocument, name: &OutputName) -> NodeId {
    let base = format!("capture_{name}");
    let mut id = NodeId::new(base.clone());
    let mut suffix = 2;
    while document.contains(&id) {
        id = NodeId::new(format!("{base}_{suffix}"));
        suffix += 1;
    }
    id
}

/// Drops nodes that consumed a marker's output.
///
/// A marker's downstream consumers are local plumbing (the dispatch
/// trigger chain); they have no remote counterpart once the marker is
/// replaced by a capture node.
fn prune_marker_consumers(
    document: &mut PromptDocument,
    subgraph: &Subgraph,
    captures: &HashMap<OutputName, CaptureTarget>,
) {
    let mut removed: HashSet<NodeId> =
        subgraph.outputs.iter().map(|m| m.node.clone()).collect();
    let keep: HashSet<NodeId> = captures.values().map(|c| c.node.clone()).collect();

    loop {
        let doomed: Vec<NodeId> = document
            .nodes()
            .filter(|(id, node)| {
                !keep.contains(id)
                    && node
                        .link_inputs()
                        .any(|(_, link)| removed.contains(&link.source))
            })
            .map(|(id, _)| id.clone())
            .collect();

        if doomed.is_empty() {
            break;
        }
        for id in doomed {
            document.remove(&id);
            removed.insert(id);
        }
    }
}

/// Rewrites path-bearing slots for the remote host's separator.
///
/// Model loaders reference checkpoints by relative path; when the
/// local and remote OS families disagree, the separators must be
/// swapped or the remote lookup misses.
pub fn normalize_model_paths(
    document: &mut PromptDocument,
    catalog: &NodeCatalog,
    remote: RemoteOs,
) {
    let local = std::path::MAIN_SEPARATOR;
    let sep = remote.separator();
    if local == sep {
        return;
    }

    for (_, node) in document.nodes_mut() {
        let Some(slot) = catalog.path_slot(&node.class_type) else {
            continue;
        };
        let Some(InputValue::Literal(serde_json::Value::String(path))) =
            node.inputs.get(slot).cloned()
        else {
            continue;
        };
        node.inputs.insert(
            slot.to_owned(),
            InputValue::Literal(serde_json::Value::String(path.replace(local, &sep.to_string()))),
        );
    }
}
