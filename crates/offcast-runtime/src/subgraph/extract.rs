//! Upstream closure computation and boundary classification.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use super::boundary::{BoundaryInput, BoundaryOrigin, OutputMarker};
use crate::error::{OffloadError, OffloadResult};
use crate::graph::{
    GraphModel, GraphNode, NodeCatalog, NodeId, OutputName, TransferKind,
    MARKER_KIND_SLOT, MARKER_NAME_SLOT, MARKER_VALUE_SLOT,
};

/// Tracing target for extraction operations.
const TRACING_TARGET: &str = "offcast_runtime::subgraph";

/// Traversal state of one node during closure computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    /// On the stack; its ancestor chain is still open.
    InProgress,
    /// Fully processed; revisits are no-ops.
    Done,
}

/// An extracted region: the upstream closure of a start node, the
/// values crossing into it, and the markers naming its outputs.
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// Node IDs reachable by following links backward from the start
    /// node, including the start node itself.
    pub closure: HashSet<NodeId>,
    /// Boundary inputs that must resolve before the region can run
    /// standalone.
    pub boundary: Vec<BoundaryInput>,
    /// Named output markers found in the closure.
    pub outputs: Vec<OutputMarker>,
}

impl Subgraph {
    /// Extracts the upstream closure of `start` and classifies its
    /// boundary crossings.
    ///
    /// The traversal is iterative with an explicit visited map; a link
    /// back into a node whose ancestor chain is still open fails with
    /// [`OffloadError::CycleDetected`]. A closure without at least one
    /// output marker fails with [`OffloadError::NoOutputDefined`].
    pub fn extract(
        graph: &GraphModel,
        catalog: &NodeCatalog,
        start: &NodeId,
    ) -> OffloadResult<Self> {
        let closure = trace_closure(graph, catalog, start)?;
        let boundary = classify_boundary(graph, catalog, &closure)?;
        let outputs = collect_markers(graph, catalog, &closure)?;

        tracing::debug!(
            target: TRACING_TARGET,
            start = %start,
            closure_len = closure.len(),
            boundary_len = boundary.len(),
            output_len = outputs.len(),
            "Subgraph extracted"
        );

        Ok(Self {
            closure,
            boundary,
            outputs,
        })
    }
}

/// Follows every link backward from `start`, stopping at classes the
/// catalog declares external.
fn trace_closure(
    graph: &GraphModel,
    catalog: &NodeCatalog,
    start: &NodeId,
) -> OffloadResult<HashSet<NodeId>> {
    struct Frame {
        id: NodeId,
        pending: Vec<NodeId>,
    }

    let mut states: HashMap<NodeId, VisitState> = HashMap::new();
    let mut stack: Vec<Frame> = Vec::new();

    states.insert(start.clone(), VisitState::InProgress);
    stack.push(Frame {
        id: start.clone(),
        pending: upstream_of(graph, catalog, start)?,
    });

    while let Some(frame) = stack.last_mut() {
        let Some(next) = frame.pending.pop() else {
            states.insert(frame.id.clone(), VisitState::Done);
            stack.pop();
            continue;
        };

        match states.get(&next) {
            Some(VisitState::Done) => {}
            Some(VisitState::InProgress) => {
                return Err(OffloadError::CycleDetected { node: next });
            }
            None => {
                let pending = upstream_of(graph, catalog, &next)?;
                states.insert(next.clone(), VisitState::InProgress);
                stack.push(Frame { id: next, pending });
            }
        }
    }

    Ok(states.into_keys().collect())
}

/// Returns the traversable link sources of one node.
///
/// Sources of an external class are not entered; they stay outside the
/// closure and the consuming slot becomes a boundary candidate.
fn upstream_of(
    graph: &GraphModel,
    catalog: &NodeCatalog,
    id: &NodeId,
) -> OffloadResult<Vec<NodeId>> {
    let node = graph.get_node(id)?;
    let mut sources = Vec::new();
    for (_, link) in node.link_inputs() {
        let source = graph.resolve_link(link)?;
        if !catalog.is_external(&source.class_type) {
            sources.push(link.source.clone());
        }
    }
    Ok(sources)
}

/// Classifies every candidate crossing by the declared kind of its
/// consuming slot.
fn classify_boundary(
    graph: &GraphModel,
    catalog: &NodeCatalog,
    closure: &HashSet<NodeId>,
) -> OffloadResult<Vec<BoundaryInput>> {
    let mut boundary = Vec::new();

    for id in closure {
        let node = graph.get_node(id)?;

        for (slot, value) in &node.inputs {
            let Some(kind) = catalog.slot_kind(&node.class_type, slot) else {
                // Undeclared slots pass through unrewritten and are
                // expected to resolve identically on the remote side.
                continue;
            };

            let origin = match value.as_link() {
                Some(link) if !closure.contains(&link.source) => {
                    BoundaryOrigin::Link(link.clone())
                }
                Some(_) => continue,
                None if catalog.is_entry_point(&node.class_type) => {
                    let literal = value
                        .as_literal()
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    BoundaryOrigin::Literal(literal)
                }
                None => continue,
            };

            boundary.push(BoundaryInput {
                node: id.clone(),
                slot: slot.clone(),
                kind,
                origin,
            });
        }
    }

    // Deterministic order for callers and tests.
    boundary.sort_by(|a, b| (&a.node, &a.slot).cmp(&(&b.node, &b.slot)));
    Ok(boundary)
}

/// Collects and validates the closure's output markers.
fn collect_markers(
    graph: &GraphModel,
    catalog: &NodeCatalog,
    closure: &HashSet<NodeId>,
) -> OffloadResult<Vec<OutputMarker>> {
    let mut outputs: Vec<OutputMarker> = Vec::new();

    for id in closure {
        let node = graph.get_node(id)?;
        if !catalog.is_marker(node) {
            continue;
        }

        let marker = parse_marker(id, node)?;
        if outputs.iter().any(|existing| existing.name == marker.name) {
            return Err(OffloadError::DuplicateOutputName { name: marker.name });
        }
        outputs.push(marker);
    }

    if outputs.is_empty() {
        return Err(OffloadError::NoOutputDefined);
    }

    outputs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(outputs)
}

/// Reads one marker node's name, kind, and captured link.
fn parse_marker(id: &NodeId, node: &GraphNode) -> OffloadResult<OutputMarker> {
    let malformed = |message: &str| OffloadError::MalformedNode {
        node: id.clone(),
        message: message.to_owned(),
    };

    let name = node
        .input(MARKER_NAME_SLOT)
        .and_then(|value| value.as_literal())
        .and_then(|value| value.as_str())
        .ok_or_else(|| malformed("marker requires a literal string `name` input"))?;

    let kind = node
        .input(MARKER_KIND_SLOT)
        .and_then(|value| value.as_literal())
        .and_then(|value| value.as_str())
        .ok_or_else(|| malformed("marker requires a literal string `kind` input"))?;
    let kind = TransferKind::from_str(kind)
        .map_err(|_| malformed("marker `kind` is not a transferable kind"))?;

    let source = node
        .input_link(MARKER_VALUE_SLOT)
        .ok_or_else(|| malformed("marker requires a link `value` input"))?;

    Ok(OutputMarker {
        node: id.clone(),
        name: OutputName::from(name),
        kind,
        source: source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::graph::Link;

    fn marker(name: &str, kind: &str, source: &str) -> GraphNode {
        GraphNode::new("RemoteOutput")
            .with_input(MARKER_VALUE_SLOT, Link::new(source, 0))
            .with_input(MARKER_NAME_SLOT, json!(name))
            .with_input(MARKER_KIND_SLOT, json!(kind))
    }

    fn scenario_graph() -> GraphModel {
        GraphModel::from_nodes([
            (
                NodeId::from("a"),
                GraphNode::new("LoadImage").with_input("image", json!("cat.png")),
            ),
            (
                NodeId::from("b"),
                GraphNode::new("Upscale")
                    .with_input("image", Link::new("a", 0))
                    .with_input("scale", json!(2)),
            ),
            (NodeId::from("c"), marker("result", "image", "b")),
            // Not reachable from the marker.
            (NodeId::from("d"), GraphNode::new("Unrelated")),
        ])
    }

    #[test]
    fn test_closure_is_exactly_the_backward_reachable_set() {
        let graph = scenario_graph();
        let subgraph =
            Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("c")).unwrap();

        let expected: HashSet<NodeId> = ["a", "b", "c"].into_iter().map(NodeId::from).collect();
        assert_eq!(subgraph.closure, expected);
    }

    #[test]
    fn test_entry_point_literal_is_a_resource_boundary() {
        let graph = scenario_graph();
        let subgraph =
            Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("c")).unwrap();

        assert_eq!(subgraph.boundary.len(), 1);
        let input = &subgraph.boundary[0];
        assert_eq!(input.node, NodeId::from("a"));
        assert_eq!(input.slot, "image");
        assert_eq!(input.kind, TransferKind::Image);
        assert_eq!(input.origin, BoundaryOrigin::Literal(json!("cat.png")));
    }

    #[test]
    fn test_external_source_link_crosses_the_boundary() {
        let mut catalog = NodeCatalog::standard();
        catalog.register_external("HostBridge");
        catalog.register_slot("Blend", "overlay", TransferKind::Image);

        let graph = GraphModel::from_nodes([
            (NodeId::from("x"), GraphNode::new("HostBridge")),
            (
                NodeId::from("b"),
                GraphNode::new("Blend").with_input("overlay", Link::new("x", 0)),
            ),
            (NodeId::from("m"), marker("out", "image", "b")),
        ]);

        let subgraph = Subgraph::extract(&graph, &catalog, &NodeId::from("m")).unwrap();

        assert!(!subgraph.closure.contains(&NodeId::from("x")));
        assert_eq!(subgraph.boundary.len(), 1);
        let input = &subgraph.boundary[0];
        assert_eq!(input.node, NodeId::from("b"));
        assert_eq!(input.origin, BoundaryOrigin::Link(Link::new("x", 0)));
    }

    #[test]
    fn test_undeclared_slots_are_not_boundary_inputs() {
        // A checkpoint name is a plain literal with no declared kind;
        // it must pass through untouched.
        let graph = GraphModel::from_nodes([
            (
                NodeId::from("ckpt"),
                GraphNode::new("CheckpointLoaderSimple")
                    .with_input("ckpt_name", json!("sd15.safetensors")),
            ),
            (
                NodeId::from("gen"),
                GraphNode::new("Sampler").with_input("model", Link::new("ckpt", 0)),
            ),
            (NodeId::from("m"), marker("out", "image", "gen")),
        ]);

        let subgraph =
            Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("m")).unwrap();
        assert!(subgraph.boundary.is_empty());
    }

    #[test]
    fn test_diamond_revisit_is_idempotent() {
        let graph = GraphModel::from_nodes([
            (NodeId::from("root"), GraphNode::new("Producer")),
            (
                NodeId::from("left"),
                GraphNode::new("Branch").with_input("in", Link::new("root", 0)),
            ),
            (
                NodeId::from("right"),
                GraphNode::new("Branch").with_input("in", Link::new("root", 1)),
            ),
            (
                NodeId::from("join"),
                GraphNode::new("Join")
                    .with_input("a", Link::new("left", 0))
                    .with_input("b", Link::new("right", 0)),
            ),
            (NodeId::from("m"), marker("out", "image", "join")),
        ]);

        let subgraph =
            Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("m")).unwrap();
        assert_eq!(subgraph.closure.len(), 5);
    }

    #[test]
    fn test_cycle_fails_extraction() {
        let graph = GraphModel::from_nodes([
            (
                NodeId::from("a"),
                GraphNode::new("Loop").with_input("in", Link::new("b", 0)),
            ),
            (
                NodeId::from("b"),
                GraphNode::new("Loop").with_input("in", Link::new("a", 0)),
            ),
            (NodeId::from("m"), marker("out", "image", "a")),
        ]);

        let err = Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("m"))
            .unwrap_err();
        assert!(matches!(err, OffloadError::CycleDetected { .. }));
    }

    #[test]
    fn test_no_marker_fails_extraction() {
        let graph = GraphModel::from_nodes([(NodeId::from("a"), GraphNode::new("Producer"))]);
        let err = Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("a"))
            .unwrap_err();
        assert!(matches!(err, OffloadError::NoOutputDefined));
    }

    #[test]
    fn test_duplicate_output_names_are_rejected() {
        let graph = GraphModel::from_nodes([
            (NodeId::from("a"), GraphNode::new("Producer")),
            (NodeId::from("m1"), marker("same", "image", "a")),
            (NodeId::from("m2"), marker("same", "image", "a")),
            (
                NodeId::from("q"),
                GraphNode::new("Collect")
                    .with_input("x", Link::new("m1", 0))
                    .with_input("y", Link::new("m2", 0)),
            ),
        ]);

        let err = Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("q"))
            .unwrap_err();
        assert!(matches!(err, OffloadError::DuplicateOutputName { .. }));
    }

    #[test]
    fn test_dangling_link_is_a_structural_error() {
        let graph = GraphModel::from_nodes([(
            NodeId::from("m"),
            marker("out", "image", "missing"),
        )]);

        let err = Subgraph::extract(&graph, &NodeCatalog::standard(), &NodeId::from("m"))
            .unwrap_err();
        assert!(matches!(err, OffloadError::NodeNotFound { .. }));
    }
}
