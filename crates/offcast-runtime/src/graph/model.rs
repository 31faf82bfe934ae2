//! Read-only workflow graph snapshot.

use std::collections::HashMap;

use super::id::NodeId;
use super::node::GraphNode;
use super::value::Link;
use crate::error::{OffloadError, OffloadResult};

/// An immutable snapshot of a workflow graph.
///
/// Built once per dispatch from the host engine's view of the graph.
/// Lookups that miss indicate a malformed graph and surface
/// [`OffloadError::NodeNotFound`]; this is a caller error, never a
/// recoverable runtime condition.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    nodes: HashMap<NodeId, GraphNode>,
}

impl GraphModel {
    /// Creates a snapshot from node pairs.
    pub fn from_nodes(nodes: impl IntoIterator<Item = (NodeId, GraphNode)>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    /// Parses a snapshot from a raw prompt document.
    ///
    /// The document must be a JSON object mapping node IDs to
    /// `{class_type, inputs}` records.
    pub fn from_document(document: serde_json::Value) -> OffloadResult<Self> {
        let nodes: HashMap<NodeId, GraphNode> = serde_json::from_value(document)?;
        Ok(Self { nodes })
    }

    /// Returns the number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns whether a node exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns a node by ID.
    pub fn get_node(&self, id: &NodeId) -> OffloadResult<&GraphNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| OffloadError::NodeNotFound { node: id.clone() })
    }

    /// Resolves a link to its source node.
    pub fn resolve_link(&self, link: &Link) -> OffloadResult<&GraphNode> {
        self.get_node(&link.source)
    }

    /// Returns an iterator over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &GraphNode)> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_document_parses_nodes_and_links() {
        let model = GraphModel::from_document(json!({
            "1": {"class_type": "LoadImage", "inputs": {"image": "cat.png"}},
            "2": {"class_type": "Upscale", "inputs": {"image": ["1", 0], "scale": 2}},
        }))
        .unwrap();

        assert_eq!(model.len(), 2);
        let upscale = model.get_node(&NodeId::from("2")).unwrap();
        let link = upscale.input_link("image").unwrap();
        assert_eq!(link.source, NodeId::from("1"));
        assert_eq!(link.output_index, 0);
    }

    #[test]
    fn test_get_node_missing_is_not_found() {
        let model = GraphModel::default();
        let err = model.get_node(&NodeId::from("9")).unwrap_err();
        assert!(matches!(err, OffloadError::NodeNotFound { .. }));
    }

    #[test]
    fn test_resolve_link_follows_source() {
        let model = GraphModel::from_nodes([
            (NodeId::from("a"), GraphNode::new("Producer")),
            (
                NodeId::from("b"),
                GraphNode::new("Consumer").with_input("value", Link::new("a", 0)),
            ),
        ]);

        let consumer = model.get_node(&NodeId::from("b")).unwrap();
        let link = consumer.input_link("value").unwrap();
        let source = model.resolve_link(link).unwrap();
        assert_eq!(source.class_type, "Producer");
    }
}
