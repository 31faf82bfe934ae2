//! Standalone prompt document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OffloadError, OffloadResult};
use crate::graph::{GraphNode, NodeId};

/// A self-contained prompt document in the remote wire format: node
/// IDs mapped to `{class_type, inputs}` records, with links encoded as
/// `[nodeId, outputIndex]` arrays.
///
/// A valid document is link-closed: every link targets a node inside
/// the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptDocument(BTreeMap<NodeId, GraphNode>);

impl PromptDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node.
    pub fn insert(&mut self, id: NodeId, node: GraphNode) {
        self.0.insert(id, node);
    }

    /// Removes a node, returning it if present.
    pub fn remove(&mut self, id: &NodeId) -> Option<GraphNode> {
        self.0.remove(id)
    }

    /// Returns a node by ID.
    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.0.get(id)
    }

    /// Returns a mutable node by ID.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        self.0.get_mut(id)
    }

    /// Returns whether a node exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains_key(id)
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the document is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &GraphNode)> {
        self.0.iter()
    }

    /// Returns an iterator over all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.0.keys()
    }

    /// Returns a mutable iterator over all nodes.
    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = (&NodeId, &mut GraphNode)> {
        self.0.iter_mut()
    }

    /// Verifies the document is link-closed.
    pub fn validate_links(&self) -> OffloadResult<()> {
        for (id, node) in &self.0 {
            for (slot, link) in node.link_inputs() {
                if !self.0.contains_key(&link.source) {
                    return Err(OffloadError::UnresolvedLink {
                        node: id.clone(),
                        slot: slot.to_owned(),
                        target: link.source.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<(NodeId, GraphNode)> for PromptDocument {
    fn from_iter<T: IntoIterator<Item = (NodeId, GraphNode)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
