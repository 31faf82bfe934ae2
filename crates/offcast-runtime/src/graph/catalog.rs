//! Node class catalog.
//!
//! The catalog is the host engine's declaration of how node classes
//! participate in subgraph delegation: which slots carry transferable
//! kinds, which classes are resource entry points, which classes stay
//! outside an extracted region, and which remote classes capture each
//! output kind. Boundary classification reads declared slot kinds from
//! here and never inspects runtime values.

use std::collections::{HashMap, HashSet};

use super::id::NodeId;
use super::node::GraphNode;
use super::transfer::TransferKind;

/// Input slot on a marker node carrying the captured link.
pub const MARKER_VALUE_SLOT: &str = "value";
/// Input slot on a marker node naming the output.
pub const MARKER_NAME_SLOT: &str = "name";
/// Input slot on a marker node declaring the output kind.
pub const MARKER_KIND_SLOT: &str = "kind";

/// Remote-side node that records one output kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    /// Class of the capture node inserted into the rewritten document.
    pub class_type: String,
    /// Slot on the capture node that consumes the marker's source link.
    pub input_slot: String,
}

impl CaptureSpec {
    /// Creates a capture spec.
    pub fn new(class_type: impl Into<String>, input_slot: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            input_slot: input_slot.into(),
        }
    }
}

/// Declarations driving extraction and rewriting for one deployment.
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    /// Declared transferable slot kinds, by `(class, slot)`.
    slot_kinds: HashMap<(String, String), TransferKind>,
    /// Classes whose whitelisted literal slots reference local resources.
    entry_points: HashSet<String>,
    /// Classes excluded from extraction; links from them cross the boundary.
    external: HashSet<String>,
    /// Class marking a named job output.
    marker_class: String,
    /// Capture node per output kind.
    captures: HashMap<TransferKind, CaptureSpec>,
    /// Slots holding remote filesystem paths, by class.
    path_slots: HashMap<String, String>,
}

impl NodeCatalog {
    /// Creates an empty catalog with the given marker class.
    pub fn new(marker_class: impl Into<String>) -> Self {
        Self {
            marker_class: marker_class.into(),
            ..Default::default()
        }
    }

    /// Creates a catalog preloaded with the stock worker vocabulary:
    /// image loaders as entry points, preview/save classes as captures,
    /// and checkpoint/LoRA/VAE loaders as path-bearing classes.
    pub fn standard() -> Self {
        let mut catalog = Self::new("RemoteOutput");

        catalog.register_entry_point("LoadImage");
        catalog.register_entry_point("LoadImageMask");
        catalog.register_slot("LoadImage", "image", TransferKind::Image);
        catalog.register_slot("LoadImageMask", "image", TransferKind::Mask);

        catalog.register_capture(TransferKind::Image, CaptureSpec::new("PreviewImage", "images"));
        catalog.register_capture(TransferKind::Mask, CaptureSpec::new("SaveMask", "mask"));
        catalog.register_capture(TransferKind::Latent, CaptureSpec::new("SaveLatent", "samples"));
        for kind in [
            TransferKind::Int,
            TransferKind::Float,
            TransferKind::String,
            TransferKind::Boolean,
        ] {
            catalog.register_capture(kind, CaptureSpec::new("CaptureValue", "value"));
        }

        catalog.register_path_slot("CheckpointLoaderSimple", "ckpt_name");
        catalog.register_path_slot("CheckpointLoader", "ckpt_name");
        catalog.register_path_slot("LoraLoader", "lora_name");
        catalog.register_path_slot("VAELoader", "vae_name");

        catalog
    }

    /// Declares the transferable kind of one input slot.
    pub fn register_slot(
        &mut self,
        class: impl Into<String>,
        slot: impl Into<String>,
        kind: TransferKind,
    ) {
        self.slot_kinds.insert((class.into(), slot.into()), kind);
    }

    /// Declares a class as a resource entry point.
    pub fn register_entry_point(&mut self, class: impl Into<String>) {
        self.entry_points.insert(class.into());
    }

    /// Declares a class as external to any extracted region.
    pub fn register_external(&mut self, class: impl Into<String>) {
        self.external.insert(class.into());
    }

    /// Declares the capture node for one output kind.
    pub fn register_capture(&mut self, kind: TransferKind, spec: CaptureSpec) {
        self.captures.insert(kind, spec);
    }

    /// Declares a slot holding a remote filesystem path.
    pub fn register_path_slot(&mut self, class: impl Into<String>, slot: impl Into<String>) {
        self.path_slots.insert(class.into(), slot.into());
    }

    /// Returns the declared kind of a slot, if it is whitelisted.
    pub fn slot_kind(&self, class: &str, slot: &str) -> Option<TransferKind> {
        // Owned-pair key lookups would allocate per call; a scan stays
        // cheap at catalog sizes (tens of entries).
        self.slot_kinds
            .iter()
            .find(|((c, s), _)| c == class && s == slot)
            .map(|(_, kind)| *kind)
    }

    /// Returns whether a class is a resource entry point.
    pub fn is_entry_point(&self, class: &str) -> bool {
        self.entry_points.contains(class)
    }

    /// Returns whether a class is external to extracted regions.
    pub fn is_external(&self, class: &str) -> bool {
        self.external.contains(class)
    }

    /// Returns whether a node is an output marker.
    pub fn is_marker(&self, node: &GraphNode) -> bool {
        node.class_type == self.marker_class
    }

    /// Returns the marker class name.
    pub fn marker_class(&self) -> &str {
        &self.marker_class
    }

    /// Returns the capture spec for an output kind.
    pub fn capture_for(&self, kind: TransferKind) -> Option<&CaptureSpec> {
        self.captures.get(&kind)
    }

    /// Returns the path-bearing slot of a class, if any.
    pub fn path_slot(&self, class: &str) -> Option<&str> {
        self.path_slots.get(class).map(String::as_str)
    }

    /// Returns whether any of the given nodes carries a path slot.
    pub fn has_path_slots<'a>(&self, nodes: impl IntoIterator<Item = (&'a NodeId, &'a GraphNode)>) -> bool {
        nodes
            .into_iter()
            .any(|(_, node)| self.path_slots.contains_key(&node.class_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_entry_points() {
        let catalog = NodeCatalog::standard();
        assert!(catalog.is_entry_point("LoadImage"));
        assert!(!catalog.is_entry_point("KSampler"));
        assert_eq!(
            catalog.slot_kind("LoadImage", "image"),
            Some(TransferKind::Image)
        );
        assert_eq!(catalog.slot_kind("KSampler", "seed"), None);
    }

    #[test]
    fn test_standard_catalog_captures_every_kind() {
        let catalog = NodeCatalog::standard();
        for kind in [
            TransferKind::Image,
            TransferKind::Latent,
            TransferKind::Mask,
            TransferKind::Int,
            TransferKind::Float,
            TransferKind::String,
            TransferKind::Boolean,
        ] {
            assert!(catalog.capture_for(kind).is_some(), "no capture for {kind}");
        }
    }

    #[test]
    fn test_marker_detection_by_class() {
        let catalog = NodeCatalog::standard();
        assert!(catalog.is_marker(&GraphNode::new("RemoteOutput")));
        assert!(!catalog.is_marker(&GraphNode::new("PreviewImage")));
    }
}
