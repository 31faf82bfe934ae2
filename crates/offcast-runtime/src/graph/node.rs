//! Graph node representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::{InputValue, Link};

/// A single workflow node: a class tag plus its input slots.
///
/// This is both the in-memory snapshot shape and the wire shape used
/// in prompt documents. Slot keys are ordered deterministically so a
/// serialized document is stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node class tag, resolved by the executing engine.
    pub class_type: String,
    /// Input slots by name.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
}

impl GraphNode {
    /// Creates a node of the given class with no inputs.
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: BTreeMap::new(),
        }
    }

    /// Adds an input slot.
    pub fn with_input(mut self, slot: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.insert(slot.into(), value.into());
        self
    }

    /// Returns the value of a slot, if present.
    pub fn input(&self, slot: &str) -> Option<&InputValue> {
        self.inputs.get(slot)
    }

    /// Returns the link held by a slot, if the slot holds one.
    pub fn input_link(&self, slot: &str) -> Option<&Link> {
        self.inputs.get(slot).and_then(InputValue::as_link)
    }

    /// Returns an iterator over slots holding links.
    pub fn link_inputs(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.inputs
            .iter()
            .filter_map(|(slot, value)| value.as_link().map(|link| (slot.as_str(), link)))
    }
}
