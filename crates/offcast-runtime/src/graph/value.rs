//! Input slot values: literals and links.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use super::id::NodeId;

/// A reference to one output socket of another node.
///
/// Serialized on the wire as a two-element `[nodeId, outputIndex]`
/// array, matching the remote worker's prompt format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    /// Node producing the value.
    pub source: NodeId,
    /// Index of the source node's output socket.
    pub output_index: u32,
}

impl Link {
    /// Creates a link to the given node's output socket.
    pub fn new(source: impl Into<NodeId>, output_index: u32) -> Self {
        Self {
            source: source.into(),
            output_index,
        }
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.source, self.output_index).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (source, output_index) = <(NodeId, u32)>::deserialize(deserializer)?;
        Ok(Self {
            source,
            output_index,
        })
    }
}

/// Value held by one input slot: either an inline literal or a link.
///
/// The wire format does not tag the two cases; a JSON array of exactly
/// `[string, number]` is a link, any other value is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// An inline JSON value.
    Literal(serde_json::Value),
    /// A reference to another node's output.
    Link(Link),
}

impl InputValue {
    /// Classifies a raw JSON value using the wire format's link shape.
    pub fn from_json(value: serde_json::Value) -> Self {
        if let serde_json::Value::Array(items) = &value {
            if items.len() == 2 && items[0].is_string() && items[1].is_u64() {
                let source = NodeId::new(items[0].as_str().unwrap_or_default());
                let output_index = items[1].as_u64().unwrap_or_default() as u32;
                return Self::Link(Link::new(source, output_index));
            }
        }
        Self::Literal(value)
    }

    /// Returns the link, if this value is one.
    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Self::Link(link) => Some(link),
            Self::Literal(_) => None,
        }
    }

    /// Returns the literal value, if this value is one.
    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Link(_) => None,
        }
    }

    /// Returns whether this value is a link.
    pub const fn is_link(&self) -> bool {
        matches!(self, Self::Link(_))
    }
}

impl Serialize for InputValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Link(link) => link.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(serde_json::Value::deserialize(
            deserializer,
        )?))
    }
}

impl From<Link> for InputValue {
    fn from(link: Link) -> Self {
        Self::Link(link)
    }
}

impl From<serde_json::Value> for InputValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}
