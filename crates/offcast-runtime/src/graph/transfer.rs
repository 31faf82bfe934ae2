//! Transferable value kinds.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The closed set of value kinds the engine can move between local and
/// remote execution contexts.
///
/// Every boundary crossing and every job output declares one of these;
/// anything outside the set is passed through untouched and expected
/// to resolve identically on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferKind {
    /// Decoded image batch.
    Image,
    /// Latent tensor.
    Latent,
    /// Single-channel mask.
    Mask,
    /// Integer scalar.
    Int,
    /// Floating-point scalar.
    Float,
    /// Text value.
    String,
    /// Boolean flag.
    Boolean,
}

/// How a kind crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferClass {
    /// Carried as uploaded/downloaded bytes.
    Resource,
    /// Inlined as a JSON value.
    Primitive,
}

impl TransferKind {
    /// Returns how values of this kind are transferred.
    pub const fn class(&self) -> TransferClass {
        match self {
            TransferKind::Image | TransferKind::Latent | TransferKind::Mask => {
                TransferClass::Resource
            }
            TransferKind::Int
            | TransferKind::Float
            | TransferKind::String
            | TransferKind::Boolean => TransferClass::Primitive,
        }
    }

    /// Returns whether this kind is carried as resource bytes.
    pub const fn is_resource(&self) -> bool {
        matches!(self.class(), TransferClass::Resource)
    }

    /// Returns the filename extension used when uploading values of
    /// this kind, for resource kinds only.
    pub const fn file_extension(&self) -> Option<&'static str> {
        match self {
            TransferKind::Image | TransferKind::Mask => Some("png"),
            TransferKind::Latent => Some("latent"),
            _ => None,
        }
    }
}
