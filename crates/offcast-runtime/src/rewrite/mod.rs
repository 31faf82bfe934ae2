//! Prompt rewriting.
//!
//! Turns an extracted closure into a standalone, link-closed prompt
//! document: boundary slots are replaced by inlined values or uploaded
//! resource references, output markers are replaced by remote-side
//! capture nodes, and everything else is carried over unchanged.

mod document;
mod rewriter;

pub use document::PromptDocument;
pub use rewriter::{
    BoundaryBindings, CaptureTarget, ResolvedBoundary, RewrittenPrompt, normalize_model_paths,
    rewrite,
};
