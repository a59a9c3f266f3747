//! Error kinds raised by the engine itself.

use std::sync::Arc;

use thiserror::Error;

/// Errors produced by spectree rather than by user blocks.
#[derive(Debug, Error)]
pub enum SpecError {
    /// A declaration block failed; carried by the synthetic error leaf.
    #[error("encountered an error: {cause:#}")]
    Declaration { cause: Arc<anyhow::Error> },

    /// An around wrapper returned without invoking its inner block.
    #[error("{wrapper} wrapper of '{name}' did not run its inner block")]
    WrapperContract { wrapper: &'static str, name: String },

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("no spec tree is being declared on this thread")]
    NoActiveDeclaration,
}

/// Marker returned through wrappers once a leaf's failures are already recorded.
#[derive(Debug, Error)]
#[error("leaf reported failures")]
pub(crate) struct InnerFailed;

/// True when `err` (or anything in its chain) is the [`InnerFailed`] marker.
pub(crate) fn is_inner_failed(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<InnerFailed>())
}
