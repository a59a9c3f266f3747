//! Shared block and failure types.
//!
//! Everything the user hands to the engine (behaviors, hooks, declaration
//! bodies) is eventually normalised to `anyhow::Result<()>`, with panics
//! converted into errors so one failing block never unwinds the traversal.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::SpecError;

/// A reusable, thread-safe block of work.
pub type Block = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Conversion from a block's return value into an outcome.
///
/// Lets blocks either return nothing (and fail by panicking) or return a
/// `Result` and use `?`.
pub trait IntoOutcome {
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Box a user closure as a [`Block`].
pub fn block<F, O>(f: F) -> Block
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    Arc::new(move || f().into_outcome())
}

/// Run `f`, turning a panic into an error.
pub(crate) fn guarded<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(SpecError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Which phase of a unit produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The declaration block of a suite failed.
    Declaration,
    /// A before-all or before-each hook failed.
    Setup,
    /// The behavior block itself failed.
    Behavior,
    /// An after-each or after-all hook failed.
    Teardown,
    /// An around wrapper did not run its inner block.
    WrapperContract,
    /// A decorator failed outside of its inner block.
    Decorator,
}

/// One reported failure.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub cause: Arc<anyhow::Error>,
}

impl Failure {
    pub fn new(kind: FailureKind, cause: anyhow::Error) -> Self {
        Self {
            kind: refine_kind(kind, &cause),
            cause: Arc::new(cause),
        }
    }

    /// Failure sharing an already reported cause (cached before-all errors).
    pub fn shared(kind: FailureKind, cause: Arc<anyhow::Error>) -> Self {
        Self {
            kind: refine_kind(kind, &cause),
            cause,
        }
    }

    /// Full message including the error's context chain.
    pub fn message(&self) -> String {
        format!("{:#}", self.cause)
    }
}

/// Engine errors keep their own kind regardless of where they surfaced.
fn refine_kind(kind: FailureKind, cause: &anyhow::Error) -> FailureKind {
    for err in cause.chain() {
        match err.downcast_ref::<SpecError>() {
            Some(SpecError::WrapperContract { .. }) => return FailureKind::WrapperContract,
            Some(SpecError::Declaration { .. }) => return FailureKind::Declaration,
            _ => {}
        }
    }
    kind
}
