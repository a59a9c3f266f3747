//! Setup/teardown composition and around wrappers.
//!
//! - Before-each and after-each hooks are plain ordered chains.
//! - Before-all hooks are one-shot: the first caller runs the block and every
//!   later caller observes the cached outcome, including a cached failure.
//! - Around wrappers receive an [`Inner`] handle and are expected to run it
//!   exactly once. Not running it at all is reported as a contract violation;
//!   running it twice is not detected.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::core::error::SpecError;
use crate::core::types::{Block, IntoOutcome, guarded};

/// Ordered list of hook blocks.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Block>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("len", &self.hooks.len())
            .finish()
    }
}

impl HookChain {
    pub fn push(&mut self, hook: Block) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run hooks in registration order, stopping at the first failure.
    pub fn run_until_failure(&self) -> anyhow::Result<()> {
        for hook in &self.hooks {
            guarded(|| hook())?;
        }
        Ok(())
    }

    /// Run every hook even if earlier ones fail, returning all failures.
    pub fn run_all(&self) -> Vec<anyhow::Error> {
        self.hooks
            .iter()
            .filter_map(|hook| guarded(|| hook()).err())
            .collect()
    }
}

/// A hook that runs at most once per instance, whatever the number of callers.
pub struct OnceHook {
    block: Block,
    outcome: OnceLock<Option<Arc<anyhow::Error>>>,
}

impl fmt::Debug for OnceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceHook")
            .field("has_run", &self.has_run())
            .finish()
    }
}

impl OnceHook {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            outcome: OnceLock::new(),
        }
    }

    /// Run the block if nobody has yet; concurrent callers wait for the first.
    pub fn run(&self) -> Result<(), Arc<anyhow::Error>> {
        let outcome = self.outcome.get_or_init(|| {
            trace!("running one-shot hook");
            guarded(|| (self.block)()).err().map(Arc::new)
        });
        match outcome {
            None => Ok(()),
            Some(err) => Err(Arc::clone(err)),
        }
    }

    pub fn has_run(&self) -> bool {
        self.outcome.get().is_some()
    }
}

/// Handle to the work an around wrapper (or decorator) encloses.
pub struct Inner<'a> {
    block: &'a mut dyn FnMut() -> anyhow::Result<()>,
    invoked: bool,
}

impl<'a> Inner<'a> {
    pub(crate) fn new(block: &'a mut dyn FnMut() -> anyhow::Result<()>) -> Self {
        Self {
            block,
            invoked: false,
        }
    }

    /// Run the enclosed work.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.invoked = true;
        (self.block)()
    }

    pub fn invoked(&self) -> bool {
        self.invoked
    }
}

/// A wrapper around a unit of work.
pub type Around = Arc<dyn Fn(&mut Inner<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Box a user closure as an [`Around`] wrapper.
pub fn around<F, O>(f: F) -> Around
where
    F: Fn(&mut Inner<'_>) -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    Arc::new(move |inner: &mut Inner<'_>| f(inner).into_outcome())
}

/// Run `block` inside `wrappers`, the first wrapper outermost.
///
/// `wrapper` and `name` only label a contract violation.
pub(crate) fn run_around(
    wrappers: &[Around],
    wrapper: &'static str,
    name: &str,
    block: &mut dyn FnMut() -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let Some((outer, rest)) = wrappers.split_first() else {
        return block();
    };
    let mut next = || run_around(rest, wrapper, name, &mut *block);
    let mut inner = Inner::new(&mut next);
    let result = guarded(|| outer(&mut inner));
    let invoked = inner.invoked();
    result?;
    if !invoked {
        return Err(SpecError::WrapperContract {
            wrapper,
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}
