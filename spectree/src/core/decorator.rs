//! External decorators ("rules") and the scopes they are attached with.
//!
//! A scope remembers the suite depth it was attached at and whether it is
//! inherited by descendant suites. Generations are derived from the current
//! depth rather than stored:
//!
//! ```text
//! depth:        d      d+1    d+2
//! Recursive     gen 0  gen 1  gen 2 ...
//! NonRecursive  gen 0  -      -
//! ```
//!
//! Suite lists keep the most recently attached scope first, and the first
//! scope in a list wraps closest to the work.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::core::description::Description;
use crate::core::hooks::Inner;
use crate::core::types::guarded;

/// Wrapping behavior supplied from outside the engine.
///
/// Both methods default to running the inner work unchanged.
pub trait Decorator: Send + Sync {
    /// Wrap one atomic unit: a spec, or a composite as a whole.
    fn wrap_leaf(&self, description: &Description, inner: &mut Inner<'_>) -> anyhow::Result<()> {
        let _ = description;
        inner.run()
    }

    /// Wrap the child-running pass of the declaring suite, at most once.
    fn wrap_suite(&self, description: &Description, inner: &mut Inner<'_>) -> anyhow::Result<()> {
        let _ = description;
        inner.run()
    }
}

#[derive(Clone)]
enum Source {
    Shared(Arc<dyn Decorator>),
    PerUnit(Arc<dyn Fn() -> Box<dyn Decorator> + Send + Sync>),
}

/// Opaque capability handle for a decorator.
///
/// A handle may be attached at several suites; each attachment becomes its
/// own [`DecoratorScope`].
#[derive(Clone)]
pub struct DecoratorHandle {
    source: Source,
}

impl fmt::Debug for DecoratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Shared(_) => "shared",
            Source::PerUnit(_) => "per-unit",
        };
        f.debug_struct("DecoratorHandle")
            .field("source", &source)
            .finish()
    }
}

impl DecoratorHandle {
    /// One decorator instance used for every wrapped unit.
    pub fn shared<D: Decorator + 'static>(decorator: D) -> Self {
        Self::from_arc(Arc::new(decorator))
    }

    pub fn from_arc(decorator: Arc<dyn Decorator>) -> Self {
        Self {
            source: Source::Shared(decorator),
        }
    }

    /// A fresh decorator instance for every wrapped unit.
    pub fn per_leaf<F, D>(factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Decorator + 'static,
    {
        Self {
            source: Source::PerUnit(Arc::new(move || Box::new(factory()) as Box<dyn Decorator>)),
        }
    }

    pub(crate) fn wrap_leaf(
        &self,
        description: &Description,
        inner: &mut Inner<'_>,
    ) -> anyhow::Result<()> {
        match &self.source {
            Source::Shared(decorator) => decorator.wrap_leaf(description, inner),
            Source::PerUnit(factory) => factory().wrap_leaf(description, inner),
        }
    }

    fn wrap_suite(&self, description: &Description, inner: &mut Inner<'_>) -> anyhow::Result<()> {
        match &self.source {
            Source::Shared(decorator) => decorator.wrap_suite(description, inner),
            Source::PerUnit(factory) => factory().wrap_suite(description, inner),
        }
    }
}

/// Whether a scope is inherited by descendant suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    Recursive,
    NonRecursive,
}

/// A decorator attached to a suite at a given depth.
///
/// The suite-level wrap runs at most once per attachment, even when the
/// tree is run again or entered from several threads at once.
#[derive(Debug, Clone)]
pub struct DecoratorScope {
    handle: DecoratorHandle,
    depth: usize,
    mode: ScopeMode,
    suite_wrapped: Arc<Mutex<bool>>,
}

impl DecoratorScope {
    pub fn new(handle: DecoratorHandle, depth: usize, mode: ScopeMode) -> Self {
        Self {
            handle,
            depth,
            mode,
            suite_wrapped: Arc::new(Mutex::new(false)),
        }
    }

    pub fn handle(&self) -> &DecoratorHandle {
        &self.handle
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Generation of this scope at `depth`, if it reaches that far.
    pub fn generation_at(&self, depth: usize) -> Option<usize> {
        let generation = depth.checked_sub(self.depth)?;
        match self.mode {
            ScopeMode::NonRecursive if generation > 0 => None,
            _ => Some(generation),
        }
    }

    /// Attached at exactly this depth (suite-level, once-only decoration).
    pub fn applies_at_this_generation(&self, depth: usize) -> bool {
        self.generation_at(depth) == Some(0)
    }

    /// Wraps the children of a suite at `depth`.
    pub fn applies_to_child(&self, depth: usize) -> bool {
        self.generation_at(depth).is_some()
    }

    /// Inherited by descendant suites.
    pub fn applies_to_lower_generation(&self) -> bool {
        self.mode == ScopeMode::Recursive
    }

    /// The copy a newly created child suite inherits, if any.
    pub fn for_child(&self) -> Option<DecoratorScope> {
        self.applies_to_lower_generation().then(|| self.clone())
    }

    /// Suite wrap for this attachment; later entries only run `inner`.
    pub(crate) fn wrap_suite_once(
        &self,
        description: &Description,
        inner: &mut Inner<'_>,
    ) -> anyhow::Result<()> {
        if !self.claim_suite_wrap() {
            debug!(suite = %description.path, "suite decorator already ran");
            return inner.run();
        }
        self.handle.wrap_suite(description, inner)
    }

    fn claim_suite_wrap(&self) -> bool {
        let mut wrapped = self
            .suite_wrapped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut *wrapped, true)
    }

    pub fn has_wrapped_suite(&self) -> bool {
        *self
            .suite_wrapped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `block` inside `scopes`; the first scope wraps closest to the block.
pub(crate) fn run_decorated(
    scopes: &[&DecoratorScope],
    apply: &dyn Fn(&DecoratorScope, &mut Inner<'_>) -> anyhow::Result<()>,
    block: &mut dyn FnMut() -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let Some((outer, rest)) = scopes.split_last() else {
        return block();
    };
    let mut next = || run_decorated(rest, apply, &mut *block);
    let mut inner = Inner::new(&mut next);
    guarded(|| apply(outer, &mut inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Decorator for Named {
        fn wrap_leaf(&self, _description: &Description, inner: &mut Inner<'_>) -> anyhow::Result<()> {
            self.log.lock().expect("lock").push(format!("{}>", self.name));
            let result = inner.run();
            self.log.lock().expect("lock").push(format!("<{}", self.name));
            result
        }
    }

    fn description() -> Description {
        Description {
            name: "spec".to_string(),
            path: "root/spec".to_string(),
            kind: crate::core::description::DescriptionKind::Test,
            children: Vec::new(),
        }
    }

    #[test]
    fn recursive_scope_reaches_every_lower_generation() {
        let scope = DecoratorScope::new(
            DecoratorHandle::shared(Named {
                name: "r",
                log: Arc::default(),
            }),
            2,
            ScopeMode::Recursive,
        );
        assert_eq!(scope.generation_at(1), None);
        assert_eq!(scope.generation_at(2), Some(0));
        assert_eq!(scope.generation_at(5), Some(3));
        assert!(scope.applies_at_this_generation(2));
        assert!(!scope.applies_at_this_generation(3));
        assert!(scope.for_child().is_some());
    }

    #[test]
    fn non_recursive_scope_stays_at_declaring_depth() {
        let scope = DecoratorScope::new(
            DecoratorHandle::shared(Named {
                name: "n",
                log: Arc::default(),
            }),
            1,
            ScopeMode::NonRecursive,
        );
        assert!(scope.applies_to_child(1));
        assert!(!scope.applies_to_child(2));
        assert!(scope.for_child().is_none());
    }

    #[test]
    fn last_declared_scope_wraps_innermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = DecoratorScope::new(
            DecoratorHandle::shared(Named {
                name: "first",
                log: Arc::clone(&log),
            }),
            0,
            ScopeMode::Recursive,
        );
        let second = DecoratorScope::new(
            DecoratorHandle::shared(Named {
                name: "second",
                log: Arc::clone(&log),
            }),
            0,
            ScopeMode::Recursive,
        );
        // Suites store the newest scope first.
        let scopes = vec![&second, &first];
        let desc = description();
        let body_log = Arc::clone(&log);
        let mut body = || -> anyhow::Result<()> {
            body_log.lock().expect("lock").push("body".to_string());
            Ok(())
        };

        run_decorated(
            &scopes,
            &|scope, inner| scope.handle().wrap_leaf(&desc, inner),
            &mut body,
        )
        .expect("runs");
        assert_eq!(
            *log.lock().expect("lock"),
            vec!["first>", "second>", "body", "<second", "<first"]
        );
    }

    #[test]
    fn per_leaf_handle_builds_a_fresh_decorator_each_time() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let handle = DecoratorHandle::per_leaf(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Named {
                name: "fresh",
                log: Arc::default(),
            }
        });
        let desc = description();
        for _ in 0..3 {
            let mut body = || -> anyhow::Result<()> { Ok(()) };
            let mut inner = Inner::new(&mut body);
            handle.wrap_leaf(&desc, &mut inner).expect("wrap");
        }
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    struct CountingSuite(Arc<AtomicUsize>);

    impl Decorator for CountingSuite {
        fn wrap_suite(&self, _d: &Description, inner: &mut Inner<'_>) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            inner.run()
        }
    }

    #[test]
    fn suite_wrap_runs_once_per_scope() {
        let count = Arc::new(AtomicUsize::new(0));
        let scope = DecoratorScope::new(
            DecoratorHandle::shared(CountingSuite(Arc::clone(&count))),
            0,
            ScopeMode::NonRecursive,
        );
        let desc = description();
        let ran_body = AtomicUsize::new(0);
        for _ in 0..2 {
            let mut body = || -> anyhow::Result<()> {
                ran_body.fetch_add(1, Ordering::SeqCst);
                Ok(())
            };
            let mut inner = Inner::new(&mut body);
            scope.wrap_suite_once(&desc, &mut inner).expect("wrap");
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(ran_body.load(Ordering::SeqCst), 2);
        assert!(scope.has_wrapped_suite());
    }

    #[test]
    fn one_handle_attached_twice_wraps_each_attachment() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = DecoratorHandle::shared(CountingSuite(Arc::clone(&count)));
        let first = DecoratorScope::new(handle.clone(), 1, ScopeMode::NonRecursive);
        let second = DecoratorScope::new(handle, 1, ScopeMode::NonRecursive);
        let desc = description();
        for scope in [&first, &second] {
            let mut body = || -> anyhow::Result<()> { Ok(()) };
            let mut inner = Inner::new(&mut body);
            scope.wrap_suite_once(&desc, &mut inner).expect("wrap");
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(first.has_wrapped_suite() && second.has_wrapped_suite());
    }
}
