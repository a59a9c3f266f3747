//! Ambient declaration API.
//!
//! `declare` opens a session on the current thread; inside it, nested calls
//! such as [`describe`] and [`it`] attach themselves to whichever suite is
//! on top of the session's stack. Sessions are thread-local, so separate
//! threads can declare independent trees at the same time, and they nest,
//! so a spec body may declare and run a tree of its own.
//!
//! Every function here except `declare`/`declare_with` panics when called
//! outside a session.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{SpecOptions, env_lookup};
use crate::core::decorator::{DecoratorHandle, ScopeMode};
use crate::core::error::SpecError;
use crate::core::hooks::{Inner, around};
use crate::core::types::{IntoOutcome, block, guarded};
use crate::tree::{NodeId, SuiteId, Tree};

/// Name of the leaf that replaces a suite whose declaration failed.
pub const DECLARATION_ERROR_SPEC: &str = "encountered an error";

struct Session {
    tree: Tree,
    stack: Vec<SuiteId>,
}

thread_local! {
    static SESSIONS: RefCell<Vec<Session>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` against the active tree and the suite currently being declared.
fn with_current<R>(f: impl FnOnce(&mut Tree, SuiteId) -> R) -> R {
    SESSIONS.with(|sessions| {
        let mut sessions = sessions.borrow_mut();
        let Some(session) = sessions.last_mut() else {
            panic!("{}", SpecError::NoActiveDeclaration);
        };
        let Some(current) = session.stack.last().copied() else {
            panic!("{}", SpecError::NoActiveDeclaration);
        };
        f(&mut session.tree, current)
    })
}

fn with_stack<R>(f: impl FnOnce(&mut Vec<SuiteId>) -> R) -> R {
    SESSIONS.with(|sessions| {
        let mut sessions = sessions.borrow_mut();
        let Some(session) = sessions.last_mut() else {
            panic!("{}", SpecError::NoActiveDeclaration);
        };
        f(&mut session.stack)
    })
}

/// True while a declaration session is open on this thread.
pub fn is_declaring() -> bool {
    SESSIONS.with(|sessions| !sessions.borrow().is_empty())
}

/// Declare a tree, taking tag configuration from the process environment.
pub fn declare<F, O>(name: &str, block: F) -> Tree
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    declare_with(&SpecOptions::default(), env_lookup, name, block)
}

/// Declare a tree with explicit options and property lookup.
///
/// Tag filters resolved from `options` and `lookup` are applied to the root
/// before `block` runs, so calls to [`include_tags`] / [`exclude_tags`]
/// inside the block take precedence.
pub fn declare_with<F, O, L>(options: &SpecOptions, lookup: L, name: &str, block: F) -> Tree
where
    F: FnOnce() -> O,
    O: IntoOutcome,
    L: Fn(&str) -> Option<String>,
{
    let tree = Tree::new(name);
    let root = tree.root();
    let tags = options.resolve_tags(lookup);
    debug!(
        root = name,
        include = ?tags.include,
        exclude = ?tags.exclude,
        "opening declaration session"
    );

    SESSIONS.with(|sessions| {
        let mut tree = tree;
        tree.include_tags(root, tags.include);
        tree.exclude_tags(root, tags.exclude);
        sessions.borrow_mut().push(Session {
            tree,
            stack: Vec::new(),
        });
    });

    begin_declaration(root, block);

    let session = SESSIONS.with(|sessions| sessions.borrow_mut().pop());
    match session {
        Some(session) => session.tree,
        None => unreachable!("declaration session closed while declaring"),
    }
}

/// Push `suite`, run its declaration block, pop.
///
/// If the block fails, everything it attached to `suite` is discarded and
/// replaced by a single failing leaf carrying the original error.
fn begin_declaration<F, O>(suite: SuiteId, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    with_stack(|stack| stack.push(suite));
    let outcome = guarded(|| block().into_outcome());
    with_stack(|stack| stack.pop());

    if let Err(err) = outcome {
        let cause = Arc::new(err);
        with_current_tree(|tree| {
            warn!(
                suite = %tree.name(suite.into()),
                error = %format!("{cause:#}"),
                "declaration failed"
            );
            tree.remove_all_children(suite);
            let failing = Arc::clone(&cause);
            tree.add_spec(
                suite,
                DECLARATION_ERROR_SPEC,
                Some(Arc::new(move || -> anyhow::Result<()> {
                    Err(SpecError::Declaration {
                        cause: Arc::clone(&failing),
                    }
                    .into())
                })),
            );
        });
    }
}

fn with_current_tree<R>(f: impl FnOnce(&mut Tree) -> R) -> R {
    SESSIONS.with(|sessions| {
        let mut sessions = sessions.borrow_mut();
        let Some(session) = sessions.last_mut() else {
            panic!("{}", SpecError::NoActiveDeclaration);
        };
        f(&mut session.tree)
    })
}

/// Declare a nested suite.
pub fn describe<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    let suite = with_current(|tree, current| tree.add_suite(current, name));
    begin_declaration(suite, block);
}

/// Declare a focused suite: only focused siblings run.
pub fn fdescribe<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    let suite = with_current(|tree, current| {
        let suite = tree.add_suite(current, name);
        tree.focus(suite.into());
        suite
    });
    begin_declaration(suite, block);
}

/// Declare an ignored suite; everything declared inside it is ignored.
pub fn xdescribe<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    ignore_next();
    describe(name, block);
}

/// Declare a composite: a suite of steps run and counted as one test.
///
/// Once a step fails, the remaining steps report ignored.
pub fn composite<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    let suite = with_current(|tree, current| tree.add_composite(current, name));
    begin_declaration(suite, block);
}

pub fn fcomposite<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    let suite = with_current(|tree, current| {
        let suite = tree.add_composite(current, name);
        tree.focus(suite.into());
        suite
    });
    begin_declaration(suite, block);
}

pub fn xcomposite<F, O>(name: &str, block: F)
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    ignore_next();
    composite(name, block);
}

/// Declare a spec.
pub fn it<F, O>(name: &str, behavior: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| {
        tree.add_spec(current, name, Some(block(behavior)));
    });
}

/// Declare a focused spec.
pub fn fit<F, O>(name: &str, behavior: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| {
        let spec = tree.add_spec(current, name, Some(block(behavior)));
        tree.focus(spec.into());
    });
}

/// Declare an ignored spec.
pub fn xit<F, O>(name: &str, behavior: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| {
        let spec = tree.add_spec(current, name, Some(block(behavior)));
        tree.ignore(NodeId::Spec(spec));
    });
}

/// Declare a spec without a behavior yet; it always reports ignored.
pub fn pending(name: &str) {
    with_current(|tree, current| {
        tree.add_spec(current, name, None);
    });
}

/// Run once before the first spec of the current suite that runs.
pub fn before_all<F, O>(hook: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.before_all(current, block(hook)));
}

/// Run once after all children of the current suite.
pub fn after_all<F, O>(hook: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.after_all(current, block(hook)));
}

/// Run before every spec declared under the current suite.
pub fn before_each<F, O>(hook: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.before_each(current, block(hook)));
}

/// Run after every spec declared under the current suite, even failed ones.
pub fn after_each<F, O>(hook: F)
where
    F: Fn() -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.after_each(current, block(hook)));
}

/// Wrap every spec under the current suite. The wrapper must call
/// [`Inner::run`] exactly once.
pub fn around_each<F, O>(wrapper: F)
where
    F: Fn(&mut Inner<'_>) -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.around_each(current, around(wrapper)));
}

/// Wrap the run of all children of the current suite. The wrapper must call
/// [`Inner::run`] exactly once.
pub fn around_all<F, O>(wrapper: F)
where
    F: Fn(&mut Inner<'_>) -> O + Send + Sync + 'static,
    O: IntoOutcome,
{
    with_current(|tree, current| tree.around_all(current, around(wrapper)));
}

/// Tag the next suite or spec declared in the current suite.
pub fn tag<I, S>(tags: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    with_current(|tree, current| tree.tag_next(current, tags));
}

/// Replace the include tags of the current suite.
pub fn include_tags<I, S>(tags: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    with_current(|tree, current| tree.include_tags(current, tags));
}

/// Replace the exclude tags of the current suite.
pub fn exclude_tags<I, S>(tags: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    with_current(|tree, current| tree.exclude_tags(current, tags));
}

/// Ignore the next suite or spec declared in the current suite.
pub fn ignore_next() {
    with_current(|tree, current| tree.ignore_next(current));
}

/// Attach a decorator to the current suite.
pub fn apply_decorator(handle: DecoratorHandle, mode: ScopeMode) {
    with_current(|tree, current| tree.apply_decorator(current, handle, mode));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecOptions;

    fn no_properties(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn nested_calls_attach_to_the_innermost_suite() {
        let tree = declare_with(&SpecOptions::default(), no_properties, "root", || {
            describe("outer", || {
                it("one", || {});
                describe("inner", || {
                    it("two", || {});
                });
            });
            it("three", || {});
        });

        let outline = tree.root_description().outline();
        assert_eq!(outline, "root\n  outer\n    one\n    inner\n      two\n  three\n");
        assert!(!is_declaring());
    }

    #[test]
    fn failing_declaration_is_replaced_by_an_error_leaf() {
        let tree = declare_with(&SpecOptions::default(), no_properties, "root", || {
            describe("broken", || -> anyhow::Result<()> {
                it("first", || {});
                it("second", || {});
                anyhow::bail!("fixture missing")
            });
            it("sibling", || {});
        });

        let description = tree.root_description();
        let broken = &description.children[0];
        assert_eq!(broken.children.len(), 1);
        assert_eq!(broken.children[0].name, DECLARATION_ERROR_SPEC);
        assert_eq!(description.children[1].name, "sibling");
    }

    #[test]
    fn declaration_panic_is_captured_too() {
        let tree = declare_with(&SpecOptions::default(), no_properties, "root", || {
            describe("broken", || -> anyhow::Result<()> {
                it("first", || {});
                panic!("bad table");
            });
        });
        let description = tree.root_description();
        assert_eq!(description.children[0].children[0].name, DECLARATION_ERROR_SPEC);
    }

    #[test]
    fn sessions_nest_without_leaking() {
        let outer = declare_with(&SpecOptions::default(), no_properties, "outer", || {
            let inner = declare_with(&SpecOptions::default(), no_properties, "inner", || {
                it("inner spec", || {});
            });
            assert_eq!(inner.leaf_count(inner.root().into()), 1);
            it("outer spec", || {});
        });
        assert_eq!(outer.root_description().children[0].name, "outer spec");
    }

    #[test]
    #[should_panic(expected = "no spec tree is being declared")]
    fn declaring_outside_a_session_panics() {
        it("orphan", || {});
    }
}
