//! Execution of a declared tree.
//!
//! One depth-first pass over the tree. Every node reaches a terminal state:
//! leaves are started then finished or failed, or ignored outright; suites
//! without leaves are reported ignored. No failure stops the traversal.
//!
//! Wrapping order around a single spec, outermost first:
//!
//! ```text
//! leaf decorators > around-each (root .. parent) > before-each, behavior, after-each
//! ```
//!
//! and around a suite's children:
//!
//! ```text
//! suite decorators (once) > around-all > children ; after-all
//! ```

use std::cell::{Cell, RefCell};

use tracing::{debug, trace, warn};

use crate::core::decorator::{DecoratorScope, run_decorated};
use crate::core::error::{InnerFailed, is_inner_failed};
use crate::core::hooks::{Around, run_around};
use crate::core::types::{Failure, FailureKind, guarded};
use crate::report::{FailureDetector, Reporter};
use crate::tree::{ChildStrategy, LeafCounts, NodeId, SpecId, SuiteId, Tree};

impl Tree {
    /// Run the whole tree, reporting to `reporter`.
    pub fn run(&self, reporter: &dyn Reporter) {
        let execution = Execution {
            tree: self,
            leaves: self.leaf_counts(),
        };
        execution.run_suite(self.root(), reporter, None);
    }
}

/// Run `tree` once, reporting to `reporter`.
pub fn run(tree: &Tree, reporter: &dyn Reporter) {
    tree.run(reporter);
}

struct Execution<'t> {
    tree: &'t Tree,
    leaves: LeafCounts,
}

impl Execution<'_> {
    /// `floor` is the depth of the innermost enclosing composite; scopes
    /// attached above it wrap the composite as a whole, never its steps.
    fn run_suite(&self, id: SuiteId, reporter: &dyn Reporter, floor: Option<usize>) {
        let suite = self.tree.suite(id);
        let description = self.tree.header(id.into());

        if self.leaves.of(id) == 0 {
            debug!(suite = %suite.path, "suite has no specs");
            reporter.test_ignored(&description);
            self.run_children(id, reporter, floor);
            return;
        }

        debug!(suite = %suite.path, children = suite.children.len(), "running suite");
        let scopes: Vec<&DecoratorScope> = suite
            .decorators
            .iter()
            .filter(|scope| scope.applies_at_this_generation(suite.depth))
            .collect();
        let failures = RefCell::new(Vec::new());
        let children_ran = Cell::new(false);

        let outcome = {
            let mut body = || -> anyhow::Result<()> {
                let mut children = || -> anyhow::Result<()> {
                    children_ran.set(true);
                    self.run_children(id, reporter, floor);
                    Ok(())
                };
                if let Err(err) = run_around(&suite.around_all, "around-all", &suite.path, &mut children)
                {
                    failures
                        .borrow_mut()
                        .push(Failure::new(FailureKind::Setup, err));
                }
                for err in suite.after_all.run_all() {
                    failures
                        .borrow_mut()
                        .push(Failure::new(FailureKind::Teardown, err));
                }
                Ok(())
            };
            run_decorated(
                &scopes,
                &|scope, inner| scope.wrap_suite_once(&description, inner),
                &mut body,
            )
        };

        let mut failures = failures.into_inner();
        if let Err(err) = outcome {
            failures.push(Failure::new(FailureKind::Decorator, err));
        }
        if !children_ran.get() {
            warn!(suite = %suite.path, "children of suite never ran");
            self.report_children_ignored(id, reporter);
        }
        if !failures.is_empty() {
            reporter.test_failed(&description, &failures);
        }
    }

    fn run_children(&self, id: SuiteId, reporter: &dyn Reporter, floor: Option<usize>) {
        let suite = self.tree.suite(id);
        match suite.strategy {
            ChildStrategy::RunAll => {
                for child in &suite.children {
                    self.run_child(id, *child, reporter, floor, false);
                }
            }
            ChildStrategy::AbortOnFirstFailure => {
                let detector = FailureDetector::new(reporter);
                for child in &suite.children {
                    let abort = detector.has_failed_yet();
                    self.run_child(id, *child, &detector, floor, abort);
                }
            }
        }
    }

    fn run_child(
        &self,
        parent: SuiteId,
        child: NodeId,
        reporter: &dyn Reporter,
        floor: Option<usize>,
        abort: bool,
    ) {
        let suite = self.tree.suite(parent);
        if abort {
            trace!(child = %self.tree.path_of(child), "earlier step failed");
            self.report_ignored(child, reporter);
            return;
        }
        if !suite.focused.is_empty() && !suite.focused.contains(&child) {
            trace!(child = %self.tree.path_of(child), "not focused");
            self.report_ignored(child, reporter);
            return;
        }

        let scopes: Vec<&DecoratorScope> = suite
            .decorators
            .iter()
            .filter(|scope| scope.applies_to_child(suite.depth))
            .filter(|scope| floor.is_none_or(|floor| scope.depth() >= floor))
            .collect();

        match child {
            NodeId::Spec(spec) => self.run_spec(spec, reporter, &scopes),
            NodeId::Suite(nested) if self.tree.is_atomic(nested) => {
                self.run_composite(nested, reporter, &scopes);
            }
            NodeId::Suite(nested) => self.run_suite(nested, reporter, floor),
        }
    }

    /// A composite is decorated as one unit; its steps run below a new floor.
    fn run_composite(&self, id: SuiteId, reporter: &dyn Reporter, scopes: &[&DecoratorScope]) {
        let floor = Some(self.tree.depth(id));
        if scopes.is_empty() || self.tree.is_ignored(id.into()) {
            self.run_suite(id, reporter, floor);
            return;
        }

        // decorators see the composite's steps
        let description = self.tree.description(id.into());
        let ran = Cell::new(false);
        let outcome = {
            let mut body = || -> anyhow::Result<()> {
                ran.set(true);
                self.run_suite(id, reporter, floor);
                Ok(())
            };
            run_decorated(
                scopes,
                &|scope, inner| scope.handle().wrap_leaf(&description, inner),
                &mut body,
            )
        };

        if !ran.get() {
            self.report_ignored(id.into(), reporter);
        }
        if let Err(err) = outcome {
            reporter.test_failed(
                &self.tree.header(id.into()),
                &[Failure::new(FailureKind::Decorator, err)],
            );
        }
    }

    fn run_spec(&self, id: SpecId, reporter: &dyn Reporter, scopes: &[&DecoratorScope]) {
        let spec = self.tree.spec(id);
        let description = self.tree.header(id.into());
        let behavior = match &spec.block {
            Some(behavior) if !spec.ignored => behavior,
            _ => {
                reporter.test_ignored(&description);
                return;
            }
        };

        reporter.test_started(&description);
        let lineage = self.tree.lineage(spec.parent);

        for hook in lineage.iter().flat_map(|suite| suite.before_all.iter()) {
            if let Err(cause) = hook.run() {
                debug!(spec = %spec.path, "before-all failed");
                reporter.test_failed(&description, &[Failure::shared(FailureKind::Setup, cause)]);
                return;
            }
        }

        let around: Vec<Around> = lineage
            .iter()
            .flat_map(|suite| suite.around_each.iter().cloned())
            .collect();
        let failures = RefCell::new(Vec::new());

        let outcome = {
            let mut body = || -> anyhow::Result<()> {
                let setup = lineage
                    .iter()
                    .try_for_each(|suite| suite.before_each.run_until_failure());
                match setup {
                    Err(err) => failures
                        .borrow_mut()
                        .push(Failure::new(FailureKind::Setup, err)),
                    Ok(()) => {
                        if let Err(err) = guarded(|| behavior()) {
                            failures
                                .borrow_mut()
                                .push(Failure::new(FailureKind::Behavior, err));
                        }
                    }
                }
                for suite in &lineage {
                    for err in suite.after_each.run_all() {
                        failures
                            .borrow_mut()
                            .push(Failure::new(FailureKind::Teardown, err));
                    }
                }
                if failures.borrow().is_empty() {
                    Ok(())
                } else {
                    Err(InnerFailed.into())
                }
            };
            let mut wrapped = || -> anyhow::Result<()> {
                match run_around(&around, "around-each", &spec.path, &mut body) {
                    Err(err) if !is_inner_failed(&err) => {
                        failures
                            .borrow_mut()
                            .push(Failure::new(FailureKind::Setup, err));
                        Err(InnerFailed.into())
                    }
                    other => other,
                }
            };
            run_decorated(
                scopes,
                &|scope, inner| scope.handle().wrap_leaf(&description, inner),
                &mut wrapped,
            )
        };

        let mut failures = failures.into_inner();
        if let Err(err) = outcome {
            if !is_inner_failed(&err) {
                failures.push(Failure::new(FailureKind::Decorator, err));
            }
        }

        if failures.is_empty() {
            trace!(spec = %spec.path, "passed");
            reporter.test_finished(&description);
        } else {
            debug!(spec = %spec.path, failures = failures.len(), "failed");
            reporter.test_failed(&description, &failures);
        }
    }

    /// Report every leaf under `id` ignored (an empty suite reports itself).
    fn report_ignored(&self, id: NodeId, reporter: &dyn Reporter) {
        match id {
            NodeId::Spec(_) => reporter.test_ignored(&self.tree.header(id)),
            NodeId::Suite(suite) => {
                if self.leaves.of(suite) == 0 {
                    reporter.test_ignored(&self.tree.header(id));
                }
                self.report_children_ignored(suite, reporter);
            }
        }
    }

    fn report_children_ignored(&self, suite: SuiteId, reporter: &dyn Reporter) {
        for child in self.tree.children(suite) {
            self.report_ignored(*child, reporter);
        }
    }
}
