//! Declarative, hierarchical spec trees.
//!
//! Suites nest, leaves hold behaviors, and hooks, wrappers, decorators, tags
//! and focus shape how a tree runs. The crate is split into:
//!
//! - **[`core`]**: Plain data and small algorithms (names, tags, hook chains,
//!   decorator scopes, descriptions, failures). No global state.
//! - **[`tree`]** and **[`run`]**: The arena-backed tree and its execution
//!   against a [`report::Reporter`].
//! - **[`declare`]**: The ambient, per-thread declaration API (`describe`,
//!   `it`, hooks, tags) that builds a [`tree::Tree`].
//! - **[`harness`]**: A command-line entry point with tag filters, options
//!   file and text or JSON output.

pub mod config;
pub mod core;
pub mod declare;
pub mod exit_codes;
pub mod harness;
pub mod logging;
pub mod report;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
pub mod variable;

pub use crate::config::SpecOptions;
pub use crate::core::decorator::{Decorator, DecoratorHandle, ScopeMode};
pub use crate::core::description::{Description, DescriptionKind};
pub use crate::core::error::SpecError;
pub use crate::core::hooks::Inner;
pub use crate::core::types::{Failure, FailureKind};
pub use crate::declare::{
    after_all, after_each, apply_decorator, around_all, around_each, before_all, before_each,
    composite, declare, declare_with, describe, exclude_tags, fcomposite, fdescribe, fit,
    ignore_next, include_tags, it, pending, tag, xcomposite, xdescribe, xit,
};
pub use crate::report::{EventLog, Reporter, RunSummary};
pub use crate::tree::{ChildStrategy, NodeId, SpecId, SuiteId, Tree};
pub use crate::variable::{Variable, let_value};
