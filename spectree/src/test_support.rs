//! Helpers for tests that declare and run small trees.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SpecOptions;
use crate::core::types::IntoOutcome;
use crate::declare::declare_with;
use crate::report::{EventKind, EventLog};
use crate::tree::Tree;

/// Declare a tree named `root` without consulting the environment.
pub fn declare_isolated<F, O>(block: F) -> Tree
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    declare_with(&SpecOptions::default(), |_| None, "root", block)
}

/// Declare with [`declare_isolated`], run once, and return the recorded events.
pub fn run_recorded<F, O>(block: F) -> EventLog
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    run_tree(&declare_isolated(block))
}

pub fn run_tree(tree: &Tree) -> EventLog {
    let log = EventLog::new();
    tree.run(&log);
    log
}

pub fn finished(log: &EventLog) -> Vec<String> {
    log.names(EventKind::Finished)
}

pub fn failed(log: &EventLog) -> Vec<String> {
    log.names(EventKind::Failed)
}

pub fn ignored(log: &EventLog) -> Vec<String> {
    log.names(EventKind::Ignored)
}

/// Failure messages recorded for the node at `path`, in order.
pub fn failure_messages(log: &EventLog, path: &str) -> Vec<String> {
    log.for_path(path)
        .into_iter()
        .flat_map(|event| event.failures)
        .map(|failure| failure.message)
        .collect()
}

/// Ordered, shareable log of what blocks ran.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block that appends `entry` each time it runs.
    pub fn recorder(&self, entry: &'static str) -> impl Fn() + Send + Sync + 'static {
        let journal = self.clone();
        move || journal.push(entry)
    }
}
