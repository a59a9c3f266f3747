//! Reporting protocol between the engine and whoever consumes results.
//!
//! For every leaf the engine emits `test_started` followed by exactly one of
//! `test_finished` / `test_failed`, or a lone `test_ignored`. Suites only
//! appear in events when they have no leaves (ignored) or when suite-level
//! work such as after-all hooks fails.

use std::cell::Cell;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::core::description::Description;
use crate::core::types::{Failure, FailureKind};

/// Receiver of lifecycle events.
pub trait Reporter {
    fn test_started(&self, description: &Description);

    fn test_finished(&self, description: &Description);

    /// Terminal failure event; `failures` is never empty.
    fn test_failed(&self, description: &Description, failures: &[Failure]);

    fn test_ignored(&self, description: &Description);
}

/// Forwards events to several reporters in order.
#[derive(Default)]
pub struct MultiReporter<'a> {
    reporters: Vec<&'a dyn Reporter>,
}

impl<'a> MultiReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl Reporter for MultiReporter<'_> {
    fn test_started(&self, description: &Description) {
        self.reporters
            .iter()
            .for_each(|reporter| reporter.test_started(description));
    }

    fn test_finished(&self, description: &Description) {
        self.reporters
            .iter()
            .for_each(|reporter| reporter.test_finished(description));
    }

    fn test_failed(&self, description: &Description, failures: &[Failure]) {
        self.reporters
            .iter()
            .for_each(|reporter| reporter.test_failed(description, failures));
    }

    fn test_ignored(&self, description: &Description) {
        self.reporters
            .iter()
            .for_each(|reporter| reporter.test_ignored(description));
    }
}

/// Transient listener used by abort-on-first-failure suites.
pub(crate) struct FailureDetector<'a> {
    inner: &'a dyn Reporter,
    failed: Cell<bool>,
}

impl<'a> FailureDetector<'a> {
    pub(crate) fn new(inner: &'a dyn Reporter) -> Self {
        Self {
            inner,
            failed: Cell::new(false),
        }
    }

    pub(crate) fn has_failed_yet(&self) -> bool {
        self.failed.get()
    }
}

impl Reporter for FailureDetector<'_> {
    fn test_started(&self, description: &Description) {
        self.inner.test_started(description);
    }

    fn test_finished(&self, description: &Description) {
        self.inner.test_finished(description);
    }

    fn test_failed(&self, description: &Description, failures: &[Failure]) {
        self.failed.set(true);
        self.inner.test_failed(description, failures);
    }

    fn test_ignored(&self, description: &Description) {
        self.inner.test_ignored(description);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Started,
    Finished,
    Failed,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub name: String,
    pub path: String,
    pub is_test: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,
}

impl Event {
    pub fn new(kind: EventKind, description: &Description, failures: &[Failure]) -> Self {
        Self {
            kind,
            name: description.name.clone(),
            path: description.path.clone(),
            is_test: description.is_test(),
            failures: failures
                .iter()
                .map(|failure| FailureRecord {
                    kind: failure.kind,
                    message: failure.message(),
                })
                .collect(),
        }
    }
}

/// Event counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub started: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Thread-safe reporter that records every event in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: EventKind, description: &Description, failures: &[Failure]) {
        let event = Event::new(kind, description, failures);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of nodes that received an event of `kind`, in event order.
    pub fn names(&self, kind: EventKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .map(|event| event.name)
            .collect()
    }

    /// Events recorded for the node at `path`.
    pub fn for_path(&self, path: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.path == path)
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for event in self.events() {
            match event.kind {
                EventKind::Started => summary.started += 1,
                EventKind::Finished => summary.passed += 1,
                EventKind::Failed => summary.failed += 1,
                EventKind::Ignored => summary.ignored += 1,
            }
        }
        summary
    }
}

impl Reporter for EventLog {
    fn test_started(&self, description: &Description) {
        self.record(EventKind::Started, description, &[]);
    }

    fn test_finished(&self, description: &Description) {
        self.record(EventKind::Finished, description, &[]);
    }

    fn test_failed(&self, description: &Description, failures: &[Failure]) {
        self.record(EventKind::Failed, description, failures);
    }

    fn test_ignored(&self, description: &Description) {
        self.record(EventKind::Ignored, description, &[]);
    }
}
