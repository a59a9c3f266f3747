//! Diagnostic tracing for the engine itself.
//!
//! Test outcomes go through [`crate::report::Reporter`]; tracing only says
//! what the engine is doing. Targets worth filtering on:
//!
//! | target              | level | events                                          |
//! |---------------------|-------|-------------------------------------------------|
//! | `spectree::declare` | warn  | declaration blocks that failed and were replaced |
//! | `spectree::run`     | warn  | suites whose children never ran                 |
//! | `spectree::run`     | debug | suites entered, failed specs, empty suites      |
//! | `spectree::run`     | trace | passed specs, focus and abort skips             |
//! | `spectree::tree`    | debug | children filtered out by tags                   |
//! | `spectree::config`  | debug | tags resolved from properties                   |

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Variable read before `RUST_LOG`, so a harness binary can trace the engine
/// without changing the filter of the code under test.
pub const LOG_ENV: &str = "SPECTREE_LOG";

pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install a stderr subscriber for engine diagnostics.
///
/// The filter comes from `SPECTREE_LOG`, then `RUST_LOG`, then
/// [`DEFAULT_DIRECTIVE`]. Does nothing if a global subscriber already exists.
///
/// ```bash
/// SPECTREE_LOG=spectree::run=trace cargo run --example calculator
/// ```
pub fn init() {
    // Err only means a global subscriber is already set.
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
