//! Command-line entry point for `harness = false` test targets and demos.
//!
//! ```no_run
//! use spectree::{describe, it};
//!
//! fn main() -> std::process::ExitCode {
//!     spectree::harness::main("arithmetic", || {
//!         describe("addition", || {
//!             it("adds", || assert_eq!(1 + 1, 2));
//!         });
//!     })
//! }
//! ```

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::warn;

use crate::config::{SpecOptions, env_lookup, load_options};
use crate::core::description::Description;
use crate::core::types::{Failure, IntoOutcome};
use crate::declare::declare_with;
use crate::exit_codes;
use crate::logging;
use crate::report::{Event, EventKind, EventLog, MultiReporter, Reporter, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per event, then the summary.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "spectree", about = "Run a declared spec tree")]
pub struct HarnessArgs {
    /// Only run specs carrying one of these tags (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub include_tags: Vec<String>,

    /// Skip specs carrying any of these tags (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub exclude_tags: Vec<String>,

    /// TOML options file; CLI tags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Print the declared tree and exit without running it.
    #[arg(long)]
    pub list: bool,
}

impl HarnessArgs {
    /// Options file (or defaults) with CLI tags layered on top.
    pub fn options(&self) -> Result<SpecOptions> {
        let mut options = match &self.config {
            Some(path) => load_options(path)?,
            None => SpecOptions::default(),
        };
        if !self.include_tags.is_empty() {
            options.include_tags = self.include_tags.clone();
        }
        if !self.exclude_tags.is_empty() {
            options.exclude_tags = self.exclude_tags.clone();
        }
        options.validate().context("validate command-line tags")?;
        Ok(options)
    }
}

/// Parse process arguments, declare, run, print, and map the outcome to an
/// exit code.
pub fn main<F, O>(name: &str, block: F) -> ExitCode
where
    F: FnOnce() -> O,
    O: IntoOutcome,
{
    logging::init();
    let args = HarnessArgs::parse();
    let mut stdout = std::io::stdout().lock();
    ExitCode::from(run_with(&args, name, block, &mut stdout))
}

/// Same as [`main`] with pre-parsed arguments and an explicit output sink.
pub fn run_with<F, O, W>(args: &HarnessArgs, name: &str, block: F, out: &mut W) -> u8
where
    F: FnOnce() -> O,
    O: IntoOutcome,
    W: Write,
{
    match execute(args, name, block, out) {
        Ok(summary) if summary.is_success() => exit_codes::OK,
        Ok(_) => exit_codes::FAILED,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    }
}

fn execute<F, O, W>(args: &HarnessArgs, name: &str, block: F, out: &mut W) -> Result<RunSummary>
where
    F: FnOnce() -> O,
    O: IntoOutcome,
    W: Write,
{
    let options = args.options()?;
    let tree = declare_with(&options, env_lookup, name, block);

    if args.list {
        match args.format {
            OutputFormat::Text => write!(out, "{}", tree.root_description().outline()),
            OutputFormat::Json => writeln!(
                out,
                "{}",
                serde_json::to_string(&tree.root_description()).context("serialize tree")?
            ),
        }
        .context("write listing")?;
        return Ok(RunSummary::default());
    }

    let log = EventLog::new();
    let summary = {
        let console = ConsoleReporter::new(&mut *out, args.format);
        tree.run(&MultiReporter::new().with(&log).with(&console));
        log.summary()
    };

    match args.format {
        OutputFormat::Text => writeln!(
            out,
            "\n{}: {} passed, {} failed, {} ignored",
            if summary.is_success() { "ok" } else { "FAILED" },
            summary.passed,
            summary.failed,
            summary.ignored
        ),
        OutputFormat::Json => writeln!(
            out,
            "{}",
            serde_json::to_string(&summary).context("serialize summary")?
        ),
    }
    .context("write summary")?;
    Ok(summary)
}

/// Prints terminal events as they happen.
struct ConsoleReporter<'w, W: Write> {
    out: RefCell<&'w mut W>,
    format: OutputFormat,
}

impl<'w, W: Write> ConsoleReporter<'w, W> {
    fn new(out: &'w mut W, format: OutputFormat) -> Self {
        Self {
            out: RefCell::new(out),
            format,
        }
    }

    fn emit(&self, kind: EventKind, description: &Description, failures: &[Failure]) {
        let mut out = self.out.borrow_mut();
        let written = match self.format {
            OutputFormat::Text => write_text(&mut **out, kind, description, failures),
            OutputFormat::Json => serde_json::to_string(&Event::new(kind, description, failures))
                .map_err(std::io::Error::other)
                .and_then(|line| writeln!(out, "{line}")),
        };
        if let Err(err) = written {
            warn!(%err, path = %description.path, "could not write event");
        }
    }
}

fn write_text<W: Write>(
    out: &mut W,
    kind: EventKind,
    description: &Description,
    failures: &[Failure],
) -> std::io::Result<()> {
    match kind {
        EventKind::Started => Ok(()),
        EventKind::Finished => writeln!(out, "ok      {}", description.path),
        EventKind::Ignored => writeln!(out, "ignored {}", description.path),
        EventKind::Failed => {
            writeln!(out, "FAILED  {}", description.path)?;
            for failure in failures {
                writeln!(out, "    {:?}: {}", failure.kind, failure.message())?;
            }
            Ok(())
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<'_, W> {
    fn test_started(&self, description: &Description) {
        if self.format == OutputFormat::Json {
            self.emit(EventKind::Started, description, &[]);
        }
    }

    fn test_finished(&self, description: &Description) {
        self.emit(EventKind::Finished, description, &[]);
    }

    fn test_failed(&self, description: &Description, failures: &[Failure]) {
        self.emit(EventKind::Failed, description, failures);
    }

    fn test_ignored(&self, description: &Description) {
        self.emit(EventKind::Ignored, description, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{describe, exclude_tags, it, tag};

    fn args(argv: &[&str]) -> HarnessArgs {
        HarnessArgs::try_parse_from(std::iter::once("spectree").chain(argv.iter().copied()))
            .expect("parse args")
    }

    fn output(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).expect("utf8")
    }

    #[test]
    fn parses_comma_separated_tags() {
        let parsed = args(&["--include-tags", "fast,unit", "--exclude-tags", "slow"]);
        assert_eq!(parsed.include_tags, vec!["fast", "unit"]);
        assert_eq!(parsed.exclude_tags, vec!["slow"]);
        assert_eq!(parsed.format, OutputFormat::Text);
        assert!(!parsed.list);
    }

    #[test]
    fn rejects_unknown_format() {
        let parsed =
            HarnessArgs::try_parse_from(["spectree", "--format", "xml"]).map(|args| args.format);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_tags_override_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("spectree.toml");
        std::fs::write(&path, "include_tags = [\"db\"]\nexclude_tags = [\"slow\"]\n")
            .expect("write");
        let path_arg = path.display().to_string();

        let options = args(&["--config", &path_arg, "--include-tags", "fast"])
            .options()
            .expect("options");
        assert_eq!(options.include_tags, vec!["fast"]);
        assert_eq!(options.exclude_tags, vec!["slow"]);
    }

    #[test]
    fn passing_tree_exits_ok_with_summary() {
        let mut out = Vec::new();
        let code = run_with(
            &args(&[]),
            "root",
            || {
                it("passes", || {});
            },
            &mut out,
        );
        assert_eq!(code, exit_codes::OK);
        let text = output(out);
        assert!(text.contains("ok      root/passes"));
        assert!(text.contains("ok: 1 passed, 0 failed, 0 ignored"));
    }

    #[test]
    fn failing_tree_exits_failed_and_prints_cause() {
        let mut out = Vec::new();
        let code = run_with(
            &args(&[]),
            "root",
            || {
                describe("math", || {
                    it("is broken", || -> anyhow::Result<()> {
                        anyhow::bail!("2 + 2 = 5")
                    });
                });
            },
            &mut out,
        );
        assert_eq!(code, exit_codes::FAILED);
        let text = output(out);
        assert!(text.contains("FAILED  root/math/is broken"));
        assert!(text.contains("Behavior: 2 + 2 = 5"));
    }

    #[test]
    fn json_format_emits_one_object_per_line() {
        let mut out = Vec::new();
        let code = run_with(
            &args(&["--format", "json"]),
            "root",
            || {
                exclude_tags(["slow"]);
                tag(["slow"]);
                it("skipped", || {});
                it("runs", || {});
            },
            &mut out,
        );
        assert_eq!(code, exit_codes::OK);
        let lines: Vec<serde_json::Value> = output(out)
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines[0]["kind"], "ignored");
        assert_eq!(lines[0]["name"], "skipped");
        assert_eq!(lines[1]["kind"], "started");
        assert_eq!(lines[2]["kind"], "finished");
        assert_eq!(lines[3]["passed"], 1);
        assert_eq!(lines[3]["ignored"], 1);
    }

    #[test]
    fn list_prints_outline_without_running() {
        let mut out = Vec::new();
        let code = run_with(
            &args(&["--list"]),
            "root",
            || {
                describe("suite", || {
                    it("never runs", || -> anyhow::Result<()> {
                        anyhow::bail!("should not run")
                    });
                });
            },
            &mut out,
        );
        assert_eq!(code, exit_codes::OK);
        assert_eq!(output(out), "root\n  suite\n    never runs\n");
    }

    #[test]
    fn malformed_config_is_invalid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "include_tags = 3\n").expect("write");
        let path_arg = path.display().to_string();

        let mut out = Vec::new();
        let code = run_with(&args(&["--config", &path_arg]), "root", || {}, &mut out);
        assert_eq!(code, exit_codes::INVALID);
        assert!(out.is_empty());
    }
}
