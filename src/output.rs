//! Command output.
//!
//! Each command builds a [`HumanReport`] next to its serializable data. With
//! `--json` the data is printed inside a `cardsync.v1` envelope; otherwise
//! the report is rendered as a header line, aligned facts, pending changes
//! and `warning:`/`hint:` lines matching the error output.

use serde::Serialize;

use crate::engine::{SyncReport, SyncStatus};
use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "cardsync.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable outcome of one command.
#[derive(Debug, Clone)]
pub struct HumanReport {
    command: String,
    outcome: String,
    facts: Vec<(String, String)>,
    changes: Vec<String>,
    warnings: Vec<String>,
    hints: Vec<String>,
}

impl HumanReport {
    pub fn new(command: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            outcome: outcome.into(),
            facts: Vec::new(),
            changes: Vec::new(),
            warnings: Vec::new(),
            hints: Vec::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn fact(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.facts.push((key.into(), value.into()));
        self
    }

    pub fn status(&mut self, key: impl Into<String>, status: SyncStatus) -> &mut Self {
        self.fact(key, status.to_string())
    }

    pub fn change(&mut self, line: impl Into<String>) -> &mut Self {
        self.changes.push(line.into());
        self
    }

    pub fn warn(&mut self, line: impl Into<String>) -> &mut Self {
        self.warnings.push(line.into());
        self
    }

    pub fn hint(&mut self, line: impl Into<String>) -> &mut Self {
        self.hints.push(line.into());
        self
    }

    /// Warn about entries a sync pass skipped or failed to apply.
    pub fn sync_report(&mut self, report: &SyncReport) -> &mut Self {
        if report.skipped > 0 {
            self.warn(format!(
                "{} change(s) skipped because their card or list is gone",
                report.skipped
            ));
        }
        if report.failed > 0 {
            self.warn(format!("{} change(s) failed, see logs", report.failed));
            self.hint(format!("RUST_LOG=cardsync=debug cardsync {}", self.command));
        }
        self
    }
}

pub fn render(report: &HumanReport) -> String {
    let mut out = format!("cardsync {}: {}", report.command, report.outcome);

    let width = report.facts.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in &report.facts {
        out.push_str(&format!("\n  {key:<width$}  {value}"));
    }

    if !report.changes.is_empty() {
        out.push('\n');
        for change in &report.changes {
            out.push_str(&format!("\n  {change}"));
        }
    }

    if !report.warnings.is_empty() || !report.hints.is_empty() {
        out.push('\n');
    }
    for warning in &report.warnings {
        out.push_str(&format!("\nwarning: {warning}"));
    }
    for hint in &report.hints {
        out.push_str(&format!("\nhint: {hint}"));
    }
    out
}

#[derive(Serialize)]
struct Envelope<'a, B: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    #[serde(flatten)]
    body: B,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Body<'a, T: Serialize> {
    Success {
        data: &'a T,
        #[serde(skip_serializing_if = "no_lines")]
        warnings: &'a [String],
        #[serde(skip_serializing_if = "no_lines")]
        hints: &'a [String],
    },
    Error {
        error: ErrorBody,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        hints: Vec<String>,
    },
}

fn no_lines(lines: &&[String]) -> bool {
    lines.is_empty()
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn print_envelope<B: Serialize>(command: &str, body: B) -> Result<()> {
    let envelope = Envelope {
        schema_version: SCHEMA_VERSION,
        command,
        body,
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

pub fn emit<T: Serialize>(options: OutputOptions, data: &T, report: &HumanReport) -> Result<()> {
    if options.json {
        return print_envelope(
            &report.command,
            Body::Success {
                data,
                warnings: &report.warnings,
                hints: &report.hints,
            },
        );
    }
    if !options.quiet {
        println!("{}", render(report));
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hints = error_hints(err);
    if json {
        return print_envelope::<Body<'_, ()>>(
            command,
            Body::Error {
                error: ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                },
                hints,
            },
        );
    }

    eprintln!("error: {err}");
    for hint in hints {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

/// Best-effort command name for error envelopes.
pub fn infer_command_name_from_args() -> String {
    infer_command_name(std::env::args().skip(1))
}

fn infer_command_name(args: impl Iterator<Item = String>) -> String {
    let mut skip_value = false;
    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--vault" {
            skip_value = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return arg;
    }
    "cardsync".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "blocked",
        _ => "operation_failed",
    }
}

fn error_hints(err: &Error) -> Vec<String> {
    match err {
        Error::VaultNotFound(_) => vec!["pass --vault <dir> for an existing directory".to_string()],
        Error::InvalidConfig(_) => vec!["fix .cardsync.toml then retry".to_string()],
        Error::MissingToken => vec!["export CARDSYNC_TOKEN=<token>".to_string()],
        Error::SyncRefused => vec!["cardsync status".to_string()],
        Error::LockFailed(path) => vec![format!(
            "stop the other watcher or remove {}",
            path.to_string_lossy()
        )],
        Error::IdentityMismatch { .. } => {
            vec!["restart cardsync watch to rebuild pending changes".to_string()]
        }
        _ => Vec::new(),
    }
}
