use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::actions::SecurityStatusCheck;
use crate::engine::outcome::{Outcome, RepoOutcome, RunSummary};
use crate::error::Result;

const PROGRESS_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}";

/// Progress bar plus per-repository lines, printed while a run is in flight.
pub struct Reporter {
    bar: ProgressBar,
    verbose: bool,
}

impl Reporter {
    pub fn new(total: usize, verbose: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(PROGRESS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, verbose }
    }

    pub fn on_outcome(&self, outcome: &RepoOutcome) {
        self.bar.inc(1);
        self.bar.set_message(outcome.repo.to_string());
        if self.verbose || outcome.outcome.is_failed() {
            self.bar.println(outcome_line(outcome));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

pub fn outcome_line(outcome: &RepoOutcome) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        outcome.outcome.label(),
        outcome.repo,
        outcome.outcome.message()
    );
    if outcome.attempts > 1 {
        let _ = write!(line, " (attempts: {})", outcome.attempts);
    }
    line
}

/// Header shown before a run starts.
pub fn plan_header(action: &str, repos: usize, workers: usize, dry_run: bool, details: &[String]) -> String {
    let mut out = String::new();
    let mode = if dry_run { "DRY RUN" } else { "LIVE" };
    let _ = writeln!(out, "{action} [{mode}]: {repos} repositories, {workers} workers");
    for line in details {
        let _ = writeln!(out, "  {line}");
    }
    out
}

/// Ask the operator to type `expected` (case-insensitive). Anything else declines.
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    expected: &str,
) -> Result<bool> {
    write!(output, "{prompt} ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case(expected))
}

/// Final console summary.
pub fn render_summary(summary: &RunSummary, findings_dir: Option<&Path>) -> String {
    let mut out = String::new();
    let c = &summary.counts;

    let _ = writeln!(out, "\n{} finished: {} repositories", summary.action, summary.total());
    if summary.dry_run {
        let _ = writeln!(out, "  previewed: {}", c.previewed);
    } else {
        let _ = writeln!(out, "  applied:   {}", c.applied);
        let _ = writeln!(out, "  skipped:   {}", c.skipped);
    }
    let _ = writeln!(out, "  failed:    {}", c.failed);
    if c.cancelled > 0 {
        let _ = writeln!(out, "  cancelled: {}", c.cancelled);
    }

    let failures: Vec<&RepoOutcome> = summary
        .failures()
        .into_iter()
        .filter(|o| !o.outcome.is_cancelled())
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailures:");
        for failure in failures {
            if let Outcome::Failed { error, class } = &failure.outcome {
                let _ = writeln!(
                    out,
                    "  {} [{class:?}, attempts: {}]: {error}",
                    failure.repo, failure.attempts
                );
            }
        }
        let by_class: Vec<String> = summary
            .failures_by_class()
            .into_iter()
            .map(|(class, n)| format!("{class}={n}"))
            .collect();
        let _ = writeln!(out, "  by class: {}", by_class.join(", "));
    }

    if let Some(dir) = findings_dir {
        if c.applied > 0 {
            let _ = writeln!(out, "\nFindings written to {}", dir.display());
        }
    }

    out
}

/// Per-repository feature table for `ghas --check`.
pub fn status_table(summary: &RunSummary) -> String {
    let mut outcomes: Vec<&RepoOutcome> = summary.outcomes.iter().collect();
    outcomes.sort_by(|a, b| a.repo.cmp(&b.repo));

    let width = outcomes
        .iter()
        .map(|o| o.repo.to_string().len())
        .max()
        .unwrap_or(0)
        .max("repository".len())
        + 2;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}{}",
        "repository",
        SecurityStatusCheck::table_header()
    );
    for outcome in outcomes {
        let row = match &outcome.outcome {
            Outcome::Applied { detail } => detail.clone(),
            other => format!("({}) {}", other.label(), other.message()),
        };
        let _ = writeln!(out, "{:<width$}{row}", outcome.repo.to_string());
    }
    out
}

/// Write the full summary as pretty JSON.
pub fn write_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Run report written");
    Ok(())
}
