use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, ErrorClass};
use crate::platform::types::Repository;

/// Result of applying an action to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Applied { detail: String },
    Skipped { reason: String },
    Failed { error: String, class: ErrorClass },
    DryRunPreview { description: String },
}

impl Outcome {
    pub fn failed(error: &AppError) -> Self {
        Outcome::Failed {
            error: error.to_string(),
            class: error.class(),
        }
    }

    pub fn cancelled() -> Self {
        Outcome::failed(&AppError::PoolCancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Outcome::Failed {
                class: ErrorClass::Cancelled,
                ..
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied { .. } => "applied",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
            Outcome::DryRunPreview { .. } => "preview",
        }
    }

    /// Human-readable detail line for this outcome.
    pub fn message(&self) -> &str {
        match self {
            Outcome::Applied { detail } => detail,
            Outcome::Skipped { reason } => reason,
            Outcome::Failed { error, .. } => error,
            Outcome::DryRunPreview { description } => description,
        }
    }
}

/// One repository's outcome, as recorded by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RepoOutcome {
    /// Position of the task in the submitted queue.
    pub index: usize,
    pub repo: Repository,
    pub outcome: Outcome,
    /// Number of `apply` attempts made (1 for a dry-run preview, 0 if never started).
    pub attempts: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub previewed: usize,
    pub cancelled: usize,
}

/// Aggregate of a whole run. Outcomes are kept in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub action: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<RepoOutcome>,
}

impl RunSummary {
    pub fn new(action: &str, dry_run: bool) -> Self {
        Self {
            action: action.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            counts: OutcomeCounts::default(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: RepoOutcome) {
        match &outcome.outcome {
            Outcome::Applied { .. } => self.counts.applied += 1,
            Outcome::Skipped { .. } => self.counts.skipped += 1,
            Outcome::Failed { .. } => {
                self.counts.failed += 1;
                if outcome.outcome.is_cancelled() {
                    self.counts.cancelled += 1;
                }
            }
            Outcome::DryRunPreview { .. } => self.counts.previewed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    /// 0 when every outcome is applied, skipped or previewed; 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }

    /// Failed outcomes sorted by repository.
    pub fn failures(&self) -> Vec<&RepoOutcome> {
        let mut failures: Vec<&RepoOutcome> =
            self.outcomes.iter().filter(|o| o.outcome.is_failed()).collect();
        failures.sort_by(|a, b| a.repo.cmp(&b.repo).then(a.index.cmp(&b.index)));
        failures
    }

    /// Outcome counts grouped by error class, for the failure breakdown.
    pub fn failures_by_class(&self) -> BTreeMap<String, usize> {
        let mut by_class = BTreeMap::new();
        for outcome in &self.outcomes {
            if let Outcome::Failed { class, .. } = &outcome.outcome {
                *by_class.entry(format!("{class:?}")).or_insert(0) += 1;
            }
        }
        by_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_outcome(index: usize, name: &str, outcome: Outcome) -> RepoOutcome {
        RepoOutcome {
            index,
            repo: Repository::new("octo-org", name),
            outcome,
            attempts: 1,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_counts_and_exit_code() {
        let mut summary = RunSummary::new("labels", false);
        summary.record(repo_outcome(
            0,
            "a",
            Outcome::Applied {
                detail: "created 2".to_string(),
            },
        ));
        summary.record(repo_outcome(
            1,
            "b",
            Outcome::Skipped {
                reason: "archived".to_string(),
            },
        ));
        assert_eq!(summary.exit_code(), 0);

        summary.record(repo_outcome(2, "c", Outcome::cancelled()));
        summary.finalize();

        assert_eq!(summary.counts.applied, 1);
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.cancelled, 1);
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.finished_at.is_some());
        assert_eq!(summary.failures_by_class().get("Cancelled"), Some(&1));
    }

    #[test]
    fn test_failures_sorted_by_repo() {
        let mut summary = RunSummary::new("ghas", false);
        let err = AppError::Auth("forbidden".to_string());
        summary.record(repo_outcome(0, "zeta", Outcome::failed(&err)));
        summary.record(repo_outcome(1, "alpha", Outcome::failed(&err)));

        let names: Vec<&str> = summary.failures().iter().map(|o| o.repo.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_serializes_tagged_outcome() {
        let outcome = Outcome::DryRunPreview {
            description: "would create label bug".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "dry_run_preview");
        assert_eq!(json["description"], "would create label bug");
    }
}
