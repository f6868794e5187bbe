use std::sync::Arc;

use crate::actions::Action;
use crate::platform::types::Repository;

/// One unit of work: an action to apply to a single repository.
#[derive(Clone)]
pub struct Task {
    /// Position in the input list; duplicates keep distinct indices.
    pub index: usize,
    pub repo: Repository,
    pub action: Arc<dyn Action>,
}

impl Task {
    pub fn description(&self) -> String {
        format!("{} on {}", self.action.name(), self.repo)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("index", &self.index)
            .field("repo", &self.repo)
            .field("action", &self.action.name())
            .finish()
    }
}

/// Inclusion/exclusion filter over `owner/name`. Patterns are either an exact
/// `owner/name` or `owner/*`; matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RepoFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl RepoFilter {
    pub fn allows(&self, repo: &Repository) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| matches(p, repo));
        included && !self.exclude.iter().any(|p| matches(p, repo))
    }
}

fn matches(pattern: &str, repo: &Repository) -> bool {
    let pattern = pattern.trim();
    match pattern.strip_suffix("/*") {
        Some(owner) => owner.eq_ignore_ascii_case(&repo.owner),
        None => pattern.eq_ignore_ascii_case(&repo.full_name()),
    }
}

/// Build the task queue for `repos`, one task per allowed entry, in input order.
pub fn build_tasks(repos: &[Repository], action: &Arc<dyn Action>, filter: &RepoFilter) -> Vec<Task> {
    repos
        .iter()
        .enumerate()
        .filter(|(_, repo)| filter.allows(repo))
        .map(|(index, repo)| Task {
            index,
            repo: repo.clone(),
            action: Arc::clone(action),
        })
        .collect()
}
