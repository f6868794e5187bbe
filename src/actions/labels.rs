use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::{AppError, Result};
use crate::platform::types::{Label, LabelSpec, Repository};
use crate::platform::Platform;

/// Reconcile issue labels against a desired set.
pub struct LabelSync {
    platform: Arc<dyn Platform>,
    labels: Vec<LabelSpec>,
    prune: bool,
}

impl LabelSync {
    pub fn new(platform: Arc<dyn Platform>, labels: Vec<LabelSpec>, prune: bool) -> Result<Self> {
        if labels.is_empty() {
            return Err(AppError::Validation("No labels defined".to_string()));
        }

        let labels = labels
            .into_iter()
            .map(LabelSpec::normalized)
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(label.name.to_lowercase()) {
                return Err(AppError::Validation(format!(
                    "Label {:?} is defined more than once",
                    label.name
                )));
            }
        }

        Ok(Self {
            platform,
            labels,
            prune,
        })
    }

    fn needs_update(existing: &Label, desired: &LabelSpec) -> bool {
        existing.name != desired.name
            || !existing.color.eq_ignore_ascii_case(&desired.color)
            || desired
                .description
                .as_ref()
                .is_some_and(|d| existing.description.as_deref().unwrap_or("") != d)
    }
}

#[async_trait]
impl Action for LabelSync {
    fn name(&self) -> &str {
        "labels"
    }

    fn describe(&self, repo: &Repository) -> String {
        let names: Vec<&str> = self.labels.iter().map(|l| l.name.as_str()).collect();
        let mut description = format!("would ensure labels [{}] on {repo}", names.join(", "));
        if self.prune {
            description.push_str(" and delete any others");
        }
        description
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        let existing: HashMap<String, Label> = self
            .platform
            .list_labels(repo)
            .await?
            .into_iter()
            .map(|l| (l.name.to_lowercase(), l))
            .collect();

        let mut created = Vec::new();
        let mut updated = Vec::new();
        for desired in &self.labels {
            match existing.get(&desired.name.to_lowercase()) {
                None => {
                    self.platform.create_label(repo, desired).await?;
                    created.push(desired.name.as_str());
                }
                Some(current) if Self::needs_update(current, desired) => {
                    self.platform
                        .update_label(repo, &current.name, desired)
                        .await?;
                    updated.push(desired.name.as_str());
                }
                Some(_) => {}
            }
        }

        let mut deleted = Vec::new();
        if self.prune {
            let wanted: HashSet<String> =
                self.labels.iter().map(|l| l.name.to_lowercase()).collect();
            let mut extras: Vec<&Label> = existing
                .iter()
                .filter(|(key, _)| !wanted.contains(*key))
                .map(|(_, label)| label)
                .collect();
            extras.sort_by(|a, b| a.name.cmp(&b.name));
            for label in extras {
                self.platform.delete_label(repo, &label.name).await?;
                deleted.push(label.name.clone());
            }
        }

        tracing::debug!(
            repo = %repo,
            created = created.len(),
            updated = updated.len(),
            deleted = deleted.len(),
            "Labels reconciled"
        );

        if created.is_empty() && updated.is_empty() && deleted.is_empty() {
            return Ok("labels up to date".to_string());
        }

        let mut parts = Vec::new();
        if !created.is_empty() {
            parts.push(format!("created {}", created.join(", ")));
        }
        if !updated.is_empty() {
            parts.push(format!("updated {}", updated.join(", ")));
        }
        if !deleted.is_empty() {
            parts.push(format!("deleted {}", deleted.join(", ")));
        }
        Ok(parts.join("; "))
    }

    fn cost(&self) -> u64 {
        1 + self.labels.len() as u64
    }
}
