//! In-memory platform used by action tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::Platform;

#[derive(Default)]
struct State {
    labels: HashMap<String, Vec<Label>>,
    topics: HashMap<String, Vec<String>>,
    status: HashMap<String, SecurityStatus>,
    findings: HashMap<(String, FindingKind), serde_json::Value>,
    /// Features whose enable call is rejected with a validation error.
    rejected_features: HashSet<(String, Feature)>,
    missing: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(self, repo: &str, labels: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().labels.insert(
            repo.to_string(),
            labels
                .iter()
                .map(|(name, color)| Label {
                    name: name.to_string(),
                    color: color.to_string(),
                    description: None,
                })
                .collect(),
        );
        self
    }

    pub fn with_topics(self, repo: &str, topics: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .topics
            .insert(repo.to_string(), topics.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_enabled(self, repo: &str, features: &[Feature]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let status = state.status.entry(repo.to_string()).or_default();
            for feature in features {
                status.set(*feature, true);
            }
        }
        self
    }

    pub fn rejecting(self, repo: &str, feature: Feature) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_features
            .insert((repo.to_string(), feature));
        self
    }

    pub fn with_findings(self, repo: &str, kind: FindingKind, value: serde_json::Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .findings
            .insert((repo.to_string(), kind), value);
        self
    }

    pub fn missing(self, repo: &str) -> Self {
        self.state.lock().unwrap().missing.insert(repo.to_string());
        self
    }

    pub fn labels(&self, repo: &str) -> Vec<Label> {
        self.state
            .lock()
            .unwrap()
            .labels
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    pub fn topics(&self, repo: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .topics
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, repo: &str, feature: Feature) -> bool {
        self.state
            .lock()
            .unwrap()
            .status
            .get(repo)
            .map(|s| s.is_enabled(feature))
            .unwrap_or(false)
    }

    /// Mutating calls made so far, as `verb repo detail` strings.
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn check(&self, repo: &Repository) -> Result<String> {
        let key = repo.full_name();
        if self.state.lock().unwrap().missing.contains(&key) {
            return Err(AppError::NotFound(format!("{key} does not exist")));
        }
        Ok(key)
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_labels(&self, repo: &Repository) -> Result<Vec<Label>> {
        let key = self.check(repo)?;
        Ok(self.labels(&key))
    }

    async fn create_label(&self, repo: &Repository, label: &LabelSpec) -> Result<()> {
        let key = self.check(repo)?;
        self.record(format!("create_label {key} {}", label.name));
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(key)
            .or_default()
            .push(Label {
                name: label.name.clone(),
                color: label.color.clone(),
                description: label.description.clone(),
            });
        Ok(())
    }

    async fn update_label(
        &self,
        repo: &Repository,
        current_name: &str,
        label: &LabelSpec,
    ) -> Result<()> {
        let key = self.check(repo)?;
        self.record(format!("update_label {key} {current_name}"));
        let mut state = self.state.lock().unwrap();
        let existing = state
            .labels
            .get_mut(&key)
            .and_then(|labels| labels.iter_mut().find(|l| l.name == current_name))
            .ok_or_else(|| AppError::NotFound(format!("label {current_name}")))?;
        existing.name = label.name.clone();
        existing.color = label.color.clone();
        if label.description.is_some() {
            existing.description = label.description.clone();
        }
        Ok(())
    }

    async fn delete_label(&self, repo: &Repository, name: &str) -> Result<()> {
        let key = self.check(repo)?;
        self.record(format!("delete_label {key} {name}"));
        if let Some(labels) = self.state.lock().unwrap().labels.get_mut(&key) {
            labels.retain(|l| l.name != name);
        }
        Ok(())
    }

    async fn get_topics(&self, repo: &Repository) -> Result<Vec<String>> {
        let key = self.check(repo)?;
        Ok(self.topics(&key))
    }

    async fn replace_topics(&self, repo: &Repository, names: &[String]) -> Result<()> {
        let key = self.check(repo)?;
        self.record(format!("replace_topics {key} {}", names.join(",")));
        self.state.lock().unwrap().topics.insert(key, names.to_vec());
        Ok(())
    }

    async fn security_status(&self, repo: &Repository) -> Result<SecurityStatus> {
        let key = self.check(repo)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .status
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn enable_feature(&self, repo: &Repository, feature: Feature) -> Result<()> {
        let key = self.check(repo)?;
        self.record(format!("enable_feature {key} {feature}"));
        let mut state = self.state.lock().unwrap();
        if state.rejected_features.contains(&(key.clone(), feature)) {
            return Err(AppError::Validation(format!("{feature} is not available")));
        }
        state.status.entry(key).or_default().set(feature, true);
        Ok(())
    }

    async fn fetch_findings(
        &self,
        repo: &Repository,
        kind: FindingKind,
    ) -> Result<serde_json::Value> {
        let key = self.check(repo)?;
        self.state
            .lock()
            .unwrap()
            .findings
            .get(&(key, kind))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{kind} not enabled")))
    }
}
