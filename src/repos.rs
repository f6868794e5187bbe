use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::platform::types::{LabelSpec, Repository};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RepoEntry {
    FullName(String),
    Object(Repository),
}

#[derive(Debug, Deserialize)]
struct RawRepoList {
    repos: Vec<RepoEntry>,
    #[serde(default)]
    labels: Option<Vec<LabelSpec>>,
    #[serde(default)]
    topics: Option<Vec<String>>,
}

/// Contents of the repository-list input file.
#[derive(Debug, Clone)]
pub struct RepoList {
    pub repos: Vec<Repository>,
    pub labels: Option<Vec<LabelSpec>>,
    pub topics: Option<Vec<String>>,
}

impl RepoList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawRepoList = serde_json::from_str(content)?;

        let repos = raw
            .repos
            .into_iter()
            .map(|entry| match entry {
                RepoEntry::FullName(name) => name.parse(),
                RepoEntry::Object(repo) if repo.owner.is_empty() || repo.name.is_empty() => Err(
                    AppError::Validation(format!("Invalid repo entry: {repo:?}")),
                ),
                RepoEntry::Object(repo) => Ok(repo),
            })
            .collect::<Result<Vec<_>>>()?;

        if repos.is_empty() {
            return Err(AppError::Validation("No repositories listed".to_string()));
        }

        Ok(Self {
            repos,
            labels: raw.labels,
            topics: raw.topics,
        })
    }

    pub fn labels(&self) -> Result<Vec<LabelSpec>> {
        self.labels
            .clone()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| AppError::Config("Input file has no \"labels\" section".to_string()))
    }

    pub fn topics(&self) -> Result<Vec<String>> {
        self.topics
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Config("Input file has no \"topics\" section".to_string()))
    }
}
