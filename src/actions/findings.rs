use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::{AppError, ErrorClass, Result};
use crate::platform::types::{FindingKind, Repository};
use crate::platform::Platform;

/// Export security findings to one JSON file per (repository, finding kind).
pub struct FindingsDownload {
    platform: Arc<dyn Platform>,
    kinds: Vec<FindingKind>,
    output_dir: PathBuf,
}

impl FindingsDownload {
    pub fn new(
        platform: Arc<dyn Platform>,
        kinds: &[FindingKind],
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let kinds: Vec<FindingKind> = FindingKind::ALL
            .into_iter()
            .filter(|k| kinds.contains(k))
            .collect();
        if kinds.is_empty() {
            return Err(AppError::Validation("No finding types selected".to_string()));
        }
        Ok(Self {
            platform,
            kinds,
            output_dir: output_dir.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic per-repository file name, so reruns overwrite.
    pub fn file_path(&self, repo: &Repository, kind: FindingKind) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}_{}.json", repo.owner, repo.name, kind))
    }
}

fn summarize(kind: FindingKind, data: &serde_json::Value) -> String {
    match kind {
        FindingKind::Sbom => {
            let packages = data["sbom"]["packages"]
                .as_array()
                .map(|p| p.len())
                .unwrap_or(0);
            format!("{kind}: {packages} packages")
        }
        _ => {
            let alerts = data.as_array().map(|a| a.len()).unwrap_or(0);
            format!("{kind}: {alerts} alerts")
        }
    }
}

/// Write through a temporary sibling and rename so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Action for FindingsDownload {
    fn name(&self) -> &str {
        "findings"
    }

    fn describe(&self, repo: &Repository) -> String {
        let targets: Vec<String> = self
            .kinds
            .iter()
            .map(|k| self.file_path(repo, *k).display().to_string())
            .collect();
        format!("would download to {}", targets.join(", "))
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut written = Vec::new();
        let mut unavailable = Vec::new();

        for &kind in &self.kinds {
            let data = match self.platform.fetch_findings(repo, kind).await {
                Ok(data) => data,
                Err(e) if e.class() == ErrorClass::NotFound => {
                    tracing::debug!(repo = %repo, kind = %kind, error = %e, "Findings unavailable");
                    unavailable.push(kind.as_str());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let path = self.file_path(repo, kind);
            let bytes = serde_json::to_vec_pretty(&data)?;
            write_atomic(&path, &bytes).await?;
            tracing::debug!(repo = %repo, path = %path.display(), "Findings written");

            written.push(summarize(kind, &data));
        }

        if written.is_empty() {
            return Err(AppError::NotFound(format!(
                "not enabled or no access: {}",
                unavailable.join(", ")
            )));
        }

        let mut detail = written.join("; ");
        if !unavailable.is_empty() {
            detail.push_str(&format!("; unavailable: {}", unavailable.join(", ")));
        }
        Ok(detail)
    }

    fn cost(&self) -> u64 {
        self.kinds.len() as u64
    }
}
