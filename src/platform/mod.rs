pub mod github;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// Remote repository-management API.
///
/// Every call returns an `AppError` from the engine's taxonomy on failure so the
/// retry wrapper can decide between retrying, skipping and failing.
#[async_trait]
pub trait Platform: Send + Sync {
    /// List every label defined on a repository.
    async fn list_labels(&self, repo: &Repository) -> Result<Vec<Label>>;

    /// Create a label.
    async fn create_label(&self, repo: &Repository, label: &LabelSpec) -> Result<()>;

    /// Update the label currently named `current_name` to match `label`.
    async fn update_label(
        &self,
        repo: &Repository,
        current_name: &str,
        label: &LabelSpec,
    ) -> Result<()>;

    /// Delete a label.
    async fn delete_label(&self, repo: &Repository, name: &str) -> Result<()>;

    /// Fetch the repository's topics.
    async fn get_topics(&self, repo: &Repository) -> Result<Vec<String>>;

    /// Replace the repository's topics with `names`.
    async fn replace_topics(&self, repo: &Repository, names: &[String]) -> Result<()>;

    /// Read which security features are enabled.
    async fn security_status(&self, repo: &Repository) -> Result<SecurityStatus>;

    /// Turn on a single security feature.
    async fn enable_feature(&self, repo: &Repository, feature: Feature) -> Result<()>;

    /// Fetch all open findings of one kind. Alert lists are returned as a JSON
    /// array covering every page; the SBOM is returned as a single object.
    async fn fetch_findings(&self, repo: &Repository, kind: FindingKind)
        -> Result<serde_json::Value>;
}
