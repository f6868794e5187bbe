pub mod features;
pub mod findings;
pub mod labels;
pub mod status;
pub mod topics;

use async_trait::async_trait;

use crate::error::Result;
use crate::platform::types::Repository;

pub use features::FeatureEnable;
pub use findings::FindingsDownload;
pub use labels::LabelSync;
pub use status::SecurityStatusCheck;
pub use topics::TopicApply;

/// A per-repository operation the engine can run in bulk.
///
/// `apply` must be idempotent: running it against a repository that is already
/// in the target state succeeds without changing anything. Implementations
/// report failures once and leave retrying to the engine.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// What `apply` would do, without touching the network.
    fn describe(&self, repo: &Repository) -> String;

    /// Perform the operation, returning a short human-readable summary.
    async fn apply(&self, repo: &Repository) -> Result<String>;

    /// Estimated number of API calls per `apply`, debited from the shared quota.
    fn cost(&self) -> u64 {
        1
    }
}
