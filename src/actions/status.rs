use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::Result;
use crate::platform::types::{Feature, Repository, SecurityStatus};
use crate::platform::Platform;

const COLUMN_WIDTH: usize = 24;

/// Read-only report of which security features are enabled.
pub struct SecurityStatusCheck {
    platform: Arc<dyn Platform>,
}

impl SecurityStatusCheck {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Column header matching the rows produced by `apply`.
    pub fn table_header() -> String {
        Feature::ORDER
            .iter()
            .map(|f| format!("{:<width$}", f.as_str(), width = COLUMN_WIDTH))
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    fn row(status: &SecurityStatus) -> String {
        Feature::ORDER
            .iter()
            .map(|f| {
                let mark = if status.is_enabled(*f) { "✅" } else { "❌" };
                format!("{mark:<width$}", width = COLUMN_WIDTH)
            })
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

#[async_trait]
impl Action for SecurityStatusCheck {
    fn name(&self) -> &str {
        "ghas-check"
    }

    fn describe(&self, repo: &Repository) -> String {
        format!("would read security settings of {repo}")
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        let status = self.platform.security_status(repo).await?;
        Ok(Self::row(&status))
    }

    fn cost(&self) -> u64 {
        3
    }
}
