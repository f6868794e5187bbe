use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::{AppError, ErrorClass, Result};
use crate::platform::types::{Feature, Repository};
use crate::platform::Platform;

/// Enable GitHub Advanced Security features.
pub struct FeatureEnable {
    platform: Arc<dyn Platform>,
    features: Vec<Feature>,
}

impl FeatureEnable {
    /// `features` is reordered into the fixed enable order and de-duplicated.
    pub fn new(platform: Arc<dyn Platform>, features: &[Feature]) -> Result<Self> {
        let features: Vec<Feature> = Feature::ORDER
            .into_iter()
            .filter(|f| features.contains(f))
            .collect();
        if features.is_empty() {
            return Err(AppError::Validation("No features selected".to_string()));
        }
        Ok(Self { platform, features })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

fn join(features: &[Feature]) -> String {
    features
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Action for FeatureEnable {
    fn name(&self) -> &str {
        "ghas"
    }

    fn describe(&self, repo: &Repository) -> String {
        format!("would enable [{}] on {repo}", join(&self.features))
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        let status = self.platform.security_status(repo).await?;

        let mut enabled = Vec::new();
        let mut already = Vec::new();
        let mut blocked = Vec::new();
        let mut ghas_unavailable: Option<String> = None;

        for &feature in &self.features {
            if ghas_unavailable.is_some() && feature.requires_advanced_security() {
                blocked.push(feature);
                continue;
            }
            if status.is_enabled(feature) {
                already.push(feature);
                continue;
            }

            match self.platform.enable_feature(repo, feature).await {
                Ok(()) => {
                    tracing::debug!(repo = %repo, feature = %feature, "Feature enabled");
                    enabled.push(feature);
                }
                Err(e)
                    if feature == Feature::AdvancedSecurity
                        && matches!(e.class(), ErrorClass::NotFound | ErrorClass::Validation) =>
                {
                    tracing::info!(repo = %repo, error = %e, "Advanced security unavailable");
                    ghas_unavailable = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let mut parts = Vec::new();
        if !enabled.is_empty() {
            parts.push(format!("enabled {}", join(&enabled)));
        }
        if !already.is_empty() {
            parts.push(format!("already enabled {}", join(&already)));
        }

        if let Some(reason) = ghas_unavailable {
            if !blocked.is_empty() {
                parts.push(format!("not attempted {}", join(&blocked)));
            }
            return Err(AppError::NotFound(format!(
                "advanced security unavailable ({reason}){}",
                if parts.is_empty() {
                    String::new()
                } else {
                    format!("; {}", parts.join("; "))
                }
            )));
        }

        if enabled.is_empty() {
            return Ok("all features already enabled".to_string());
        }
        Ok(parts.join("; "))
    }

    fn cost(&self) -> u64 {
        3 + self.features.len() as u64
    }
}
