use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A target repository, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repository {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().splitn(2, '/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Repository::new(*owner, *name))
            }
            _ => Err(AppError::Validation(format!("Invalid repo name: {s}"))),
        }
    }
}

/// Desired state of one issue label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl LabelSpec {
    /// Normalize the color to six lowercase hex digits without a leading `#`.
    pub fn normalized(mut self) -> Result<Self, AppError> {
        let color = self.color.trim().trim_start_matches('#').to_ascii_lowercase();
        if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::Validation(format!(
                "Label {:?} has invalid color {:?} (expected 6 hex digits)",
                self.name, self.color
            )));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Label name must not be empty".to_string()));
        }
        self.color = color;
        Ok(self)
    }
}

/// A label as it currently exists on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Security features that can be toggled per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AdvancedSecurity,
    Codeql,
    DependabotAlerts,
    DependabotUpdates,
    SecretScanning,
    SecretPushProtection,
}

impl Feature {
    /// Enable order. Advanced security comes first since several features depend on it.
    pub const ORDER: [Feature; 6] = [
        Feature::AdvancedSecurity,
        Feature::Codeql,
        Feature::DependabotAlerts,
        Feature::DependabotUpdates,
        Feature::SecretScanning,
        Feature::SecretPushProtection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::AdvancedSecurity => "advanced_security",
            Feature::Codeql => "codeql",
            Feature::DependabotAlerts => "dependabot_alerts",
            Feature::DependabotUpdates => "dependabot_updates",
            Feature::SecretScanning => "secret_scanning",
            Feature::SecretPushProtection => "secret_push_protection",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Feature::AdvancedSecurity => "GHAS license (required for CodeQL & secret scanning)",
            Feature::Codeql => "CodeQL code scanning (default setup)",
            Feature::DependabotAlerts => "Dependabot vulnerability alerts",
            Feature::DependabotUpdates => "Dependabot automated security fixes",
            Feature::SecretScanning => "Secret scanning",
            Feature::SecretPushProtection => "Secret scanning push protection",
        }
    }

    /// Features that cannot be enabled without advanced security.
    pub fn requires_advanced_security(&self) -> bool {
        matches!(
            self,
            Feature::Codeql | Feature::SecretScanning | Feature::SecretPushProtection
        )
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ORDER
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown feature: {s}")))
    }
}

/// Which security features are currently enabled on a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityStatus {
    pub enabled: BTreeMap<Feature, bool>,
}

impl SecurityStatus {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.get(&feature).copied().unwrap_or(false)
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        self.enabled.insert(feature, enabled);
    }
}

/// Exportable finding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Sbom,
    Dependabot,
    Codeql,
}

impl FindingKind {
    pub const ALL: [FindingKind; 3] = [FindingKind::Sbom, FindingKind::Dependabot, FindingKind::Codeql];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Sbom => "sbom",
            FindingKind::Dependabot => "dependabot",
            FindingKind::Codeql => "codeql",
        }
    }

    /// REST path for this finding type, relative to the API root.
    pub fn endpoint(&self, repo: &Repository) -> String {
        match self {
            FindingKind::Sbom => format!("/repos/{repo}/dependency-graph/sbom"),
            FindingKind::Dependabot => format!("/repos/{repo}/dependabot/alerts?per_page=100&state=open"),
            FindingKind::Codeql => {
                format!("/repos/{repo}/code-scanning/alerts?per_page=100&state=open")
            }
        }
    }

    /// SBOM is a single object; alert lists are paginated arrays.
    pub fn is_paginated(&self) -> bool {
        !matches!(self, FindingKind::Sbom)
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindingKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FindingKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown finding type: {s}")))
    }
}

/// Quota information reported by one API response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Unix epoch seconds at which the primary window resets.
    pub reset_epoch: Option<i64>,
    pub retry_after: Option<Duration>,
    /// Set when the response was an abuse-detection (secondary) throttle.
    pub secondary: bool,
}

impl RateLimitInfo {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_epoch.is_none()
            && self.retry_after.is_none()
            && !self.secondary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository() {
        let repo: Repository = "octo-org/widgets".parse().unwrap();
        assert_eq!(repo.owner, "octo-org");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.to_string(), "octo-org/widgets");
    }

    #[test]
    fn test_parse_repository_rejects_malformed() {
        assert!("widgets".parse::<Repository>().is_err());
        assert!("/widgets".parse::<Repository>().is_err());
        assert!("octo-org/".parse::<Repository>().is_err());
        assert!("a/b/c".parse::<Repository>().is_err());
    }

    #[test]
    fn test_label_color_normalized() {
        let spec = LabelSpec {
            name: "bug".to_string(),
            color: "#D73A4A".to_string(),
            description: None,
        };
        assert_eq!(spec.normalized().unwrap().color, "d73a4a");
    }

    #[test]
    fn test_label_color_rejected() {
        let spec = LabelSpec {
            name: "bug".to_string(),
            color: "red".to_string(),
            description: None,
        };
        assert!(spec.normalized().is_err());
    }

    #[test]
    fn test_feature_order_and_dependencies() {
        assert_eq!(Feature::ORDER[0], Feature::AdvancedSecurity);
        assert!(Feature::Codeql.requires_advanced_security());
        assert!(!Feature::DependabotAlerts.requires_advanced_security());
        assert_eq!("secret_push_protection".parse::<Feature>().unwrap(), Feature::SecretPushProtection);
        assert!("ghas".parse::<Feature>().is_err());
    }

    #[test]
    fn test_finding_endpoints() {
        let repo = Repository::new("octo-org", "widgets");
        assert_eq!(
            FindingKind::Sbom.endpoint(&repo),
            "/repos/octo-org/widgets/dependency-graph/sbom"
        );
        assert!(FindingKind::Codeql.endpoint(&repo).contains("state=open"));
        assert!(!FindingKind::Sbom.is_paginated());
    }
}
