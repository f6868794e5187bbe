use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::limiter::LimiterSettings;
use crate::engine::retry::{NotFoundPolicy, RetryPolicy};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            call_timeout_secs: default_call_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_secondary_cooldown_secs")]
    pub secondary_cooldown_secs: u64,
    #[serde(default = "default_primary_limit")]
    pub primary_limit: u64,
    #[serde(default)]
    pub not_found_policy: NotFoundPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            secondary_cooldown_secs: default_secondary_cooldown_secs(),
            primary_limit: default_primary_limit(),
            not_found_policy: NotFoundPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_findings_dir")]
    pub findings_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            findings_dir: default_findings_dir(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "rhizome".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter() -> bool {
    true
}

fn default_acquire_timeout_secs() -> u64 {
    15 * 60
}

fn default_secondary_cooldown_secs() -> u64 {
    60
}

fn default_primary_limit() -> u64 {
    5000 // authenticated REST quota per hour
}

fn default_findings_dir() -> PathBuf {
    PathBuf::from("findings")
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("rhizome").required(false));
        }

        // Environment variable overrides with RHIZOME_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("RHIZOME")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut app: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        if app.github.token.is_none() {
            app.github.token = std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("GH_TOKEN"))
                .ok()
                .filter(|t| !t.trim().is_empty());
        }

        Ok(app)
    }

    pub fn github_token(&self) -> Result<&str> {
        self.github.token.as_deref().ok_or_else(|| {
            AppError::Config(
                "No GitHub token configured (set github.token, GITHUB_TOKEN or GH_TOKEN)"
                    .to_string(),
            )
        })
    }
}

impl EngineConfig {
    /// Build and validate the retry policy for a run.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.workers == 0 {
            return Err(AppError::Config("engine.workers must be at least 1".to_string()));
        }

        let policy = RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
            not_found: self.not_found_policy,
            ..RetryPolicy::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn limiter_settings(&self) -> LimiterSettings {
        LimiterSettings {
            primary_limit: self.primary_limit,
            wait_timeout: Duration::from_secs(self.acquire_timeout_secs),
            secondary_cooldown: Duration::from_secs(self.secondary_cooldown_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.workers, 10);
        assert_eq!(engine.max_attempts, 4);
        assert_eq!(engine.not_found_policy, NotFoundPolicy::Skip);

        let policy = engine.retry_policy().unwrap();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert!(policy.jitter);
    }

    #[test]
    fn test_retry_policy_rejects_zero_workers() {
        let engine = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(engine.retry_policy(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_retry_policy_rejects_zero_attempts() {
        let engine = EngineConfig {
            max_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(engine.retry_policy().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhizome.toml");
        std::fs::write(
            &path,
            r#"
[github]
token = "ghp_test"
api_url = "http://localhost:9999"

[engine]
workers = 3
not_found_policy = "fail"
"#,
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.github.api_url, "http://localhost:9999");
        assert_eq!(config.github_token().unwrap(), "ghp_test");
        assert_eq!(config.engine.workers, 3);
        assert_eq!(config.engine.max_attempts, 4);
        assert_eq!(config.engine.not_found_policy, NotFoundPolicy::Fail);
        assert_eq!(config.output.findings_dir, PathBuf::from("findings"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let github = GitHubConfig {
            token: Some("ghp_secret".to_string()),
            ..GitHubConfig::default()
        };
        let rendered = format!("{github:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
