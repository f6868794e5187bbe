use octocrab::Octocrab;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

/// Check that the token authenticates and return the login it belongs to.
pub async fn verify_token(config: &GitHubConfig, token: &str) -> Result<String> {
    let client = Octocrab::builder()
        .base_uri(config.api_url.as_str())
        .map_err(|e| AppError::Config(format!("Invalid GitHub API URL {}: {e}", config.api_url)))?
        .personal_token(token.to_string())
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build octocrab client: {e}")))?;

    let user = client.current().user().await?;
    tracing::info!(login = %user.login, "GitHub token verified");
    Ok(user.login)
}
