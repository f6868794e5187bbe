use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::error::AppError;
use crate::platform::types::{Feature, RateLimitInfo, SecurityStatus};

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Extract quota information from response headers.
pub fn rate_limit_info(status: StatusCode, headers: &HeaderMap, body: &str) -> RateLimitInfo {
    let retry_after = header_u64(headers, "retry-after").map(Duration::from_secs);
    let remaining = header_u64(headers, "x-ratelimit-remaining");

    let throttled = matches!(status.as_u16(), 403 | 429);
    let secondary = throttled
        && remaining != Some(0)
        && (retry_after.is_some() || body.to_lowercase().contains("secondary rate limit"));

    RateLimitInfo {
        limit: header_u64(headers, "x-ratelimit-limit"),
        remaining,
        reset_epoch: header_u64(headers, "x-ratelimit-reset").map(|v| v as i64),
        retry_after,
        secondary,
    }
}

/// Map a non-success response onto the error taxonomy.
pub fn error_for_status(status: StatusCode, info: &RateLimitInfo, body: &str) -> AppError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.chars().take(200).collect());
    let message = format!("{status}: {message}");

    match status.as_u16() {
        401 => AppError::Auth(message),
        403 | 429 if info.secondary || info.remaining == Some(0) || status.as_u16() == 429 => {
            AppError::RateLimited {
                message,
                retry_after: info.retry_after,
            }
        }
        403 => AppError::Auth(message),
        404 => AppError::NotFound(message),
        400 | 409 | 410 | 422 => AppError::Validation(message),
        500..=599 => AppError::Transient(message),
        _ => AppError::Internal(format!("unexpected response {message}")),
    }
}

fn sa_enabled(repo: &serde_json::Value, key: &str) -> bool {
    repo["security_and_analysis"][key]["status"].as_str() == Some("enabled")
}

/// Build a status from the repository payload plus the separately fetched flags.
pub fn security_status(
    repo: &serde_json::Value,
    codeql_configured: bool,
    vulnerability_alerts: bool,
) -> SecurityStatus {
    let mut status = SecurityStatus::default();
    status.set(Feature::AdvancedSecurity, sa_enabled(repo, "advanced_security"));
    status.set(Feature::Codeql, codeql_configured);
    status.set(Feature::DependabotAlerts, vulnerability_alerts);
    status.set(
        Feature::DependabotUpdates,
        sa_enabled(repo, "dependabot_security_updates"),
    );
    status.set(Feature::SecretScanning, sa_enabled(repo, "secret_scanning"));
    status.set(
        Feature::SecretPushProtection,
        sa_enabled(repo, "secret_scanning_push_protection"),
    );
    status
}
