use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::GitHubConfig;
use crate::engine::limiter::RateLimiter;
use crate::error::{AppError, ErrorClass, Result};
use crate::platform::types::*;
use crate::platform::Platform;

use super::mapper;

const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// GitHub REST client. Every response is reported to the shared rate limiter.
pub struct GitHubPlatform {
    client: Client,
    api_url: String,
    limiter: Arc<RateLimiter>,
}

impl GitHubPlatform {
    pub fn new(config: &GitHubConfig, token: &str, limiter: Arc<RateLimiter>) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AppError::Config(format!("Invalid GitHub token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// Send one request and return the response body on success.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String> {
        self.limiter.wait_for_quota().await?;

        let url = format!("{}{}", self.api_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        let info = mapper::rate_limit_info(status, &headers, &text);
        self.limiter.report(&info).await;

        if status.is_success() {
            tracing::trace!(%method, path, %status, remaining = ?info.remaining, "GitHub API call");
            return Ok(text);
        }

        let error = mapper::error_for_status(status, &info, &text);
        tracing::debug!(%method, path, %status, error = %error, "GitHub API call failed");
        Err(error)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_json(&self, method: Method, path: &str, body: serde_json::Value) -> Result<()> {
        self.request(method, path, Some(&body)).await?;
        Ok(())
    }

    /// GET a probe endpoint, treating 404 as "off".
    async fn probe(&self, path: &str) -> Result<bool> {
        match self.request(Method::GET, path, None).await {
            Ok(_) => Ok(true),
            Err(e) if e.class() == ErrorClass::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Follow `page=N` pagination until a short page. An object response is
    /// returned unchanged.
    async fn paginate(&self, path: &str) -> Result<serde_json::Value> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let data: serde_json::Value = self
                .get_json(&format!("{path}{separator}page={page}"))
                .await?;

            let batch = match data {
                serde_json::Value::Array(batch) => batch,
                other => return Ok(other),
            };

            let count = batch.len();
            items.extend(batch);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(serde_json::Value::Array(items))
    }

    fn label_body(label: &LabelSpec, name_key: &str) -> serde_json::Value {
        let mut body = json!({ name_key: label.name, "color": label.color });
        if let Some(description) = &label.description {
            body["description"] = json!(description);
        }
        body
    }
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn list_labels(&self, repo: &Repository) -> Result<Vec<Label>> {
        let data = self
            .paginate(&format!("/repos/{repo}/labels?per_page={PER_PAGE}"))
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn create_label(&self, repo: &Repository, label: &LabelSpec) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/repos/{repo}/labels"),
            Self::label_body(label, "name"),
        )
        .await
    }

    async fn update_label(
        &self,
        repo: &Repository,
        current_name: &str,
        label: &LabelSpec,
    ) -> Result<()> {
        let name = urlencoding::encode(current_name);
        self.send_json(
            Method::PATCH,
            &format!("/repos/{repo}/labels/{name}"),
            Self::label_body(label, "new_name"),
        )
        .await
    }

    async fn delete_label(&self, repo: &Repository, name: &str) -> Result<()> {
        let name = urlencoding::encode(name);
        self.request(Method::DELETE, &format!("/repos/{repo}/labels/{name}"), None)
            .await?;
        Ok(())
    }

    async fn get_topics(&self, repo: &Repository) -> Result<Vec<String>> {
        let data: serde_json::Value = self.get_json(&format!("/repos/{repo}/topics")).await?;
        Ok(data["names"]
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn replace_topics(&self, repo: &Repository, names: &[String]) -> Result<()> {
        self.send_json(
            Method::PUT,
            &format!("/repos/{repo}/topics"),
            json!({ "names": names }),
        )
        .await
    }

    async fn security_status(&self, repo: &Repository) -> Result<SecurityStatus> {
        let data: serde_json::Value = self.get_json(&format!("/repos/{repo}")).await?;

        let codeql_configured = match self
            .get_json::<serde_json::Value>(&format!("/repos/{repo}/code-scanning/default-setup"))
            .await
        {
            Ok(setup) => setup["state"].as_str() == Some("configured"),
            // Code scanning is forbidden or absent when GHAS is off.
            Err(e) if matches!(e.class(), ErrorClass::NotFound | ErrorClass::Auth) => false,
            Err(e) => return Err(e),
        };

        let vulnerability_alerts = self
            .probe(&format!("/repos/{repo}/vulnerability-alerts"))
            .await?;

        Ok(mapper::security_status(
            &data,
            codeql_configured,
            vulnerability_alerts,
        ))
    }

    async fn enable_feature(&self, repo: &Repository, feature: Feature) -> Result<()> {
        let security = |key: &str| json!({ "security_and_analysis": { key: { "status": "enabled" } } });

        match feature {
            Feature::AdvancedSecurity => {
                self.send_json(Method::PATCH, &format!("/repos/{repo}"), security("advanced_security"))
                    .await
            }
            Feature::Codeql => {
                self.send_json(
                    Method::PATCH,
                    &format!("/repos/{repo}/code-scanning/default-setup"),
                    json!({ "state": "configured", "query_suite": "default" }),
                )
                .await
            }
            Feature::DependabotAlerts => {
                self.request(Method::PUT, &format!("/repos/{repo}/vulnerability-alerts"), None)
                    .await?;
                Ok(())
            }
            Feature::DependabotUpdates => {
                self.request(
                    Method::PUT,
                    &format!("/repos/{repo}/automated-security-fixes"),
                    None,
                )
                .await?;
                Ok(())
            }
            Feature::SecretScanning => {
                self.send_json(Method::PATCH, &format!("/repos/{repo}"), security("secret_scanning"))
                    .await
            }
            Feature::SecretPushProtection => {
                self.send_json(
                    Method::PATCH,
                    &format!("/repos/{repo}"),
                    security("secret_scanning_push_protection"),
                )
                .await
            }
        }
    }

    async fn fetch_findings(
        &self,
        repo: &Repository,
        kind: FindingKind,
    ) -> Result<serde_json::Value> {
        let endpoint = kind.endpoint(repo);
        if kind.is_paginated() {
            self.paginate(&endpoint).await
        } else {
            self.get_json(&endpoint).await
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::engine::limiter::LimiterSettings;

    fn platform(server: &MockServer) -> (GitHubPlatform, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(
            LimiterSettings::default(),
            CancellationToken::new(),
        ));
        let config = GitHubConfig {
            api_url: server.uri(),
            ..GitHubConfig::default()
        };
        let platform = GitHubPlatform::new(&config, "ghp_test", Arc::clone(&limiter)).unwrap();
        (platform, limiter)
    }

    fn repo() -> Repository {
        Repository::new("octo-org", "widgets")
    }

    #[tokio::test]
    async fn test_list_labels_reports_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/labels"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "bug", "color": "d73a4a", "description": null}]))
                    .insert_header("x-ratelimit-limit", "5000")
                    .insert_header("x-ratelimit-remaining", "4321"),
            )
            .mount(&server)
            .await;

        let (platform, limiter) = platform(&server);
        let labels = platform.list_labels(&repo()).await.unwrap();

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "bug");
        let budget = limiter.budget().await;
        assert_eq!(budget.limit, 5000);
        assert_eq!(budget.remaining, 4321);
    }

    #[tokio::test]
    async fn test_missing_repository_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/topics"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        let err = platform.get_topics(&repo()).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_secondary_limit_sets_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo-org/widgets/topics"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("retry-after", "7")
                    .insert_header("x-ratelimit-remaining", "4000")
                    .set_body_json(json!({"message": "You have exceeded a secondary rate limit"})),
            )
            .mount(&server)
            .await;

        let (platform, limiter) = platform(&server);
        let err = platform
            .replace_topics(&repo(), &["security".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(7)
        ));
        assert!(limiter.budget().await.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn test_alerts_are_paginated() {
        let server = MockServer::start().await;
        let full_page: Vec<serde_json::Value> = (0..100).map(|n| json!({"number": n})).collect();
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/dependabot/alerts"))
            .and(query_param("page", "1"))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/dependabot/alerts"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"number": 100}])))
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        let data = platform
            .fetch_findings(&repo(), FindingKind::Dependabot)
            .await
            .unwrap();

        assert_eq!(data.as_array().unwrap().len(), 101);
    }

    #[tokio::test]
    async fn test_sbom_is_single_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/dependency-graph/sbom"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sbom": {"packages": [{}]}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        let data = platform.fetch_findings(&repo(), FindingKind::Sbom).await.unwrap();

        assert_eq!(data["sbom"]["packages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_security_status_combines_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security_and_analysis": {"advanced_security": {"status": "enabled"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/code-scanning/default-setup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "not-configured"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/vulnerability-alerts"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        let status = platform.security_status(&repo()).await.unwrap();

        assert!(status.is_enabled(Feature::AdvancedSecurity));
        assert!(!status.is_enabled(Feature::Codeql));
        assert!(status.is_enabled(Feature::DependabotAlerts));
    }

    #[tokio::test]
    async fn test_enable_secret_scanning_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/octo-org/widgets"))
            .and(body_json(json!({
                "security_and_analysis": {"secret_scanning": {"status": "enabled"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        platform
            .enable_feature(&repo(), Feature::SecretScanning)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_label_encodes_name() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/octo-org/widgets/labels/good%20first%20issue"))
            .and(body_json(json!({"new_name": "good first issue", "color": "7057ff"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let (platform, _) = platform(&server);
        let label = LabelSpec {
            name: "good first issue".to_string(),
            color: "7057ff".to_string(),
            description: None,
        };
        platform
            .update_label(&repo(), "good first issue", &label)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_quota_holds_next_request_until_reset() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp() + 2;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/widgets/topics"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"names": ["security"]}))
                    .insert_header("x-ratelimit-limit", "5000")
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
            )
            .expect(2)
            .mount(&server)
            .await;

        let (platform, limiter) = platform(&server);
        platform.get_topics(&repo()).await.unwrap();
        assert!(limiter.budget().await.exhausted_until.is_some());

        let started = std::time::Instant::now();
        platform.get_topics(&repo()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
