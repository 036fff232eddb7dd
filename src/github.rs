use reqwest::{header, Method};
use serde_json::Value;

use crate::error::GithubToolsError;

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Credential and endpoint configuration, built once at startup and passed
/// into [`GithubClient::new`]. Tests substitute `api_base` to point the
/// client at a mock server.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// Personal access token sent as a bearer credential on every request.
    pub token: String,
    /// Informational; shown in the server instructions when present.
    pub username: Option<String>,
    /// API root, without a trailing slash.
    pub api_base: String,
}

impl GithubConfig {
    pub fn new(token: String, username: Option<String>) -> Self {
        Self {
            token,
            username,
            api_base: GITHUB_API_BASE.to_string(),
        }
    }
}

/// Thin wrapper over a single `reqwest::Client`: one method per HTTP verb,
/// bearer token injected on every call, single attempt per request.
///
/// Non-2xx responses become [`GithubToolsError::Api`] with the upstream
/// `message` preserved; connection failures become
/// [`GithubToolsError::Transport`]. Empty success bodies (204) decode to
/// JSON null.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    username: Option<String>,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, GithubToolsError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("github-tools-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base,
            token: config.token,
            username: config.username,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// `path` is the API route including any query string, e.g.
    /// `/repos/rust-lang/rust/issues?per_page=10`.
    pub async fn get(&self, path: &str) -> Result<Value, GithubToolsError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, GithubToolsError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, GithubToolsError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    /// Some PUT endpoints (workflow enable/disable) take no body.
    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Value, GithubToolsError> {
        self.send(Method::PUT, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, GithubToolsError> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GithubToolsError> {
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!(%method, %url, "GitHub API request");

        let mut request = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GithubToolsError::Api {
                status: status.as_u16(),
                message: upstream_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": ...}`;
/// fall back to the raw body when they don't.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
