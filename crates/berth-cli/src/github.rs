//! HTTP client for listing a GitHub user's public repositories.

use std::fmt::Write as _;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;

/// Public GitHub API base.
pub const DEFAULT_API: &str = "https://api.github.com";

/// Error type for GitHub requests.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("Error: {status} - {body}")]
    Api { status: u16, body: String },
}

/// A repository as listed by `GET /users/:name/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Browser URL.
    pub html_url: String,
}

/// Client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
}

impl GithubClient {
    /// Create a client against `base_url` (e.g. [`DEFAULT_API`]).
    pub fn new(base_url: impl Into<String>) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        // GitHub rejects requests without a user agent.
        let client = Client::builder()
            .user_agent(concat!("berth/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// List a user's public repositories.
    pub async fn list_repos(&self, username: &str) -> Result<Vec<Repository>, GithubError> {
        let url = format!("{}/users/{username}/repos", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Render the listing printed by `berth list-github-repos`.
pub fn format_repos(username: &str, repos: &[Repository]) -> String {
    let mut out = format!("Found {} repositories for {username}:", repos.len());
    for repo in repos {
        let _ = write!(out, "\n- {}: {}", repo.name, repo.html_url);
    }
    out
}
