//! GitHub REST client for rule files, commits and pull requests.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GitHubConfig;
use crate::error::SourceError;
use crate::sources::{
    CodeHit, CommitInfo, FileContent, PullRequestInfo, RuleRepository, VersionControl,
};

const SERVICE: &str = "GitHub";

/// Hits requested per code search.
const SEARCH_PAGE_SIZE: u32 = 5;

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    items: Vec<CodeSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CodeSearchItem {
    path: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    encoding: Option<String>,
    path: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: String,
}

/// Low-level GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    max_diff_chars: usize,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(
        api_url: &str,
        token: Option<String>,
        timeout: Duration,
        max_diff_chars: usize,
    ) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("alert-context/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            max_diff_chars,
        })
    }

    /// Create a client from configuration.
    pub fn from_config(config: &GitHubConfig) -> Result<Self, SourceError> {
        Self::new(
            &config.api_url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_diff_chars,
        )
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: Option<&'static str>,
    ) -> Result<reqwest::Response, SourceError> {
        let url = format!("{}{path}", self.api_url);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                service: SERVICE,
                status,
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        self.get(path, query, None)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            })
    }

    /// Check that a repository is visible with the configured token.
    pub async fn check_repository(&self, repo: &str) -> Result<(), SourceError> {
        self.get(&format!("/repos/{repo}"), &[], None).await?;
        Ok(())
    }

    /// Run a code search query.
    pub async fn search_code(&self, query: &str) -> Result<Vec<CodeHit>, SourceError> {
        let per_page = SEARCH_PAGE_SIZE.to_string();
        let response: CodeSearchResponse = self
            .get_json("/search/code", &[("q", query), ("per_page", &per_page)])
            .await?;

        debug!(query = %query, hits = response.items.len(), "GitHub code search");
        Ok(response
            .items
            .into_iter()
            .map(|item| CodeHit {
                path: item.path,
                url: item.html_url,
            })
            .collect())
    }

    /// Fetch and decode a file through the contents API.
    pub async fn fetch_file(
        &self,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContent, SourceError> {
        let encoded_path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let query: Vec<(&str, &str)> = git_ref.map(|r| vec![("ref", r)]).unwrap_or_default();

        let response: ContentResponse = self
            .get_json(&format!("/repos/{repo}/contents/{encoded_path}"), &query)
            .await?;

        if response.encoding.as_deref() != Some("base64") {
            return Err(SourceError::Decode {
                service: SERVICE,
                reason: format!(
                    "unsupported content encoding {:?} for {path}",
                    response.encoding
                ),
            });
        }
        let content = response.content.unwrap_or_default();
        let text = decode_content(&content)?;

        Ok(FileContent {
            url: response
                .html_url
                .unwrap_or_else(|| format!("https://github.com/{repo}/blob/HEAD/{path}")),
            path: response.path,
            text,
        })
    }

    /// Fetch a commit; `None` when GitHub does not know the SHA.
    pub async fn commit(&self, repo: &str, sha: &str) -> Result<Option<CommitInfo>, SourceError> {
        let response: CommitResponse =
            match self.get_json(&format!("/repos/{repo}/commits/{sha}"), &[]).await {
                Ok(response) => response,
                Err(e) if is_missing(&e) => return Ok(None),
                Err(e) => return Err(e),
            };

        let title = response
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        let (author, date) = response
            .commit
            .author
            .map(|a| (a.name.unwrap_or_default(), a.date))
            .unwrap_or_default();

        Ok(Some(CommitInfo {
            sha: response.sha,
            title,
            message: response.commit.message,
            author,
            date,
            url: response.html_url,
        }))
    }

    /// Find the pull request that introduced a commit, with its diff.
    pub async fn pull_request_for_commit(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<Option<PullRequestInfo>, SourceError> {
        let pulls: Vec<PullResponse> = match self
            .get_json(&format!("/repos/{repo}/commits/{sha}/pulls"), &[])
            .await
        {
            Ok(pulls) => pulls,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(pull) = pulls.into_iter().next() else {
            debug!(commit = %sha, "No pull request associated with commit");
            return Ok(None);
        };

        let diff = match self.pull_request_diff(repo, pull.number).await {
            Ok(diff) => Some(truncate_diff(diff, self.max_diff_chars)),
            Err(e) => {
                warn!(pr = pull.number, error = %e, "Failed to fetch pull request diff");
                None
            }
        };

        Ok(Some(PullRequestInfo {
            number: pull.number,
            title: pull.title,
            url: pull.html_url,
            diff,
        }))
    }

    /// Fetch a pull request as a unified diff.
    pub async fn pull_request_diff(&self, repo: &str, number: u64) -> Result<String, SourceError> {
        let response = self
            .get(
                &format!("/repos/{repo}/pulls/{number}"),
                &[],
                Some("application/vnd.github.diff"),
            )
            .await?;
        Ok(response.text().await?)
    }
}

/// GitHub answers 422 for SHAs it cannot resolve.
fn is_missing(error: &SourceError) -> bool {
    error.is_not_found() || matches!(error, SourceError::Status { status: 422, .. })
}

fn decode_content(content: &str) -> Result<String, SourceError> {
    // GitHub wraps base64 at 60 columns.
    let clean: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| SourceError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| SourceError::Decode {
        service: SERVICE,
        reason: e.to_string(),
    })
}

/// Cut a diff to `max_chars` characters, noting how much was dropped.
#[must_use]
pub fn truncate_diff(diff: String, max_chars: usize) -> String {
    let total = diff.chars().count();
    if max_chars == 0 || total <= max_chars {
        return diff;
    }
    let kept: String = diff.chars().take(max_chars).collect();
    format!(
        "{kept}\n... diff truncated ({} more characters)",
        total - max_chars
    )
}

/// The rules repository, seen through [`RuleRepository`].
#[derive(Debug, Clone)]
pub struct GitHubRuleRepository {
    client: GitHubClient,
    repo: String,
    git_ref: Option<String>,
}

impl GitHubRuleRepository {
    #[must_use]
    pub fn new(client: GitHubClient, repo: &str, git_ref: Option<String>) -> Self {
        Self {
            client,
            repo: repo.to_string(),
            git_ref,
        }
    }
}

#[async_trait]
impl RuleRepository for GitHubRuleRepository {
    async fn probe(&self) -> Result<(), SourceError> {
        self.client.check_repository(&self.repo).await
    }

    async fn search_code(&self, query: &str) -> Result<Vec<CodeHit>, SourceError> {
        self.client.search_code(query).await
    }

    async fn fetch_file(&self, path: &str) -> Result<FileContent, SourceError> {
        self.client
            .fetch_file(&self.repo, path, self.git_ref.as_deref())
            .await
    }

    fn repository(&self) -> &str {
        &self.repo
    }
}

/// Commit and PR lookups, seen through [`VersionControl`].
#[derive(Debug, Clone)]
pub struct GitHubVersionControl {
    client: GitHubClient,
    default_repo: Option<String>,
}

impl GitHubVersionControl {
    #[must_use]
    pub fn new(client: GitHubClient, default_repo: Option<String>) -> Self {
        Self {
            client,
            default_repo,
        }
    }

    fn target_repo<'a>(&'a self, repo_override: Option<&'a str>) -> Result<&'a str, SourceError> {
        repo_override
            .or(self.default_repo.as_deref())
            .ok_or(SourceError::NotConfigured("Default code repository"))
    }
}

#[async_trait]
impl VersionControl for GitHubVersionControl {
    async fn commit(
        &self,
        sha: &str,
        repo_override: Option<&str>,
    ) -> Result<Option<CommitInfo>, SourceError> {
        let repo = self.target_repo(repo_override)?;
        self.client.commit(repo, sha).await
    }

    async fn pull_request_for_commit(
        &self,
        sha: &str,
        repo_override: Option<&str>,
    ) -> Result<Option<PullRequestInfo>, SourceError> {
        let repo = self.target_repo(repo_override)?;
        self.client.pull_request_for_commit(repo, sha).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wrapped_content() {
        let text = decode_content("YWxlcnRz\nOiBbXQo=\n").unwrap();
        assert_eq!(text, "alerts: []\n");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_content("!!!not base64"),
            Err(SourceError::Decode { .. })
        ));
    }

    #[test]
    fn test_truncate_diff() {
        assert_eq!(truncate_diff("short".to_string(), 10), "short");
        assert_eq!(truncate_diff("short".to_string(), 0), "short");
        let cut = truncate_diff("é".repeat(12), 10);
        assert!(cut.starts_with(&"é".repeat(10)));
        assert!(cut.ends_with("(2 more characters)"));
    }

    #[tokio::test]
    async fn test_missing_repository_is_not_configured() {
        let client =
            GitHubClient::new("http://127.0.0.1:9", None, Duration::from_secs(1), 100).unwrap();
        let vcs = GitHubVersionControl::new(client, None);
        let err = vcs.commit("3f2a9c1d", None).await.unwrap_err();
        assert!(matches!(err, SourceError::NotConfigured(_)));
    }
}
