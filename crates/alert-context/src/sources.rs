//! Remote capabilities consumed by the resolver and the reset reconstructor.
//!
//! Each capability is a trait so that tests can substitute stubs and so that
//! an unconfigured capability can simply be absent (`None`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::logs::{LogEntry, LogQuery};

/// A code-search hit in the rules repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeHit {
    /// Path of the file within the repository
    pub path: String,
    /// Browsable URL of the file
    pub url: String,
}

/// Decoded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Path of the file within the repository
    pub path: String,
    /// Decoded UTF-8 text
    pub text: String,
    /// Browsable URL of the file
    pub url: String,
}

/// Commit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    /// First line of the commit message
    pub title: String,
    /// Full commit message
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub url: String,
}

/// Pull request associated with a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub url: String,
    /// Unified diff, possibly truncated
    pub diff: Option<String>,
}

/// Code search and file access over the rules repository.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Check that the repository is reachable with the configured credentials.
    async fn probe(&self) -> Result<(), SourceError>;

    /// Run a code-search query, best hits first.
    async fn search_code(&self, query: &str) -> Result<Vec<CodeHit>, SourceError>;

    /// Fetch and decode a file by path.
    async fn fetch_file(&self, path: &str) -> Result<FileContent, SourceError>;

    /// `owner/repo` used to scope search queries.
    fn repository(&self) -> &str;
}

/// Commit and pull request metadata.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Fetch a commit. `Ok(None)` when the commit does not exist.
    async fn commit(
        &self,
        sha: &str,
        repo_override: Option<&str>,
    ) -> Result<Option<CommitInfo>, SourceError>;

    /// Fetch the pull request that introduced a commit, if any.
    async fn pull_request_for_commit(
        &self,
        sha: &str,
        repo_override: Option<&str>,
    ) -> Result<Option<PullRequestInfo>, SourceError>;
}

/// Structured log search.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Run a query and return matching entries in the requested order.
    async fn search(&self, query: &LogQuery) -> Result<Vec<LogEntry>, SourceError>;
}
