//! Pod reset investigation.
//!
//! Every process logs a commit marker line on boot (for example
//! `Running commit 3f2a9c1d`). The most recent marker for a workload anchors
//! the investigation: its commit and pull request are looked up, and every
//! log line since one second before the marker is collected.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::logs::{LogEntry, LogQuery, SortOrder};
use crate::sources::{CommitInfo, LogStore, PullRequestInfo, VersionControl};

/// Default marker phrase emitted on boot.
pub const DEFAULT_MARKER_PHRASE: &str = "Running commit";

/// Default number of marker lines considered.
pub const DEFAULT_MARKER_SCAN_LIMIT: usize = 5;

/// A parsed commit marker line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMarker {
    pub timestamp: DateTime<Utc>,
    /// Exactly 8 lowercase hex characters
    pub commit_hash: String,
    pub full_message: String,
}

/// Matches the marker phrase followed by an 8 character lowercase hex hash.
#[derive(Debug, Clone)]
pub struct CommitMarkerPattern {
    phrase: String,
    regex: Regex,
}

impl CommitMarkerPattern {
    pub fn new(phrase: &str) -> Result<Self, regex::Error> {
        // \b rejects a ninth hex character.
        let regex = Regex::new(&format!(
            r"{}[\s:=]*([0-9a-f]{{8}})\b",
            regex::escape(phrase)
        ))?;
        Ok(Self {
            phrase: phrase.to_string(),
            regex,
        })
    }

    /// The literal marker phrase.
    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Extract the commit hash from a message, if it carries a valid one.
    #[must_use]
    pub fn commit_hash<'a>(&self, message: &'a str) -> Option<&'a str> {
        self.regex
            .captures(message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Parse a log entry into a marker.
    #[must_use]
    pub fn parse(&self, entry: &LogEntry) -> Option<CommitMarker> {
        self.commit_hash(&entry.message).map(|hash| CommitMarker {
            timestamp: entry.timestamp,
            commit_hash: hash.to_string(),
            full_message: entry.message.clone(),
        })
    }
}

/// Longest marker search window: one week.
pub const MAX_SEARCH_WINDOW_MINUTES: u32 = 10_080;

/// Largest page the log store serves in one query.
pub const MAX_LOG_LIMIT: usize = 10_000;

/// Per-call investigation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSettings {
    /// How far back to look for marker lines
    pub search_window_minutes: u32,
    /// Maximum number of log lines returned after the anchor
    pub log_limit: usize,
}

impl ResetSettings {
    /// Bound both values to what the log store accepts.
    ///
    /// A zero limit would drop even the anchor line, so both start at 1.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            search_window_minutes: self
                .search_window_minutes
                .clamp(1, MAX_SEARCH_WINDOW_MINUTES),
            log_limit: self.log_limit.clamp(1, MAX_LOG_LIMIT),
        }
    }
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            search_window_minutes: 60,
            log_limit: 500,
        }
    }
}

/// Why an investigation found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    /// No log store is configured
    NotConfigured,
    /// The marker query itself failed
    LogStoreError,
    /// No marker lines in the window
    NoMarkerLines,
    /// Marker lines exist but none carries a valid hash
    NoParseableHash,
}

/// Reconstructed reset timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetInvestigationResult {
    pub found: bool,
    pub workload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotFoundReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub commit_hash: Option<String>,
    pub marker: Option<CommitMarker>,
    pub commit_info: Option<CommitInfo>,
    pub pr_info: Option<PullRequestInfo>,
    /// Chronological, oldest first
    pub logs: Vec<LogEntry>,
    pub log_count: usize,
}

impl ResetInvestigationResult {
    fn not_found(workload: &str, reason: NotFoundReason, message: String) -> Self {
        Self {
            found: false,
            workload: workload.to_string(),
            reason: Some(reason),
            message: Some(message),
            start_timestamp: None,
            commit_hash: None,
            marker: None,
            commit_info: None,
            pr_info: None,
            logs: Vec::new(),
            log_count: 0,
        }
    }
}

/// Correlates the latest boot marker with commit, PR and log data.
pub struct ResetTimelineReconstructor {
    logs: Option<Arc<dyn LogStore>>,
    vcs: Option<Arc<dyn VersionControl>>,
    pattern: CommitMarkerPattern,
    scan_limit: usize,
}

impl ResetTimelineReconstructor {
    #[must_use]
    pub fn new(
        logs: Option<Arc<dyn LogStore>>,
        vcs: Option<Arc<dyn VersionControl>>,
        pattern: CommitMarkerPattern,
        scan_limit: usize,
    ) -> Self {
        Self {
            logs,
            vcs,
            pattern,
            scan_limit,
        }
    }

    /// Investigate the most recent restart of `workload`.
    ///
    /// Always returns a result; failures are reported through `found`,
    /// `reason` and `message`. Settings are bounded by
    /// [`ResetSettings::clamped`] first.
    pub async fn investigate(
        &self,
        workload: &str,
        requested: &ResetSettings,
        repo_override: Option<&str>,
    ) -> ResetInvestigationResult {
        let settings = requested.clamped();
        if settings != *requested {
            debug!(
                requested_window = requested.search_window_minutes,
                requested_limit = requested.log_limit,
                window = settings.search_window_minutes,
                limit = settings.log_limit,
                "Clamped investigation settings"
            );
        }

        let Some(store) = &self.logs else {
            return ResetInvestigationResult::not_found(
                workload,
                NotFoundReason::NotConfigured,
                "Log store is not configured".to_string(),
            );
        };

        let now = Utc::now();
        let window_start = now - Duration::minutes(i64::from(settings.search_window_minutes));
        let marker_query = LogQuery::for_workload(workload)
            .phrase(self.pattern.phrase())
            .since(window_start)
            .until(now)
            .order(SortOrder::Desc)
            .size(self.scan_limit);

        let mut candidates = match store.search(&marker_query).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(workload = %workload, error = %e, "Commit marker query failed");
                return ResetInvestigationResult::not_found(
                    workload,
                    NotFoundReason::LogStoreError,
                    format!("Failed to query commit markers: {e}"),
                );
            }
        };

        if candidates.is_empty() {
            info!(workload = %workload, "No commit marker lines in window");
            return ResetInvestigationResult::not_found(
                workload,
                NotFoundReason::NoMarkerLines,
                format!(
                    "No '{}' log lines found for {workload} in the last {} minutes",
                    self.pattern.phrase(),
                    settings.search_window_minutes
                ),
            );
        }

        // Newest first, whatever order the store returned.
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        candidates.truncate(self.scan_limit);

        let Some(anchor) = candidates.iter().find_map(|e| self.pattern.parse(e)) else {
            info!(
                workload = %workload,
                candidates = candidates.len(),
                "Commit marker lines found but none carries a valid hash"
            );
            return ResetInvestigationResult::not_found(
                workload,
                NotFoundReason::NoParseableHash,
                format!(
                    "Found {} '{}' log lines for {workload} but none contained an 8 character commit hash",
                    candidates.len(),
                    self.pattern.phrase()
                ),
            );
        };

        let start_timestamp = anchor.timestamp - Duration::seconds(1);
        info!(
            workload = %workload,
            commit = %anchor.commit_hash,
            anchor = %anchor.timestamp,
            "Anchored reset investigation"
        );

        let (commit_info, pr_info) = match &self.vcs {
            Some(vcs) => tokio::join!(
                fetch_commit(vcs.as_ref(), &anchor.commit_hash, repo_override),
                fetch_pull_request(vcs.as_ref(), &anchor.commit_hash, repo_override),
            ),
            None => {
                debug!("No version control configured, skipping commit lookup");
                (None, None)
            }
        };

        let since_query = LogQuery::for_workload(workload)
            .since(start_timestamp)
            .order(SortOrder::Asc)
            .size(settings.log_limit);

        let (logs, message) = match store.search(&since_query).await {
            Ok(mut logs) => {
                logs.sort_by_key(|e| e.timestamp);
                (logs, None)
            }
            Err(e) => {
                warn!(workload = %workload, error = %e, "Failed to fetch logs since anchor");
                (Vec::new(), Some(format!("Failed to fetch logs since anchor: {e}")))
            }
        };

        ResetInvestigationResult {
            found: true,
            workload: workload.to_string(),
            reason: None,
            message,
            start_timestamp: Some(start_timestamp),
            commit_hash: Some(anchor.commit_hash.clone()),
            marker: Some(anchor),
            commit_info,
            pr_info,
            log_count: logs.len(),
            logs,
        }
    }
}

async fn fetch_commit(
    vcs: &dyn VersionControl,
    sha: &str,
    repo_override: Option<&str>,
) -> Option<CommitInfo> {
    match vcs.commit(sha, repo_override).await {
        Ok(info) => info,
        Err(e) => {
            warn!(commit = %sha, error = %e, "Failed to fetch commit metadata");
            None
        }
    }
}

async fn fetch_pull_request(
    vcs: &dyn VersionControl,
    sha: &str,
    repo_override: Option<&str>,
) -> Option<PullRequestInfo> {
    match vcs.pull_request_for_commit(sha, repo_override).await {
        Ok(info) => info,
        Err(e) => {
            warn!(commit = %sha, error = %e, "Failed to fetch pull request for commit");
            None
        }
    }
}
