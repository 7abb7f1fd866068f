//! Rule search over the rules repository.
//!
//! Search runs in two phases:
//!
//! 1. **Code search** - an ordered list of query variants. The first variant
//!    returning at least one hit wins; its top hit is fetched and parsed.
//! 2. **Known files** - the configured candidate paths are fetched in order
//!    and the first one containing the alert name is parsed.
//!
//! Remote failures inside either phase are logged and skipped. Known files
//! that could not be fetched are reported apart from the ones that were read.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::rules::{parse_rule, AlertRule};
use crate::sources::RuleRepository;

/// Where a resolved rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSource {
    /// Found in the live rules repository
    Repository,
    /// Found in the static fallback table
    FallbackTable,
    /// The repository could not be searched
    Error,
    /// Not found anywhere
    None,
}

impl RuleSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::FallbackTable => "fallback-table",
            Self::Error => "error",
            Self::None => "none",
        }
    }
}

/// Outcome of a rule search.
///
/// Built only through the constructors below, which keep `found` and `rule`
/// consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub found: bool,
    pub source: RuleSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<AlertRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Known files whose content was read
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub searched_files: Vec<String>,
    /// Known files that could not be fetched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
}

impl SearchResult {
    /// Rule found in the repository.
    #[must_use]
    pub fn from_repository(file: String, url: String, rule: AlertRule) -> Self {
        Self {
            found: true,
            source: RuleSource::Repository,
            file: Some(file),
            url: Some(url),
            rule: Some(rule),
            message: None,
            error: None,
            searched_files: Vec::new(),
            failed_files: Vec::new(),
        }
    }

    /// Rule found in the fallback table.
    #[must_use]
    pub fn from_fallback_table(rule: AlertRule) -> Self {
        Self {
            found: true,
            source: RuleSource::FallbackTable,
            file: None,
            url: None,
            message: Some(format!(
                "Rule '{}' resolved from the built-in fallback table",
                rule.name
            )),
            rule: Some(rule),
            error: None,
            searched_files: Vec::new(),
            failed_files: Vec::new(),
        }
    }

    /// The repository was searched exhaustively without a match.
    #[must_use]
    pub fn not_in_repository(alert_name: &str, searched_files: Vec<String>) -> Self {
        Self {
            found: false,
            source: RuleSource::Repository,
            file: None,
            url: None,
            rule: None,
            message: Some(format!(
                "Alert '{alert_name}' not found in the rules repository after searching {} known files",
                searched_files.len()
            )),
            error: None,
            searched_files,
            failed_files: Vec::new(),
        }
    }

    /// Not a single known file could be read, so absence is unknown.
    #[must_use]
    pub fn known_files_unreadable(failed_files: Vec<String>, error: &SourceError) -> Self {
        Self {
            found: false,
            source: RuleSource::Error,
            file: None,
            url: None,
            rule: None,
            message: Some(format!(
                "None of the {} known rule files could be fetched",
                failed_files.len()
            )),
            error: Some(error.to_string()),
            searched_files: Vec::new(),
            failed_files,
        }
    }

    /// The repository could not be reached.
    #[must_use]
    pub fn unreachable(error: &SourceError) -> Self {
        Self {
            found: false,
            source: RuleSource::Error,
            file: None,
            url: None,
            rule: None,
            message: Some("Rules repository is unreachable".to_string()),
            error: Some(error.to_string()),
            searched_files: Vec::new(),
            failed_files: Vec::new(),
        }
    }

    /// Not found in any tier.
    #[must_use]
    pub fn not_found(alert_name: &str) -> Self {
        Self {
            found: false,
            source: RuleSource::None,
            file: None,
            url: None,
            rule: None,
            message: Some(format!(
                "Alert '{alert_name}' not found in the rules repository or the fallback table"
            )),
            error: None,
            searched_files: Vec::new(),
            failed_files: Vec::new(),
        }
    }
}

/// Search settings for [`RepositorySearcher`].
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Directory used by the path-restricted query variant
    pub rules_path: String,
    /// Candidate files for the known-file phase, in probe order
    pub known_files: Vec<String>,
    /// Delay between known-file fetches
    pub fetch_delay: Duration,
}

/// Locates an alert's rule in the rules repository.
pub struct RepositorySearcher {
    repo: Arc<dyn RuleRepository>,
    settings: SearchSettings,
}

impl RepositorySearcher {
    #[must_use]
    pub fn new(repo: Arc<dyn RuleRepository>, settings: SearchSettings) -> Self {
        Self { repo, settings }
    }

    /// Code-search query variants, in the order they are tried.
    #[must_use]
    pub fn query_variants(&self, alert_name: &str) -> Vec<String> {
        let repo = self.repo.repository();
        let path = self.settings.rules_path.trim_matches('/');
        vec![
            format!("\"{alert_name}\" repo:{repo}"),
            format!("{alert_name} repo:{repo} filename:alerts"),
            format!("{alert_name} repo:{repo} path:{path}"),
            format!("{alert_name} repo:{repo} extension:yml"),
            format!("{alert_name} repo:{repo} extension:yaml"),
        ]
    }

    /// Check repository reachability.
    pub async fn probe(&self) -> Result<(), SourceError> {
        self.repo.probe().await
    }

    /// Probe, then search. A failed probe yields a `source=error` result.
    pub async fn search_checked(&self, alert_name: &str) -> SearchResult {
        if let Err(e) = self.probe().await {
            warn!(alert = %alert_name, error = %e, "Rules repository probe failed");
            return SearchResult::unreachable(&e);
        }
        self.search(alert_name).await
    }

    /// Run the code-search phase, then the known-file phase.
    pub async fn search(&self, alert_name: &str) -> SearchResult {
        if let Some(result) = self.search_by_query(alert_name).await {
            return result;
        }

        info!(
            alert = %alert_name,
            "No code search hits, falling back to known rule files"
        );
        self.search_known_files(alert_name).await
    }

    async fn search_by_query(&self, alert_name: &str) -> Option<SearchResult> {
        for query in self.query_variants(alert_name) {
            debug!(alert = %alert_name, query = %query, "Searching rules repository");

            let hits = match self.repo.search_code(&query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = %query, error = %e, "Code search failed, trying next variant");
                    continue;
                }
            };

            let Some(top) = hits.into_iter().next() else {
                debug!(query = %query, "No hits");
                continue;
            };

            match self.repo.fetch_file(&top.path).await {
                Ok(content) => {
                    info!(alert = %alert_name, file = %content.path, "Rule file found via code search");
                    let rule = parse_rule(&content.text, alert_name);
                    if rule.is_blank() {
                        warn!(
                            alert = %alert_name,
                            file = %content.path,
                            "No rule block found in search hit"
                        );
                    }
                    let url = if content.url.is_empty() {
                        top.url
                    } else {
                        content.url
                    };
                    return Some(SearchResult::from_repository(content.path, url, rule));
                }
                Err(e) => {
                    warn!(file = %top.path, error = %e, "Failed to fetch search hit, trying next variant");
                }
            }
        }
        None
    }

    async fn search_known_files(&self, alert_name: &str) -> SearchResult {
        let mut searched = Vec::with_capacity(self.settings.known_files.len());
        let mut failed = Vec::new();
        let mut last_error = None;

        for (index, path) in self.settings.known_files.iter().enumerate() {
            if index > 0 && !self.settings.fetch_delay.is_zero() {
                tokio::time::sleep(self.settings.fetch_delay).await;
            }

            let content = match self.repo.fetch_file(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path, error = %e, "Failed to fetch known rule file");
                    failed.push(path.clone());
                    last_error = Some(e);
                    continue;
                }
            };
            searched.push(path.clone());

            if content.text.contains(alert_name) {
                info!(alert = %alert_name, file = %path, "Rule found in known file");
                let rule = parse_rule(&content.text, alert_name);
                if rule.is_blank() {
                    warn!(
                        alert = %alert_name,
                        file = %path,
                        "Alert name present but no rule block parsed"
                    );
                }
                return SearchResult::from_repository(content.path, content.url, rule);
            }
        }

        if let Some(error) = last_error {
            if searched.is_empty() {
                warn!(
                    alert = %alert_name,
                    failed = failed.len(),
                    error = %error,
                    "No known rule file could be fetched"
                );
                return SearchResult::known_files_unreadable(failed, &error);
            }

            warn!(
                alert = %alert_name,
                searched = searched.len(),
                failed = failed.len(),
                "Alert not found in readable known rule files"
            );
            let mut result = SearchResult::not_in_repository(alert_name, searched);
            result.error = Some(format!(
                "{} known rule files could not be fetched: {error}",
                failed.len()
            ));
            result.failed_files = failed;
            return result;
        }

        warn!(
            alert = %alert_name,
            files = searched.len(),
            "Alert not found in any known rule file"
        );
        SearchResult::not_in_repository(alert_name, searched)
    }
}
