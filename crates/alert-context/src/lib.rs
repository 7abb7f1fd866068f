//! Alert enrichment for Prometheus alerts.
//!
//! This crate provides:
//! - Rule resolution: find an alert's rule definition in a rules repository,
//!   falling back to a built-in table when the repository is unreachable
//! - Rule parsing for `- name:` block lists and Prometheus `- alert:` groups
//! - Reset investigation: anchor on the latest boot commit marker in the
//!   workload's logs and correlate it with the commit, its pull request and
//!   the logs emitted since
//!
//! # Usage
//!
//! ```no_run
//! use alert_context::{AlertContext, Config, ResetSettings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let context = AlertContext::from_config(&Config::from_env())?;
//!
//! let rule = context.resolve_alert_rule("KubePodCrashLooping").await;
//! let reset = context
//!     .investigate_reset("api-7f9c", &ResetSettings::default(), None)
//!     .await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod elastic;
pub mod error;
pub mod github;
pub mod logs;
pub mod reset;
pub mod resolver;
pub mod rules;
pub mod search;
pub mod sources;

pub use config::Config;
pub use error::{ConfigError, SourceError};
pub use logs::{LogEntry, LogQuery, SortOrder};
pub use reset::{
    CommitMarker, CommitMarkerPattern, NotFoundReason, ResetInvestigationResult, ResetSettings,
    ResetTimelineReconstructor,
};
pub use resolver::AlertRuleResolver;
pub use rules::{parse_rule, AlertRule, Dialect, FallbackTable};
pub use search::{RepositorySearcher, RuleSource, SearchResult, SearchSettings};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use elastic::ElasticClient;
use github::{GitHubClient, GitHubRuleRepository, GitHubVersionControl};
use sources::{LogStore, VersionControl};

/// Entry point combining rule resolution and reset investigation.
pub struct AlertContext {
    resolver: AlertRuleResolver,
    reconstructor: ResetTimelineReconstructor,
}

impl AlertContext {
    #[must_use]
    pub fn new(resolver: AlertRuleResolver, reconstructor: ResetTimelineReconstructor) -> Self {
        Self {
            resolver,
            reconstructor,
        }
    }

    /// Wire up the GitHub and Elasticsearch adapters from configuration.
    ///
    /// Unconfigured capabilities are left out rather than failing.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let github =
            GitHubClient::from_config(&config.github).context("Failed to create GitHub client")?;

        let searcher = config.github.rules_repo.as_deref().map(|repo| {
            info!(repo = %repo, "Rules repository search enabled");
            let repository =
                GitHubRuleRepository::new(github.clone(), repo, config.github.rules_ref.clone());
            RepositorySearcher::new(
                Arc::new(repository),
                SearchSettings {
                    rules_path: config.github.rules_path.clone(),
                    known_files: config.github.known_files.clone(),
                    fetch_delay: Duration::from_millis(config.github.fetch_delay_ms),
                },
            )
        });

        let vcs: Arc<dyn VersionControl> = Arc::new(GitHubVersionControl::new(
            github,
            config.github.default_repo.clone(),
        ));

        let logs = ElasticClient::from_config(&config.elastic)
            .context("Failed to create Elasticsearch client")?
            .map(|client| Arc::new(client) as Arc<dyn LogStore>);
        if logs.is_none() {
            info!("ELASTIC_URL not set, reset investigation disabled");
        }

        let pattern = CommitMarkerPattern::new(&config.marker.phrase)
            .context("Invalid commit marker phrase")?;

        let fallback = FallbackTable::builtin();
        if fallback.is_empty() {
            warn!("Fallback table is empty");
        } else {
            debug!(rules = fallback.len(), "Fallback table loaded");
        }

        Ok(Self::new(
            AlertRuleResolver::new(searcher, Arc::new(fallback)),
            ResetTimelineReconstructor::new(logs, Some(vcs), pattern, config.marker.scan_limit),
        ))
    }

    /// Resolve an alert name to its rule definition.
    pub async fn resolve_alert_rule(&self, alert_name: &str) -> SearchResult {
        self.resolver.resolve(alert_name).await
    }

    /// Reconstruct the latest reset timeline for a workload.
    pub async fn investigate_reset(
        &self,
        workload: &str,
        settings: &ResetSettings,
        repo_override: Option<&str>,
    ) -> ResetInvestigationResult {
        self.reconstructor
            .investigate(workload, settings, repo_override)
            .await
    }
}
