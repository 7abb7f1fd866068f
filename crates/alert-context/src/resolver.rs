//! Three-tier alert rule resolution.
//!
//! live repository search -> static fallback table -> explicit not-found.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::rules::FallbackTable;
use crate::search::{RepositorySearcher, SearchResult};

/// Resolves alert names to rule definitions.
pub struct AlertRuleResolver {
    searcher: Option<RepositorySearcher>,
    fallback: Arc<FallbackTable>,
}

impl AlertRuleResolver {
    /// Create a resolver. `searcher` is `None` when no rules repository is
    /// configured; resolution then goes straight to the fallback table.
    #[must_use]
    pub fn new(searcher: Option<RepositorySearcher>, fallback: Arc<FallbackTable>) -> Self {
        Self { searcher, fallback }
    }

    /// Resolve an alert's rule. Never fails; the result says where (or
    /// whether) the rule was found.
    pub async fn resolve(&self, alert_name: &str) -> SearchResult {
        let mut repository_error = None;
        let mut searched_files = Vec::new();
        let mut failed_files = Vec::new();

        match &self.searcher {
            None => debug!(alert = %alert_name, "No rules repository configured"),
            Some(searcher) => {
                let result = searcher.search_checked(alert_name).await;
                if result.found {
                    return result;
                }
                if let Some(error) = &result.error {
                    warn!(
                        alert = %alert_name,
                        source = result.source.as_str(),
                        error = %error,
                        "Rules repository search incomplete, using fallback table"
                    );
                }
                repository_error = result.error;
                searched_files = result.searched_files;
                failed_files = result.failed_files;
            }
        }

        if let Some(rule) = self.fallback.get(alert_name) {
            info!(alert = %alert_name, "Rule resolved from fallback table");
            return SearchResult::from_fallback_table(rule.clone());
        }

        info!(alert = %alert_name, "Rule not found in any source");
        let mut result = SearchResult::not_found(alert_name);
        result.error = repository_error;
        result.searched_files = searched_files;
        result.failed_files = failed_files;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::AlertRule;
    use crate::search::tests::{settings, StubRepository, RULES};
    use crate::search::RuleSource;
    use std::sync::atomic::Ordering;

    fn table() -> Arc<FallbackTable> {
        let mut rule = AlertRule::empty("KnownAlert");
        rule.expression = "up == 0".to_string();
        Arc::new(FallbackTable::new([rule]))
    }

    #[tokio::test]
    async fn test_repository_hit_is_returned_unchanged() {
        let mut repo = StubRepository::reachable();
        repo.files
            .insert(settings().known_files[0].clone(), RULES.to_string());
        let repo = Arc::new(repo);
        let searcher = RepositorySearcher::new(repo.clone(), settings());
        let direct = searcher.search("HighErrorRate").await;

        let resolver = AlertRuleResolver::new(
            Some(RepositorySearcher::new(repo, settings())),
            table(),
        );
        let resolved = resolver.resolve("HighErrorRate").await;

        assert_eq!(resolved, direct);
        assert_eq!(resolved.source, RuleSource::Repository);
    }

    #[tokio::test]
    async fn test_unreachable_repository_uses_fallback_table() {
        let repo = Arc::new(StubRepository::default());
        let resolver = AlertRuleResolver::new(
            Some(RepositorySearcher::new(repo.clone(), settings())),
            table(),
        );

        let result = resolver.resolve("KnownAlert").await;
        assert!(result.found);
        assert_eq!(result.source, RuleSource::FallbackTable);
        assert_eq!(result.rule.unwrap().expression, "up == 0");
        // Probe failure skips the search entirely.
        assert_eq!(repo.search_calls.load(Ordering::SeqCst), 0);

        let missing = resolver.resolve("UnknownAlert").await;
        assert!(!missing.found);
        assert_eq!(missing.source, RuleSource::None);
        assert!(missing.rule.is_none());
        assert!(missing.message.unwrap().contains("UnknownAlert"));
        assert!(missing.error.unwrap().contains("Bad credentials"));
    }

    fn readable_repository() -> StubRepository {
        let mut repo = StubRepository::reachable();
        for path in settings().known_files {
            repo.files.insert(path, "alerts: []\n".to_string());
        }
        repo
    }

    #[tokio::test]
    async fn test_searched_but_missing_uses_fallback_then_none() {
        let resolver = AlertRuleResolver::new(
            Some(RepositorySearcher::new(
                Arc::new(readable_repository()),
                settings(),
            )),
            table(),
        );

        let known = resolver.resolve("KnownAlert").await;
        assert_eq!(known.source, RuleSource::FallbackTable);

        let missing = resolver.resolve("UnknownAlert").await;
        assert_eq!(missing.source, RuleSource::None);
        assert!(missing.error.is_none());
        assert_eq!(missing.searched_files.len(), 6);
        assert!(missing.failed_files.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_known_files_surface_as_error() {
        let resolver = AlertRuleResolver::new(
            Some(RepositorySearcher::new(
                Arc::new(StubRepository::reachable()),
                settings(),
            )),
            table(),
        );

        let known = resolver.resolve("KnownAlert").await;
        assert_eq!(known.source, RuleSource::FallbackTable);

        let missing = resolver.resolve("UnknownAlert").await;
        assert!(!missing.found);
        assert_eq!(missing.source, RuleSource::None);
        assert!(missing.searched_files.is_empty());
        assert_eq!(missing.failed_files.len(), 6);
        assert!(missing.error.unwrap().contains("Not Found"));
    }

    #[tokio::test]
    async fn test_unconfigured_repository() {
        let resolver = AlertRuleResolver::new(None, Arc::new(FallbackTable::builtin()));
        let result = resolver.resolve("KubePodCrashLooping").await;
        assert_eq!(result.source, RuleSource::FallbackTable);

        let missing = resolver.resolve("NotARealAlert").await;
        assert!(!missing.found);
        assert_eq!(missing.source, RuleSource::None);
    }

    #[tokio::test]
    async fn test_resolution_is_repeatable() {
        let mut repo = StubRepository::reachable();
        repo.files
            .insert(settings().known_files[4].clone(), RULES.to_string());
        let resolver = AlertRuleResolver::new(
            Some(RepositorySearcher::new(Arc::new(repo), settings())),
            table(),
        );

        let first = resolver.resolve("HighErrorRate").await;
        let second = resolver.resolve("HighErrorRate").await;
        assert_eq!(first, second);
        assert!(first.found);
    }
}
