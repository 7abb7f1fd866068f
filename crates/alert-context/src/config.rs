//! Configuration loaded from environment variables.
//!
//! Every remote capability is optional: a missing `RULES_REPO`,
//! `DEFAULT_CODE_REPO` or `ELASTIC_URL` disables the matching tier instead of
//! failing.

use crate::error::ConfigError;
use crate::reset::{DEFAULT_MARKER_PHRASE, DEFAULT_MARKER_SCAN_LIMIT};

/// Default GitHub API base URL
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default log index pattern
const DEFAULT_ELASTIC_INDEX: &str = "app-logs-*";

/// Conventional rule file locations in the rules repository.
pub const DEFAULT_KNOWN_FILES: &[&str] = &[
    "rules/alerts.yml",
    "rules/kubernetes.yml",
    "rules/containers.yml",
    "rules/nodes.yml",
    "prometheus/rules/alerts.yaml",
    "alerts/rules.yaml",
];

/// GitHub settings (rules repository and commit lookups).
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL
    pub api_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// `owner/repo` holding the alert rules
    pub rules_repo: Option<String>,
    /// Branch or ref for file contents
    pub rules_ref: Option<String>,
    /// Directory for the path-restricted search variant
    pub rules_path: String,
    /// Known rule files, in probe order
    pub known_files: Vec<String>,
    /// Delay between known-file fetches in milliseconds
    pub fetch_delay_ms: u64,
    /// `owner/repo` for commit and PR lookups
    pub default_repo: Option<String>,
    /// PR diffs are truncated beyond this many characters
    pub max_diff_chars: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Field names in the log documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub timestamp: String,
    pub message: String,
    pub level: String,
    pub workload: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            timestamp: "@timestamp".to_string(),
            message: "json.message".to_string(),
            level: "json.levelname".to_string(),
            workload: "json.hostname".to_string(),
        }
    }
}

/// Elasticsearch log store settings.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    /// Index pattern to search
    pub index: String,
    pub fields: FieldMapping,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// PEM bundle trusted in addition to the system roots
    pub ca_certs: Option<String>,
    /// Whether to verify the cluster's TLS certificate
    pub verify_certs: bool,
}

/// Commit marker settings.
#[derive(Debug, Clone)]
pub struct MarkerConfig {
    /// Phrase preceding the commit hash in boot log lines
    pub phrase: String,
    /// How many recent marker lines to consider
    pub scan_limit: usize,
}

/// Full configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub github: GitHubConfig,
    pub elastic: ElasticConfig,
    pub marker: MarkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset. Unparseable numbers fall back to defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let parse_or = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let known_files = get("RULES_KNOWN_FILES")
            .map(|v| {
                v.split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_KNOWN_FILES.iter().map(|f| (*f).to_string()).collect());

        let github = GitHubConfig {
            api_url: get_or("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            token: get("GITHUB_TOKEN"),
            rules_repo: get("RULES_REPO"),
            rules_ref: get("RULES_REF"),
            rules_path: get_or("RULES_PATH", "rules"),
            known_files,
            fetch_delay_ms: parse_or("RULES_FETCH_DELAY_MS", 500),
            default_repo: get("DEFAULT_CODE_REPO"),
            max_diff_chars: parse_or("MAX_DIFF_CHARS", 20_000) as usize,
            timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30),
        };

        let fields = FieldMapping::default();
        let elastic = ElasticConfig {
            url: get("ELASTIC_URL").or_else(|| get("ELASTICSEARCH_URL")),
            username: get("ELASTIC_USERNAME").or_else(|| get("ELASTICSEARCH_USERNAME")),
            password: get("ELASTIC_PASSWORD").or_else(|| get("ELASTICSEARCH_PASSWORD")),
            api_key: get("ELASTIC_API_KEY").or_else(|| get("ELASTICSEARCH_API_KEY")),
            index: get_or("ELASTIC_INDEX", DEFAULT_ELASTIC_INDEX),
            fields: FieldMapping {
                timestamp: get_or("ELASTIC_TIMESTAMP_FIELD", &fields.timestamp),
                message: get_or("ELASTIC_MESSAGE_FIELD", &fields.message),
                level: get_or("ELASTIC_LEVEL_FIELD", &fields.level),
                workload: get_or("ELASTIC_WORKLOAD_FIELD", &fields.workload),
            },
            timeout_ms: get("ELASTIC_TIMEOUT")
                .or_else(|| get("ELASTICSEARCH_TIMEOUT"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(30_000),
            ca_certs: get("ELASTIC_CA_CERTS").or_else(|| get("ELASTICSEARCH_CA_CERTS")),
            verify_certs: get("ELASTIC_VERIFY_CERTS")
                .or_else(|| get("ELASTICSEARCH_VERIFY_CERTS"))
                .map_or(true, |v| parse_flag(&v)),
        };

        let marker = MarkerConfig {
            phrase: get_or("COMMIT_MARKER_PHRASE", DEFAULT_MARKER_PHRASE),
            scan_limit: parse_or("COMMIT_MARKER_SCAN_LIMIT", DEFAULT_MARKER_SCAN_LIMIT as u64)
                as usize,
        };

        Self {
            github,
            elastic,
            marker,
        }
    }

    /// Check values that would make every call fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            ("RULES_REPO", &self.github.rules_repo),
            ("DEFAULT_CODE_REPO", &self.github.default_repo),
        ] {
            if let Some(value) = value {
                validate_repository(var, value)?;
            }
        }

        if self.marker.scan_limit == 0 {
            return Err(ConfigError::ZeroLimit("COMMIT_MARKER_SCAN_LIMIT"));
        }
        if self.github.timeout_secs == 0 {
            return Err(ConfigError::ZeroLimit("HTTP_TIMEOUT_SECS"));
        }
        if self.elastic.timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit("ELASTIC_TIMEOUT"));
        }
        if self.marker.phrase.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "COMMIT_MARKER_PHRASE",
                value: self.marker.phrase.clone(),
            });
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// Reject repository values that are not `owner/repo`.
pub fn validate_repository(var: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_owner_repo(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRepository {
            var,
            value: value.to_string(),
        })
    }
}

/// Whether `value` looks like `owner/repo`.
#[must_use]
pub fn is_owner_repo(value: &str) -> bool {
    let mut parts = value.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert!(config.github.rules_repo.is_none());
        assert_eq!(config.github.known_files.len(), 6);
        assert_eq!(config.github.fetch_delay_ms, 500);
        assert_eq!(config.github.timeout_secs, 30);
        assert!(config.elastic.url.is_none());
        assert_eq!(config.elastic.fields.timestamp, "@timestamp");
        assert_eq!(config.elastic.timeout_ms, 30_000);
        assert!(config.elastic.ca_certs.is_none());
        assert!(config.elastic.verify_certs);
        assert_eq!(config.marker.phrase, "Running commit");
        assert_eq!(config.marker.scan_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_and_aliases() {
        let config = config(&[
            ("RULES_REPO", "acme/prometheus-rules"),
            ("RULES_KNOWN_FILES", "a.yml, b.yml,,"),
            ("ELASTICSEARCH_URL", "http://es:9200"),
            ("ELASTIC_TIMEOUT", "5000"),
            ("RULES_FETCH_DELAY_MS", "not-a-number"),
            ("GITHUB_TOKEN", ""),
        ]);
        assert_eq!(
            config.github.rules_repo.as_deref(),
            Some("acme/prometheus-rules")
        );
        assert_eq!(config.github.known_files, vec!["a.yml", "b.yml"]);
        assert_eq!(config.elastic.url.as_deref(), Some("http://es:9200"));
        assert_eq!(config.elastic.timeout_ms, 5000);
        assert_eq!(config.github.fetch_delay_ms, 500);
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_tls_settings() {
        let config = config(&[
            ("ELASTIC_CA_CERTS", "/etc/ssl/es-ca.pem"),
            ("ELASTICSEARCH_VERIFY_CERTS", "False"),
        ]);
        assert_eq!(
            config.elastic.ca_certs.as_deref(),
            Some("/etc/ssl/es-ca.pem")
        );
        assert!(!config.elastic.verify_certs);
        assert!(parse_flag("true"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_validate_rejects_bad_repository() {
        let err = config(&[("DEFAULT_CODE_REPO", "just-a-name")])
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRepository {
                var: "DEFAULT_CODE_REPO",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_scan_limit() {
        let err = config(&[("COMMIT_MARKER_SCAN_LIMIT", "0")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit("COMMIT_MARKER_SCAN_LIMIT")));
    }

    #[test]
    fn test_validate_repository_names_the_source() {
        assert!(validate_repository("--repo", "acme/api").is_ok());
        let err = validate_repository("--repo", "a/b/c").unwrap_err();
        assert_eq!(
            err.to_string(),
            "--repo must be in owner/repo form, got 'a/b/c'"
        );
    }

    #[test]
    fn test_owner_repo() {
        assert!(is_owner_repo("acme/rules"));
        assert!(!is_owner_repo("acme/"));
        assert!(!is_owner_repo("acme/rules/extra"));
        assert!(!is_owner_repo("rules"));
    }
}
