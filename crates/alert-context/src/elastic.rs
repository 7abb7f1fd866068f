//! Elasticsearch client for workload logs.
//!
//! Queries `{url}/{index}/_search` with a bool filter built from a
//! [`LogQuery`] and maps hits back through the configured [`FieldMapping`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ElasticConfig, FieldMapping};
use crate::error::SourceError;
use crate::logs::{normalize_level, LogEntry, LogQuery};
use crate::sources::LogStore;

const SERVICE: &str = "Elasticsearch";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Clone)]
enum Auth {
    None,
    ApiKey(String),
    Basic { username: String, password: Option<String> },
}

/// Elasticsearch log store client.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: String,
    index: String,
    fields: FieldMapping,
    auth: Auth,
}

impl ElasticClient {
    /// Create a client from configuration. `None` when no URL is configured.
    pub fn from_config(config: &ElasticConfig) -> Result<Option<Self>, SourceError> {
        let Some(url) = &config.url else {
            return Ok(None);
        };

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));
        if let Some(path) = &config.ca_certs {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        if !config.verify_certs {
            warn!(url = %url, "TLS certificate verification disabled for Elasticsearch");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        let auth = match (&config.api_key, &config.username) {
            (Some(key), _) => Auth::ApiKey(key.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        Ok(Some(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            fields: config.fields.clone(),
            auth,
        }))
    }

    /// Build the search request body for a query.
    #[must_use]
    pub fn build_request(query: &LogQuery, fields: &FieldMapping) -> Value {
        let mut filter = vec![json!({
            "match_phrase": { &fields.workload: query.workload }
        })];

        if let Some(phrase) = &query.phrase {
            filter.push(json!({ "match_phrase": { &fields.message: phrase } }));
        }

        let mut range = serde_json::Map::new();
        if let Some(since) = query.since {
            range.insert("gte".to_string(), json!(format_timestamp(since)));
        }
        if let Some(until) = query.until {
            range.insert("lte".to_string(), json!(format_timestamp(until)));
        }
        if !range.is_empty() {
            filter.push(json!({ "range": { &fields.timestamp: range } }));
        }

        json!({
            "size": query.size,
            "sort": [{ &fields.timestamp: { "order": query.order.as_str() } }],
            "query": { "bool": { "filter": filter } }
        })
    }

    /// Map one `_source` document onto a log entry.
    ///
    /// Documents without a parseable timestamp are dropped.
    #[must_use]
    pub fn parse_source(source: &Value, fields: &FieldMapping) -> Option<LogEntry> {
        let timestamp = parse_timestamp(lookup(source, &fields.timestamp)?)?;
        let message = lookup(source, &fields.message)
            .map(value_to_string)
            .unwrap_or_default();
        let level = lookup(source, &fields.level)
            .map(|v| normalize_level(&value_to_string(v)))
            .unwrap_or_default();
        let workload = lookup(source, &fields.workload).map(value_to_string);

        Some(LogEntry {
            timestamp,
            level,
            message,
            workload,
        })
    }
}

#[async_trait]
impl LogStore for ElasticClient {
    async fn search(&self, query: &LogQuery) -> Result<Vec<LogEntry>, SourceError> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = Self::build_request(query, &self.fields);

        debug!(
            workload = %query.workload,
            phrase = ?query.phrase,
            since = ?query.since,
            size = query.size,
            "Querying Elasticsearch"
        );

        let mut request = self.client.post(&url).json(&body);
        request = match &self.auth {
            Auth::None => request,
            Auth::ApiKey(key) => request.header(AUTHORIZATION, format!("ApiKey {key}")),
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
        };

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

        let parsed: SearchResponse = response.json().await.map_err(|e| SourceError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;

        let total = parsed.hits.hits.len();
        let entries: Vec<LogEntry> = parsed
            .hits
            .hits
            .iter()
            .filter_map(|hit| Self::parse_source(&hit.source, &self.fields))
            .collect();

        debug!(hits = total, entries = entries.len(), "Retrieved log entries");
        Ok(entries)
    }
}

fn load_certificate(path: &str) -> Result<reqwest::Certificate, SourceError> {
    let pem = std::fs::read(path).map_err(|e| SourceError::Certificate {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    reqwest::Certificate::from_pem(&pem).map_err(|e| SourceError::Certificate {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resolve a field either as a flat dotted key or as a nested path.
fn lookup<'a>(source: &'a Value, field: &str) -> Option<&'a Value> {
    if let Some(value) = source.get(field) {
        return Some(value);
    }
    field
        .split('.')
        .try_fold(source, |current, part| current.get(part))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::SortOrder;
    use chrono::TimeZone;

    #[test]
    fn test_marker_query_body() {
        let since = Utc.with_ymd_and_hms(2026, 10, 17, 11, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let query = LogQuery::for_workload("api-7f9c")
            .phrase("Running commit")
            .since(since)
            .until(until)
            .order(SortOrder::Desc)
            .size(5);

        let body = ElasticClient::build_request(&query, &FieldMapping::default());

        assert_eq!(body["size"], 5);
        assert_eq!(body["sort"][0]["@timestamp"]["order"], "desc");
        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 3);
        assert_eq!(filter[0]["match_phrase"]["json.hostname"], "api-7f9c");
        assert_eq!(filter[1]["match_phrase"]["json.message"], "Running commit");
        assert_eq!(
            filter[2]["range"]["@timestamp"]["gte"],
            "2026-10-17T11:00:00.000Z"
        );
        assert_eq!(
            filter[2]["range"]["@timestamp"]["lte"],
            "2026-10-17T12:00:00.000Z"
        );
    }

    #[test]
    fn test_since_query_has_only_lower_bound() {
        let since = Utc.with_ymd_and_hms(2026, 10, 17, 11, 59, 59).unwrap();
        let query = LogQuery::for_workload("api-7f9c").since(since).size(500);

        let body = ElasticClient::build_request(&query, &FieldMapping::default());

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 2);
        let range = &filter[1]["range"]["@timestamp"];
        assert_eq!(range["gte"], "2026-10-17T11:59:59.000Z");
        assert!(range.get("lte").is_none());
        assert_eq!(body["sort"][0]["@timestamp"]["order"], "asc");
    }

    #[test]
    fn test_parse_nested_and_flat_fields() {
        let fields = FieldMapping::default();
        let nested = json!({
            "@timestamp": "2026-10-17T12:00:00.250Z",
            "json": { "message": "Running commit 3f2a9c1d", "levelname": "info", "hostname": "api-7f9c" }
        });
        let entry = ElasticClient::parse_source(&nested, &fields).unwrap();
        assert_eq!(entry.message, "Running commit 3f2a9c1d");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.workload.as_deref(), Some("api-7f9c"));

        let flat = json!({
            "@timestamp": 1_792_238_400_000_i64,
            "json.message": "boom",
            "json.levelname": "err"
        });
        let entry = ElasticClient::parse_source(&flat, &fields).unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.level, "ERROR");
        assert!(entry.workload.is_none());
    }

    #[test]
    fn test_missing_timestamp_is_dropped() {
        let doc = json!({ "json": { "message": "no time" } });
        assert!(ElasticClient::parse_source(&doc, &FieldMapping::default()).is_none());
    }

    #[test]
    fn test_unconfigured_client() {
        let config = ElasticConfig {
            url: None,
            username: None,
            password: None,
            api_key: None,
            index: "app-logs-*".to_string(),
            fields: FieldMapping::default(),
            timeout_ms: 1000,
            ca_certs: None,
            verify_certs: true,
        };
        assert!(ElasticClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_missing_ca_bundle_fails_construction() {
        let config = ElasticConfig {
            url: Some("https://es.internal:9200".to_string()),
            username: None,
            password: None,
            api_key: None,
            index: "app-logs-*".to_string(),
            fields: FieldMapping::default(),
            timeout_ms: 1000,
            ca_certs: Some("/nonexistent/es-ca.pem".to_string()),
            verify_certs: true,
        };
        let err = ElasticClient::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Certificate { ref path, .. } if path == "/nonexistent/es-ca.pem"
        ));
    }

    #[test]
    fn test_unverified_tls_builds_client() {
        let config = ElasticConfig {
            url: Some("https://es.internal:9200".to_string()),
            username: None,
            password: None,
            api_key: None,
            index: "app-logs-*".to_string(),
            fields: FieldMapping::default(),
            timeout_ms: 1000,
            ca_certs: None,
            verify_certs: false,
        };
        assert!(ElasticClient::from_config(&config).unwrap().is_some());
    }
}
