//! Log entries, log-store queries and formatting helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction by timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A log-store query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogQuery {
    /// Workload identifier (pod / hostname)
    pub workload: String,
    /// Phrase the message must contain
    pub phrase: Option<String>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub order: SortOrder,
    /// Maximum number of entries
    pub size: usize,
}

impl LogQuery {
    /// Query all entries for a workload.
    #[must_use]
    pub fn for_workload(workload: &str) -> Self {
        Self {
            workload: workload.to_string(),
            phrase: None,
            since: None,
            until: None,
            order: SortOrder::Asc,
            size: 100,
        }
    }

    #[must_use]
    pub fn phrase(mut self, phrase: &str) -> Self {
        self.phrase = Some(phrase.to_string());
        self
    }

    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Normalized level (`ERROR`, `WARNING`, `INFO`, `DEBUG`, `CRITICAL`) or the raw value
    pub level: String,
    pub message: String,
    /// Workload the entry came from
    pub workload: Option<String>,
}

/// Map the many spellings of a log level onto one canonical name.
///
/// Unknown levels are returned unchanged.
#[must_use]
pub fn normalize_level(raw: &str) -> String {
    let canonical = match raw.trim().to_ascii_uppercase().as_str() {
        "ERROR" | "E" | "ERR" => "ERROR",
        "WARNING" | "WARN" | "W" => "WARNING",
        "INFO" | "I" => "INFO",
        "DEBUG" | "D" => "DEBUG",
        "CRITICAL" | "CRIT" | "C" | "FATAL" => "CRITICAL",
        _ => return raw.trim().to_string(),
    };
    canonical.to_string()
}

/// Format log entries as a timeline for terminal output.
///
/// `max_lines == 0` shows everything; otherwise only the last `max_lines`.
#[must_use]
pub fn format_logs(entries: &[LogEntry], max_lines: usize) -> String {
    use std::fmt::Write;

    if entries.is_empty() {
        return "No logs available.".to_string();
    }

    let mut output = String::new();
    let total = entries.len();

    let shown: &[LogEntry] = if max_lines > 0 && total > max_lines {
        let _ = writeln!(output, "Showing last {max_lines} of {total} log entries");
        &entries[total - max_lines..]
    } else {
        entries
    };

    for entry in shown {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let _ = writeln!(output, "[{time}] {:<8} {}", entry.level, entry.message);
    }

    output
}

/// Entries at error level or whose message looks like a failure.
#[must_use]
pub fn error_lines(entries: &[LogEntry]) -> Vec<&LogEntry> {
    entries
        .iter()
        .filter(|e| {
            if matches!(e.level.as_str(), "ERROR" | "CRITICAL") {
                return true;
            }
            let lower = e.message.to_lowercase();
            lower.contains("error")
                || lower.contains("fatal")
                || lower.contains("panic")
                || lower.contains("exception")
                || lower.contains("traceback")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
            workload: None,
        }
    }

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("err"), "ERROR");
        assert_eq!(normalize_level("warn"), "WARNING");
        assert_eq!(normalize_level("fatal"), "CRITICAL");
        assert_eq!(normalize_level("I"), "INFO");
        assert_eq!(normalize_level("trace"), "trace");
    }

    #[test]
    fn test_format_logs_empty() {
        assert_eq!(format_logs(&[], 10), "No logs available.");
    }

    #[test]
    fn test_format_logs_truncation() {
        let entries: Vec<LogEntry> = (0..10)
            .map(|i| entry("INFO", &format!("Log line {i}")))
            .collect();

        let output = format_logs(&entries, 5);
        assert!(output.contains("Showing last 5 of 10"));
        assert!(output.contains("Log line 9"));
        assert!(!output.contains("Log line 0"));

        let all = format_logs(&entries, 0);
        assert!(!all.contains("Showing last"));
        assert!(all.contains("Log line 0"));
    }

    #[test]
    fn test_error_lines() {
        let entries = vec![
            entry("INFO", "Starting server"),
            entry("ERROR", "Connection refused"),
            entry("INFO", "Traceback (most recent call last):"),
            entry("WARNING", "Retrying"),
        ];
        let errors = error_lines(&entries);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Connection refused");
    }

    #[test]
    fn test_query_builder() {
        let query = LogQuery::for_workload("api-7f9c")
            .phrase("Running commit")
            .order(SortOrder::Desc)
            .size(5);
        assert_eq!(query.phrase.as_deref(), Some("Running commit"));
        assert_eq!(query.order.as_str(), "desc");
        assert_eq!(query.size, 5);
        assert!(query.since.is_none());
    }
}
