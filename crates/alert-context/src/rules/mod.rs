//! Alert rule records and the rule-file parser.
//!
//! Rule files in the rules repository come in two layouts:
//!
//! - **Block list** (`- name: X`) with `expression:`, `duration:`,
//!   `summary:`, `description:` and `target:` keys. `expression: |` starts a
//!   multi-line literal.
//! - **Prometheus-native** (`- alert: X`) with `expr:`, `for:` and nested
//!   `labels:` / `annotations:` maps.
//!
//! Both are parsed with the same line-oriented scanner in [`scan`]. Layouts
//! that differ from these two (flow mappings, anchors, odd indentation) are
//! not supported and parse to an empty rule.

pub mod fallback;
mod scan;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use fallback::FallbackTable;

use scan::{find_block, indentation, key_value, unquote};

/// Keys recognized inside a block-list rule.
const BLOCK_LIST_KEYS: &[&str] = &[
    "expression:",
    "duration:",
    "description:",
    "summary:",
    "target:",
];

const BLOCK_LIST_MARKER: &str = "- name:";
const PROMETHEUS_MARKER: &str = "- alert:";

/// A single alert rule's essential facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Alert name
    pub name: String,
    /// Query expression, flattened to one line
    pub expression: String,
    /// Trigger duration (e.g. `10m`), empty if absent
    pub duration: String,
    /// Short summary
    pub summary: String,
    /// Long description
    pub description: String,
    /// Derived severity
    pub severity: String,
    /// Rule labels
    pub labels: BTreeMap<String, String>,
    /// Rule annotations
    pub annotations: BTreeMap<String, String>,
}

impl AlertRule {
    /// A rule with only its name set.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// True when nothing beyond the name was extracted.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.expression.is_empty()
            && self.duration.is_empty()
            && self.summary.is_empty()
            && self.description.is_empty()
            && self.labels.is_empty()
            && self.annotations.is_empty()
    }
}

/// Rule-file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `- name: X` blocks
    BlockList,
    /// `- alert: X` Prometheus rule groups
    Prometheus,
}

impl Dialect {
    /// Detect the layout of a rule file.
    ///
    /// Prometheus files also contain `- name:` lines (rule groups), so the
    /// presence of any `- alert:` line decides.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        if text
            .lines()
            .any(|line| line.trim_start().starts_with(PROMETHEUS_MARKER))
        {
            Self::Prometheus
        } else {
            Self::BlockList
        }
    }

    /// Marker that introduces a rule in this layout.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::BlockList => BLOCK_LIST_MARKER,
            Self::Prometheus => PROMETHEUS_MARKER,
        }
    }

    /// Parse the rule named `alert_name` from `text`.
    ///
    /// Never fails: an absent rule yields [`AlertRule::empty`].
    #[must_use]
    pub fn parse(self, text: &str, alert_name: &str) -> AlertRule {
        let Some(body) = find_block(text, self.marker(), alert_name) else {
            return AlertRule::empty(alert_name);
        };

        match self {
            Self::BlockList => parse_block_list(&body, alert_name),
            Self::Prometheus => parse_prometheus(&body, alert_name),
        }
    }
}

/// Parse the rule named `alert_name`, detecting the file's layout.
#[must_use]
pub fn parse_rule(text: &str, alert_name: &str) -> AlertRule {
    Dialect::detect(text).parse(text, alert_name)
}

fn starts_block_list_key(trimmed: &str) -> bool {
    trimmed.starts_with(BLOCK_LIST_MARKER) || BLOCK_LIST_KEYS.iter().any(|k| trimmed.starts_with(k))
}

fn parse_block_list(body: &[&str], alert_name: &str) -> AlertRule {
    let mut rule = AlertRule::empty(alert_name);
    let mut target = String::new();

    let mut i = 0;
    while i < body.len() {
        let trimmed = body[i].trim();

        if let Some(value) = key_value(trimmed, "expression:") {
            if value == "|" {
                // Literal block: join continuation lines until the next key.
                let mut parts = Vec::new();
                i += 1;
                while i < body.len() {
                    let next = body[i].trim();
                    if starts_block_list_key(next) {
                        break;
                    }
                    if !next.is_empty() {
                        parts.push(next);
                    }
                    i += 1;
                }
                rule.expression = parts.join(" ");
                continue;
            }
            rule.expression = value.to_string();
        } else if let Some(value) = key_value(trimmed, "duration:") {
            rule.duration = value.to_string();
        } else if let Some(value) = key_value(trimmed, "description:") {
            rule.description = value.to_string();
        } else if let Some(value) = key_value(trimmed, "summary:") {
            rule.summary = value.to_string();
        } else if let Some(value) = key_value(trimmed, "target:") {
            target = value.to_string();
        }
        i += 1;
    }

    // Placeholder heuristic: the block list has no severity field.
    rule.severity = if target == "slack" {
        "warning".to_string()
    } else {
        "critical".to_string()
    };
    rule.labels
        .insert("severity".to_string(), rule.severity.clone());
    rule.annotations
        .insert("summary".to_string(), rule.summary.clone());
    rule.annotations
        .insert("description".to_string(), rule.description.clone());
    rule
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Labels,
    Annotations,
}

fn parse_prometheus(body: &[&str], alert_name: &str) -> AlertRule {
    let mut rule = AlertRule::empty(alert_name);
    let mut section = Section::None;
    // The rule's own keys sit one level below `- alert:`; anything shallower
    // belongs to the next group.
    let key_indent = body
        .iter()
        .find(|line| !line.trim().is_empty())
        .map_or(0, |line| indentation(line));

    for line in body {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if indentation(line) < key_indent {
            break;
        }

        match trimmed {
            "labels:" => {
                section = Section::Labels;
                continue;
            }
            "annotations:" => {
                section = Section::Annotations;
                continue;
            }
            _ => {}
        }

        if let Some(value) = key_value(trimmed, "expr:") {
            rule.expression = value.to_string();
            section = Section::None;
        } else if let Some(value) = key_value(trimmed, "for:") {
            rule.duration = value.to_string();
            section = Section::None;
        } else if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_string();
            let value = unquote(value).to_string();
            match section {
                Section::Labels => {
                    rule.labels.insert(key, value);
                }
                Section::Annotations => {
                    rule.annotations.insert(key, value);
                }
                Section::None => {}
            }
        }
    }

    rule.severity = rule.labels.get("severity").cloned().unwrap_or_default();
    rule.summary = rule.annotations.get("summary").cloned().unwrap_or_default();
    rule.description = rule
        .annotations
        .get("description")
        .cloned()
        .unwrap_or_default();
    rule
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_LIST: &str = "\
alerts:
  - name: ContainerCPUThrottlingIsHigh
    expression: |
      sum(rate(container_cpu_cfs_throttled_periods_total[5m])) by (pod)
        /
      sum(rate(container_cpu_cfs_periods_total[5m])) by (pod) > 0.25
    duration: 10m
    summary: CPU throttling is high
    description: Pod {{ $labels.pod }} is throttled
    target: slack
  - name: KubePodCrashLooping
    expression: increase(kube_pod_container_status_restarts_total[15m]) > 3
    duration: 5m
    summary: Pod is crash looping
    description: Restarts keep increasing
    target: pagerduty
  - name: NodeDiskFull
    expression: node_filesystem_avail_bytes == 0
";

    const PROMETHEUS: &str = "\
groups:
  - name: kubernetes-apps
    rules:
      - alert: KubePodNotReady
        expr: sum by (pod) (kube_pod_status_phase{phase=~\"Pending|Unknown\"}) > 0
        for: 15m
        labels:
          severity: \"warning\"
          team: platform
        annotations:
          summary: 'Pod has been in a non-ready state'
          description: Pod {{ $labels.pod }} not ready for 15 minutes
      - alert: KubeDeploymentReplicasMismatch
        expr: kube_deployment_spec_replicas != kube_deployment_status_replicas_available
        for: 15m
        labels:
          severity: critical
";

    #[test]
    fn test_slack_target_is_warning() {
        let rule = parse_rule(BLOCK_LIST, "ContainerCPUThrottlingIsHigh");
        assert_eq!(rule.severity, "warning");
        assert_eq!(rule.labels.get("severity").unwrap(), "warning");
        assert_eq!(rule.duration, "10m");
        assert_eq!(rule.summary, "CPU throttling is high");
    }

    #[test]
    fn test_other_target_is_critical() {
        let rule = parse_rule(BLOCK_LIST, "KubePodCrashLooping");
        assert_eq!(rule.severity, "critical");
        assert_eq!(rule.annotations.get("summary").unwrap(), "Pod is crash looping");
        assert_eq!(
            rule.annotations.get("description").unwrap(),
            "Restarts keep increasing"
        );
    }

    #[test]
    fn test_multiline_expression_is_flattened() {
        let rule = parse_rule(BLOCK_LIST, "ContainerCPUThrottlingIsHigh");
        assert_eq!(
            rule.expression,
            "sum(rate(container_cpu_cfs_throttled_periods_total[5m])) by (pod) / \
             sum(rate(container_cpu_cfs_periods_total[5m])) by (pod) > 0.25"
        );
    }

    #[test]
    fn test_blocks_do_not_leak_into_neighbours() {
        let middle = parse_rule(BLOCK_LIST, "KubePodCrashLooping");
        assert_eq!(
            middle.expression,
            "increase(kube_pod_container_status_restarts_total[15m]) > 3"
        );
        assert_eq!(middle.duration, "5m");

        // Last block has no duration or summary of its own.
        let last = parse_rule(BLOCK_LIST, "NodeDiskFull");
        assert_eq!(last.expression, "node_filesystem_avail_bytes == 0");
        assert!(last.duration.is_empty());
        assert!(last.summary.is_empty());
    }

    #[test]
    fn test_missing_rule_is_empty() {
        let rule = parse_rule(BLOCK_LIST, "DoesNotExist");
        assert_eq!(rule, AlertRule::empty("DoesNotExist"));
        assert!(rule.is_blank());
        assert_eq!(rule.expression, "");
    }

    #[test]
    fn test_substring_name_does_not_match() {
        let rule = parse_rule(BLOCK_LIST, "KubePodCrash");
        assert!(rule.is_blank());
    }

    #[test]
    fn test_detect_dialect() {
        assert_eq!(Dialect::detect(BLOCK_LIST), Dialect::BlockList);
        assert_eq!(Dialect::detect(PROMETHEUS), Dialect::Prometheus);
    }

    #[test]
    fn test_prometheus_sections() {
        let rule = parse_rule(PROMETHEUS, "KubePodNotReady");
        assert_eq!(
            rule.expression,
            "sum by (pod) (kube_pod_status_phase{phase=~\"Pending|Unknown\"}) > 0"
        );
        assert_eq!(rule.duration, "15m");
        assert_eq!(rule.severity, "warning");
        assert_eq!(rule.labels.get("team").unwrap(), "platform");
        assert_eq!(rule.summary, "Pod has been in a non-ready state");
        assert_eq!(
            rule.description,
            "Pod {{ $labels.pod }} not ready for 15 minutes"
        );
    }

    #[test]
    fn test_prometheus_last_rule() {
        let rule = parse_rule(PROMETHEUS, "KubeDeploymentReplicasMismatch");
        assert_eq!(rule.severity, "critical");
        assert!(rule.annotations.is_empty());
        assert!(rule.summary.is_empty());
    }

    #[test]
    fn test_next_group_header_is_not_captured() {
        let text = "\
groups:
  - name: g1
    rules:
      - alert: LastInGroup
        expr: up == 0
        annotations:
          summary: s
  - name: g2
    interval: 1m
    rules:
      - alert: Other
        expr: up == 1
";
        let rule = parse_rule(text, "LastInGroup");
        assert_eq!(rule.expression, "up == 0");
        assert_eq!(rule.summary, "s");
        assert_eq!(rule.annotations.len(), 1);
        assert!(rule.labels.is_empty());
    }

    #[test]
    fn test_group_name_is_not_an_alert() {
        let rule = parse_rule(PROMETHEUS, "kubernetes-apps");
        assert!(rule.is_blank());
    }
}
