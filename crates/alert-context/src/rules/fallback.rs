//! Static, read-only table of well-known rules.
//!
//! Used when the rules repository is unreachable or has no match.

use std::collections::{BTreeMap, HashMap};

use super::AlertRule;

/// Read-only mapping from alert name to rule.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    rules: HashMap<String, AlertRule>,
}

impl FallbackTable {
    /// Build a table from the given rules, keyed by rule name.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = AlertRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// The built-in table of common Kubernetes alerts.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new([
            rule(
                "ContainerCPUThrottlingIsHigh",
                "sum(increase(container_cpu_cfs_throttled_periods_total{container!=\"\"}[5m])) by (container, pod, namespace) / sum(increase(container_cpu_cfs_periods_total[5m])) by (container, pod, namespace) > 0.25",
                "10m",
                "warning",
                "Container CPU throttling is high",
                "Container {{ $labels.container }} in pod {{ $labels.pod }} is throttled for more than 25% of its CPU periods.",
            ),
            rule(
                "ContainerMemoryUsageHigh",
                "sum(container_memory_working_set_bytes{container!=\"\"}) by (container, pod, namespace) / sum(container_spec_memory_limit_bytes{container!=\"\"} > 0) by (container, pod, namespace) > 0.9",
                "5m",
                "warning",
                "Container memory usage is above 90% of its limit",
                "Container {{ $labels.container }} in pod {{ $labels.pod }} is close to being OOM killed.",
            ),
            rule(
                "KubePodCrashLooping",
                "max_over_time(kube_pod_container_status_waiting_reason{reason=\"CrashLoopBackOff\"}[5m]) >= 1",
                "15m",
                "critical",
                "Pod is crash looping",
                "Pod {{ $labels.namespace }}/{{ $labels.pod }} ({{ $labels.container }}) is in waiting state (reason: CrashLoopBackOff).",
            ),
            rule(
                "KubePodNotReady",
                "sum by (namespace, pod) (max by (namespace, pod) (kube_pod_status_phase{phase=~\"Pending|Unknown|Failed\"})) > 0",
                "15m",
                "warning",
                "Pod has been in a non-ready state for more than 15 minutes",
                "Pod {{ $labels.namespace }}/{{ $labels.pod }} has been in a non-ready state for longer than 15 minutes.",
            ),
            rule(
                "KubeDeploymentReplicasMismatch",
                "kube_deployment_spec_replicas > kube_deployment_status_replicas_available",
                "15m",
                "warning",
                "Deployment has not matched the expected number of replicas",
                "Deployment {{ $labels.namespace }}/{{ $labels.deployment }} has not matched the expected number of replicas for longer than 15 minutes.",
            ),
        ])
    }

    /// Look up a rule by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AlertRule> {
        self.rules.get(name)
    }

    /// Number of rules in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn rule(
    name: &str,
    expression: &str,
    duration: &str,
    severity: &str,
    summary: &str,
    description: &str,
) -> AlertRule {
    AlertRule {
        name: name.to_string(),
        expression: expression.to_string(),
        duration: duration.to_string(),
        summary: summary.to_string(),
        description: description.to_string(),
        severity: severity.to_string(),
        labels: BTreeMap::from([("severity".to_string(), severity.to_string())]),
        annotations: BTreeMap::from([
            ("summary".to_string(), summary.to_string()),
            ("description".to_string(), description.to_string()),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_exact() {
        let table = FallbackTable::builtin();
        assert_eq!(table.len(), 5);
        let rule = table.get("KubePodCrashLooping").unwrap();
        assert_eq!(rule.severity, "critical");
        assert!(table.get("kubepodcrashlooping").is_none());
    }

    #[test]
    fn test_injected_table() {
        let table = FallbackTable::new([AlertRule::empty("Custom")]);
        assert!(table.get("Custom").is_some());
        assert!(FallbackTable::default().is_empty());
    }
}
