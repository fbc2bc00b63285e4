//! Agrégation par client et classement du snapshot.

use serde::Serialize;
use std::collections::HashMap;

use crate::liveness::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallStatus {
    Green,
    Red,
}

/// Une ligne du wallboard. Les noms de champs sont le contrat JSON du dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAggregate {
    #[serde(rename = "Customer")]
    pub customer: String,
    #[serde(rename = "Status")]
    pub status: OverallStatus,
    #[serde(rename = "TotalServers")]
    pub total_servers: u32,
    /// Somme des poids des issues (sert au classement, pas un compte)
    #[serde(rename = "IssuesCount")]
    pub issue_weight: f64,
    #[serde(rename = "IssuesList")]
    pub issues: Vec<Issue>,
}

impl CustomerAggregate {
    fn new(customer: &str) -> Self {
        Self {
            customer: customer.to_string(),
            status: OverallStatus::Green,
            total_servers: 0,
            issue_weight: 0.0,
            issues: Vec::new(),
        }
    }
}

/// Snapshot publié : trié par poids décroissant puis nom de client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(pub Vec<CustomerAggregate>);

impl Snapshot {
    pub fn customers(&self) -> &[CustomerAggregate] {
        &self.0
    }
}

/// Map client -> agrégat, reconstruite à chaque cycle.
#[derive(Debug, Default)]
pub struct Aggregator {
    customers: HashMap<String, CustomerAggregate>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compte un serveur supervisé pour ce client, avec son éventuelle issue.
    pub fn record(&mut self, customer: &str, issue: Option<Issue>) {
        let entry = self
            .customers
            .entry(customer.to_string())
            .or_insert_with(|| CustomerAggregate::new(customer));

        entry.total_servers += 1;
        if let Some(issue) = issue {
            entry.status = OverallStatus::Red;
            entry.issue_weight += issue.weight;
            entry.issues.push(issue);
        }
    }

    pub fn into_snapshot(self) -> Snapshot {
        let mut rows: Vec<CustomerAggregate> = self.customers.into_values().collect();
        rows.sort_by(|a, b| {
            b.issue_weight
                .total_cmp(&a.issue_weight)
                .then_with(|| a.customer.cmp(&b.customer))
        });
        Snapshot(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::{IssueLabel, Severity};

    fn issue(name: &str, weight: f64) -> Issue {
        Issue {
            name: name.into(),
            time: "10m ago".into(),
            label: IssueLabel::RecentlyOffline,
            severity: Severity::Critical,
            weight,
        }
    }

    #[test]
    fn test_empty_aggregator_gives_empty_snapshot() {
        let snapshot = Aggregator::new().into_snapshot();
        assert!(snapshot.customers().is_empty());
        assert_eq!(serde_json::to_string(&snapshot).unwrap(), "[]");
    }

    #[test]
    fn test_status_follows_issue_list() {
        let mut agg = Aggregator::new();
        agg.record("Healthy Co", None);
        agg.record("Healthy Co", None);
        agg.record("Broken Co", None);
        agg.record("Broken Co", Some(issue("SRV-1", 2.0)));

        let snapshot = agg.into_snapshot();
        for row in snapshot.customers() {
            assert_eq!(row.status == OverallStatus::Red, !row.issues.is_empty());
        }
        let healthy = &snapshot.customers()[1];
        assert_eq!(healthy.customer, "Healthy Co");
        assert_eq!(healthy.total_servers, 2);
        assert_eq!(healthy.status, OverallStatus::Green);
        assert_eq!(snapshot.customers()[0].total_servers, 2);
    }

    #[test]
    fn test_ranking_by_weight_then_name() {
        let mut agg = Aggregator::new();
        agg.record("Zeta", Some(issue("z1", 0.5)));
        agg.record("Alpha", Some(issue("a1", 0.5)));
        agg.record("Mid", Some(issue("m1", 0.05)));
        agg.record("Mid", Some(issue("m2", 0.1)));
        agg.record("Top", Some(issue("t1", 3.0)));
        agg.record("Clean", None);

        let names: Vec<_> = agg
            .into_snapshot()
            .customers()
            .iter()
            .map(|c| c.customer.clone())
            .collect();
        assert_eq!(names, vec!["Top", "Alpha", "Zeta", "Mid", "Clean"]);
    }

    #[test]
    fn test_issues_keep_device_order() {
        let mut agg = Aggregator::new();
        agg.record("Acme", Some(issue("first", 0.05)));
        agg.record("Acme", None);
        agg.record("Acme", Some(issue("second", 3.0)));
        agg.record("Acme", Some(issue("third", 1.0)));

        let snapshot = agg.into_snapshot();
        let acme = &snapshot.customers()[0];
        let order: Vec<_> = acme.issues.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert!((acme.issue_weight - 4.05).abs() < 1e-9);
    }

    #[test]
    fn test_row_json_shape() {
        let mut agg = Aggregator::new();
        agg.record("Acme", Some(issue("SRV-1", 2.0)));
        let json = serde_json::to_value(agg.into_snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "Customer": "Acme",
                "Status": "Red",
                "TotalServers": 1,
                "IssuesCount": 2.0,
                "IssuesList": [{"name": "SRV-1", "time": "10m ago", "label": "RECENTLY OFFLINE", "severity": "critical"}]
            }])
        );
    }
}
