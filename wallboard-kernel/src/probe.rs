//! Escalation probe for "RECENTLY OFFLINE" servers.
//!
//! Reads the per-device service-monitor list and looks at the first `Connectivity` entry:
//! `Normal` means the host still answers (the agent is the problem), `Failed` reported by
//! an appliance other than the central server corroborates the outage.

use std::future::Future;

use crate::error::HarvestError;
use crate::liveness::{Issue, IssueLabel, Severity};
use crate::models::{DeviceId, ServiceStatus};

const CONNECTIVITY_MODULE: &str = "Connectivity";

/// Source of per-device service statuses. Implemented by the N-central client.
pub trait ServiceProbe {
    fn service_status(
        &self,
        device_id: &DeviceId,
    ) -> impl Future<Output = Result<Vec<ServiceStatus>, HarvestError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Host answers the connectivity check.
    Verified,
    /// Connectivity check failed from a remote appliance.
    ConfirmedDown,
    NoOverride,
}

/// Nom de l'appliance centrale : un échec remonté par elle ne corrobore rien.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbePolicy {
    pub central_appliance: Option<String>,
}

impl ProbePolicy {
    fn is_central(&self, appliance: Option<&str>) -> bool {
        match (self.central_appliance.as_deref(), appliance) {
            (Some(central), Some(name)) => central.eq_ignore_ascii_case(name.trim()),
            _ => false,
        }
    }
}

pub fn evaluate(services: &[ServiceStatus], policy: &ProbePolicy) -> ProbeVerdict {
    let Some(entry) = services
        .iter()
        .find(|s| s.module_name.as_deref() == Some(CONNECTIVITY_MODULE))
    else {
        return ProbeVerdict::NoOverride;
    };

    match entry.state_status.as_deref() {
        Some("Normal") => ProbeVerdict::Verified,
        Some("Failed") if !policy.is_central(entry.appliance_name.as_deref()) => {
            ProbeVerdict::ConfirmedDown
        }
        _ => ProbeVerdict::NoOverride,
    }
}

pub fn apply(issue: &mut Issue, verdict: ProbeVerdict) {
    match verdict {
        ProbeVerdict::Verified => issue.override_with(IssueLabel::FixAgent, Severity::Warning, 1.0),
        ProbeVerdict::ConfirmedDown => {
            issue.override_with(IssueLabel::ConfirmedDown, Severity::Critical, 3.0)
        }
        ProbeVerdict::NoOverride => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(module: &str, state: &str, appliance: &str) -> ServiceStatus {
        ServiceStatus {
            module_name: Some(module.into()),
            state_status: Some(state.into()),
            appliance_name: Some(appliance.into()),
        }
    }

    fn central() -> ProbePolicy {
        ProbePolicy { central_appliance: Some("ncod153".into()) }
    }

    fn recent_issue() -> Issue {
        Issue {
            name: "SRV-FS01".into(),
            time: "12m ago".into(),
            label: IssueLabel::RecentlyOffline,
            severity: Severity::Critical,
            weight: 2.0,
        }
    }

    #[test]
    fn test_normal_connectivity_is_verified() {
        let services = vec![svc("Agent Status", "Failed", "probe-01"), svc("Connectivity", "Normal", "probe-01")];
        assert_eq!(evaluate(&services, &central()), ProbeVerdict::Verified);

        let mut issue = recent_issue();
        apply(&mut issue, ProbeVerdict::Verified);
        assert_eq!(issue.label, IssueLabel::FixAgent);
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.weight, 1.0);
    }

    #[test]
    fn test_failed_from_remote_appliance_confirms_outage() {
        let services = vec![svc("Connectivity", "Failed", "probe-site-b")];
        assert_eq!(evaluate(&services, &central()), ProbeVerdict::ConfirmedDown);

        let mut issue = recent_issue();
        apply(&mut issue, ProbeVerdict::ConfirmedDown);
        assert_eq!(issue.label.as_str(), "CONFIRMED DOWN (Probe Failed)");
        assert_eq!(issue.weight, 3.0);
    }

    #[test]
    fn test_failed_from_central_server_is_ignored() {
        let services = vec![svc("Connectivity", "Failed", "NCOD153")];
        assert_eq!(evaluate(&services, &central()), ProbeVerdict::NoOverride);
    }

    #[test]
    fn test_only_first_connectivity_entry_counts() {
        let services = vec![svc("Connectivity", "Warning", "probe-01"), svc("Connectivity", "Normal", "probe-02")];
        assert_eq!(evaluate(&services, &central()), ProbeVerdict::NoOverride);
    }

    #[test]
    fn test_missing_connectivity_entry() {
        assert_eq!(evaluate(&[], &central()), ProbeVerdict::NoOverride);
        let services = vec![svc("Disk Space", "Normal", "probe-01")];
        assert_eq!(evaluate(&services, &ProbePolicy::default()), ProbeVerdict::NoOverride);

        let mut issue = recent_issue();
        apply(&mut issue, ProbeVerdict::NoOverride);
        assert_eq!(issue, recent_issue());
    }
}
