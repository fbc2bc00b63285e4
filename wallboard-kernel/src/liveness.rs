//! Liveness classification for a single monitored server.
//!
//! The agent heartbeat (`lastApplianceCheckinTime`) is the authoritative signal: its age
//! selects a tier, and the tier alone decides whether an [`Issue`] exists and how much it
//! weighs. The remote-control status is normalized into [`ConnectivityStatus`] and kept on
//! the [`LivenessAssessment`] for reporting; ambiguous recent outages are settled by the
//! escalation probe (see `probe.rs`), not by that field.

use serde::{Serialize, Serializer};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::models::DeviceRecord;

const HOUR_MINS: f64 = 60.0;
const DAY_MINS: f64 = 1440.0;
/// 48h: upper bound of the "recently offline" tier.
const RECENT_LIMIT_MINS: f64 = 2880.0;
/// 7 days.
const LONG_TERM_MINS: f64 = 10080.0;
/// 14 days.
const HISTORICAL_MINS: f64 = 20160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Stale,
}

/// Closed set of labels shown on the wallboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLabel {
    RecentlyOffline,
    StaleAgent,
    LongTermOffline,
    HistoricalDown,
    FixAgent,
    ConfirmedDown,
}

impl IssueLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueLabel::RecentlyOffline => "RECENTLY OFFLINE",
            IssueLabel::StaleAgent => "STALE AGENT",
            IssueLabel::LongTermOffline => "LONG TERM OFFLINE",
            IssueLabel::HistoricalDown => "HISTORICAL DOWN",
            IssueLabel::FixAgent => "FIX AGENT (Probe Verified)",
            IssueLabel::ConfirmedDown => "CONFIRMED DOWN (Probe Failed)",
        }
    }
}

impl Serialize for IssueLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One impaired device. `weight` only drives the customer ranking and is not published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub name: String,
    pub time: String,
    pub label: IssueLabel,
    pub severity: Severity,
    #[serde(skip)]
    pub weight: f64,
}

impl Issue {
    pub fn override_with(&mut self, label: IssueLabel, severity: Severity, weight: f64) {
        self.label = label;
        self.severity = severity;
        self.weight = weight;
    }
}

/// Age bucket of the last agent checkin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeTier {
    Fresh,
    Recent,
    Stale,
    LongTerm,
    Historical,
}

impl AgeTier {
    pub fn from_age(age_minutes: f64, threshold_mins: f64) -> Self {
        if age_minutes <= threshold_mins {
            AgeTier::Fresh
        } else if age_minutes > HISTORICAL_MINS {
            AgeTier::Historical
        } else if age_minutes > LONG_TERM_MINS {
            AgeTier::LongTerm
        } else if age_minutes > RECENT_LIMIT_MINS {
            AgeTier::Stale
        } else {
            AgeTier::Recent
        }
    }

    /// Default verdict for the tier, before any probe override.
    fn verdict(self) -> Option<(IssueLabel, Severity, f64)> {
        match self {
            AgeTier::Fresh => None,
            AgeTier::Recent => Some((IssueLabel::RecentlyOffline, Severity::Critical, 2.0)),
            AgeTier::Stale => Some((IssueLabel::StaleAgent, Severity::Warning, 0.5)),
            AgeTier::LongTerm => Some((IssueLabel::LongTermOffline, Severity::Stale, 0.1)),
            AgeTier::Historical => Some((IssueLabel::HistoricalDown, Severity::Stale, 0.05)),
        }
    }
}

/// Normalized `remoteControlStatus`. Anything not explicitly recognized is `Unknown`,
/// and `Unknown` is never considered reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Active,
    Inactive,
    Unknown,
}

impl ConnectivityStatus {
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(raw) = raw else { return ConnectivityStatus::Unknown };
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "connected" | "online" | "enabled" => ConnectivityStatus::Active,
            "inactive" | "disconnected" | "offline" | "disabled" | "unavailable"
            | "not installed" | "failed" => ConnectivityStatus::Inactive,
            _ => ConnectivityStatus::Unknown,
        }
    }

    pub fn is_reachable(self) -> bool {
        self == ConnectivityStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessPolicy {
    pub threshold_mins: f64,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self { threshold_mins: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessAssessment {
    pub age_minutes: f64,
    pub tier: AgeTier,
    pub connectivity: ConnectivityStatus,
}

impl LivenessAssessment {
    pub fn agent_alive(&self) -> bool {
        self.tier == AgeTier::Fresh
    }

    /// Agent checks in but the remote-control channel does not look reachable.
    pub fn connectivity_mismatch(&self) -> bool {
        self.agent_alive() && !self.connectivity.is_reachable()
    }

    pub fn needs_probe(&self) -> bool {
        self.tier == AgeTier::Recent
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("not a server or no checkin time")]
    OutOfScope,
    #[error("unparsable checkin time {raw:?}: {source}")]
    BadTimestamp {
        raw: String,
        #[source]
        source: time::error::Parse,
    },
}

/// Parses the checkin timestamp at second precision, ignoring fractional seconds and
/// zone suffix (the API always reports UTC).
pub fn parse_checkin(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let clean = raw.get(..19).unwrap_or(raw);
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    Ok(PrimitiveDateTime::parse(clean, format)?.assume_utc())
}

pub fn assess(
    record: &DeviceRecord,
    now: OffsetDateTime,
    policy: &LivenessPolicy,
) -> Result<LivenessAssessment, SkipReason> {
    if !record.is_in_scope() {
        return Err(SkipReason::OutOfScope);
    }
    let raw = record.last_appliance_checkin_time.as_deref().unwrap_or_default();
    let last_seen = parse_checkin(raw).map_err(|source| SkipReason::BadTimestamp {
        raw: raw.to_string(),
        source,
    })?;

    let age_minutes = (now - last_seen).as_seconds_f64() / 60.0;
    Ok(LivenessAssessment {
        age_minutes,
        tier: AgeTier::from_age(age_minutes, policy.threshold_mins),
        connectivity: ConnectivityStatus::from_raw(record.remote_control_status.as_deref()),
    })
}

pub fn classify(record: &DeviceRecord, assessment: &LivenessAssessment) -> Option<Issue> {
    let (label, severity, weight) = assessment.tier.verdict()?;
    Some(Issue {
        name: record.display_name(),
        time: format_time_ago(assessment.age_minutes),
        label,
        severity,
        weight,
    })
}

pub fn format_time_ago(age_minutes: f64) -> String {
    if age_minutes <= HOUR_MINS {
        format!("{}m ago", age_minutes as i64)
    } else if age_minutes <= RECENT_LIMIT_MINS {
        format!("{}h ago", (age_minutes / HOUR_MINS) as i64)
    } else {
        format!("{}d ago", (age_minutes / DAY_MINS) as i64)
    }
}
