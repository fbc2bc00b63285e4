use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::HarvestError;
use crate::harvest::CycleStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestState {
    /// Pas de credential : la boucle ne démarre jamais
    Disabled,
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestHealth {
    pub state: HarvestState,
    pub uptime_seconds: u64,
    pub cycles_ok: u32,
    pub cycles_failed: u32,
    pub last_success: Option<String>,
    pub last_error: Option<String>,
    pub last_cycle: Option<CycleStats>,
}

struct TrackerInner {
    state: HarvestState,
    cycles_ok: u32,
    cycles_failed: u32,
    last_success: Option<OffsetDateTime>,
    last_error: Option<String>,
    last_cycle: Option<CycleStats>,
}

/// Etat du harvester, écrit par la boucle et lu par /system/health.
/// Ne contient aucune donnée du pipeline : le snapshot reste la seule ressource partagée.
#[derive(Clone)]
pub struct HarvestTracker {
    start_time: Instant,
    inner: Arc<Mutex<TrackerInner>>,
}

impl HarvestTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            inner: Arc::new(Mutex::new(TrackerInner {
                state: HarvestState::Idle,
                cycles_ok: 0,
                cycles_failed: 0,
                last_success: None,
                last_error: None,
                last_cycle: None,
            })),
        }
    }

    pub fn mark_disabled(&self, reason: &HarvestError) {
        let mut inner = self.inner.lock();
        inner.state = HarvestState::Disabled;
        inner.last_error = Some(reason.to_string());
    }

    pub fn begin_cycle(&self) {
        self.inner.lock().state = HarvestState::Running;
    }

    pub fn finish_success(&self, stats: CycleStats, at: OffsetDateTime) {
        let mut inner = self.inner.lock();
        inner.state = HarvestState::Idle;
        inner.cycles_ok += 1;
        inner.last_success = Some(at);
        inner.last_cycle = Some(stats);
    }

    pub fn finish_failure(&self, err: &HarvestError) {
        let mut inner = self.inner.lock();
        inner.state = HarvestState::Idle;
        inner.cycles_failed += 1;
        inner.last_error = Some(err.to_string());
    }

    pub fn get_health(&self) -> HarvestHealth {
        let inner = self.inner.lock();
        HarvestHealth {
            state: inner.state,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycles_ok: inner.cycles_ok,
            cycles_failed: inner.cycles_failed,
            last_success: inner.last_success.and_then(|t| t.format(&Rfc3339).ok()),
            last_error: inner.last_error.clone(),
            last_cycle: inner.last_cycle,
        }
    }
}

impl Default for HarvestTracker {
    fn default() -> Self {
        Self::new()
    }
}
