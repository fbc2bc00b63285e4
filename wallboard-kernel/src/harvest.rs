/**
 * HARVEST - Cycle de collecte N-central -> snapshot wallboard
 *
 * RÔLE : auth -> listing paginé -> classification (+ sonde) -> agrégation -> publication.
 * Un cycle en échec est abandonné en entier : le snapshot précédent reste en place.
 *
 * BOUCLE : Idle -> Running -> Idle, une seule tâche, jamais de chevauchement.
 * Attente fixe après chaque cycle (période standard, ou backoff court si l'auth échoue).
 */

use serde::Serialize;
use time::OffsetDateTime;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::aggregate::{Aggregator, Snapshot};
use crate::config::{HarvestConf, WallboardConfig};
use crate::error::HarvestError;
use crate::health::HarvestTracker;
use crate::liveness::{self, LivenessPolicy, SkipReason};
use crate::models::DeviceRecord;
use crate::nable::NableClient;
use crate::probe::{self, ProbePolicy, ProbeVerdict, ServiceProbe};
use crate::snapshot::SnapshotStore;

/// Compteurs d'un cycle, pour les logs et /system/health
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub devices_seen: u32,
    pub servers: u32,
    pub skipped: u32,
    pub customers: u32,
    pub issues: u32,
    pub probes: u32,
    pub probes_inconclusive: u32,
    pub probe_overrides: u32,
    pub connectivity_mismatches: u32,
}

/// Classification + sonde + agrégation, dans l'ordre du listing.
/// Ne peut pas échouer : un device invalide est ignoré, une sonde en échec est non concluante.
pub async fn build_snapshot<P: ServiceProbe>(
    devices: &[DeviceRecord],
    now: OffsetDateTime,
    liveness_policy: &LivenessPolicy,
    probe_policy: &ProbePolicy,
    prober: &P,
) -> (Snapshot, CycleStats) {
    let mut stats = CycleStats::default();
    let mut aggregator = Aggregator::new();

    for record in devices {
        stats.devices_seen += 1;

        let assessment = match liveness::assess(record, now, liveness_policy) {
            Ok(a) => a,
            Err(SkipReason::OutOfScope) => continue,
            Err(reason) => {
                stats.skipped += 1;
                tracing::debug!(device = %record.display_name(), "skipping device: {reason}");
                continue;
            }
        };
        stats.servers += 1;
        if assessment.connectivity_mismatch() {
            stats.connectivity_mismatches += 1;
        }

        let mut issue = liveness::classify(record, &assessment);
        if let Some(issue) = issue.as_mut().filter(|_| assessment.needs_probe()) {
            stats.probes += 1;
            match record.device_id.as_ref() {
                None => {
                    stats.probes_inconclusive += 1;
                    tracing::debug!(device = %issue.name, "no deviceId, probe skipped");
                }
                Some(device_id) => match prober.service_status(device_id).await {
                    Ok(services) => {
                        let verdict = probe::evaluate(&services, probe_policy);
                        if verdict != ProbeVerdict::NoOverride {
                            stats.probe_overrides += 1;
                        }
                        probe::apply(issue, verdict);
                    }
                    Err(e) => {
                        stats.probes_inconclusive += 1;
                        tracing::warn!(device = %issue.name, %device_id, "probe inconclusive: {e}");
                    }
                },
            }
        }

        if issue.is_some() {
            stats.issues += 1;
        }
        aggregator.record(record.customer(), issue);
    }

    let snapshot = aggregator.into_snapshot();
    stats.customers = snapshot.customers().len() as u32;
    (snapshot, stats)
}

pub struct Harvester {
    client: NableClient,
    store: SnapshotStore,
    tracker: HarvestTracker,
    liveness_policy: LivenessPolicy,
    probe_policy: ProbePolicy,
    config: WallboardConfig,
}

impl Harvester {
    pub fn new(
        config: WallboardConfig,
        store: SnapshotStore,
        tracker: HarvestTracker,
    ) -> Result<Self, HarvestError> {
        let jwt = config
            .nable
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(HarvestError::MissingCredential)?;

        Ok(Self {
            client: NableClient::new(&config.nable, jwt),
            store,
            tracker,
            liveness_policy: config.liveness_policy(),
            probe_policy: config.probe_policy(),
            config,
        })
    }

    /// Un cycle complet. Rien n'est publié si une étape échoue.
    pub async fn run_cycle(&self, now: OffsetDateTime) -> Result<CycleStats, HarvestError> {
        let session = self.client.authenticate().await?;
        let listing = session.fetch_devices().await?;
        let (snapshot, mut stats) = build_snapshot(
            &listing.devices,
            now,
            &self.liveness_policy,
            &self.probe_policy,
            &session,
        )
        .await;
        // devices illisibles : écartés au décodage, comptés comme les autres rejets
        stats.devices_seen += listing.malformed;
        stats.skipped += listing.malformed;
        self.store.publish(&snapshot).await?;
        Ok(stats)
    }

    pub async fn run_forever(self) {
        loop {
            tracing::info!(">>> starting harvest cycle");
            self.tracker.begin_cycle();

            let now = OffsetDateTime::now_utc();
            let outcome = self.run_cycle(now).await;
            match &outcome {
                Ok(stats) => {
                    tracing::info!(
                        customers = stats.customers,
                        servers = stats.servers,
                        issues = stats.issues,
                        skipped = stats.skipped,
                        probes = stats.probes,
                        probes_inconclusive = stats.probes_inconclusive,
                        connectivity_mismatches = stats.connectivity_mismatches,
                        "*** harvest success ***"
                    );
                    self.tracker.finish_success(*stats, now);
                }
                Err(e) => {
                    tracing::error!(error = ?e, "!! harvest cycle aborted: {e}");
                    self.tracker.finish_failure(e);
                }
            }

            let wait = next_wait(&self.config.harvest, &outcome);
            tracing::debug!(secs = wait.as_secs(), "sleeping until next cycle");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Attente avant le cycle suivant : backoff court seulement si le serveur a refusé l'auth.
fn next_wait(conf: &HarvestConf, outcome: &Result<CycleStats, HarvestError>) -> Duration {
    match outcome {
        Err(e) if e.is_auth_failure() => conf.auth_backoff(),
        _ => conf.cycle_period(),
    }
}

/// Démarre la boucle de harvest en tâche de fond.
/// Sans credential la boucle ne démarre pas ; le serveur HTTP continue de servir le dernier snapshot.
pub fn spawn_harvest_loop(
    config: WallboardConfig,
    store: SnapshotStore,
    tracker: HarvestTracker,
) -> Option<JoinHandle<()>> {
    match Harvester::new(config, store, tracker.clone()) {
        Ok(harvester) => Some(tokio::spawn(harvester.run_forever())),
        Err(e) => {
            tracing::error!("!! harvest loop not started: {e}");
            tracker.mark_disabled(&e);
            None
        }
    }
}
