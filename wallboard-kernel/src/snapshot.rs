/**
 * SNAPSHOT STORE - Persistance du wallboard sur disque
 *
 * RÔLE : Unique ressource partagée entre le harvester (seul écrivain) et le serveur HTTP
 * (lecteurs). Le fichier est un tableau JSON indenté (4 espaces) de CustomerAggregate.
 *
 * FONCTIONNEMENT : écriture dans un fichier temporaire du même répertoire puis rename,
 * les lecteurs voient donc soit l'ancien snapshot soit le nouveau, jamais un fichier tronqué.
 */

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::aggregate::Snapshot;
use crate::error::HarvestError;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Crée `[]` si aucun snapshot n'existe encore (avant le démarrage du serveur HTTP)
    pub async fn ensure_exists(&self) -> Result<(), HarvestError> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        tracing::info!(path = %self.path.display(), "no snapshot yet, writing empty wallboard");
        self.publish(&Snapshot::default()).await
    }

    pub async fn publish(&self, snapshot: &Snapshot) -> Result<(), HarvestError> {
        let bytes = render(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Lecture brute du dernier snapshot publié
    pub async fn read_raw(&self) -> Result<Vec<u8>, HarvestError> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot.json".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }
}

/// Sérialise avec une indentation de 4 espaces, format attendu par le dashboard.
pub fn render(snapshot: &Snapshot) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    snapshot.serialize(&mut ser)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::liveness::{Issue, IssueLabel, Severity};
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let mut agg = Aggregator::new();
        agg.record(
            "Acme",
            Some(Issue {
                name: "SRV-1".into(),
                time: "3d ago".into(),
                label: IssueLabel::StaleAgent,
                severity: Severity::Warning,
                weight: 0.5,
            }),
        );
        agg.record("Globex", None);
        agg.into_snapshot()
    }

    #[tokio::test]
    async fn test_ensure_exists_writes_empty_array_once() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("www/data.json"));

        store.ensure_exists().await.unwrap();
        assert_eq!(store.read_raw().await.unwrap(), b"[]");

        store.publish(&sample()).await.unwrap();
        store.ensure_exists().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&store.read_raw().await.unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("data.json"));

        store.publish(&Snapshot::default()).await.unwrap();
        store.publish(&sample()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("data.json")]);

        let raw = String::from_utf8(store.read_raw().await.unwrap()).unwrap();
        assert!(raw.starts_with("[\n    {\n        \"Customer\": \"Acme\""));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render(&sample()).unwrap(), render(&sample()).unwrap());
    }
}
