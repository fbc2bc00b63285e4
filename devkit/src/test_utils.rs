/*!
Test Harness pour le harvester

Regroupe ce dont un test de cycle complet a besoin :
- Répertoire temporaire pour le snapshot (supprimé au drop)
- Stub N-central démarré
- Lecture/écriture brute du fichier snapshot pour les assertions
*/

use crate::nable_stub::{NableStub, NableStubBuilder};
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use anyhow::Result;

pub struct TestHarness {
    pub stub: NableStub,
    dir: TempDir,
}

impl TestHarness {
    /// Démarre le stub décrit par `builder` dans un répertoire de travail neuf
    pub async fn start(builder: NableStubBuilder) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let dir = TempDir::new()?;
        let stub = builder.spawn().await?;
        Ok(Self { stub, dir })
    }

    pub fn base_url(&self) -> String {
        self.stub.base_url()
    }

    pub fn jwt(&self) -> String {
        self.stub.jwt().to_string()
    }

    /// Chemin du snapshot dans le répertoire temporaire
    pub fn data_file(&self) -> PathBuf {
        self.dir.path().join("www").join("data.json")
    }

    pub fn web_root(&self) -> PathBuf {
        self.dir.path().join("www")
    }

    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.data_file())?)
    }

    pub fn snapshot_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.snapshot_bytes()?)?)
    }

    /// Pré-remplit le snapshot (simule le résultat d'un cycle précédent)
    pub fn seed_snapshot(&self, content: &str) -> Result<()> {
        std::fs::create_dir_all(self.web_root())?;
        std::fs::write(self.data_file(), content)?;
        Ok(())
    }

    /// Trouve la ligne d'un client dans le snapshot publié
    pub fn customer_row(&self, customer: &str) -> Result<Option<Value>> {
        let snapshot = self.snapshot_json()?;
        Ok(snapshot
            .as_array()
            .and_then(|rows| rows.iter().find(|r| r["Customer"] == customer))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_seed_and_lookup() {
        let harness = TestHarness::start(NableStub::builder()).await.unwrap();
        assert!(harness.snapshot_bytes().is_err());

        harness
            .seed_snapshot(r#"[{"Customer": "Acme", "Status": "Green", "TotalServers": 1, "IssuesCount": 0.0, "IssuesList": []}]"#)
            .unwrap();

        let row = harness.customer_row("Acme").unwrap().unwrap();
        assert_eq!(row["TotalServers"], 1);
        assert!(harness.customer_row("Globex").unwrap().is_none());
        assert!(harness.data_file().starts_with(harness.web_root()));
    }
}
