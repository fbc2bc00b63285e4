use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr, time::Duration};
use tokio::fs;

use crate::liveness::LivenessPolicy;
use crate::probe::ProbePolicy;

pub const DEFAULT_BASE_URL: &str = "https://ncod153.n-able.com";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WallboardConfig {
    pub nable: NableConf,
    pub harvest: HarvestConf,
    pub web: WebConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NableConf {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub page_size: u32,
    /// Appliance du serveur central ; par défaut le premier label DNS de base_url
    pub central_appliance: Option<String>,
    pub auth_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HarvestConf {
    pub threshold_mins: f64,
    pub cycle_secs: u64,
    pub auth_backoff_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WebConf {
    pub port: u16,
    pub web_root: String,
    pub data_file: String,
}

impl Default for WallboardConfig {
    fn default() -> Self {
        Self {
            nable: NableConf::default(),
            harvest: HarvestConf::default(),
            web: WebConf::default(),
        }
    }
}

impl Default for NableConf {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            token: None,
            page_size: 1000,
            central_appliance: None,
            auth_timeout_secs: 30,
            page_timeout_secs: 60,
            probe_timeout_secs: 20,
        }
    }
}

impl Default for HarvestConf {
    fn default() -> Self {
        Self { threshold_mins: 6.0, cycle_secs: 300, auth_backoff_secs: 60 }
    }
}

impl Default for WebConf {
    fn default() -> Self {
        Self { port: 8080, web_root: "www".into(), data_file: "www/data.json".into() }
    }
}

impl NableConf {
    pub fn central_appliance(&self) -> Option<String> {
        if let Some(name) = self.central_appliance.as_ref().filter(|n| !n.is_empty()) {
            return Some(name.clone());
        }
        host_label(&self.base_url)
    }
}

impl HarvestConf {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn auth_backoff(&self) -> Duration {
        Duration::from_secs(self.auth_backoff_secs)
    }
}

impl WallboardConfig {
    pub fn liveness_policy(&self) -> LivenessPolicy {
        LivenessPolicy { threshold_mins: self.harvest.threshold_mins }
    }

    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy { central_appliance: self.nable.central_appliance() }
    }

    /// Applique les overrides d'environnement par-dessus le fichier
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NABLE_BASE_URL").filter(|v| !v.is_empty()) {
            self.nable.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("NABLE_TOKEN").filter(|v| !v.is_empty()) {
            self.nable.token = Some(v);
        }
        if let Some(v) = lookup("NABLE_CENTRAL_APPLIANCE").filter(|v| !v.is_empty()) {
            self.nable.central_appliance = Some(v);
        }
        override_checked(&lookup, "THRESHOLD_MINS", &mut self.harvest.threshold_mins, valid_threshold);
        override_parsed(&lookup, "HARVEST_INTERVAL_SECS", &mut self.harvest.cycle_secs);
        override_parsed(&lookup, "WALLBOARD_PORT", &mut self.web.port);
        if let Some(v) = lookup("WALLBOARD_WEB_ROOT").filter(|v| !v.is_empty()) {
            self.web.web_root = v;
        }
        if let Some(v) = lookup("WALLBOARD_DATA_FILE").filter(|v| !v.is_empty()) {
            self.web.data_file = v;
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    override_checked(lookup, key, slot, |_| true);
}

fn override_checked<F, T>(lookup: &F, key: &str, slot: &mut T, accept: fn(&T) -> bool)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse::<T>() {
        Ok(v) if accept(&v) => *slot = v,
        Ok(_) => tracing::warn!(key, value = %raw, "ignoring out-of-range environment override"),
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

// NaN rendrait toute comparaison d'âge fausse, donc chaque serveur signalé
fn valid_threshold(mins: &f64) -> bool {
    mins.is_finite() && *mins >= 0.0
}

/// "https://ncod153.n-able.com" -> "ncod153"
fn host_label(base_url: &str) -> Option<String> {
    let rest = base_url.split_once("://").map_or(base_url, |(_, r)| r);
    let host = rest.split(['/', ':']).next()?;
    let label = host.split('.').next()?;
    (!label.is_empty()).then(|| label.to_string())
}

pub async fn load_config() -> WallboardConfig {
    let path = std::env::var("WALLBOARD_CONFIG").unwrap_or_else(|_| "wallboard.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            WallboardConfig::default()
        } else {
            serde_yaml::from_str(&txt).unwrap_or_else(|e| {
                tracing::error!(%path, "invalid config file: {e}");
                WallboardConfig::default()
            })
        }
    } else {
        tracing::info!(%path, "no config file, using defaults");
        WallboardConfig::default()
    };
    if !valid_threshold(&cfg.harvest.threshold_mins) {
        tracing::warn!(value = cfg.harvest.threshold_mins, "invalid threshold_mins in config file, using default");
        cfg.harvest.threshold_mins = HarvestConf::default().threshold_mins;
    }
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = WallboardConfig::default();
        assert_eq!(cfg.harvest.threshold_mins, 6.0);
        assert_eq!(cfg.harvest.cycle_period(), Duration::from_secs(300));
        assert_eq!(cfg.harvest.auth_backoff(), Duration::from_secs(60));
        assert_eq!(cfg.web.port, 8080);
        assert_eq!(cfg.nable.token, None);
        assert_eq!(cfg.probe_policy().central_appliance.as_deref(), Some("ncod153"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NABLE_TOKEN", "jwt-abc"),
            ("NABLE_BASE_URL", "http://127.0.0.1:9000/"),
            ("THRESHOLD_MINS", "15"),
            ("HARVEST_INTERVAL_SECS", "not-a-number"),
        ]);
        let mut cfg = WallboardConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.nable.token.as_deref(), Some("jwt-abc"));
        assert_eq!(cfg.nable.base_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.harvest.threshold_mins, 15.0);
        assert_eq!(cfg.harvest.cycle_secs, 300);
        assert_eq!(cfg.nable.central_appliance().as_deref(), Some("127"));
    }

    #[test]
    fn test_threshold_override_rejects_nan_and_negative() {
        for bad in ["NaN", "-3", "inf"] {
            let mut cfg = WallboardConfig::default();
            cfg.apply_env(|k| (k == "THRESHOLD_MINS").then(|| bad.to_string()));
            assert_eq!(cfg.harvest.threshold_mins, 6.0, "{bad} should be rejected");
        }

        let mut cfg = WallboardConfig::default();
        cfg.apply_env(|k| (k == "THRESHOLD_MINS").then(|| "0".to_string()));
        assert_eq!(cfg.harvest.threshold_mins, 0.0);
    }

    #[test]
    fn test_yaml_partial_file() {
        let cfg: WallboardConfig = serde_yaml::from_str(
            "nable:\n  central_appliance: nc-central\nharvest:\n  cycle_secs: 120\n",
        )
        .unwrap();
        assert_eq!(cfg.harvest.cycle_secs, 120);
        assert_eq!(cfg.harvest.threshold_mins, 6.0);
        assert_eq!(cfg.nable.page_size, 1000);
        assert_eq!(cfg.probe_policy().central_appliance.as_deref(), Some("nc-central"));
    }

    #[test]
    fn test_host_label() {
        assert_eq!(host_label("https://ncod153.n-able.com").as_deref(), Some("ncod153"));
        assert_eq!(host_label("http://localhost:8080/api").as_deref(), Some("localhost"));
        assert_eq!(host_label(""), None);
    }
}
