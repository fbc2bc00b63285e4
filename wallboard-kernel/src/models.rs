//! Payloads échangés avec l'API N-central (auth, devices, service-monitor-status).

use serde::Deserialize;
use std::fmt;

/// Identifiant device : numérique côté N-central, mais on accepte aussi une chaîne.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    Num(i64),
    Text(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Num(n) => write!(f, "{n}"),
            DeviceId::Text(s) => f.write_str(s),
        }
    }
}

/// Un device tel que renvoyé par `GET /api/devices`.
/// Tous les champs sont optionnels : l'API omet ou met à null ce qu'elle ne connaît pas.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: Option<DeviceId>,
    pub long_name: Option<String>,
    pub device_class: Option<String>,
    pub last_appliance_checkin_time: Option<String>,
    pub remote_control_status: Option<String>,
    pub customer_name: Option<String>,
}

impl DeviceRecord {
    /// Seuls les serveurs avec un checkin connu sont supervisés.
    pub fn is_in_scope(&self) -> bool {
        let is_server = self
            .device_class
            .as_deref()
            .is_some_and(|class| class.contains("Server"));
        let has_checkin = self
            .last_appliance_checkin_time
            .as_deref()
            .is_some_and(|ts| !ts.is_empty());
        is_server && has_checkin
    }

    pub fn customer(&self) -> &str {
        match self.customer_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Unknown",
        }
    }

    /// Nom affiché sur le wallboard : longName, sinon l'id, sinon un placeholder.
    pub fn display_name(&self) -> String {
        match (&self.long_name, &self.device_id) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(id)) => format!("device {id}"),
            _ => "unnamed device".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageLinks {
    #[serde(rename = "nextPage")]
    pub next_page: Option<String>,
}

/// Une page de `GET /api/devices`.
/// Les devices restent bruts : un device mal typé ne doit pas invalider la page.
#[derive(Debug, Deserialize)]
pub struct DevicePage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(rename = "_links")]
    pub links: Option<PageLinks>,
}

impl DevicePage {
    pub fn next_page(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.next_page.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Décode chaque device séparément ; les entrées invalides sont renvoyées avec leur erreur.
    pub fn into_records(self) -> (Vec<DeviceRecord>, Vec<serde_json::Error>) {
        let mut records = Vec::with_capacity(self.data.len());
        let mut rejected = Vec::new();
        for raw in self.data {
            match serde_json::from_value::<DeviceRecord>(raw) {
                Ok(record) => records.push(record),
                Err(e) => rejected.push(e),
            }
        }
        (records, rejected)
    }
}

/// Entrée de `GET /api/devices/{id}/service-monitor-status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub module_name: Option<String>,
    pub state_status: Option<String>,
    pub appliance_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceStatusList {
    #[serde(default)]
    pub data: Vec<ServiceStatus>,
}

// Réponse de /api/auth/authenticate : {"tokens": {"access": {"token": "..."}}}
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub tokens: AuthTokens,
}

#[derive(Debug, Deserialize)]
pub struct AuthTokens {
    pub access: AccessToken,
}

#[derive(Debug, Deserialize)]
pub struct AccessToken {
    pub token: String,
}
