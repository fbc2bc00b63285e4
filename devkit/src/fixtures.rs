/*!
Builders JSON pour les payloads de l'API N-central

Produit des `serde_json::Value` au format exact renvoyé par l'API, pour alimenter
le stub ou désérialiser directement dans les tests.
*/

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

/// Format de `lastApplianceCheckinTime` tel que renvoyé par N-central
pub fn checkin_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Builder pour un device de `GET /api/devices`
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    payload: Value,
}

impl DeviceBuilder {
    /// Serveur Windows, client "Acme", checkin à l'instant, remote control actif
    pub fn server(name: &str) -> Self {
        Self {
            payload: json!({
                "longName": name,
                "deviceClass": "Windows Server",
                "lastApplianceCheckinTime": checkin_timestamp(Utc::now()),
                "remoteControlStatus": "Active",
                "customerName": "Acme",
            }),
        }
    }

    pub fn workstation(name: &str) -> Self {
        Self::server(name).device_class("Workstations - Windows")
    }

    pub fn id(self, id: i64) -> Self {
        self.set("deviceId", json!(id))
    }

    pub fn customer(self, customer: &str) -> Self {
        self.set("customerName", json!(customer))
    }

    pub fn device_class(self, class: &str) -> Self {
        self.set("deviceClass", json!(class))
    }

    pub fn remote_control(self, status: &str) -> Self {
        self.set("remoteControlStatus", json!(status))
    }

    pub fn checked_in_minutes_ago(self, minutes: i64) -> Self {
        let at = Utc::now() - Duration::minutes(minutes);
        self.set("lastApplianceCheckinTime", json!(checkin_timestamp(at)))
    }

    /// Valeur brute, pour tester les timestamps invalides
    pub fn checkin_raw(self, raw: &str) -> Self {
        self.set("lastApplianceCheckinTime", json!(raw))
    }

    /// Retire un champ (l'API omet les champs inconnus)
    pub fn without(mut self, field: &str) -> Self {
        if let Some(obj) = self.payload.as_object_mut() {
            obj.remove(field);
        }
        self
    }

    pub fn set(mut self, field: &str, value: Value) -> Self {
        if let Some(obj) = self.payload.as_object_mut() {
            obj.insert(field.to_string(), value);
        }
        self
    }

    pub fn build(self) -> Value {
        self.payload
    }
}

/// Builder pour une entrée de `service-monitor-status`
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    payload: Value,
}

impl ServiceBuilder {
    pub fn module(name: &str, state: &str, appliance: &str) -> Self {
        Self {
            payload: json!({
                "moduleName": name,
                "stateStatus": state,
                "applianceName": appliance,
            }),
        }
    }

    pub fn connectivity(state: &str, appliance: &str) -> Self {
        Self::module("Connectivity", state, appliance)
    }

    pub fn build(self) -> Value {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_checkin_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(checkin_timestamp(at), "2025-03-01T09:05:07.000Z");
    }

    #[test]
    fn test_device_builder() {
        let dev = DeviceBuilder::server("SRV-DC01")
            .id(12)
            .customer("Globex")
            .remote_control("Disconnected")
            .without("remoteControlStatus")
            .build();

        assert_eq!(dev["longName"], "SRV-DC01");
        assert_eq!(dev["deviceId"], 12);
        assert_eq!(dev["customerName"], "Globex");
        assert!(dev.get("remoteControlStatus").is_none());
        assert_eq!(dev["lastApplianceCheckinTime"].as_str().unwrap().len(), 24);
    }

    #[test]
    fn test_workstation_and_service_builders() {
        let ws = DeviceBuilder::workstation("PC-042").build();
        assert_eq!(ws["deviceClass"], "Workstations - Windows");

        let svc = ServiceBuilder::connectivity("Failed", "probe-01").build();
        assert_eq!(svc["moduleName"], "Connectivity");
        assert_eq!(svc["stateStatus"], "Failed");
        assert_eq!(svc["applianceName"], "probe-01");
    }
}
