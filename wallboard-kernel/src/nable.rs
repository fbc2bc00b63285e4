//! HTTP client for the N-central REST API.
//!
//! Wraps the three calls the harvester needs (token exchange, paginated device listing,
//! per-device service-monitor status) using [`reqwest`].

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::NableConf;
use crate::error::HarvestError;
use crate::models::{AuthResponse, DeviceId, DevicePage, DeviceRecord, ServiceStatus, ServiceStatusList};
use crate::probe::ServiceProbe;

/// Client non authentifié : ne connaît que le JWT longue durée.
#[derive(Clone)]
pub struct NableClient {
    http: reqwest::Client,
    base_url: String,
    jwt: String,
    page_size: u32,
    auth_timeout: Duration,
    page_timeout: Duration,
    probe_timeout: Duration,
}

/// Résultat du listing : devices décodés + nombre d'entrées illisibles écartées.
#[derive(Debug, Default)]
pub struct DeviceListing {
    pub devices: Vec<DeviceRecord>,
    pub malformed: u32,
}

/// Session ouverte pour un cycle, porte le token d'accès.
#[derive(Clone)]
pub struct NableSession {
    client: NableClient,
    access_token: String,
}

impl NableClient {
    pub fn new(conf: &NableConf, jwt: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            jwt,
            page_size: conf.page_size,
            auth_timeout: Duration::from_secs(conf.auth_timeout_secs),
            page_timeout: Duration::from_secs(conf.page_timeout_secs),
            probe_timeout: Duration::from_secs(conf.probe_timeout_secs),
        }
    }

    /// `POST /api/auth/authenticate` : échange le JWT contre un access token.
    pub async fn authenticate(&self) -> Result<NableSession, HarvestError> {
        let response = self
            .http
            .post(format!("{}/api/auth/authenticate", self.base_url))
            .bearer_auth(&self.jwt)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.auth_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(HarvestError::AuthRejected { status: status.as_u16(), body });
        }

        let auth: AuthResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(NableSession {
            client: self.clone(),
            access_token: auth.tokens.access.token,
        })
    }
}

impl NableSession {
    /// Récupère tous les devices en suivant `_links.nextPage` jusqu'à épuisement.
    pub async fn fetch_devices(&self) -> Result<DeviceListing, HarvestError> {
        let base = &self.client.base_url;
        let mut listing = DeviceListing::default();
        let mut next = Some(format!("{base}/api/devices?pageSize={}", self.client.page_size));
        let mut pages = 0u32;

        while let Some(url) = next.take() {
            let page: DevicePage = self.get_json(&url, self.client.page_timeout).await?;
            pages += 1;
            tracing::debug!(page = pages, count = page.data.len(), "fetched device page");
            next = page.next_page().map(|path| format!("{base}{path}"));

            let (records, rejected) = page.into_records();
            for e in &rejected {
                tracing::debug!(page = pages, "skipping malformed device: {e}");
            }
            listing.malformed += rejected.len() as u32;
            listing.devices.extend(records);
        }

        tracing::info!(
            devices = listing.devices.len(),
            malformed = listing.malformed,
            pages,
            "device listing complete"
        );
        Ok(listing)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, HarvestError> {
        let response = self
            .client
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarvestError::Api {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

impl ServiceProbe for NableSession {
    async fn service_status(&self, device_id: &DeviceId) -> Result<Vec<ServiceStatus>, HarvestError> {
        let url = format!(
            "{}/api/devices/{device_id}/service-monitor-status",
            self.client.base_url
        );
        let response = self
            .client
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.client.probe_timeout)
            .send()
            .await?;

        // Seul un 200 est exploitable, le reste rend la sonde non concluante
        let status = response.status();
        if status != StatusCode::OK {
            return Err(HarvestError::Api { endpoint: url, status: status.as_u16(), body: String::new() });
        }
        let list: ServiceStatusList = serde_json::from_slice(&response.bytes().await?)?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallboard_devkit::{DeviceBuilder, NableStub, ServiceBuilder};

    fn conf(base_url: &str) -> NableConf {
        NableConf { base_url: base_url.to_string(), page_size: 2, ..NableConf::default() }
    }

    #[tokio::test]
    async fn test_authenticate_and_paginate() {
        let stub = NableStub::builder()
            .jwt("jwt-1")
            .page_size(2)
            .devices((0..5).map(|i| DeviceBuilder::server(&format!("SRV-{i}")).build()).collect())
            .spawn()
            .await
            .unwrap();

        let client = NableClient::new(&conf(&stub.base_url()), "jwt-1".into());
        let session = client.authenticate().await.unwrap();
        let listing = session.fetch_devices().await.unwrap();

        let names: Vec<_> = listing.devices.iter().map(|d| d.display_name()).collect();
        assert_eq!(names, vec!["SRV-0", "SRV-1", "SRV-2", "SRV-3", "SRV-4"]);
        assert_eq!(listing.malformed, 0);
        assert_eq!(stub.page_requests(), 3);
    }

    #[tokio::test]
    async fn test_malformed_device_is_dropped_from_its_page() {
        let stub = NableStub::builder()
            .page_size(2)
            .device(DeviceBuilder::server("SRV-0").build())
            .device(DeviceBuilder::server("SRV-1").set("lastApplianceCheckinTime", serde_json::json!(1700000000)).build())
            .device(DeviceBuilder::server("SRV-2").build())
            .spawn()
            .await
            .unwrap();

        let client = NableClient::new(&conf(&stub.base_url()), stub.jwt().to_string());
        let listing = client.authenticate().await.unwrap().fetch_devices().await.unwrap();

        let names: Vec<_> = listing.devices.iter().map(|d| d.display_name()).collect();
        assert_eq!(names, vec!["SRV-0", "SRV-2"]);
        assert_eq!(listing.malformed, 1);
    }

    #[tokio::test]
    async fn test_bad_jwt_is_auth_rejected() {
        let stub = NableStub::builder().jwt("jwt-1").spawn().await.unwrap();
        let client = NableClient::new(&conf(&stub.base_url()), "wrong".into());

        let err = client.authenticate().await.err().unwrap();
        assert!(err.is_auth_failure(), "{err}");
    }

    #[tokio::test]
    async fn test_device_listing_error_status() {
        let stub = NableStub::builder().fail_devices(500).spawn().await.unwrap();
        let client = NableClient::new(&conf(&stub.base_url()), stub.jwt().to_string());
        let session = client.authenticate().await.unwrap();

        match session.fetch_devices().await {
            Err(HarvestError::Api { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_status_server_error() {
        let stub = NableStub::builder()
            .services("77", vec![ServiceBuilder::connectivity("Normal", "probe-01").build()])
            .fail_services("77", 500)
            .spawn()
            .await
            .unwrap();
        let client = NableClient::new(&conf(&stub.base_url()), stub.jwt().to_string());
        let session = client.authenticate().await.unwrap();

        let result = session.service_status(&DeviceId::Num(77)).await;
        assert!(matches!(result, Err(HarvestError::Api { status: 500, .. })));
        assert_eq!(stub.probe_requests(), 1);
    }

    #[tokio::test]
    async fn test_service_status_lookup() {
        let stub = NableStub::builder()
            .services("77", vec![ServiceBuilder::connectivity("Normal", "probe-01").build()])
            .spawn()
            .await
            .unwrap();
        let client = NableClient::new(&conf(&stub.base_url()), stub.jwt().to_string());
        let session = client.authenticate().await.unwrap();

        let found = session.service_status(&DeviceId::Num(77)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].module_name.as_deref(), Some("Connectivity"));
        assert_eq!(found[0].state_status.as_deref(), Some("Normal"));

        // device inconnu du stub -> 404
        let missing = session.service_status(&DeviceId::Num(78)).await;
        assert!(matches!(missing, Err(HarvestError::Api { status: 404, .. })));
    }
}
