// SPDX-License-Identifier: MIT

//! Typed client for one SmartRelay device

use crate::error::ApiError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Per-call HTTP timeout. Must stay well below any poll budget so a single
/// stalled call cannot silently eat a whole polling window.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Basic-auth credential pair shared by all devices of a fleet.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Response of `/api/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionReport {
    pub software: SoftwareVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoftwareVersion {
    pub git_commit_id: String,
    pub version: String,
}

/// Response of `/api/systeminfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub boot_count: u64,
    pub reset_reason: String,
}

/// One-shot OTA record. The device persists the result of its last OTA
/// attempt and deletes it when `/api/ota` is read, so a second read after a
/// successful update reports no record at all.
#[derive(Debug, Clone)]
pub struct OtaReport {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct OtaBody {
    ota: Option<String>,
}

/// Response of `/api/get?relay=N`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayState {
    pub value: bool,
}

/// Client for a single device.
///
/// The network address is derived from the hostname as
/// `https://{hostname}.local`; devices serve self-signed certificates, so
/// certificate validation is disabled on this client.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    hostname: String,
    base_url: String,
    credentials: Credentials,
    http: reqwest::Client,
}

impl DeviceClient {
    pub fn new(hostname: &str, credentials: Credentials) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ApiError::ClientSetup(e.to_string()))?;

        Ok(Self {
            base_url: format!("https://{}.local", hostname.to_lowercase()),
            hostname: hostname.to_string(),
            credentials,
            http,
        })
    }

    /// Override the derived device address, for tests against a local mock
    /// server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub async fn version(&self) -> Result<VersionReport, ApiError> {
        self.get_json("/api/version").await
    }

    pub async fn system_info(&self) -> Result<SystemInfo, ApiError> {
        self.get_json("/api/systeminfo").await
    }

    /// Fetch the one-shot OTA record. `Ok(None)` means the device holds no
    /// record (either none was ever written, or it was already read once).
    pub async fn ota(&self) -> Result<Option<OtaReport>, ApiError> {
        let body: OtaBody = self.get_json("/api/ota").await?;
        Ok(body.ota.map(|status| OtaReport { status }))
    }

    /// Ask the device to reboot. The acknowledgement is opaque and the
    /// connection may drop while the device goes down.
    pub async fn reboot(&self) -> Result<(), ApiError> {
        self.get_ack("/api/reboot").await
    }

    pub async fn get_relay(&self, relay: u8) -> Result<RelayState, ApiError> {
        self.get_json(&format!("/api/get?relay={relay}")).await
    }

    /// Set a relay. With `value` omitted the device toggles the relay.
    pub async fn set_relay(&self, relay: u8, value: Option<bool>) -> Result<(), ApiError> {
        let mut body = serde_json::json!({ "relay": relay });
        if let Some(value) = value {
            body["value"] = Value::Bool(value);
        }
        self.post_ack("/api/set", &body).await
    }

    pub async fn get_config(&self) -> Result<Value, ApiError> {
        self.get_json("/api/config").await
    }

    pub async fn post_config(&self, config: &Value) -> Result<(), ApiError> {
        self.post_ack("/api/config", config).await
    }

    pub async fn reload_config(&self) -> Result<(), ApiError> {
        self.get_ack("/api/config/reload").await
    }

    pub async fn reset_config(&self) -> Result<(), ApiError> {
        self.get_ack("/api/config/reset").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("{}: GET {path}", self.hostname);
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    async fn get_ack(&self, path: &str) -> Result<(), ApiError> {
        debug!("{}: GET {path}", self.hostname);
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn post_ack(&self, path: &str, body: &Value) -> Result<(), ApiError> {
        debug!("{}: POST {path}", self.hostname);
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(())
    }
}
