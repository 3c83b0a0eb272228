// SPDX-License-Identifier: MIT

//! Device state predicates
//!
//! Each predicate is a probe over one device: it succeeds with a typed value
//! when the expectation holds and fails otherwise, so it can drive the
//! bounded poller. At this layer "device unreachable" and "device reachable
//! but in the wrong state" are the same control outcome; the error kind only
//! feeds diagnostic logging.

use crate::version::BuildVersion;
use smartrelay_api::{ApiError, DeviceClient, OtaReport, SystemInfo, VersionReport};
use thiserror::Error;

/// Reset cause reported after a software-triggered restart.
pub const SOFTWARE_RESET_REASON: &str = "Software/System restart";

/// OTA status value written by the device after a successful update.
pub const OTA_SUCCESS: &str = "success";

/// Relays that must come back on after every reboot.
pub const MONITORED_RELAYS: [u8; 2] = [1, 2];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("state mismatch: {0}")]
    Mismatch(String),
}

/// Target state for [`relay_toggled_to`].
#[derive(Debug, Clone, Copy)]
pub enum RelayTarget {
    /// Set the relay to this state and expect to read it back.
    State(bool),
    /// Toggle (set with no value) and expect the state to differ from the
    /// prior observation supplied by the caller.
    ToggleFrom(bool),
}

/// Succeeds iff the version endpoint returns a parseable response. Used to
/// gate whether an upgrade should be attempted at all.
pub async fn device_is_up(device: &DeviceClient) -> Result<VersionReport, ProbeError> {
    Ok(device.version().await?)
}

/// Succeeds iff the device shows every sign of one genuine software-triggered
/// reboot past `baseline_boot_count`: the boot counter advanced by exactly
/// one, the reset cause is the software value, and both monitored relays are
/// back on. A partial match (counter advanced but relays not yet restored)
/// fails and must be retried.
pub async fn rebooted(
    device: &DeviceClient,
    baseline_boot_count: u64,
) -> Result<SystemInfo, ProbeError> {
    let info = device.system_info().await?;

    let expected = baseline_boot_count + 1;
    if info.boot_count != expected {
        return Err(ProbeError::Mismatch(format!(
            "boot count is {}, expected {expected}",
            info.boot_count
        )));
    }
    if info.reset_reason != SOFTWARE_RESET_REASON {
        return Err(ProbeError::Mismatch(format!(
            "reset reason is {:?}, expected {SOFTWARE_RESET_REASON:?}",
            info.reset_reason
        )));
    }
    for relay in MONITORED_RELAYS {
        let state = device.get_relay(relay).await?;
        if !state.value {
            return Err(ProbeError::Mismatch(format!(
                "relay {relay} is off after reboot"
            )));
        }
    }

    Ok(info)
}

/// Succeeds iff the device holds an OTA record with the success status.
pub async fn ota_succeeded(device: &DeviceClient) -> Result<OtaReport, ProbeError> {
    match device.ota().await? {
        Some(report) if report.status == OTA_SUCCESS => Ok(report),
        Some(report) => Err(ProbeError::Mismatch(format!(
            "ota status is {:?}",
            report.status
        ))),
        None => Err(ProbeError::Mismatch("no ota record yet".to_string())),
    }
}

/// Succeeds iff the device no longer holds an OTA record. The record is
/// one-shot: it must disappear after having been read once, proving the
/// device is not stuck re-reporting stale success.
pub async fn ota_record_cleared(device: &DeviceClient) -> Result<(), ProbeError> {
    match device.ota().await? {
        None => Ok(()),
        Some(report) => Err(ProbeError::Mismatch(format!(
            "ota record still present with status {:?}",
            report.status
        ))),
    }
}

/// Succeeds iff the reported commit id matches exactly and the reported
/// version contains the expected version string.
pub async fn version_matches(
    device: &DeviceClient,
    expected: &BuildVersion,
) -> Result<VersionReport, ProbeError> {
    let report = device.version().await?;
    let software = &report.software;

    if !expected.matches(&software.git_commit_id, &software.version) {
        return Err(ProbeError::Mismatch(format!(
            "device reports commit {:?} version {:?}, expected commit {:?} version containing {:?}",
            software.git_commit_id, software.version, expected.git_commit_id,
            expected.version_string
        )));
    }

    Ok(report)
}

/// Issue a set command, then succeed iff a subsequent get reports the target
/// state. Assumes single-writer access to the relay for the duration of the
/// check.
pub async fn relay_toggled_to(
    device: &DeviceClient,
    relay: u8,
    target: RelayTarget,
) -> Result<bool, ProbeError> {
    match target {
        RelayTarget::State(desired) => {
            device.set_relay(relay, Some(desired)).await?;
            let state = device.get_relay(relay).await?;
            if state.value != desired {
                return Err(ProbeError::Mismatch(format!(
                    "relay {relay} reports {}, expected {desired}",
                    state.value
                )));
            }
            Ok(state.value)
        }
        RelayTarget::ToggleFrom(prior) => {
            device.set_relay(relay, None).await?;
            let state = device.get_relay(relay).await?;
            if state.value == prior {
                return Err(ProbeError::Mismatch(format!(
                    "relay {relay} still reports {prior} after toggle"
                )));
            }
            Ok(state.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use smartrelay_api::Credentials;

    fn client_for(server: &ServerGuard) -> DeviceClient {
        DeviceClient::new("bench", Credentials {
            user: "admin".to_string(),
            password: "secret".to_string(),
        })
        .unwrap()
        .with_base_url(&server.url())
    }

    async fn mock_system_info(server: &mut ServerGuard, boot_count: u64, reset_reason: &str) {
        server
            .mock("GET", "/api/systeminfo")
            .with_status(200)
            .with_body(json!({ "boot_count": boot_count, "reset_reason": reset_reason }).to_string())
            .create_async()
            .await;
    }

    async fn mock_relay(server: &mut ServerGuard, relay: u8, value: bool) {
        server
            .mock("GET", format!("/api/get?relay={relay}").as_str())
            .with_status(200)
            .with_body(json!({ "value": value }).to_string())
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_device_is_up_with_unreachable_endpoint() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/version")
            .with_status(500)
            .create_async()
            .await;

        let result = device_is_up(&client_for(&server)).await;
        assert!(matches!(result, Err(ProbeError::Api(ApiError::Status(500)))));
    }

    #[tokio::test]
    async fn test_rebooted_rejects_partial_match() {
        // Boot count and reset reason already converged, relay 2 has not.
        let mut server = Server::new_async().await;
        mock_system_info(&mut server, 6, SOFTWARE_RESET_REASON).await;
        mock_relay(&mut server, 1, true).await;
        mock_relay(&mut server, 2, false).await;

        let result = rebooted(&client_for(&server), 5).await;
        match result {
            Err(ProbeError::Mismatch(msg)) => assert!(msg.contains("relay 2")),
            other => panic!("expected relay mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rebooted_succeeds_once_all_conditions_hold() {
        let mut server = Server::new_async().await;
        mock_system_info(&mut server, 6, SOFTWARE_RESET_REASON).await;
        mock_relay(&mut server, 1, true).await;
        mock_relay(&mut server, 2, true).await;

        let info = rebooted(&client_for(&server), 5).await.unwrap();
        assert_eq!(info.boot_count, 6);
    }

    #[tokio::test]
    async fn test_rebooted_rejects_stale_boot_count() {
        let mut server = Server::new_async().await;
        mock_system_info(&mut server, 5, SOFTWARE_RESET_REASON).await;
        mock_relay(&mut server, 1, true).await;
        mock_relay(&mut server, 2, true).await;

        let result = rebooted(&client_for(&server), 5).await;
        match result {
            Err(ProbeError::Mismatch(msg)) => assert!(msg.contains("boot count")),
            other => panic!("expected boot count mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rebooted_rejects_double_reboot() {
        // A counter that jumped by two means we missed a boot; that is not
        // the reboot we triggered.
        let mut server = Server::new_async().await;
        mock_system_info(&mut server, 7, SOFTWARE_RESET_REASON).await;

        let result = rebooted(&client_for(&server), 5).await;
        assert!(matches!(result, Err(ProbeError::Mismatch(_))));
    }

    #[tokio::test]
    async fn test_rebooted_rejects_unexpected_reset_reason() {
        let mut server = Server::new_async().await;
        mock_system_info(&mut server, 6, "Power On").await;

        let result = rebooted(&client_for(&server), 5).await;
        match result {
            Err(ProbeError::Mismatch(msg)) => assert!(msg.contains("reset reason")),
            other => panic!("expected reset reason mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ota_succeeded() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ota")
            .with_status(200)
            .with_body(json!({ "ota": "success" }).to_string())
            .create_async()
            .await;

        let report = ota_succeeded(&client_for(&server)).await.unwrap();
        assert_eq!(report.status, "success");
    }

    #[tokio::test]
    async fn test_ota_failure_status_is_a_mismatch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ota")
            .with_status(200)
            .with_body(json!({ "ota": "Receive Failed" }).to_string())
            .create_async()
            .await;

        let result = ota_succeeded(&client_for(&server)).await;
        match result {
            Err(ProbeError::Mismatch(msg)) => assert!(msg.contains("Receive Failed")),
            other => panic!("expected status mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ota_absent_record_is_not_success() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ota")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        assert!(ota_succeeded(&client_for(&server)).await.is_err());
        // The same observation satisfies the cleared predicate.
        ota_record_cleared(&client_for(&server)).await.unwrap();
    }

    #[tokio::test]
    async fn test_ota_record_cleared_fails_on_stale_record() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ota")
            .with_status(200)
            .with_body(json!({ "ota": "success" }).to_string())
            .create_async()
            .await;

        let result = ota_record_cleared(&client_for(&server)).await;
        assert!(matches!(result, Err(ProbeError::Mismatch(_))));
    }

    #[tokio::test]
    async fn test_version_matches() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/version")
            .with_status(200)
            .with_body(
                json!({
                    "software": { "git_commit_id": "3f9c2d1", "version": "v1.4-3-g3f9c2d1" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let expected = BuildVersion::new("3f9c2d1", "v1.4");
        version_matches(&client, &expected).await.unwrap();

        let stale = BuildVersion::new("deadbee", "v1.5");
        assert!(matches!(
            version_matches(&client, &stale).await,
            Err(ProbeError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_toggled_to_state() {
        let mut server = Server::new_async().await;
        let set = server
            .mock("POST", "/api/set")
            .match_body(Matcher::Json(json!({ "relay": 1, "value": false })))
            .with_status(200)
            .create_async()
            .await;
        mock_relay(&mut server, 1, false).await;

        let value = relay_toggled_to(&client_for(&server), 1, RelayTarget::State(false))
            .await
            .unwrap();
        assert!(!value);
        set.assert_async().await;
    }

    #[tokio::test]
    async fn test_relay_toggled_to_state_mismatch() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/set")
            .with_status(200)
            .create_async()
            .await;
        mock_relay(&mut server, 1, true).await;

        let result = relay_toggled_to(&client_for(&server), 1, RelayTarget::State(false)).await;
        assert!(matches!(result, Err(ProbeError::Mismatch(_))));
    }

    #[tokio::test]
    async fn test_relay_toggle_requires_state_change() {
        let mut server = Server::new_async().await;
        let set = server
            .mock("POST", "/api/set")
            .match_body(Matcher::Json(json!({ "relay": 2 })))
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        mock_relay(&mut server, 2, true).await;

        let client = client_for(&server);
        // Prior state off, device now reports on: a real toggle.
        let value = relay_toggled_to(&client, 2, RelayTarget::ToggleFrom(false))
            .await
            .unwrap();
        assert!(value);

        // Prior state on, device still reports on: the toggle did not take.
        let result = relay_toggled_to(&client, 2, RelayTarget::ToggleFrom(true)).await;
        assert!(matches!(result, Err(ProbeError::Mismatch(_))));

        set.assert_async().await;
    }
}
