// SPDX-License-Identifier: MIT

//! Firmware upload action
//!
//! The actual flashing is done by an external tool (platformio driving the
//! device's OTA receiver). The deployer treats the invocation as opaque: it
//! either ran or it did not, and its exit status is advisory only.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use smartrelay_api::DeviceClient;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_ENVIRONMENT: &str = "esp-12F-ota";

/// Outcome of one upload invocation that actually ran.
#[derive(Debug, Clone, Copy)]
pub struct UploadReport {
    /// Whether the tool exited zero. The flash tool is known to exit
    /// non-zero on uploads that actually went through, so callers must not
    /// fail an attempt on this flag alone.
    pub exit_status_ok: bool,
}

/// Seam for the external flash action. `Err` means the tool could not be
/// started at all; anything that ran to completion yields an [`UploadReport`].
#[async_trait]
pub trait FirmwareUploader: Send + Sync {
    async fn upload(&self, device: &DeviceClient) -> Result<UploadReport>;
}

/// Runs `platformio run --target upload` against a device's OTA port.
#[derive(Debug, Clone)]
pub struct PlatformioUploader {
    project_dir: PathBuf,
    environment: String,
}

impl PlatformioUploader {
    pub fn new(project_dir: PathBuf, environment: String) -> Self {
        Self {
            project_dir,
            environment,
        }
    }
}

#[async_trait]
impl FirmwareUploader for PlatformioUploader {
    async fn upload(&self, device: &DeviceClient) -> Result<UploadReport> {
        let upload_port = format!("{}.local", device.hostname().to_lowercase());
        info!("{}: uploading firmware to {upload_port}", device.hostname());

        let mut child = Command::new("platformio")
            .arg("run")
            .arg("--silent")
            .arg("--target")
            .arg("upload")
            .arg("--environment")
            .arg(&self.environment)
            .arg("--upload-port")
            .arg(&upload_port)
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::Upload(format!("failed to spawn platformio: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("platformio: {line}");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DeployError::Upload(format!("failed to wait for platformio: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // platformio sometimes exits non-zero even though the upload went
            // through; the device polls decide the real outcome.
            warn!(
                "{}: platformio exited with {} ({}), relying on device polls",
                device.hostname(),
                output.status,
                stderr.trim()
            );
        }

        Ok(UploadReport {
            exit_status_ok: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploader_configuration() {
        let uploader =
            PlatformioUploader::new(PathBuf::from("/src/firmware"), DEFAULT_ENVIRONMENT.to_string());
        assert_eq!(uploader.project_dir, PathBuf::from("/src/firmware"));
        assert_eq!(uploader.environment, "esp-12F-ota");
    }
}
