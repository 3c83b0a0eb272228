// SPDX-License-Identifier: MIT

//! Upgrade orchestration
//!
//! Drives one device through the full upgrade sequence (upload, OTA
//! confirmation, reboot, version identity) and fans the sequence out across
//! a device set. Devices are independent: one device's failure never affects
//! another's run.

use crate::poller::{PollBudget, PollOutcome, poll};
use crate::upload::FirmwareUploader;
use crate::verify;
use crate::version::BuildVersion;
use smartrelay_api::{DeviceClient, DeviceRegistry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Phase of the per-device sequence, reported with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    Upload,
    OtaSuccess,
    OtaCleared,
    Reboot,
    Version,
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradePhase::Upload => "firmware upload",
            UpgradePhase::OtaSuccess => "awaiting ota success",
            UpgradePhase::OtaCleared => "awaiting ota record cleared",
            UpgradePhase::Reboot => "awaiting reboot",
            UpgradePhase::Version => "verifying version",
        };
        f.write_str(name)
    }
}

/// Terminal per-device outcome. `Skipped` is an expected non-error state: the
/// device was not up before anything was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Succeeded {
        boot_count: u64,
        version: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        phase: UpgradePhase,
        last_error: String,
    },
}

impl DeviceOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, DeviceOutcome::Succeeded { .. })
    }
}

/// Poll budgets per phase. OTA flashing plus the device-side flash commit is
/// by far the slowest part, hence the larger default there.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeBudgets {
    pub ota: PollBudget,
    pub ota_cleared: PollBudget,
    pub reboot: PollBudget,
    pub version: PollBudget,
}

impl Default for UpgradeBudgets {
    fn default() -> Self {
        let interval = Duration::from_secs(5);
        Self {
            ota: PollBudget::new(Duration::from_secs(120), interval),
            ota_cleared: PollBudget::new(Duration::from_secs(120), interval),
            reboot: PollBudget::new(Duration::from_secs(60), interval),
            version: PollBudget::new(Duration::from_secs(60), interval),
        }
    }
}

/// What a successful attempt observed; the boot count becomes the next
/// attempt's baseline in repeated-upgrade validation.
#[derive(Debug)]
struct AttemptReport {
    boot_count: u64,
    version: String,
}

pub struct UpgradeOrchestrator<U> {
    uploader: U,
    expected: BuildVersion,
    budgets: UpgradeBudgets,
}

impl<U> fmt::Debug for UpgradeOrchestrator<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeOrchestrator")
            .field("expected", &self.expected)
            .field("budgets", &self.budgets)
            .finish_non_exhaustive()
    }
}

impl<U: FirmwareUploader> UpgradeOrchestrator<U> {
    pub fn new(uploader: U, expected: BuildVersion) -> Self {
        Self {
            uploader,
            expected,
            budgets: UpgradeBudgets::default(),
        }
    }

    #[must_use]
    pub fn with_budgets(mut self, budgets: UpgradeBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Run the upgrade sequence for every device in the registry, each in its
    /// own task, and collect the per-device outcomes. No ordering is
    /// guaranteed across devices.
    pub async fn run(
        self: Arc<Self>,
        registry: &DeviceRegistry,
        repeat: bool,
    ) -> BTreeMap<String, DeviceOutcome>
    where
        U: 'static,
    {
        let mut workers = JoinSet::new();
        for (hostname, device) in registry.iter() {
            let orchestrator = Arc::clone(&self);
            let hostname = hostname.clone();
            let device = device.clone();
            workers.spawn(async move {
                let outcome = if repeat {
                    orchestrator.upgrade_device_twice(&device).await
                } else {
                    orchestrator.upgrade_device(&device).await
                };
                (hostname, outcome)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((hostname, outcome)) => {
                    outcomes.insert(hostname, outcome);
                }
                Err(e) => error!("device worker panicked: {e}"),
            }
        }
        outcomes
    }

    /// Drive one device through a single upgrade.
    pub async fn upgrade_device(&self, device: &DeviceClient) -> DeviceOutcome {
        let baseline = match self.prepare(device).await {
            Ok(baseline) => baseline,
            Err(reason) => return DeviceOutcome::Skipped { reason },
        };

        info!(
            "{}: starting upgrade (boot count baseline {baseline})",
            device.hostname()
        );
        self.finish(device, self.run_attempt(device, baseline).await)
    }

    /// Upgrade the same device twice in a row, proving that the freshly
    /// flashed firmware can itself be upgraded. The second attempt's baseline
    /// is the boot count observed by the first attempt, threaded forward
    /// rather than re-read, so a stale report cannot shift it.
    pub async fn upgrade_device_twice(&self, device: &DeviceClient) -> DeviceOutcome {
        let baseline = match self.prepare(device).await {
            Ok(baseline) => baseline,
            Err(reason) => return DeviceOutcome::Skipped { reason },
        };

        info!(
            "{}: starting repeated upgrade (boot count baseline {baseline})",
            device.hostname()
        );
        let first = match self.run_attempt(device, baseline).await {
            Ok(report) => report,
            Err(failure) => return self.finish(device, Err(failure)),
        };

        info!(
            "{}: first upgrade verified, upgrading again",
            device.hostname()
        );
        self.finish(device, self.run_attempt(device, first.boot_count).await)
    }

    /// Trigger a plain reboot and verify the device comes back in a
    /// known-good state.
    pub async fn verify_reboot(&self, device: &DeviceClient) -> DeviceOutcome {
        let baseline = match self.prepare(device).await {
            Ok(baseline) => baseline,
            Err(reason) => return DeviceOutcome::Skipped { reason },
        };

        if let Err(e) = device.reboot().await {
            // The device may drop the connection while going down.
            debug!("{}: no reboot ack ({e})", device.hostname());
        }

        match poll("reboot", self.budgets.reboot, || {
            verify::rebooted(device, baseline)
        })
        .await
        {
            PollOutcome::Succeeded(info) => DeviceOutcome::Succeeded {
                boot_count: info.boot_count,
                version: None,
            },
            PollOutcome::TimedOut { last_error, .. } => DeviceOutcome::Failed {
                phase: UpgradePhase::Reboot,
                last_error: last_error.to_string(),
            },
        }
    }

    /// Liveness gate plus baseline capture. A single attempt each, no retry
    /// budget: a down device is an expected outcome, not a failure, and
    /// nothing has been triggered yet.
    async fn prepare(&self, device: &DeviceClient) -> Result<u64, String> {
        if let Err(e) = verify::device_is_up(device).await {
            info!("{}: device is not up ({e}), skipping", device.hostname());
            return Err(format!("device is not up: {e}"));
        }

        // The baseline must be read strictly before the upload so the
        // device's own increment cannot race it.
        match device.system_info().await {
            Ok(info) => Ok(info.boot_count),
            Err(e) => {
                info!(
                    "{}: device went away before upload ({e}), skipping",
                    device.hostname()
                );
                Err(format!("device went away before upload: {e}"))
            }
        }
    }

    async fn run_attempt(
        &self,
        device: &DeviceClient,
        baseline: u64,
    ) -> Result<AttemptReport, (UpgradePhase, String)> {
        let hostname = device.hostname();

        match self.uploader.upload(device).await {
            Ok(report) if !report.exit_status_ok => {
                // Non-zero exit from a tool that ran is advisory; the polls
                // below decide the real outcome.
                warn!("{hostname}: upload tool exited non-zero, deciding by device polls");
            }
            Ok(_) => {}
            Err(e) => return Err((UpgradePhase::Upload, e.to_string())),
        }

        if let PollOutcome::TimedOut { last_error, .. } = poll("ota success", self.budgets.ota, || {
            verify::ota_succeeded(device)
        })
        .await
        {
            return Err((UpgradePhase::OtaSuccess, last_error.to_string()));
        }

        if let PollOutcome::TimedOut { last_error, .. } =
            poll("ota record cleared", self.budgets.ota_cleared, || {
                verify::ota_record_cleared(device)
            })
            .await
        {
            return Err((UpgradePhase::OtaCleared, last_error.to_string()));
        }

        let rebooted = match poll("reboot", self.budgets.reboot, || {
            verify::rebooted(device, baseline)
        })
        .await
        {
            PollOutcome::Succeeded(info) => info,
            PollOutcome::TimedOut { last_error, .. } => {
                return Err((UpgradePhase::Reboot, last_error.to_string()));
            }
        };

        let report = match poll("version identity", self.budgets.version, || {
            verify::version_matches(device, &self.expected)
        })
        .await
        {
            PollOutcome::Succeeded(report) => report,
            PollOutcome::TimedOut { last_error, .. } => {
                return Err((UpgradePhase::Version, last_error.to_string()));
            }
        };

        Ok(AttemptReport {
            boot_count: rebooted.boot_count,
            version: report.software.version,
        })
    }

    fn finish(
        &self,
        device: &DeviceClient,
        result: Result<AttemptReport, (UpgradePhase, String)>,
    ) -> DeviceOutcome {
        match result {
            Ok(report) => {
                info!(
                    "{}: upgrade succeeded (boot count {}, version {})",
                    device.hostname(),
                    report.boot_count,
                    report.version
                );
                DeviceOutcome::Succeeded {
                    boot_count: report.boot_count,
                    version: Some(report.version),
                }
            }
            Err((phase, last_error)) => {
                error!(
                    "{}: upgrade failed while {phase}: {last_error}",
                    device.hostname()
                );
                DeviceOutcome::Failed { phase, last_error }
            }
        }
    }
}
