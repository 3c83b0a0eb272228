// SPDX-License-Identifier: MIT

//! SmartRelay fleet deployer
//!
//! Pushes firmware to a set of SmartRelay devices over their OTA receivers
//! and verifies each device actually converged: OTA completion reported and
//! cleared, a genuine reboot (boot counter advanced, relays restored), and
//! the expected software identity running. Built around one bounded polling
//! primitive; every wait in the sequence is an instantiation of it.

pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod upload;
pub mod verify;
pub mod version;

pub use error::{DeployError, Result};
pub use orchestrator::{DeviceOutcome, UpgradeBudgets, UpgradeOrchestrator, UpgradePhase};
pub use poller::{PollBudget, PollOutcome, poll};
pub use upload::{FirmwareUploader, PlatformioUploader, UploadReport};
pub use verify::{ProbeError, RelayTarget};
pub use version::BuildVersion;
