// SPDX-License-Identifier: MIT

//! HTTP client for the SmartRelay device control API.
//!
//! Each device exposes a small HTTPS API (`/api/version`, `/api/systeminfo`,
//! `/api/ota`, relay get/set, ...) behind basic auth and a self-signed
//! certificate. This crate wraps those endpoints with typed responses and a
//! narrow error taxonomy, plus a registry that holds one client per
//! configured hostname.

pub mod client;
pub mod error;
pub mod registry;

pub use client::{
    Credentials, DeviceClient, OtaReport, RelayState, SoftwareVersion, SystemInfo, VersionReport,
};
pub use error::ApiError;
pub use registry::{DeviceRegistry, DeviceSet, FleetConfig};
