// SPDX-License-Identifier: MIT

//! Fleet configuration and the per-hostname client registry

use crate::client::{Credentials, DeviceClient};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fleet config file shape:
///
/// ```json
/// {
///   "security": { "www_user": "admin", "www_pass": "..." },
///   "devices": { "deploy": ["livingroom", "kitchen"], "test": ["bench"] }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub security: SecurityConfig,
    #[serde(default)]
    pub devices: DeviceSets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub www_user: String,
    pub www_pass: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSets {
    #[serde(default)]
    pub deploy: Vec<String>,
    #[serde(default)]
    pub test: Vec<String>,
}

/// Which configured hostname list to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSet {
    Deploy,
    Test,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApiError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ApiError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn hostnames(&self, set: DeviceSet) -> &[String] {
        match set {
            DeviceSet::Deploy => &self.devices.deploy,
            DeviceSet::Test => &self.devices.test,
        }
    }
}

/// One `DeviceClient` per configured hostname, built once from the shared
/// credentials. Read-only after construction, safe to share across
/// per-device workers.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceClient>,
}

impl DeviceRegistry {
    pub fn from_config(config: &FleetConfig, set: DeviceSet) -> Result<Self, ApiError> {
        let credentials = Credentials {
            user: config.security.www_user.clone(),
            password: config.security.www_pass.clone(),
        };

        let mut devices = BTreeMap::new();
        for hostname in config.hostnames(set) {
            let client = DeviceClient::new(hostname, credentials.clone())?;
            devices.insert(hostname.clone(), client);
        }
        Ok(Self { devices })
    }

    /// Build a registry from prebuilt clients, for callers that need
    /// per-device addressing (tests against mock servers).
    pub fn from_clients(clients: impl IntoIterator<Item = (String, DeviceClient)>) -> Self {
        Self {
            devices: clients.into_iter().collect(),
        }
    }

    pub fn get(&self, hostname: &str) -> Option<&DeviceClient> {
        self.devices.get(hostname)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeviceClient)> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn test_config() -> FleetConfig {
        FleetConfig {
            security: SecurityConfig {
                www_user: "admin".to_string(),
                www_pass: "secret".to_string(),
            },
            devices: DeviceSets {
                deploy: vec!["livingroom".to_string(), "kitchen".to_string()],
                test: vec!["bench".to_string()],
            },
        }
    }

    #[test]
    fn test_load_config() {
        let content = json!({
            "security": { "www_user": "admin", "www_pass": "secret" },
            "devices": { "deploy": ["livingroom"], "test": [] }
        });

        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), content.to_string()).unwrap();

        let config = FleetConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.security.www_user, "admin");
        assert_eq!(config.devices.deploy, vec!["livingroom"]);
        assert!(config.devices.test.is_empty());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = FleetConfig::load(Path::new("/nonexistent/fleet.json"));
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn test_load_config_device_lists_optional() {
        let content = json!({
            "security": { "www_user": "admin", "www_pass": "secret" }
        });

        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), content.to_string()).unwrap();

        let config = FleetConfig::load(temp_file.path()).unwrap();
        assert!(config.devices.deploy.is_empty());
        assert!(config.devices.test.is_empty());
    }

    #[test]
    fn test_registry_holds_selected_set() {
        let registry = DeviceRegistry::from_config(&test_config(), DeviceSet::Deploy).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("livingroom").is_some());
        assert!(registry.get("kitchen").is_some());
        assert!(registry.get("bench").is_none());

        let registry = DeviceRegistry::from_config(&test_config(), DeviceSet::Test).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("bench").is_some());
    }

    #[test]
    fn test_registry_iteration_is_ordered() {
        let registry = DeviceRegistry::from_config(&test_config(), DeviceSet::Deploy).unwrap();
        let hostnames: Vec<&String> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(hostnames, vec!["kitchen", "livingroom"]);
    }
}
