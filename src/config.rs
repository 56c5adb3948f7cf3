// ABOUTME: Loads TOML configuration selecting the pod hardware backend.
// ABOUTME: Provides defaults for the pod comms D-Bus endpoint and the simulated pod.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pod: PodConfig,
}

/// Which implementation talks to the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PodBackend {
    #[default]
    PodComms,
    Simulator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodConfig {
    #[serde(default)]
    pub backend: PodBackend,
    #[serde(default)]
    pub comms: CommsConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommsConfig {
    #[serde(default = "default_comms_service")]
    pub service: String,
    #[serde(default = "default_comms_path")]
    pub path: String,
}

/// Failure the simulated pod reports instead of pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatedFailure {
    Fault,
    Timeout,
    Communication,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_prime_duration_secs")]
    pub prime_duration_secs: u64,
    #[serde(default = "default_pair_latency_ms")]
    pub pair_latency_ms: u64,
    #[serde(default)]
    pub failure: Option<SimulatedFailure>,
}

fn default_comms_service() -> String {
    podpair_ipc::POD_COMMS_SERVICE.to_string()
}

fn default_comms_path() -> String {
    podpair_ipc::POD_COMMS_PATH.to_string()
}

fn default_prime_duration_secs() -> u64 {
    55
}

fn default_pair_latency_ms() -> u64 {
    1500
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            service: default_comms_service(),
            path: default_comms_path(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            prime_duration_secs: default_prime_duration_secs(),
            pair_latency_ms: default_pair_latency_ms(),
            failure: None,
        }
    }
}

impl Config {
    /// Load configuration from the standard config file location.
    /// Falls back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::load_from_path(&Self::config_file_path())
    }

    fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = Self::load_from_str(&contents)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn load_from_str(contents: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve the config path, respecting the PODPAIR_CONFIG env var override.
    fn config_file_path() -> PathBuf {
        if let Ok(override_path) = std::env::var("PODPAIR_CONFIG") {
            return PathBuf::from(override_path);
        }
        let xdg_config = std::env::var("XDG_CONFIG_HOME")
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                format!("{home}/.config")
            });
        Path::new(&xdg_config).join("podpair").join("config.toml")
    }
}
