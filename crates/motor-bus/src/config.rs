use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Mock,
    I2c,
}

/// Host-side driver settings. Bus address, clock and timeout are protocol constants and
/// deliberately absent.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
}

fn default_device() -> String {
    "/dev/i2c-1".to_string()
}

fn default_poll_period_ms() -> u64 {
    10
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            device: default_device(),
            poll_period_ms: default_poll_period_ms(),
        }
    }
}

impl DriverConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: DriverConfig = serde_yaml::from_str(raw).context("parsing driver config")?;
        if cfg.poll_period_ms == 0 {
            anyhow::bail!("poll_period_ms must be greater than zero");
        }
        Ok(cfg)
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<DriverConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    DriverConfig::from_yaml_str(&raw).with_context(|| format!("loading config: {}", path.display()))
}
