//! Bridge configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub log_level: String,
    /// Default deadline applied to permission requests that carry none.
    /// Absent means requests without an explicit timeout pend forever.
    #[serde(default)]
    pub permission_timeout_secs: Option<u64>,
}

/// Demo platform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Answer permission prompts immediately instead of waiting for an
    /// injected verdict
    #[serde(default = "DemoSettings::default_auto_grant")]
    pub auto_grant: bool,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            auto_grant: Self::default_auto_grant(),
        }
    }
}

impl DemoSettings {
    fn default_auto_grant() -> bool {
        true
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings {
                log_level: "info".to_string(),
                permission_timeout_secs: None,
            },
            demo: DemoSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Default config file location under the user config dir
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbdevinfo").join("bridge.toml")
        } else {
            PathBuf::from("/etc/usbdevinfo/bridge.toml")
        }
    }

    /// Load from an explicit path, or from the default path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Load from the default path, falling back to built-in defaults
    pub fn load_or_default() -> Self {
        Self::load(None).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Default permission deadline as a duration
    pub fn permission_timeout(&self) -> Option<Duration> {
        self.bridge.permission_timeout_secs.map(Duration::from_secs)
    }
}
