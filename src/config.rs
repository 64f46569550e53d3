//! Configuration management module.

use crate::history::DeviceHistory;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Highest transmit power the reader accepts, in dBm.
pub const MAX_POWER_DBM: u8 = 33;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub reader: ReaderSettings,
    #[serde(default, skip_serializing_if = "DeviceHistory::is_empty")]
    pub history: DeviceHistory,
}

/// Last (service, characteristic) pair that produced a working link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub service_uuid: Option<String>,
    pub characteristic_uuid: Option<String>,
}

impl ConnectionConfig {
    /// Both UUIDs, or nothing.
    pub fn saved_pair(&self) -> Option<(&str, &str)> {
        match (&self.service_uuid, &self.characteristic_uuid) {
            (Some(service), Some(characteristic)) => Some((service, characteristic)),
            _ => None,
        }
    }

    pub fn remember(&mut self, service: impl Into<String>, characteristic: impl Into<String>) {
        self.service_uuid = Some(service.into());
        self.characteristic_uuid = Some(characteristic.into());
    }

    pub fn clear(&mut self) {
        self.service_uuid = None;
        self.characteristic_uuid = None;
    }
}

/// Regulatory frequency region. The wire code is the position in [`FrequencyRegion::ALL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyRegion {
    #[default]
    #[serde(rename = "China Standard 1")]
    ChinaStandard1,
    #[serde(rename = "China Standard 2")]
    ChinaStandard2,
    #[serde(rename = "Europe Standard")]
    Europe,
    #[serde(rename = "United States Standard")]
    UnitedStates,
    #[serde(rename = "Korea")]
    Korea,
    #[serde(rename = "Japan")]
    Japan,
}

impl FrequencyRegion {
    pub const ALL: [FrequencyRegion; 6] = [
        Self::ChinaStandard1,
        Self::ChinaStandard2,
        Self::Europe,
        Self::UnitedStates,
        Self::Korea,
        Self::Japan,
    ];

    /// Mode byte sent with `SetFrequency`.
    pub fn code(self) -> u8 {
        match self {
            Self::ChinaStandard1 => 0,
            Self::ChinaStandard2 => 1,
            Self::Europe => 2,
            Self::UnitedStates => 3,
            Self::Korea => 4,
            Self::Japan => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ChinaStandard1 => "China Standard 1",
            Self::ChinaStandard2 => "China Standard 2",
            Self::Europe => "Europe Standard",
            Self::UnitedStates => "United States Standard",
            Self::Korea => "Korea",
            Self::Japan => "Japan",
        }
    }
}

impl fmt::Display for FrequencyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FrequencyRegion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|region| region.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Validation(format!("Unknown frequency region '{s}'")))
    }
}

/// Air protocol preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMode {
    #[default]
    Auto,
    #[serde(rename = "ISO18000-6B")]
    Iso18000_6B,
    #[serde(rename = "ISO18000-6C")]
    Iso18000_6C,
}

/// Operator preferences for the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Transmit power in dBm.
    pub power: u8,
    pub frequency: FrequencyRegion,
    pub protocol: ProtocolMode,
    /// Beep on every tag report.
    pub beep: bool,
    /// Show RSSI next to each tag.
    pub rssi: bool,
    pub auto_reconnect: bool,
    pub tag_focus: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            power: 26,
            frequency: FrequencyRegion::default(),
            protocol: ProtocolMode::default(),
            beep: true,
            rssi: false,
            auto_reconnect: false,
            tag_focus: false,
        }
    }
}

impl AppConfig {
    /// Get config file path (per-user config directory).
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "uhf-ble-reader")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reader.power > MAX_POWER_DBM {
            return Err(ConfigError::Validation(format!(
                "Power must be between 0 and {MAX_POWER_DBM} dBm"
            )));
        }
        if self.connection.service_uuid.is_some() != self.connection.characteristic_uuid.is_some() {
            return Err(ConfigError::Validation(
                "Saved service and characteristic UUIDs must be set together".to_string(),
            ));
        }
        if let Some((service, characteristic)) = self.connection.saved_pair() {
            if service.trim().is_empty() || characteristic.trim().is_empty() {
                return Err(ConfigError::Validation("Saved UUIDs cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Save configuration to file, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
