//! Persistence of the last working (service, characteristic) pair and the
//! devices it was used with.

use crate::config::{AppConfig, ConfigError, ConfigLoadResult, ConnectionConfig};
use crate::history::DeviceHistory;
use crate::models::DeviceEntry;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Where the negotiator reads and writes [`ConnectionConfig`] and device history.
pub trait LinkStore: Send + Sync {
    fn load(&self) -> ConnectionConfig;
    fn save(&self, connection: &ConnectionConfig) -> Result<(), ConfigError>;

    fn history(&self) -> DeviceHistory;
    /// Put a freshly connected device at the front of the history.
    fn record_device(&self, entry: DeviceEntry) -> Result<(), ConfigError>;
}

/// Stores the pair in `[connection]` and devices in `[[history]]` of the application config file.
#[derive(Debug, Clone)]
pub struct TomlLinkStore {
    path: PathBuf,
}

impl TomlLinkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_config(&self) -> Result<AppConfig, ConfigError> {
        match AppConfig::try_load(&self.path) {
            ConfigLoadResult::Loaded(config) => Ok(config),
            ConfigLoadResult::Missing => Ok(AppConfig::default()),
            ConfigLoadResult::Invalid(e) => Err(e),
        }
    }
}

impl LinkStore for TomlLinkStore {
    fn load(&self) -> ConnectionConfig {
        match self.load_config() {
            Ok(config) => config.connection,
            Err(e) => {
                warn!("Ignoring saved connection, config unreadable: {}", e);
                ConnectionConfig::default()
            }
        }
    }

    /// Rewrites only `[connection]`; other sections are kept as loaded.
    fn save(&self, connection: &ConnectionConfig) -> Result<(), ConfigError> {
        let mut config = self.load_config()?;
        config.connection = connection.clone();
        config.save(&self.path)
    }

    fn history(&self) -> DeviceHistory {
        match self.load_config() {
            Ok(config) => config.history,
            Err(e) => {
                warn!("Ignoring device history, config unreadable: {}", e);
                DeviceHistory::default()
            }
        }
    }

    fn record_device(&self, entry: DeviceEntry) -> Result<(), ConfigError> {
        let mut config = self.load_config()?;
        config.history.record(entry);
        config.save(&self.path)
    }
}

/// In-process store, for tests and hosts without a config file.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    connection: Mutex<ConnectionConfig>,
    history: Mutex<DeviceHistory>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(service: &str, characteristic: &str) -> Self {
        let mut connection = ConnectionConfig::default();
        connection.remember(service, characteristic);
        Self {
            connection: Mutex::new(connection),
            ..Self::default()
        }
    }
}

impl LinkStore for MemoryLinkStore {
    fn load(&self) -> ConnectionConfig {
        match self.connection.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, connection: &ConnectionConfig) -> Result<(), ConfigError> {
        match self.connection.lock() {
            Ok(mut guard) => *guard = connection.clone(),
            Err(poisoned) => *poisoned.into_inner() = connection.clone(),
        }
        Ok(())
    }

    fn history(&self) -> DeviceHistory {
        match self.history.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_device(&self, entry: DeviceEntry) -> Result<(), ConfigError> {
        match self.history.lock() {
            Ok(mut guard) => guard.record(entry),
            Err(poisoned) => poisoned.into_inner().record(entry),
        }
        Ok(())
    }
}
