//! Discovered and previously connected readers.

use crate::ble::DeviceHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// Coarse signal grade shown next to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalStrength {
    Strong,
    Good,
    Weak,
}

impl SignalStrength {
    pub fn from_rssi(rssi: i16) -> Self {
        if rssi > -60 {
            Self::Strong
        } else if rssi > -70 {
            Self::Good
        } else {
            Self::Weak
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strong => "Strong",
            Self::Good => "Good",
            Self::Weak => "Weak",
        })
    }
}

/// A reader remembered in the device history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    pub last_connected: DateTime<Utc>,
}

impl DeviceEntry {
    /// History entry for `device`, keyed by its address (or id when the host hides it).
    pub fn from_handle(device: &DeviceHandle, now: DateTime<Utc>) -> Self {
        Self {
            name: device.display_name().to_string(),
            address: device.address.clone().unwrap_or_else(|| device.id.clone()),
            rssi: device.rssi,
            last_connected: now,
        }
    }

    pub fn signal(&self) -> Option<SignalStrength> {
        self.rssi.map(SignalStrength::from_rssi)
    }
}

/// Strongest first; devices without RSSI go last, in their original order.
pub fn sort_by_signal(devices: &mut [DeviceHandle]) {
    devices.sort_by_key(|d| Reverse(d.rssi));
}
