//! Host BLE capability consumed by the negotiator and the reader session.

use super::classify::{ErrorKind, Stage, classify};
use crate::models::device::SignalStrength;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Where a subscribed characteristic pushes its notification payloads.
pub type NotificationSink = mpsc::UnboundedSender<Vec<u8>>;

/// A device picked by the host scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHandle {
    /// Host-assigned identifier, stable for the device's lifetime.
    pub id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    /// Advertised signal strength (dBm), when the scanner reports one.
    pub rssi: Option<i16>,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            address: None,
            rssi: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for display, falling back to a generic label.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Device")
    }

    pub fn signal(&self) -> Option<SignalStrength> {
        self.rssi.map(SignalStrength::from_rssi)
    }
}

/// An open GATT connection to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattServer {
    pub device_id: String,
}

/// A primary service exposed by a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub device_id: String,
    pub uuid: String,
}

/// Properties advertised by a GATT characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub notify: bool,
    pub indicate: bool,
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
}

impl Capabilities {
    /// Notify or indicate: the characteristic can stream replies to us.
    pub fn can_subscribe(&self) -> bool {
        self.notify || self.indicate
    }

    pub fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// A characteristic within a service, with its discovered capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub device_id: String,
    pub service_uuid: String,
    pub uuid: String,
    pub capabilities: Capabilities,
}

/// Failure reported by the host: a named error category plus free text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct TransportError {
    pub name: String,
    pub message: String,
}

impl TransportError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// A GATT lookup that found nothing.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFoundError", message)
    }

    /// Classify as a failure of an established or in-progress GATT link.
    pub fn classify(&self) -> ErrorKind {
        classify(self, Stage::Gatt)
    }

    /// Classify as a failure while scanning for / picking a device.
    pub fn classify_scan(&self) -> ErrorKind {
        classify(self, Stage::Scan)
    }
}

/// The host BLE stack, as seen by this crate.
///
/// Every async method is a suspend point; implementations must not run two
/// operations concurrently against the same device on our behalf, and must
/// deliver notifications to a [`NotificationSink`] one payload at a time in
/// arrival order.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Scan and let the operator pick a device.
    async fn scan_and_pick(&self) -> Result<DeviceHandle, TransportError>;

    /// Open (or reuse) the GATT connection to `device`.
    async fn connect(&self, device: &DeviceHandle) -> Result<GattServer, TransportError>;

    async fn list_services(&self, server: &GattServer) -> Result<Vec<ServiceHandle>, TransportError>;

    async fn list_characteristics(&self, service: &ServiceHandle) -> Result<Vec<CharacteristicHandle>, TransportError>;

    /// Start notifications/indications, pushing each payload into `sink`.
    async fn subscribe(&self, characteristic: &CharacteristicHandle, sink: NotificationSink)
    -> Result<(), TransportError>;

    async fn unsubscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), TransportError>;

    async fn write(&self, characteristic: &CharacteristicHandle, bytes: &[u8]) -> Result<(), TransportError>;

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>, TransportError>;

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError>;

    /// Fire `observer` once when the device drops its GATT connection.
    fn on_disconnect(&self, device: &DeviceHandle, observer: oneshot::Sender<()>);
}
