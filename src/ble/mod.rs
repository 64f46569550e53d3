//! Bluetooth Low Energy seam.
//!
//! The BLE stack itself (scan/pick, GATT connect, discovery, read/write,
//! notifications) belongs to the host. This module defines the narrow
//! [`BleTransport`] interface the rest of the crate drives, the UUID
//! canonicalization rules, and the classifier that turns host failures into
//! actionable [`ErrorKind`]s.

mod classify;
mod transport;
pub mod uuid;

#[cfg(test)]
pub(crate) mod mock;

pub use classify::{ErrorKind, Stage, classify};
pub use transport::{
    BleTransport, Capabilities, CharacteristicHandle, DeviceHandle, GattServer, NotificationSink, ServiceHandle,
    TransportError,
};
