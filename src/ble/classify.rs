//! Maps host transport failures onto a small, actionable taxonomy.

use super::transport::TransportError;
use serde::Serialize;
use std::fmt;

/// Phase of the connection flow a failure came from.
///
/// The host reports "not found" for both an empty scan and a missing GATT
/// service, so the phase decides which of the two it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Gatt,
}

/// Classified transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DeviceNotFound,
    BrowserUnsupported,
    TransportInsecureContext,
    PermissionDenied,
    GattNetwork,
    GattInvalidState,
    GattSecurity,
    GattNotFound,
    GattNotSupported,
    GattOperationFailed,
    GattTimeout,
    Unknown,
}

impl ErrorKind {
    /// Transient link failures worth an automatic retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::GattNetwork | Self::GattOperationFailed | Self::GattTimeout)
    }

    /// Discovery and environment failures end the current attempt outright.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound | Self::BrowserUnsupported | Self::TransportInsecureContext | Self::PermissionDenied
        )
    }

    /// Guidance shown to the operator.
    pub fn remediation(self) -> &'static str {
        match self {
            Self::DeviceNotFound => {
                "No devices found. Make sure the reader is powered on, discoverable, supports BLE and is in range."
            }
            Self::BrowserUnsupported => "Bluetooth Low Energy is not available on this host.",
            Self::TransportInsecureContext => "Bluetooth access requires a secure context (HTTPS or localhost).",
            Self::PermissionDenied => "Bluetooth permission was denied. Grant access and try again.",
            Self::GattNetwork => "Network/connection failed. Try moving closer to the device or reconnecting.",
            Self::GattInvalidState => "Device is not in a valid state. Try disconnecting and reconnecting.",
            Self::GattSecurity => "Security/authorization failed. Check Bluetooth permissions.",
            Self::GattNotFound => "Service or characteristic not found.",
            Self::GattNotSupported => "Operation not supported by this device.",
            Self::GattOperationFailed => "Operation failed. The device may have disconnected.",
            Self::GattTimeout => "Connection timeout. The device may be out of range or not responding.",
            Self::Unknown => "Connection failed.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DeviceNotFound => "Device not found",
            Self::BrowserUnsupported => "Bluetooth unsupported",
            Self::TransportInsecureContext => "Insecure context",
            Self::PermissionDenied => "Permission denied",
            Self::GattNetwork => "GATT network error",
            Self::GattInvalidState => "GATT invalid state",
            Self::GattSecurity => "GATT security error",
            Self::GattNotFound => "GATT not found",
            Self::GattNotSupported => "GATT not supported",
            Self::GattOperationFailed => "GATT operation failed",
            Self::GattTimeout => "GATT timeout",
            Self::Unknown => "Unknown error",
        };
        f.write_str(label)
    }
}

/// Classify a host failure: exact category name first, message keywords second.
pub fn classify(err: &TransportError, stage: Stage) -> ErrorKind {
    let message = err.message.to_lowercase();

    if stage == Stage::Scan {
        match err.name.as_str() {
            "NotFoundError" => return ErrorKind::DeviceNotFound,
            "NotSupportedError" => return ErrorKind::BrowserUnsupported,
            "SecurityError" if message.contains("secure context") || message.contains("https") => {
                return ErrorKind::TransportInsecureContext;
            }
            _ => {}
        }
        if message.contains("not supported") {
            return ErrorKind::BrowserUnsupported;
        }
    }

    match err.name.as_str() {
        "NotAllowedError" => return ErrorKind::PermissionDenied,
        "NetworkError" => return ErrorKind::GattNetwork,
        "InvalidStateError" => return ErrorKind::GattInvalidState,
        "SecurityError" => return ErrorKind::GattSecurity,
        "NotFoundError" => return ErrorKind::GattNotFound,
        "NotSupportedError" => return ErrorKind::GattNotSupported,
        "OperationError" => return ErrorKind::GattOperationFailed,
        "TimeoutError" => return ErrorKind::GattTimeout,
        _ => {}
    }

    if message.contains("network") {
        ErrorKind::GattNetwork
    } else if message.contains("invalid state") {
        ErrorKind::GattInvalidState
    } else if message.contains("security") {
        ErrorKind::GattSecurity
    } else if message.contains("time") {
        ErrorKind::GattTimeout
    } else {
        ErrorKind::Unknown
    }
}
