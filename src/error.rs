//! Error types and handling.

use crate::ble::{ErrorKind, TransportError};
use crate::negotiate::StrategyFailure;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Operation needs an established reader link
    #[error("Not connected to a reader")]
    NotConnected,

    /// Hex input rejected (odd length or non-hex characters)
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// BLE transport failure, already classified
    #[error("{kind}: {message}")]
    Transport { kind: ErrorKind, message: String },

    /// No connection strategy produced a working link
    #[error("All connection strategies failed ({} tried)", failures.len())]
    Exhausted { failures: Vec<StrategyFailure> },
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create a validation error with message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid hex error with message
    pub fn invalid_hex(msg: impl Into<String>) -> Self {
        Self::InvalidHex(msg.into())
    }

    /// Wrap a failure from scanning/picking a device.
    pub fn scan(err: TransportError) -> Self {
        Self::Transport {
            kind: err.classify_scan(),
            message: err.message,
        }
    }

    /// Classification of the failure, if it came from the transport.
    pub fn transport_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            kind: err.classify(),
            message: err.message,
        }
    }
}
