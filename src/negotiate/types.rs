//! Negotiation results and state.

use super::strategy::StrategyKind;
use crate::ble::{Capabilities, CharacteristicHandle, DeviceHandle, ErrorKind, TransportError};
use serde::Serialize;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Progress of the current (or last) negotiation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NegotiationState {
    Idle,
    /// Index into [`StrategyKind::ORDER`].
    TryingStrategy(usize),
    Connected(StrategyKind),
    Exhausted,
}

/// A (service, characteristic) pair and what the characteristic can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCandidate {
    pub service_uuid: String,
    pub characteristic_uuid: String,
    pub capabilities: Capabilities,
}

impl From<&CharacteristicHandle> for ConnectionCandidate {
    fn from(characteristic: &CharacteristicHandle) -> Self {
        Self {
            service_uuid: characteristic.service_uuid.clone(),
            characteristic_uuid: characteristic.uuid.clone(),
            capabilities: characteristic.capabilities,
        }
    }
}

/// How replies reach us over the negotiated characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkMode {
    Notify,
    Indicate,
    /// Replies must be polled with reads.
    Read,
    /// Commands only; no reply path.
    WriteOnly,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notify => "notify",
            Self::Indicate => "indicate",
            Self::Read => "read",
            Self::WriteOnly => "write-only",
        })
    }
}

/// Why one strategy did not produce a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub kind: ErrorKind,
    pub message: String,
}

impl StrategyFailure {
    pub(crate) fn new(strategy: StrategyKind, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            strategy,
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn from_transport(strategy: StrategyKind, err: &TransportError) -> Self {
        Self::new(strategy, err.classify(), err.to_string())
    }
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.strategy, self.kind, self.message)
    }
}

/// An established link, owned by whoever drives the session.
///
/// Produced in one piece by a successful negotiation; there is no partially
/// connected state.
#[derive(Debug)]
pub struct LinkHandle {
    pub device: DeviceHandle,
    pub characteristic: CharacteristicHandle,
    pub strategy: StrategyKind,
    pub mode: LinkMode,
    /// Notification payloads, in arrival order.
    pub notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Resolves when the device drops the connection.
    pub disconnected: oneshot::Receiver<()>,
}

impl LinkHandle {
    pub fn candidate(&self) -> ConnectionCandidate {
        ConnectionCandidate::from(&self.characteristic)
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.mode, LinkMode::Notify | LinkMode::Indicate)
    }
}

/// Result of one negotiation pass.
#[derive(Debug)]
pub enum NegotiationOutcome {
    Success(LinkHandle),
    /// Every strategy failed (or a terminal failure ended the pass early).
    Exhausted(Vec<StrategyFailure>),
}

impl NegotiationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
