//! Connection strategies and the UUID tables they try.

use crate::ble::uuid::{NUS_RX_CHAR, NUS_SERVICE, NUS_TX_CHAR, RFID_CHAR, RFID_CHAR_ALT, RFID_SERVICE};
use serde::Serialize;
use std::fmt;

/// One way of finding the reader's data characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StrategyKind {
    DefaultUuids,
    SavedUuids,
    UuidVariations,
    QuickConnect,
    AutoDiscover,
    BruteForce,
    /// Operator-chosen pair; never part of an automatic pass.
    Manual,
}

impl StrategyKind {
    /// Priority order of an automatic negotiation pass.
    pub const ORDER: [StrategyKind; 6] = [
        Self::DefaultUuids,
        Self::SavedUuids,
        Self::UuidVariations,
        Self::QuickConnect,
        Self::AutoDiscover,
        Self::BruteForce,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::DefaultUuids => "Default UUIDs",
            Self::SavedUuids => "Saved UUIDs",
            Self::UuidVariations => "UUID Format Variations",
            Self::QuickConnect => "Quick Connect",
            Self::AutoDiscover => "Auto-Discover",
            Self::BruteForce => "Brute Force",
            Self::Manual => "Manual Selection",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Same canonical pairs written in short and long form.
pub(crate) const UUID_VARIATIONS: [(&str, &str); 5] = [
    (RFID_SERVICE, RFID_CHAR),
    ("fff0", "fff1"),
    (NUS_SERVICE, NUS_RX_CHAR),
    (RFID_SERVICE, "fff1"),
    ("fff0", RFID_CHAR),
];

/// A known-common (service, characteristic) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QuickCombo {
    pub service: &'static str,
    pub characteristic: &'static str,
    pub label: &'static str,
}

pub(crate) const QUICK_CONNECT_COMBOS: [QuickCombo; 4] = [
    QuickCombo {
        service: RFID_SERVICE,
        characteristic: RFID_CHAR,
        label: "Standard RFID Service",
    },
    QuickCombo {
        service: NUS_SERVICE,
        characteristic: NUS_RX_CHAR,
        label: "Nordic UART Service (RX/Notify)",
    },
    QuickCombo {
        service: NUS_SERVICE,
        characteristic: NUS_TX_CHAR,
        label: "Nordic UART Service (TX/Write)",
    },
    QuickCombo {
        service: RFID_SERVICE,
        characteristic: RFID_CHAR_ALT,
        label: "Standard RFID Service (Alt Char)",
    },
];
