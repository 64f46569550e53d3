//! Reader protocol types and constants.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Frame layout
pub(crate) const HEADER: u8 = 0xA0;
pub(crate) const MIN_FRAME_LEN: usize = 4; // header + length + opcode + one byte
pub(crate) const MIN_TAG_FRAME_LEN: usize = 6;
pub(crate) const MIN_READ_FRAME_LEN: usize = 6;
pub(crate) const MAX_FRAME_LEN: usize = 256; // length byte counts everything after the header

// Command op-codes
pub(crate) const CMD_START_INVENTORY: u8 = 0x01;
pub(crate) const CMD_STOP_INVENTORY: u8 = 0x02;
pub(crate) const CMD_INVENTORY_SINGLE: u8 = 0x03;
pub(crate) const CMD_GET_POWER: u8 = 0x97;
pub(crate) const CMD_SET_POWER: u8 = 0x98;
pub(crate) const CMD_GET_FREQUENCY: u8 = 0xAA;
pub(crate) const CMD_SET_FREQUENCY: u8 = 0xAB;
pub(crate) const CMD_READ_TAG: u8 = 0x39;
pub(crate) const CMD_WRITE_TAG: u8 = 0x49;
pub(crate) const CMD_SET_FILTER: u8 = 0x8C;

// Fixed frames, sent verbatim
pub(crate) const FRAME_START_INVENTORY: [u8; 5] = [HEADER, 0x04, CMD_START_INVENTORY, 0x89, 0x01];
pub(crate) const FRAME_STOP_INVENTORY: [u8; 4] = [HEADER, 0x03, CMD_STOP_INVENTORY, 0x01];
pub(crate) const FRAME_INVENTORY_SINGLE: [u8; 4] = [HEADER, 0x03, CMD_INVENTORY_SINGLE, 0x22];
pub(crate) const FRAME_GET_POWER: [u8; 4] = [HEADER, 0x03, CMD_GET_POWER, 0x01];
pub(crate) const FRAME_GET_FREQUENCY: [u8; 4] = [HEADER, 0x03, CMD_GET_FREQUENCY, 0x01];

// Response op-codes
pub(crate) const RSP_TAG_INVENTORY: u8 = 0x89;
pub(crate) const RSP_TAG_SINGLE: u8 = 0x22;
pub(crate) const RSP_INVENTORY_STOPPED: u8 = 0x01;
pub(crate) const RSP_POWER: u8 = 0x97;
pub(crate) const RSP_READ: u8 = 0x39;
pub(crate) const RSP_WRITE: u8 = 0x49;
pub(crate) const RSP_FREQUENCY: u8 = 0xAA;

/// Status byte the reader sends for a successful read/write.
pub(crate) const STATUS_SUCCESS: u8 = 0x10;

/// Trailing bytes strictly inside this range are RSSI magnitudes.
pub(crate) const RSSI_FLOOR: u8 = 20;
pub(crate) const RSSI_CEILING: u8 = 100;

/// Access password length in bytes.
pub(crate) const PASSWORD_LEN: usize = 4;
pub const DEFAULT_PASSWORD: &str = "00000000";

/// Tag memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bank {
    Reserved,
    Epc,
    Tid,
    User,
}

impl Bank {
    /// Wire code for this bank.
    pub fn code(self) -> u8 {
        match self {
            Self::Reserved => 0,
            Self::Epc => 1,
            Self::Tid => 2,
            Self::User => 3,
        }
    }
}

impl FromStr for Bank {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESERVED" => Ok(Self::Reserved),
            "EPC" => Ok(Self::Epc),
            "TID" => Ok(Self::Tid),
            "USER" => Ok(Self::User),
            other => Err(AppError::validation(format!("Unknown memory bank '{other}'"))),
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reserved => "RESERVED",
            Self::Epc => "EPC",
            Self::Tid => "TID",
            Self::User => "USER",
        })
    }
}

/// Outbound reader command.
///
/// Hex string fields (`password`, `data`, `mask`) hold two hex characters per
/// byte; `pointer` and `length` are in words as the reader expects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartInventory,
    StopInventory,
    InventorySingle,
    GetPower,
    SetPower(u8),
    GetFrequency,
    SetFrequency(u8),
    ReadTag {
        bank: Bank,
        pointer: u8,
        length: u8,
        password: String,
    },
    WriteTag {
        bank: Bank,
        pointer: u8,
        length: u8,
        data: String,
        password: String,
    },
    SetFilter {
        bank: Bank,
        pointer: u8,
        length: u8,
        mask: String,
    },
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::StartInventory => CMD_START_INVENTORY,
            Self::StopInventory => CMD_STOP_INVENTORY,
            Self::InventorySingle => CMD_INVENTORY_SINGLE,
            Self::GetPower => CMD_GET_POWER,
            Self::SetPower(_) => CMD_SET_POWER,
            Self::GetFrequency => CMD_GET_FREQUENCY,
            Self::SetFrequency(_) => CMD_SET_FREQUENCY,
            Self::ReadTag { .. } => CMD_READ_TAG,
            Self::WriteTag { .. } => CMD_WRITE_TAG,
            Self::SetFilter { .. } => CMD_SET_FILTER,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartInventory => "START_INVENTORY",
            Self::StopInventory => "STOP_INVENTORY",
            Self::InventorySingle => "INVENTORY_SINGLE",
            Self::GetPower => "GET_POWER",
            Self::SetPower(_) => "SET_POWER",
            Self::GetFrequency => "GET_FREQUENCY",
            Self::SetFrequency(_) => "SET_FREQUENCY",
            Self::ReadTag { .. } => "READ_TAG",
            Self::WriteTag { .. } => "WRITE_TAG",
            Self::SetFilter { .. } => "SET_FILTER",
        }
    }
}

/// Outcome byte of a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum OpStatus {
    Success,
    Failure(u8),
}

impl OpStatus {
    pub(crate) fn from_byte(byte: u8) -> Self {
        if byte == STATUS_SUCCESS {
            Self::Success
        } else {
            Self::Failure(byte)
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// One inventoried tag as reported by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagReport {
    /// Uppercase hex.
    pub epc: String,
    pub tid: Option<String>,
    /// dBm, always negative when present.
    pub rssi: Option<i16>,
}

/// Decoded meaning of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    TagReport(TagReport),
    ReadResult { status: OpStatus, data: Option<String> },
    WriteResult { status: OpStatus },
    PowerReport { dbm: u8 },
    FrequencyReport { mode: u8 },
    InventoryStopped,
    Unrecognized { raw: Vec<u8> },
}

/// A frame too short or internally inconsistent to interpret.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed frame: {reason}")]
pub struct Malformed {
    pub reason: String,
}

impl Malformed {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
