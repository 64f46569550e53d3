//! Outbound frame building and checksum calculation.

use super::types::{
    CMD_READ_TAG, CMD_SET_FILTER, CMD_SET_FREQUENCY, CMD_SET_POWER, CMD_WRITE_TAG, Command, FRAME_GET_FREQUENCY,
    FRAME_GET_POWER, FRAME_INVENTORY_SINGLE, FRAME_START_INVENTORY, FRAME_STOP_INVENTORY, HEADER, MAX_FRAME_LEN,
    PASSWORD_LEN,
};
use crate::error::{AppError, Result};

/// Sum of `data` modulo 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Decode a hex string pairwise into bytes.
///
/// Odd-length or non-hex input is rejected rather than truncated.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(AppError::invalid_hex(format!(
            "'{hex}' has odd length {}",
            hex.len()
        )));
    }

    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| match pair {
            [hi, lo] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => Ok((nibble(*hi) << 4) | nibble(*lo)),
            _ => Err(AppError::invalid_hex(format!("'{hex}' contains a non-hex character"))),
        })
        .collect()
}

fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Uppercase hex, no separators.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Uppercase hex with a space between bytes, for logs and the CLI.
pub fn format_frame(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

/// Build `[header, length, opcode, payload.., checksum]`.
///
/// `length` counts every byte after the header (itself included); the
/// checksum covers opcode and payload.
pub(crate) fn build_frame(opcode: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let total_len = 4 + payload.len();
    if total_len > MAX_FRAME_LEN {
        return Err(AppError::validation(format!(
            "Payload of {} bytes does not fit in one frame",
            payload.len()
        )));
    }
    let length = u8::try_from(total_len - 1)
        .map_err(|_| AppError::validation(format!("Frame length {total_len} out of range")))?;

    let mut frame = Vec::with_capacity(total_len);
    frame.push(HEADER);
    frame.push(length);
    frame.push(opcode);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame[2..]));

    Ok(frame)
}

/// Encode a command into its wire frame.
pub fn encode(command: &Command) -> Result<Vec<u8>> {
    match command {
        Command::StartInventory => Ok(FRAME_START_INVENTORY.to_vec()),
        Command::StopInventory => Ok(FRAME_STOP_INVENTORY.to_vec()),
        Command::InventorySingle => Ok(FRAME_INVENTORY_SINGLE.to_vec()),
        Command::GetPower => Ok(FRAME_GET_POWER.to_vec()),
        Command::GetFrequency => Ok(FRAME_GET_FREQUENCY.to_vec()),
        Command::SetPower(level) => build_frame(CMD_SET_POWER, &[*level]),
        Command::SetFrequency(mode) => build_frame(CMD_SET_FREQUENCY, &[*mode]),
        Command::ReadTag {
            bank,
            pointer,
            length,
            password,
        } => {
            let mut payload = password_bytes(password)?;
            payload.extend_from_slice(&[bank.code(), *pointer, *length]);
            build_frame(CMD_READ_TAG, &payload)
        }
        Command::WriteTag {
            bank,
            pointer,
            length,
            data,
            password,
        } => {
            let data = hex_to_bytes(data)?;
            if data.is_empty() || data.len() % 2 != 0 {
                return Err(AppError::validation(format!(
                    "Write data must be whole 16-bit words, got {} bytes",
                    data.len()
                )));
            }

            let mut payload = password_bytes(password)?;
            payload.extend_from_slice(&[bank.code(), *pointer, *length]);
            payload.extend(data);
            build_frame(CMD_WRITE_TAG, &payload)
        }
        Command::SetFilter {
            bank,
            pointer,
            length,
            mask,
        } => {
            let mut payload = vec![bank.code(), *pointer, *length];
            payload.extend(hex_to_bytes(mask)?);
            build_frame(CMD_SET_FILTER, &payload)
        }
    }
}

fn password_bytes(password: &str) -> Result<Vec<u8>> {
    let bytes = hex_to_bytes(password)?;
    if bytes.len() != PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Access password must be {} hex characters, got {}",
            PASSWORD_LEN * 2,
            password.len()
        )));
    }
    Ok(bytes)
}
