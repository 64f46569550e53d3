//! Inbound notification frame decoding.

use super::protocol::bytes_to_hex;
use super::types::{
    HEADER, InboundEvent, MIN_FRAME_LEN, MIN_READ_FRAME_LEN, MIN_TAG_FRAME_LEN, Malformed, OpStatus, RSP_FREQUENCY,
    RSP_INVENTORY_STOPPED, RSP_POWER, RSP_READ, RSP_TAG_INVENTORY, RSP_TAG_SINGLE, RSP_WRITE, RSSI_CEILING,
    RSSI_FLOOR, TagReport,
};

/// Decode one inbound frame.
///
/// Unknown headers and op-codes come back as [`InboundEvent::Unrecognized`];
/// only truncated or self-inconsistent buffers are [`Malformed`].
pub fn decode(buffer: &[u8]) -> Result<InboundEvent, Malformed> {
    if buffer.len() < MIN_FRAME_LEN {
        return Err(Malformed::new(format!("{} bytes, need at least {MIN_FRAME_LEN}", buffer.len())));
    }

    if buffer[0] != HEADER {
        return Ok(InboundEvent::Unrecognized { raw: buffer.to_vec() });
    }

    let declared = usize::from(buffer[1]);
    if declared + 1 > buffer.len() {
        return Err(Malformed::new(format!(
            "declared length {declared} exceeds {} received bytes",
            buffer.len()
        )));
    }

    match buffer[2] {
        RSP_TAG_INVENTORY | RSP_TAG_SINGLE => parse_tag_report(buffer),
        RSP_READ => parse_read_result(buffer),
        RSP_WRITE => Ok(InboundEvent::WriteResult {
            status: OpStatus::from_byte(buffer[3]),
        }),
        RSP_POWER => Ok(InboundEvent::PowerReport { dbm: buffer[3] }),
        RSP_FREQUENCY => Ok(InboundEvent::FrequencyReport { mode: buffer[3] }),
        RSP_INVENTORY_STOPPED => Ok(InboundEvent::InventoryStopped),
        _ => Ok(InboundEvent::Unrecognized { raw: buffer.to_vec() }),
    }
}

/// `[header, length, cmd, data_len, epc.., rssi?, checksum]`
fn parse_tag_report(buffer: &[u8]) -> Result<InboundEvent, Malformed> {
    const EPC_START: usize = 4;

    if buffer.len() < MIN_TAG_FRAME_LEN {
        return Err(Malformed::new(format!(
            "tag report of {} bytes, need at least {MIN_TAG_FRAME_LEN}",
            buffer.len()
        )));
    }

    let data_len = usize::from(buffer[3]);
    let epc_end = EPC_START + data_len;
    if data_len == 0 || epc_end > buffer.len() {
        return Err(Malformed::new(format!(
            "tag data length {data_len} does not fit {} byte frame",
            buffer.len()
        )));
    }

    // A byte between the EPC and the checksum carries the RSSI magnitude.
    let rssi = if buffer.len() > epc_end + 1 {
        let value = buffer[epc_end];
        (value > RSSI_FLOOR && value < RSSI_CEILING).then(|| -i16::from(value))
    } else {
        None
    };

    Ok(InboundEvent::TagReport(TagReport {
        epc: bytes_to_hex(&buffer[EPC_START..epc_end]),
        tid: None,
        rssi,
    }))
}

/// `[header, length, cmd, status, data_len, data.., checksum]`
fn parse_read_result(buffer: &[u8]) -> Result<InboundEvent, Malformed> {
    const DATA_START: usize = 5;

    let status = OpStatus::from_byte(buffer[3]);
    if !status.is_success() {
        return Ok(InboundEvent::ReadResult { status, data: None });
    }

    if buffer.len() < MIN_READ_FRAME_LEN {
        return Err(Malformed::new(format!(
            "read result of {} bytes, need at least {MIN_READ_FRAME_LEN}",
            buffer.len()
        )));
    }

    let data_len = usize::from(buffer[4]);
    let data_end = DATA_START + data_len;
    if data_end > buffer.len() {
        return Err(Malformed::new(format!(
            "read data length {data_len} does not fit {} byte frame",
            buffer.len()
        )));
    }

    let data = (data_len > 0).then(|| bytes_to_hex(&buffer[DATA_START..data_end]));
    Ok(InboundEvent::ReadResult { status, data })
}
