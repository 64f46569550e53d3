//! GATT UUIDs known to carry the reader protocol, and textual canonicalization.

/// Suffix of the Bluetooth base UUID that short (16-bit) UUIDs expand into.
const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Standard RFID reader service.
pub const RFID_SERVICE: &str = "0000fff0-0000-1000-8000-00805f9b34fb";
/// Standard RFID reader data characteristic.
pub const RFID_CHAR: &str = "0000fff1-0000-1000-8000-00805f9b34fb";
/// Alternate data characteristic on the standard RFID service.
pub const RFID_CHAR_ALT: &str = "0000fff2-0000-1000-8000-00805f9b34fb";

/// Nordic UART Service.
pub const NUS_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
/// Nordic UART TX (write) characteristic.
pub const NUS_TX_CHAR: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
/// Nordic UART RX (notify) characteristic.
pub const NUS_RX_CHAR: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Canonical pair tried first on every negotiation.
pub const DEFAULT_SERVICE: &str = RFID_SERVICE;
pub const DEFAULT_CHAR: &str = RFID_CHAR;

/// Expand a UUID to its 36-character form.
///
/// - `xxxx` becomes `0000xxxx-0000-1000-8000-00805f9b34fb`
/// - `0000xxxx` expands the same way from its last four characters
/// - a hyphenated 36-character UUID, or anything else, is returned unchanged
pub fn normalize(uuid: &str) -> String {
    if uuid.len() == 36 && uuid.contains('-') {
        return uuid.to_string();
    }

    match uuid.len() {
        4 => format!("0000{uuid}{BASE_UUID_SUFFIX}"),
        8 => match uuid.get(4..) {
            Some(short) => format!("0000{short}{BASE_UUID_SUFFIX}"),
            None => uuid.to_string(),
        },
        _ => uuid.to_string(),
    }
}

/// Compare two UUIDs after canonicalization, ignoring case.
pub fn same_uuid(a: &str, b: &str) -> bool {
    normalize(a).eq_ignore_ascii_case(&normalize(b))
}
