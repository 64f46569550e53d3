//! Plain data records for inventoried tags and discovered readers.

pub mod device;
pub mod tag;

pub use device::{DeviceEntry, SignalStrength, sort_by_signal};
pub use tag::TagRecord;
