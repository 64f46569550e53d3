//! Inventoried tag record.

use crate::frame::TagReport;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the tag table, keyed by EPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    /// Uppercase hex, unique within a table.
    pub epc: String,
    pub tid: Option<String>,
    /// RSSI (dBm) of the most recent report, absent if that report had none.
    pub rssi: Option<i16>,
    /// Number of reports seen for this EPC.
    pub count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl TagRecord {
    pub(crate) fn from_report(report: &TagReport, now: DateTime<Utc>) -> Self {
        Self {
            epc: report.epc.to_ascii_uppercase(),
            tid: report.tid.clone(),
            rssi: report.rssi,
            count: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Fold a repeat report into this record.
    pub(crate) fn absorb(&mut self, report: &TagReport, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        self.rssi = report.rssi;
        self.last_seen = now;
    }
}
