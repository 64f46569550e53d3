//! Tag table built from the inventory report stream.

use crate::frame::TagReport;
use crate::models::TagRecord;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deduplicates tag reports by EPC, in first-seen order.
#[derive(Debug, Default)]
pub struct TagAggregator {
    records: Vec<TagRecord>,
    index: HashMap<String, usize>,
    started_at: Option<Instant>,
}

impl TagAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record or bump the count of an existing one.
    pub fn update(&mut self, report: &TagReport) -> &TagRecord {
        let now = Utc::now();
        let epc = report.epc.to_ascii_uppercase();

        let slot = match self.index.get(&epc) {
            Some(&slot) => {
                self.records[slot].absorb(report, now);
                slot
            }
            None => {
                let slot = self.records.len();
                self.records.push(TagRecord::from_report(report, now));
                self.index.insert(epc, slot);
                slot
            }
        };

        &self.records[slot]
    }

    /// Drop every record and the elapsed-time baseline.
    pub fn reset(&mut self) {
        self.records.clear();
        self.index.clear();
        self.started_at = None;
    }

    /// Sum of all report counts.
    pub fn total_count(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.count)).sum()
    }

    pub fn unique_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[TagRecord] {
        &self.records
    }

    pub fn get(&self, epc: &str) -> Option<&TagRecord> {
        self.index
            .get(&epc.to_ascii_uppercase())
            .map(|&slot| &self.records[slot])
    }

    /// Start (or restart) the elapsed-time clock.
    pub fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}
