//! Per-zone latest reading and prediction.
//!
//! Ordering between the push channel and REST refreshes is decided by
//! arrival, not by the timestamps the server embeds. The engine ticks an
//! [`ArrivalClock`] for every input it applies. Live writes remember the
//! revision they were applied at; a refresh remembers the revision at which
//! it was issued and may only overwrite values that are not newer than that.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hvac_types::{SensorReading, ZonePrediction};

/// Monotonic count of inputs applied by the engine.
///
/// Cloning shares the counter. Only the engine ticks it; refresh tasks read
/// it to stamp the revision at which they issued their requests.
#[derive(Debug, Clone, Default)]
pub struct ArrivalClock {
    rev: Arc<AtomicU64>,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision of the most recently applied input.
    pub fn current(&self) -> u64 {
        self.rev.load(Ordering::Acquire)
    }

    /// Advance to the next revision and return it.
    pub fn tick(&self) -> u64 {
        self.rev.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Latest state of one zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneEntry {
    pub reading: Option<SensorReading>,
    /// Revision at which `reading` was written.
    pub reading_rev: u64,
    pub prediction: Option<ZonePrediction>,
    /// Revision at which `prediction` was written.
    pub prediction_rev: u64,
}

/// Map of zone id to its latest reading and prediction.
///
/// Entries may exist for zones the engine has not been told about yet; they
/// are kept so nothing is lost once the zone list catches up.
#[derive(Debug, Clone, Default)]
pub struct ZoneStateStore {
    zones: HashMap<String, ZoneEntry>,
}

impl ZoneStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, zone_id: &str) -> Option<&ZoneEntry> {
        self.zones.get(zone_id)
    }

    pub fn reading(&self, zone_id: &str) -> Option<&SensorReading> {
        self.get(zone_id).and_then(|e| e.reading.as_ref())
    }

    pub fn prediction(&self, zone_id: &str) -> Option<&ZonePrediction> {
        self.get(zone_id).and_then(|e| e.prediction.as_ref())
    }

    /// Replace the zone's current reading.
    pub fn set_reading(&mut self, zone_id: &str, reading: SensorReading, rev: u64) {
        let entry = self.entry_mut(zone_id);
        entry.reading = Some(reading);
        entry.reading_rev = rev;
    }

    /// Replace the zone's prediction.
    pub fn set_prediction(&mut self, prediction: ZonePrediction, rev: u64) {
        let entry = self.entry_mut(&prediction.zone_id);
        entry.prediction = Some(prediction);
        entry.prediction_rev = rev;
    }

    /// Apply a refreshed reading unless a write newer than `issued_rev`
    /// already landed. Returns whether it was applied.
    pub fn refresh_reading(
        &mut self,
        zone_id: &str,
        reading: SensorReading,
        issued_rev: u64,
        rev: u64,
    ) -> bool {
        if self.get(zone_id).is_some_and(|e| e.reading_rev > issued_rev) {
            return false;
        }
        self.set_reading(zone_id, reading, rev);
        true
    }

    /// Apply a refreshed prediction unless a write newer than `issued_rev`
    /// already landed. Returns whether it was applied.
    pub fn refresh_prediction(
        &mut self,
        prediction: ZonePrediction,
        issued_rev: u64,
        rev: u64,
    ) -> bool {
        if self
            .get(&prediction.zone_id)
            .is_some_and(|e| e.prediction_rev > issued_rev)
        {
            return false;
        }
        self.set_prediction(prediction, rev);
        true
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.zones.keys().map(String::as_str)
    }

    fn entry_mut(&mut self, zone_id: &str) -> &mut ZoneEntry {
        self.zones.entry(zone_id.to_string()).or_default()
    }
}
