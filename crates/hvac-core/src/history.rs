//! Bounded per-zone reading history.

use std::collections::{HashMap, VecDeque};

use hvac_types::SensorReading;

/// Maximum samples kept per zone (30 minutes at 5 s cadence).
pub const HISTORY_CAPACITY: usize = 360;

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    reading: SensorReading,
    /// Arrival revision for live samples, `None` for seeded ones.
    live_rev: Option<u64>,
}

/// Fixed-capacity FIFO of readings for one zone, oldest first.
///
/// Samples are kept in insertion order. A seed from the REST history and the
/// live tail are concatenated as-is; timestamps are not deduplicated.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// A window holding at most `capacity` samples (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a live sample applied at arrival revision `rev`, evicting the
    /// oldest sample when full.
    pub fn push(&mut self, reading: SensorReading, rev: u64) {
        self.push_sample(Sample {
            reading,
            live_rev: Some(rev),
        });
    }

    fn push_sample(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Replace the contents with a bulk fetch issued at revision `issued_rev`.
    ///
    /// Live samples applied after `issued_rev` are not part of the fetch, so
    /// they are re-appended after the seed. If the seed is larger than the
    /// capacity only its newest samples are kept.
    pub fn seed(&mut self, readings: Vec<SensorReading>, issued_rev: u64) {
        let newer_live: Vec<Sample> = self
            .samples
            .drain(..)
            .filter(|s| s.live_rev.is_some_and(|rev| rev > issued_rev))
            .collect();

        let skip = readings.len().saturating_sub(self.capacity);
        for reading in readings.into_iter().skip(skip) {
            self.push_sample(Sample {
                reading,
                live_rev: None,
            });
        }
        for sample in newer_live {
            self.push_sample(sample);
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&SensorReading> {
        self.samples.back().map(|s| &s.reading)
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SensorReading> + '_ {
        self.samples.iter().map(|s| &s.reading)
    }

    /// Owned copy of the samples, oldest first.
    pub fn to_vec(&self) -> Vec<SensorReading> {
        self.iter().cloned().collect()
    }
}

/// History windows keyed by zone id.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindows {
    windows: HashMap<String, HistoryWindow>,
}

impl HistoryWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, zone_id: &str, reading: SensorReading, rev: u64) {
        self.window_mut(zone_id).push(reading, rev);
    }

    pub fn seed(&mut self, zone_id: &str, readings: Vec<SensorReading>, issued_rev: u64) {
        self.window_mut(zone_id).seed(readings, issued_rev);
    }

    pub fn get(&self, zone_id: &str) -> Option<&HistoryWindow> {
        self.windows.get(zone_id)
    }

    fn window_mut(&mut self, zone_id: &str) -> &mut HistoryWindow {
        self.windows.entry(zone_id.to_string()).or_default()
    }
}
