//! Bounded activity feed.

use std::collections::VecDeque;

use hvac_types::ActivityEvent;

/// Maximum entries kept in the feed.
pub const ACTIVITY_CAPACITY: usize = 50;

/// Reverse-chronological log of activity entries.
///
/// New entries go to the front; once the log is full the oldest entry falls
/// off the back. Repeated events are recorded individually.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: ActivityEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> + '_ {
        self.entries.iter()
    }

    /// Up to `n` newest entries.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ActivityEvent> + '_ {
        self.entries.iter().take(n)
    }

    pub fn to_vec(&self) -> Vec<ActivityEvent> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use hvac_types::{ActivityCategory, Severity};
    use time::OffsetDateTime;

    use super::*;

    fn entry(n: usize) -> ActivityEvent {
        ActivityEvent {
            id: format!("evt-{n}"),
            category: ActivityCategory::DeviceStatus,
            message: format!("fcu-{n} went offline"),
            timestamp: OffsetDateTime::UNIX_EPOCH,
            severity: Severity::Warning,
        }
    }

    #[test]
    fn test_newest_first() {
        let mut log = ActivityLog::new();
        log.push(entry(1));
        log.push(entry(2));

        let ids: Vec<_> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["evt-2", "evt-1"]);
    }

    #[test]
    fn test_fifty_first_evicts_earliest() {
        let mut log = ActivityLog::new();
        for n in 1..=51 {
            log.push(entry(n));
        }

        assert_eq!(log.len(), ACTIVITY_CAPACITY);
        assert_eq!(log.iter().next().unwrap().id, "evt-51");
        assert!(log.iter().all(|e| e.id != "evt-1"));
        assert_eq!(log.iter().last().unwrap().id, "evt-2");
    }

    #[test]
    fn test_duplicates_kept() {
        let mut log = ActivityLog::new();
        let mut e = entry(1);
        log.push(e.clone());
        e.id = "evt-2".to_string();
        log.push(e);

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_recent() {
        let mut log = ActivityLog::new();
        for n in 1..=20 {
            log.push(entry(n));
        }

        let recent: Vec<_> = log.recent(15).collect();
        assert_eq!(recent.len(), 15);
        assert_eq!(recent[0].id, "evt-20");
        assert_eq!(log.recent(100).count(), 20);
    }
}
