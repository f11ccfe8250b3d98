//! Activity entry identifiers.
//!
//! Every activity entry gets an id from an [`EventIdGenerator`] owned by the
//! engine. [`MonotonicIds`] is the default and never repeats within one
//! engine. [`UuidIds`] produces random v4 UUIDs. [`TimeRandomIds`] produces
//! `{millis}-{random}` ids; two entries created in the same millisecond can
//! collide with small probability, so it only exists for consumers that
//! depend on that id shape.

use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;
use time::OffsetDateTime;

/// Source of activity entry ids.
pub trait EventIdGenerator: Send + 'static {
    /// Produce the next id.
    fn next_id(&mut self) -> String;
}

/// Sequential ids: `evt-1`, `evt-2`, ...
#[derive(Debug, Default, Clone)]
pub struct MonotonicIds {
    next: u64,
}

impl MonotonicIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventIdGenerator for MonotonicIds {
    fn next_id(&mut self) -> String {
        self.next += 1;
        format!("evt-{}", self.next)
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl EventIdGenerator for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Wall-clock milliseconds plus a short random suffix.
///
/// Uniqueness is probabilistic: ids minted in the same millisecond share a
/// prefix and rely on the 9-character suffix to differ.
#[derive(Default, Clone, Copy)]
pub struct TimeRandomIds;

const SUFFIX_LEN: usize = 9;

impl EventIdGenerator for TimeRandomIds {
    fn next_id(&mut self) -> String {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        format!("{millis}-{suffix}")
    }
}

impl fmt::Debug for TimeRandomIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimeRandomIds (probabilistic)")
    }
}

impl<G: EventIdGenerator + ?Sized> EventIdGenerator for Box<G> {
    fn next_id(&mut self) -> String {
        (**self).next_id()
    }
}
