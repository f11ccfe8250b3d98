//! Serde helpers for ISO-8601 timestamps.
//!
//! The HVAC API emits RFC 3339 timestamps, but a server running on a naive
//! clock omits the offset (`2024-05-01T12:00:00.123456`). Both forms are
//! accepted; offset-less values are taken as UTC. Serialization always
//! produces RFC 3339.
//!
//! ```
//! use hvac_types::timestamp;
//!
//! let with_offset = timestamp::parse("2024-05-01T12:00:00Z").unwrap();
//! let naive = timestamp::parse("2024-05-01T12:00:00").unwrap();
//! assert_eq!(with_offset, naive);
//! ```

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{ParseError, ParseResult};

/// Parse an ISO-8601 timestamp, assuming UTC when no offset is present.
pub fn parse(value: &str) -> ParseResult<OffsetDateTime> {
    let value = value.trim();

    if let Ok(ts) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(value, &Iso8601::DEFAULT) {
        return Ok(ts);
    }

    PrimitiveDateTime::parse(value, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| ParseError::InvalidTimestamp(value.to_string()))
}

/// Format a timestamp as RFC 3339.
pub fn format(ts: &OffsetDateTime) -> Option<String> {
    ts.format(&Rfc3339).ok()
}

pub fn serialize<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    let formatted = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

/// Same as the parent module, for `Option<OffsetDateTime>` fields.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => super::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse("2024-05-01T12:30:00Z").unwrap();
        assert_eq!(ts, datetime!(2024-05-01 12:30:00 UTC));
    }

    #[test]
    fn test_parse_with_offset() {
        let ts = parse("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(ts, datetime!(2024-05-01 12:30:00 UTC));
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let ts = parse("2024-05-01T12:30:00.250000").unwrap();
        assert_eq!(ts, datetime!(2024-05-01 12:30:00.25 UTC));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse("yesterday").unwrap_err();
        assert_eq!(err, ParseError::InvalidTimestamp("yesterday".to_string()));
    }

    #[test]
    fn test_format_is_rfc3339() {
        let formatted = format(&datetime!(2024-05-01 12:30:00 UTC)).unwrap();
        assert_eq!(formatted, "2024-05-01T12:30:00Z");
    }
}
