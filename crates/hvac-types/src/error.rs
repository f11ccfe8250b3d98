//! Error types for parsing wire values in hvac-types.

use thiserror::Error;

/// Errors that can occur when parsing HVAC wire values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A string did not name any variant of the expected enumeration.
    #[error("Unknown {kind}: '{value}'")]
    UnknownVariant {
        /// Name of the enumeration being parsed (e.g. "trend").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A timestamp was not valid ISO-8601.
    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),
}

/// Result type alias using hvac-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
