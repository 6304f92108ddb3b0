//! Error types for mail composition.

/// Result type alias for mail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Mail composition error types.
///
/// Subprocess failures are deliberately not represented here: the text
/// extractor falls back to an empty derivation and the MTA failure is the
/// `false` return of [`crate::Email::send`], both with a log line.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter failed validation: an empty header or parameter name, an
    /// unparseable address in an address-bearing field, a wrong address
    /// cardinality, or an empty disposition type.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A field required for sending is absent (`From`, `To`, or the body).
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Attempt to nest related parts beyond one level.
    #[error("Too many levels: {0}")]
    TooManyLevels(String),

    /// Indexed access past the end of a part list.
    #[error("Out of range: {0}")]
    OutOfRange(String),
}
