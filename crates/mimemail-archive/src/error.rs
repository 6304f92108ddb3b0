//! Error types for record stream decoding.

/// Result type alias for record stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Record stream decode errors.
///
/// Encoding cannot fail; all variants are produced by [`crate::Reader`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stream ended in the middle of a record.
    #[error("Truncated record stream at offset {offset}: {needed} more bytes needed")]
    Truncated {
        /// Byte offset at which the shortfall was detected.
        offset: usize,
        /// Number of missing bytes.
        needed: usize,
    },

    /// A record declared a zero-length tag.
    #[error("Empty record tag at offset {offset}")]
    EmptyTag {
        /// Byte offset of the offending record.
        offset: usize,
    },

    /// A record declared a payload kind this reader does not know.
    #[error("Unknown payload kind {kind} at offset {offset}")]
    UnknownKind {
        /// The unrecognized kind byte.
        kind: u8,
        /// Byte offset of the kind byte.
        offset: usize,
    },
}
