//! # mimemail-archive
//!
//! Length-prefixed tagged record streams for archiving mail messages.
//!
//! A stream is a concatenation of records. Each record is a tuple of an
//! ASCII tag, an optional sub-tag (used for map-valued tags such as header
//! fields), and a typed payload: a bool, a byte string, or a nested record
//! stream. All payloads are length-prefixed so a reader can skip records
//! whose tag it does not recognize, which makes the format forward
//! compatible.
//!
//! ## Wire format
//!
//! ```text
//! record := tag_len:u8      (must be >= 1)
//!           tag:[u8]        (tag_len bytes, ASCII)
//!           sub_len:u16 LE  (0 = no sub-tag)
//!           sub:[u8]        (sub_len bytes, ASCII)
//!           kind:u8         (0 = bool, 1 = bytes, 2 = nested stream)
//!           payload
//!
//! bool payload   := value:u8          (0 = false, anything else = true)
//! bytes payload  := len:u32 LE, data:[u8]
//! nested payload := len:u32 LE, records:[u8]   (no extra framing)
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use mimemail_archive::{Reader, Value, Writer};
//!
//! let mut w = Writer::new();
//! w.string_field("version", "1.1");
//! w.keyed_field("header", "subject", "Hello");
//! w.nested("attachment", |w| {
//!     w.bytes_field("data", b"payload");
//! });
//! let bytes = w.into_bytes();
//!
//! let mut r = Reader::new(&bytes);
//! while let Some(field) = r.next_field()? {
//!     match field.tag.as_str() {
//!         "version" => { /* ... */ }
//!         _ => { /* unknown tags are skippable */ }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{Field, Reader, Value};
pub use writer::Writer;

/// Payload kind marker for a bool record.
pub(crate) const KIND_BOOL: u8 = 0;

/// Payload kind marker for a byte-string record.
pub(crate) const KIND_BYTES: u8 = 1;

/// Payload kind marker for a nested record stream.
pub(crate) const KIND_STREAM: u8 = 2;
