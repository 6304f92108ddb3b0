//! # mimemail
//!
//! MIME email composition with sendmail delivery and an archival form.
//!
//! A message is a header map plus an ordered list of parts; the first part
//! is the body, every further part an attachment. Sending derives a
//! plain-text alternative for an HTML body, renders the full RFC 5322
//! stream and pipes it to the local mailer. Messages also serialize to a
//! compact record stream so they can be queued and reloaded later.
//!
//! ## Features
//!
//! - **Headers**: Case-insensitive header map with RFC 5322 address
//!   validation on address-bearing fields
//! - **Attachments**: MIME type sniffing, `Content-Disposition` synthesis,
//!   one level of related sub-parts
//! - **Rendering**: `multipart/mixed` and nested `multipart/alternative`
//!   generation with quoted-printable encoding
//! - **Delivery**: Plain-text derivation through `html2text`, delivery
//!   through `sendmail`, both injectable for tests
//! - **Archival**: Tagged record serialization that tolerates unknown
//!   future records
//!
//! ## Quick Start
//!
//! ### Building and Sending
//!
//! ```ignore
//! use mimemail::{Attachment, Email, Priority};
//!
//! let mut email = Email::new();
//! email.set_from("Alexis <alexis@example.com>")?;
//! email.set_to("contact@example.com")?;
//! email.set_subject("Monthly report");
//! email.set_priority(Priority::High);
//!
//! let mut body = Attachment::new();
//! body.set_data(b"<p>The report is attached.</p>".to_vec(), "text/html");
//! email.set_body_attachment(&body);
//!
//! let accepted = email.send()?;
//! ```
//!
//! ### Attachments
//!
//! ```ignore
//! use mimemail::Attachment;
//!
//! let mut report = Attachment::new();
//! // an empty MIME type sniffs the content
//! report.set_data(std::fs::read("report.pdf")?, "");
//! report.set_content_disposition("report.pdf", None, "attachment")?;
//! email.add_attachment(&report);
//! ```
//!
//! ### Archiving
//!
//! ```ignore
//! use mimemail::Email;
//!
//! let bytes = email.serialize();
//! // later, possibly in another process
//! let restored = Email::deserialize(&bytes);
//! assert_eq!(restored, email);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod archive;
mod attachment;
mod email;
mod error;
mod header;
mod render;
mod send;
mod sniff;

pub mod address;
pub mod encoding;

pub use attachment::Attachment;
pub use email::{Email, Priority};
pub use error::{Error, Result};
pub use header::HeaderMap;
pub use send::{Html2Text, Sendmail, TextExtractor, Transport};
pub use sniff::mime_type_of;
