//! One MIME part: headers, wire-ready payload, related sub-parts.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::encoding::{self, QpFlags};
use crate::error::{Error, Result};
use crate::header::HeaderMap;
use crate::sniff;

// Characters in this set are escaped when a filename lands in a
// Content-Disposition header. Everything outside the unreserved set of
// RFC 3986 section 2.3 gets encoded.
const FILENAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One part of a MIME message.
///
/// A part owns its headers and its payload. The payload is stored exactly
/// as it will appear on the wire, so a part meant to be transferred as
/// quoted-printable or base64 must hold the already-encoded bytes (see
/// [`Attachment::set_data_quoted_printable`]).
///
/// A part can carry one level of related sub-parts, as used by an HTML body
/// that references inline images. Related parts cannot nest any deeper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    headers: HeaderMap,
    data: Vec<u8>,
    is_sub_attachment: bool,
    sub_attachments: Vec<Attachment>,
}

impl Attachment {
    /// Create an empty part.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            data: Vec::new(),
            is_sub_attachment: false,
            sub_attachments: Vec::new(),
        }
    }

    /// Store the payload and stamp its `Content-Type`.
    ///
    /// The bytes are kept verbatim. When `mime_type` is empty the type is
    /// derived from the content instead (see [`crate::sniff::mime_type_of`]).
    pub fn set_data(&mut self, data: Vec<u8>, mime_type: &str) {
        self.data = data;
        let mime_type = if mime_type.is_empty() {
            sniff::mime_type_of(&self.data)
        } else {
            mime_type
        };
        self.headers.set_raw("Content-Type", mime_type);
    }

    /// Encode the payload as quoted-printable and store it.
    ///
    /// On top of what [`Attachment::set_data`] stamps, this also sets
    /// `Content-Transfer-Encoding: quoted-printable` so the two headers
    /// cannot drift apart.
    pub fn set_data_quoted_printable(&mut self, data: &[u8], mime_type: &str, flags: QpFlags) {
        let encoded = encoding::encode_quoted_printable(data, flags);
        self.set_data(encoded.into_bytes(), mime_type);
        self.headers
            .set_raw("Content-Transfer-Encoding", "quoted-printable");
    }

    /// Synthesize the `Content-Disposition` header.
    ///
    /// The resulting value is `<type>; filename=<escaped basename>;
    /// modification-date="<RFC 2822 date>";`. Only the basename of
    /// `filename` is emitted, and the filename parameter is left out
    /// entirely when the basename is empty. A `modification_date` of `None`
    /// means now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `attachment_type` is empty.
    pub fn set_content_disposition(
        &mut self,
        filename: &str,
        modification_date: Option<DateTime<Utc>>,
        attachment_type: &str,
    ) -> Result<()> {
        if attachment_type.is_empty() {
            return Err(Error::InvalidParameter(
                "the attachment type in a Content-Disposition cannot be empty".to_string(),
            ));
        }

        let mut value = format!("{attachment_type};");

        let basename = Path::new(filename)
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("");
        if !basename.is_empty() {
            let escaped = utf8_percent_encode(basename, FILENAME_SET);
            let _ = write!(value, " filename={escaped};");
        }

        let date = modification_date.unwrap_or_else(Utc::now);
        let _ = write!(value, " modification-date=\"{}\";", date.to_rfc2822());

        self.headers.set_raw("Content-Disposition", &value);
        Ok(())
    }

    /// Add a header to this part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.set(name, value)
    }

    /// Remove a header, silently ignoring absent or empty names.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Check whether a header is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn has_header(&self, name: &str) -> Result<bool> {
        self.headers.has(name)
    }

    /// Read a header value, or `""` when the header is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn get_header(&self, name: &str) -> Result<&str> {
        self.headers.get(name)
    }

    /// All headers of this part.
    #[must_use]
    pub const fn all_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The wire-ready payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether this part lives inside another part's related list.
    #[must_use]
    pub const fn is_sub_attachment(&self) -> bool {
        self.is_sub_attachment
    }

    /// Attach a copy of `related` as a sub-part of this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyLevels`] if this part is itself a related
    /// sub-part, or if `related` already holds sub-parts of its own. Related
    /// parts only ever go one level deep.
    pub fn add_related(&mut self, related: &Attachment) -> Result<()> {
        if self.is_sub_attachment {
            return Err(Error::TooManyLevels(
                "a related sub-attachment cannot hold more related sub-attachments".to_string(),
            ));
        }
        if !related.sub_attachments.is_empty() {
            return Err(Error::TooManyLevels(
                "an attachment with its own related sub-attachments cannot become one".to_string(),
            ));
        }

        let mut copy = related.clone();
        copy.is_sub_attachment = true;
        self.sub_attachments.push(copy);
        Ok(())
    }

    /// Number of related sub-parts.
    #[must_use]
    pub fn related_count(&self) -> usize {
        self.sub_attachments.len()
    }

    /// Access a related sub-part by index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `index` is past the end.
    pub fn related(&self, index: usize) -> Result<&Attachment> {
        self.sub_attachments.get(index).ok_or_else(|| {
            Error::OutOfRange(format!(
                "related attachment index {index} out of range (count: {})",
                self.sub_attachments.len()
            ))
        })
    }

    /// All related sub-parts, for archiving.
    pub(crate) fn related_parts(&self) -> &[Attachment] {
        &self.sub_attachments
    }

    /// Header map access for the archive decoder.
    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Payload write access for the archive decoder, bypassing the type
    /// classification of [`Attachment::set_data`].
    pub(crate) fn replace_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn test_set_data_keeps_explicit_type() {
        let mut part = Attachment::new();
        part.set_data(b"<html></html>".to_vec(), "text/html; charset=\"utf-8\"");
        assert_eq!(
            part.get_header("Content-Type").unwrap(),
            "text/html; charset=\"utf-8\""
        );
        assert_eq!(part.data(), b"<html></html>");
    }

    #[test]
    fn test_set_data_classifies_when_type_empty() {
        let mut part = Attachment::new();
        part.set_data(b"%PDF-1.4 stuff".to_vec(), "");
        assert_eq!(part.get_header("Content-Type").unwrap(), "application/pdf");
    }

    #[test]
    fn test_set_data_quoted_printable_sets_both_headers() {
        let mut part = Attachment::new();
        part.set_data_quoted_printable("héllo\n".as_bytes(), "text/plain", QpFlags::text());
        assert_eq!(part.data(), b"h=C3=A9llo\n");
        assert_eq!(part.get_header("Content-Type").unwrap(), "text/plain");
        assert_eq!(
            part.get_header("Content-Transfer-Encoding").unwrap(),
            "quoted-printable"
        );
    }

    #[test]
    fn test_content_disposition_full_value() {
        let mut part = Attachment::new();
        let date = chrono::Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        part.set_content_disposition("/tmp/files/report.pdf", Some(date), "attachment")
            .unwrap();
        assert_eq!(
            part.get_header("Content-Disposition").unwrap(),
            "attachment; filename=report.pdf; modification-date=\"Wed, 5 Apr 2023 06:07:08 +0000\";"
        );
    }

    #[test]
    fn test_content_disposition_escapes_filename() {
        let mut part = Attachment::new();
        let date = chrono::Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        part.set_content_disposition("the report (final).pdf", Some(date), "attachment")
            .unwrap();
        let value = part.get_header("Content-Disposition").unwrap().to_string();
        assert!(value.contains("filename=the%20report%20%28final%29.pdf;"));
    }

    #[test]
    fn test_content_disposition_without_basename() {
        let mut part = Attachment::new();
        let date = chrono::Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        part.set_content_disposition("", Some(date), "inline").unwrap();
        assert_eq!(
            part.get_header("Content-Disposition").unwrap(),
            "inline; modification-date=\"Wed, 5 Apr 2023 06:07:08 +0000\";"
        );
    }

    #[test]
    fn test_content_disposition_requires_type() {
        let mut part = Attachment::new();
        let result = part.set_content_disposition("report.pdf", None, "");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(!part.has_header("Content-Disposition").unwrap());
    }

    #[test]
    fn test_add_related_copies_and_flags() {
        let mut body = Attachment::new();
        let mut image = Attachment::new();
        image.set_data(b"\x89PNG\r\n\x1a\nxxxx".to_vec(), "");
        body.add_related(&image).unwrap();

        assert!(!image.is_sub_attachment());
        assert_eq!(body.related_count(), 1);
        let stored = body.related(0).unwrap();
        assert!(stored.is_sub_attachment());
        assert_eq!(stored.get_header("Content-Type").unwrap(), "image/png");
    }

    #[test]
    fn test_add_related_rejects_deep_nesting() {
        let mut body = Attachment::new();
        let image = Attachment::new();
        body.add_related(&image).unwrap();

        let mut other = Attachment::new();
        assert!(matches!(
            other.add_related(&body),
            Err(Error::TooManyLevels(_))
        ));

        let sub = body.related(0).unwrap().clone();
        let mut as_parent = sub;
        assert!(matches!(
            as_parent.add_related(&image),
            Err(Error::TooManyLevels(_))
        ));
    }

    #[test]
    fn test_related_out_of_range() {
        let part = Attachment::new();
        assert!(matches!(part.related(0), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let mut a = Attachment::new();
        a.set_data(b"text".to_vec(), "text/plain");
        let mut b = a.clone();
        assert_eq!(a, b);

        b.add_header("Content-Description", "something").unwrap();
        assert_ne!(a, b);
    }
}
