//! Archival encoding of messages.
//!
//! A message can be serialized to a private tagged-record stream, stored,
//! and deserialized later to be sent as if it had just been built. The
//! stream format itself lives in the `mimemail-archive` crate; this module
//! maps the [`Email`] and [`Attachment`] models onto it.
//!
//! Decoding never fails outright. Unknown tags are logged and skipped so
//! that streams written by newer versions still load, and a truncated
//! stream yields whatever fields were decoded before the damage.

use mimemail_archive::{Field, Reader, Writer};
use tracing::warn;

use crate::attachment::Attachment;
use crate::email::Email;

/// Major version of the archive vocabulary; breaking changes bump it.
const ARCHIVE_MAJOR_VERSION: u32 = 1;

/// Minor version of the archive vocabulary; additions bump it.
const ARCHIVE_MINOR_VERSION: u32 = 1;

impl Email {
    /// Serialize the message to the archival stream.
    ///
    /// Everything except `created_at` is archived; see
    /// [`Email::deserialize`] for the way back.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.string_field(
            "version",
            &format!("{ARCHIVE_MAJOR_VERSION}.{ARCHIVE_MINOR_VERSION}"),
        );
        writer.bool_field("branding", self.branding());
        writer.string_field_if_not_empty("cumulative", self.cumulative());
        writer.string_field("site_key", self.site_key());
        writer.string_field("email_path", self.email_path());
        writer.string_field("email_key", self.email_key());
        for (name, value) in self.all_headers().iter_folded() {
            writer.keyed_field("header", name, value);
        }
        for part in self.parts() {
            writer.nested("attachment", |nested| part.write_records(nested));
        }
        for (name, value) in self.parameters() {
            writer.keyed_field("parameter", name, value);
        }
        writer.into_bytes()
    }

    /// Deserialize a message from the archival stream.
    ///
    /// The returned message carries a fresh `created_at`. Damaged or
    /// unfamiliar records are logged and skipped rather than failing the
    /// whole load.
    #[must_use]
    pub fn deserialize(data: &[u8]) -> Self {
        let mut email = Self::new();
        let mut reader = Reader::new(data);
        loop {
            match reader.next_field() {
                Ok(Some(field)) => email.apply_record(&field),
                Ok(None) => break,
                Err(error) => {
                    warn!("Damaged email archive stream, keeping fields read so far: {error}");
                    break;
                }
            }
        }
        email
    }

    fn apply_record(&mut self, field: &Field) {
        match field.tag.as_str() {
            "version" => check_version(field),
            "branding" => match field.value.as_bool() {
                Some(branding) => self.set_branding(branding),
                None => warn_type(field),
            },
            "cumulative" => match field.value.as_str() {
                Some(value) => self.set_cumulative(value),
                None => warn_type(field),
            },
            "site_key" => match field.value.as_str() {
                Some(value) => self.set_site_key(value),
                None => warn_type(field),
            },
            "email_path" => match field.value.as_str() {
                Some(value) => self.set_email_path(value),
                None => warn_type(field),
            },
            "email_key" => match field.value.as_str() {
                Some(value) => self.set_email_key(value),
                None => warn_type(field),
            },
            "header" => match (field.sub_tag.as_deref(), field.value.as_str()) {
                (Some(name), Some(value)) if !name.is_empty() => {
                    self.headers_mut().set_raw(name, value);
                }
                _ => warn_type(field),
            },
            "attachment" => match field.value.as_stream() {
                Some(stream) => self.add_attachment(&Attachment::read_records(stream)),
                None => warn_type(field),
            },
            "parameter" => match (field.sub_tag.as_deref(), field.value.as_str()) {
                (Some(name), Some(value)) if !name.is_empty() => {
                    if let Err(error) = self.add_parameter(name, value) {
                        warn!("Skipping archived parameter: {error}");
                    }
                }
                _ => warn_type(field),
            },
            _ => warn!("Skipping unknown email archive tag {:?}", field.tag),
        }
    }
}

impl Attachment {
    /// Write this part's records into an open stream.
    pub(crate) fn write_records(&self, writer: &mut Writer) {
        for (name, value) in self.all_headers().iter_folded() {
            writer.keyed_field("header", name, value);
        }
        for sub in self.related_parts() {
            writer.nested("attachment", |nested| sub.write_records(nested));
        }
        writer.bytes_field("data", self.data());
    }

    /// Rebuild a part from a nested record stream.
    pub(crate) fn read_records(data: &[u8]) -> Self {
        let mut part = Self::new();
        let mut reader = Reader::new(data);
        loop {
            match reader.next_field() {
                Ok(Some(field)) => part.apply_record(&field),
                Ok(None) => break,
                Err(error) => {
                    warn!("Damaged attachment archive stream, keeping fields read so far: {error}");
                    break;
                }
            }
        }
        part
    }

    fn apply_record(&mut self, field: &Field) {
        match field.tag.as_str() {
            "header" => match (field.sub_tag.as_deref(), field.value.as_str()) {
                (Some(name), Some(value)) if !name.is_empty() => {
                    self.headers_mut().set_raw(name, value);
                }
                _ => warn_type(field),
            },
            "attachment" => match field.value.as_stream() {
                Some(stream) => {
                    let child = Self::read_records(stream);
                    if let Err(error) = self.add_related(&child) {
                        warn!("Skipping archived related attachment: {error}");
                    }
                }
                None => warn_type(field),
            },
            "data" => match field.value.as_bytes() {
                Some(bytes) => self.replace_data(bytes.to_vec()),
                None => warn_type(field),
            },
            _ => warn!("Skipping unknown attachment archive tag {:?}", field.tag),
        }
    }
}

/// Warn about a stream whose major version is not ours, then carry on.
fn check_version(field: &Field) {
    let Some(version) = field.value.as_str() else {
        warn_type(field);
        return;
    };
    let major = version.split('.').next().unwrap_or("");
    if major.parse::<u32>() != Ok(ARCHIVE_MAJOR_VERSION) {
        warn!(
            "Archived email version {version} differs from \
             {ARCHIVE_MAJOR_VERSION}.{ARCHIVE_MINOR_VERSION}, decoding best effort"
        );
    }
}

/// Warn about a record whose payload does not fit its tag.
fn warn_type(field: &Field) {
    warn!("Archive record {:?} has an unexpected payload, skipping", field.tag);
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
    use proptest::prelude::*;

    use super::*;
    use crate::encoding::QpFlags;

    fn sample_email() -> Email {
        let mut email = Email::new();
        email.set_branding(false);
        email.set_cumulative("daily-report");
        email.set_site_key("https://example.com/");
        email.set_email_path("admin/settings/alerts");
        email.set_email_key("a1b2c3d4");
        email.set_from("Ops <ops@example.com>").unwrap();
        email.set_to("admin@example.com").unwrap();
        email.set_subject("Disk almost full");
        email.add_parameter("retries", "3").unwrap();
        email.add_parameter("Retries", "overridden").unwrap();

        let mut body = Attachment::new();
        body.set_data_quoted_printable(
            b"<html><body>93% used</body></html>",
            "text/html; charset=\"utf-8\"",
            QpFlags::text(),
        );
        let mut gauge = Attachment::new();
        gauge.set_data(b"\x89PNG\r\n\x1a\n\x00\xFF\xFEgauge".to_vec(), "");
        body.add_related(&gauge).unwrap();
        email.set_body_attachment(&body);

        let mut report = Attachment::new();
        report.set_data(b"%PDF-1.4 report".to_vec(), "");
        report
            .set_content_disposition("report.pdf", None, "attachment")
            .unwrap();
        email.add_attachment(&report);

        email
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let email = sample_email();
        let stream = email.serialize();

        std::thread::sleep(std::time::Duration::from_millis(2));
        let reloaded = Email::deserialize(&stream);

        assert_eq!(email, reloaded);
        assert_ne!(email.created_at(), reloaded.created_at());
        assert!(reloaded.attachment(0).unwrap().related(0).unwrap().is_sub_attachment());
        assert_eq!(reloaded.attachment(1).unwrap().data(), b"%PDF-1.4 report");
        assert_eq!(reloaded.parameter("retries").unwrap(), "3");
        assert_eq!(reloaded.parameter("Retries").unwrap(), "overridden");
    }

    #[test]
    fn test_stream_starts_with_version_record() {
        let email = Email::new();
        let stream = email.serialize();
        // tag_len, "version", no sub_tag, byte payload "1.1"
        let mut expected = vec![7u8];
        expected.extend_from_slice(b"version");
        expected.extend_from_slice(&[0, 0, 1, 3, 0, 0, 0]);
        expected.extend_from_slice(b"1.1");
        assert!(stream.starts_with(&expected));
    }

    #[test]
    fn test_empty_cumulative_not_archived() {
        let email = Email::new();
        let stream = email.serialize();
        let mut reader = Reader::new(&stream);
        let mut tags = Vec::new();
        while let Ok(Some(field)) = reader.next_field() {
            tags.push(field.tag);
        }
        assert!(!tags.contains(&"cumulative".to_string()));
        assert!(tags.contains(&"site_key".to_string()));
    }

    #[test]
    fn test_unknown_tag_skipped() {
        let mut writer = Writer::new();
        writer.string_field("flavor", "vanilla");
        writer.string_field("site_key", "https://example.com/");
        let email = Email::deserialize(&writer.into_bytes());
        assert_eq!(email.site_key(), "https://example.com/");
    }

    #[test]
    fn test_future_version_still_decodes() {
        let mut writer = Writer::new();
        writer.string_field("version", "9.0");
        writer.string_field("email_key", "k");
        let email = Email::deserialize(&writer.into_bytes());
        assert_eq!(email.email_key(), "k");
    }

    #[test]
    fn test_truncated_stream_keeps_leading_fields() {
        let email = sample_email();
        let stream = email.serialize();
        let cut = stream.len() - 4;
        let partial = Email::deserialize(stream.get(..cut).unwrap());
        assert_eq!(partial.site_key(), "https://example.com/");
        assert_eq!(partial.cumulative(), "daily-report");
    }

    #[test]
    fn test_parameter_without_name_skipped() {
        let mut writer = Writer::new();
        writer.keyed_field("parameter", "", "orphan");
        writer.keyed_field("parameter", "kept", "value");
        let email = Email::deserialize(&writer.into_bytes());
        assert_eq!(email.parameter("kept").unwrap(), "value");
        assert_eq!(email.parameters().count(), 1);
    }

    #[test]
    fn test_deserialize_empty_stream() {
        let email = Email::deserialize(&[]);
        assert_eq!(email, Email::new());
    }

    proptest! {
        #[test]
        fn test_round_trip_any_built_message(
            branding in any::<bool>(),
            subject in "[ -~]{1,40}",
            cumulative in "[a-z-]{0,12}",
            params in prop::collection::btree_map(
                "[A-Za-z][A-Za-z0-9_]{0,8}",
                "[ -~]{0,16}",
                0..4,
            ),
            payloads in prop::collection::vec(
                prop::collection::vec(any::<u8>(), 0..64),
                1..4,
            ),
        ) {
            let mut email = Email::new();
            email.set_branding(branding);
            email.set_subject(&subject);
            email.set_cumulative(&cumulative);
            for (name, value) in &params {
                email.add_parameter(name, value).unwrap();
            }
            for payload in &payloads {
                let mut part = Attachment::new();
                part.set_data(payload.clone(), "application/octet-stream");
                email.add_attachment(&part);
            }

            let reloaded = Email::deserialize(&email.serialize());
            prop_assert_eq!(reloaded, email);
        }
    }
}
