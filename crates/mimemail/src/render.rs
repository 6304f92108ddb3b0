//! Wire rendering of a message.
//!
//! Turns a message into the complete RFC 5322 byte stream handed to the
//! MTA: top-level header synthesis, shape selection (a bare body or
//! `multipart/mixed`), the nested `multipart/alternative` wrapping a derived
//! plain-text version next to an HTML body, filename propagation on
//! attachment headers, and the final dot line a sendmail pipe expects.
//!
//! Rendering is deterministic given the message, the derived plain text and
//! the boundary; only the synthesized `Date` header depends on the clock.

use std::fmt::Write as _;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

use crate::email::Email;
use crate::encoding::{self, QpFlags};
use crate::error::{Error, Result};
use crate::header::HeaderMap;

/// Fixed prefix of every generated multipart boundary. It starts with `=S`,
/// a sequence that cannot occur in quoted-printable output.
const BOUNDARY_PREFIX: &str = "=Snap.Websites=";

/// Number of random characters appended to the boundary prefix.
const BOUNDARY_SUFFIX_LEN: usize = 20;

/// Text shown by mail clients that cannot parse multipart messages.
const PREAMBLE: &str = "The following are various parts of a multipart email.\n\
    It is likely to include a text version (first part) that you should\n\
    be able to read as is.\n\
    It may be followed by HTML and then various attachments.\n\
    Please consider installing a MIME capable client to read this email.\n\n";

/// Identification written into the branding headers.
const BRANDING: &str = concat!(
    "mimemail v",
    env!("CARGO_PKG_VERSION"),
    " (https://snapwebsites.org/)"
);

/// Generate a fresh multipart boundary.
///
/// The boundary only needs to avoid colliding with payload bytes, so a
/// plain PRNG is plenty.
pub(crate) fn generate_boundary<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{BOUNDARY_PREFIX}{suffix}")
}

/// Render `email` to the byte stream fed to the MTA.
///
/// `plain_text` is the derived plain-text alternative (empty when there is
/// none) and `boundary` the outer multipart boundary; both come from
/// [`Email::send_with`]. The message headers are not modified: synthesized
/// headers only exist in the emitted stream.
///
/// # Errors
///
/// Returns [`Error::MissingParameter`] if the message has no parts.
pub(crate) fn compose(email: &Email, plain_text: &[u8], boundary: &str) -> Result<Vec<u8>> {
    if email.attachment_count() == 0 {
        return Err(Error::MissingParameter(
            "a message cannot be rendered without at least a body part".to_string(),
        ));
    }
    let body = email.attachment(0)?;
    let body_only = email.attachment_count() == 1 && plain_text.is_empty();

    // synthesized headers go into a local copy
    let mut headers = email.all_headers().clone();
    if body_only {
        // the lone part is emitted without its own header block, so its
        // type and encoding travel in the top-level headers
        let content_type = body.get_header("Content-Type")?;
        if !content_type.is_empty() {
            headers.set_raw("Content-Type", content_type);
        }
        if body.get_header("Content-Transfer-Encoding")? == "quoted-printable" {
            headers.set_raw("Content-Transfer-Encoding", "quoted-printable");
        }
    } else {
        headers.set_raw(
            "Content-Type",
            &format!("multipart/mixed;\n  boundary=\"{boundary}\""),
        );
        headers.set_raw("MIME-Version", "1.0");
    }
    if !headers.has("Date")? {
        headers.set_raw("Date", &Utc::now().to_rfc2822());
    }
    if !headers.has("Content-Language")? {
        headers.set_raw("Content-Language", "en-us");
    }

    let mut out = Vec::new();
    for (name, value) in headers.iter() {
        push_header(&mut out, name, value);
    }
    if email.branding() {
        push_header(&mut out, "X-Generated-By", BRANDING);
        push_header(&mut out, "X-Mailer", BRANDING);
    }
    out.push(b'\n');

    if body_only {
        push_payload(&mut out, body.data());
    } else {
        out.extend_from_slice(PREAMBLE.as_bytes());

        let mut next_part = 0;
        if !plain_text.is_empty() {
            // a text alternative exists, wrap it and the body in a nested
            // multipart/alternative
            let alternative = format!("{boundary}.msg");
            push_delimiter(&mut out, boundary);
            push_header(
                &mut out,
                "Content-Type",
                &format!("multipart/alternative;\n  boundary=\"{alternative}\""),
            );
            out.push(b'\n');

            push_delimiter(&mut out, &alternative);
            push_header(&mut out, "Content-Type", "text/plain; charset=\"utf-8\"");
            push_header(&mut out, "Content-Transfer-Encoding", "quoted-printable");
            push_header(&mut out, "Content-Description", "Mail message body");
            out.push(b'\n');
            let encoded = encoding::encode_quoted_printable(plain_text, QpFlags::text());
            push_payload(&mut out, encoded.as_bytes());

            push_delimiter(&mut out, &alternative);
            for (name, value) in body.all_headers().iter() {
                push_header(&mut out, name, value);
            }
            out.push(b'\n');
            push_payload(&mut out, body.data());
            out.extend_from_slice(format!("--{alternative}--\n\n").as_bytes());

            next_part = 1;
        }

        for index in next_part..email.attachment_count() {
            let part = email.attachment(index)?;
            push_delimiter(&mut out, boundary);
            let mut part_headers = part.all_headers().clone();
            propagate_filename(&mut part_headers);
            for (name, value) in part_headers.iter() {
                push_header(&mut out, name, value);
            }
            out.push(b'\n');
            push_payload(&mut out, part.data());
        }

        out.extend_from_slice(format!("--{boundary}--\n").as_bytes());
    }

    out.extend_from_slice(b"\n.\n");
    Ok(out)
}

/// Mirror a filename between `Content-Disposition` and `Content-Type`.
///
/// Many tools read the filename from the `name=` parameter of the type
/// even though its proper home is the disposition, so the two are kept in
/// agreement. The disposition's `filename=` wins and is forced into the
/// type's `name=`; only when the disposition has none is the type's `name=`
/// copied back. Nothing happens unless both headers are present.
fn propagate_filename(headers: &mut HeaderMap) {
    let disposition = headers.get("Content-Disposition").unwrap_or("").to_string();
    let content_type = headers.get("Content-Type").unwrap_or("").to_string();
    if disposition.is_empty() || content_type.is_empty() {
        return;
    }

    let (disposition_main, mut disposition_params) = split_parameters(&disposition);
    let (type_main, mut type_params) = split_parameters(&content_type);

    if let Some(filename) = find_parameter(&disposition_params, "filename") {
        let filename = filename.to_string();
        set_parameter(&mut type_params, "name", &filename);
        headers.set_raw("Content-Type", &join_parameters(&type_main, &type_params));
    } else if let Some(name) = find_parameter(&type_params, "name") {
        let name = name.to_string();
        set_parameter(&mut disposition_params, "filename", &name);
        headers.set_raw(
            "Content-Disposition",
            &join_parameters(&disposition_main, &disposition_params),
        );
    }
}

/// Append one `Name: value` header line.
fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
}

/// Append one part delimiter line.
fn push_delimiter(out: &mut Vec<u8>, boundary: &str) {
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundary.as_bytes());
    out.push(b'\n');
}

/// Append a payload, making sure it ends on a line of its own.
fn push_payload(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(payload);
    if !payload.ends_with(b"\n") {
        out.push(b'\n');
    }
}

/// Split a structured header value into its main value and parameters.
fn split_parameters(value: &str) -> (String, Vec<(String, String)>) {
    let mut segments = split_on_semicolons(value).into_iter();
    let main = segments.next().unwrap_or_default().trim().to_string();
    let mut parameters = Vec::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) => {
                parameters.push((key.trim().to_string(), unquote(value.trim()).to_string()));
            }
            None => parameters.push((segment.to_string(), String::new())),
        }
    }
    (main, parameters)
}

/// Split on semicolons that sit outside double quotes.
fn split_on_semicolons(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(value.get(start..i).unwrap_or(""));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value.get(start..).unwrap_or(""));
    parts
}

/// Strip one layer of double quotes.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn find_parameter<'a>(parameters: &'a [(String, String)], key: &str) -> Option<&'a str> {
    parameters
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

fn set_parameter(parameters: &mut Vec<(String, String)>, key: &str, value: &str) {
    if let Some(slot) = parameters
        .iter_mut()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
    {
        slot.1 = value.to_string();
    } else {
        parameters.push((key.to_string(), value.to_string()));
    }
}

/// Rebuild a structured header value, quoting parameter values that carry
/// special characters.
fn join_parameters(main: &str, parameters: &[(String, String)]) -> String {
    let mut result = main.to_string();
    for (key, value) in parameters {
        if value.is_empty() {
            let _ = write!(result, "; {key}");
        } else if value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
            let _ = write!(result, "; {key}=\"{value}\"");
        } else {
            let _ = write!(result, "; {key}={value}");
        }
    }
    result
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
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    use super::*;
    use crate::attachment::Attachment;

    const TEST_BOUNDARY: &str = "=Snap.Websites=AAAAAAAAAAAAAAAAAAAA";

    fn base_email() -> Email {
        let mut email = Email::new();
        email.set_from("alexis@example.com").unwrap();
        email.set_to("contact@example.com").unwrap();
        email.set_subject("Greetings");
        email
    }

    /// Compare a rendered stream line by line; `Date` lines only need a
    /// matching prefix because they carry the wall clock.
    fn assert_lines_ignoring_date(stream: &[u8], expected: &[&str]) {
        let text = std::str::from_utf8(stream).unwrap();
        let actual: Vec<&str> = text.split('\n').collect();
        assert_eq!(
            actual.len(),
            expected.len(),
            "line count differs, full stream:\n{text}"
        );
        for (index, (actual_line, expected_line)) in actual.iter().zip(expected.iter()).enumerate()
        {
            if expected_line.starts_with("Date: ") {
                assert!(
                    actual_line.starts_with("Date: "),
                    "line {index} is not a Date header: {actual_line:?}"
                );
            } else {
                assert_eq!(
                    actual_line, expected_line,
                    "line {index} differs, full stream:\n{text}"
                );
            }
        }
    }

    #[test]
    fn test_boundary_shape_and_uniqueness() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = generate_boundary(&mut rng);
        let second = generate_boundary(&mut rng);

        for boundary in [&first, &second] {
            assert!(boundary.starts_with(BOUNDARY_PREFIX));
            let suffix = boundary.strip_prefix(BOUNDARY_PREFIX).unwrap();
            assert_eq!(suffix.len(), BOUNDARY_SUFFIX_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert_ne!(first, second);
    }

    #[test]
    fn test_compose_requires_a_part() {
        let email = base_email();
        assert!(matches!(
            compose(&email, b"", TEST_BOUNDARY),
            Err(Error::MissingParameter(_))
        ));
    }

    #[test]
    fn test_compose_body_only_layout() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data(b"Hello\n".to_vec(), "text/plain; charset=utf-8");
        email.set_body_attachment(&body);

        let stream = compose(&email, b"", TEST_BOUNDARY).unwrap();

        let generated_by = format!("X-Generated-By: {BRANDING}");
        let mailer = format!("X-Mailer: {BRANDING}");
        let expected = [
            "Content-Language: en-us",
            "Content-Type: text/plain; charset=utf-8",
            "Date: ignored",
            "From: alexis@example.com",
            "Subject: Greetings",
            "To: contact@example.com",
            generated_by.as_str(),
            mailer.as_str(),
            "",
            "Hello",
            "",
            ".",
            "",
        ];
        assert_lines_ignoring_date(&stream, &expected);
    }

    #[test]
    fn test_compose_body_only_appends_missing_newline() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data(b"Hello".to_vec(), "text/plain; charset=utf-8");
        email.set_body_attachment(&body);

        let stream = compose(&email, b"", TEST_BOUNDARY).unwrap();
        let text = std::str::from_utf8(&stream).unwrap();
        assert!(text.ends_with("\nHello\n\n.\n"));
    }

    #[test]
    fn test_compose_body_only_propagates_quoted_printable() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data_quoted_printable(
            "caf\u{e9}\n".as_bytes(),
            "text/plain; charset=\"utf-8\"",
            QpFlags::text(),
        );
        email.set_body_attachment(&body);

        let stream = compose(&email, b"", TEST_BOUNDARY).unwrap();
        let text = std::str::from_utf8(&stream).unwrap();
        assert!(text.contains("\nContent-Transfer-Encoding: quoted-printable\n"));
        assert!(text.contains("\ncaf=C3=A9\n"));
    }

    #[test]
    fn test_compose_branding_can_be_turned_off() {
        let mut email = base_email();
        email.set_branding(false);
        let mut body = Attachment::new();
        body.set_data(b"Hello\n".to_vec(), "text/plain");
        email.set_body_attachment(&body);

        let stream = compose(&email, b"", TEST_BOUNDARY).unwrap();
        let text = std::str::from_utf8(&stream).unwrap();
        assert!(!text.contains("X-Generated-By"));
        assert!(!text.contains("X-Mailer"));
    }

    #[test]
    fn test_compose_multipart_with_alternative() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data(b"<p>Hi</p>".to_vec(), "text/html");
        email.set_body_attachment(&body);

        let stream = compose(&email, b"Hi\n", TEST_BOUNDARY).unwrap();

        let generated_by = format!("X-Generated-By: {BRANDING}");
        let mailer = format!("X-Mailer: {BRANDING}");
        let expected = [
            "Content-Language: en-us",
            "Content-Type: multipart/mixed;",
            "  boundary=\"=Snap.Websites=AAAAAAAAAAAAAAAAAAAA\"",
            "Date: ignored",
            "From: alexis@example.com",
            "MIME-Version: 1.0",
            "Subject: Greetings",
            "To: contact@example.com",
            generated_by.as_str(),
            mailer.as_str(),
            "",
            "The following are various parts of a multipart email.",
            "It is likely to include a text version (first part) that you should",
            "be able to read as is.",
            "It may be followed by HTML and then various attachments.",
            "Please consider installing a MIME capable client to read this email.",
            "",
            "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA",
            "Content-Type: multipart/alternative;",
            "  boundary=\"=Snap.Websites=AAAAAAAAAAAAAAAAAAAA.msg\"",
            "",
            "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA.msg",
            "Content-Type: text/plain; charset=\"utf-8\"",
            "Content-Transfer-Encoding: quoted-printable",
            "Content-Description: Mail message body",
            "",
            "Hi",
            "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA.msg",
            "Content-Type: text/html",
            "",
            "<p>Hi</p>",
            "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA.msg--",
            "",
            "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA--",
            "",
            ".",
            "",
        ];
        assert_lines_ignoring_date(&stream, &expected);
    }

    #[test]
    fn test_compose_attachment_gains_content_type_name() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data(b"<p>Hi</p>".to_vec(), "text/html");
        email.set_body_attachment(&body);

        let mut report = Attachment::new();
        report.set_data(b"%PDF-1.4 data\n".to_vec(), "application/pdf");
        let date = chrono::Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        report
            .set_content_disposition("x.pdf", Some(date), "attachment")
            .unwrap();
        email.add_attachment(&report);

        let stream = compose(&email, b"Hi\n", TEST_BOUNDARY).unwrap();
        let text = std::str::from_utf8(&stream).unwrap();

        let tail = text
            .split("--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA.msg--\n\n")
            .nth(1)
            .unwrap();
        let expected_tail = "--=Snap.Websites=AAAAAAAAAAAAAAAAAAAA\n\
            Content-Disposition: attachment; filename=x.pdf; \
            modification-date=\"Wed, 5 Apr 2023 06:07:08 +0000\";\n\
            Content-Type: application/pdf; name=x.pdf\n\
            \n\
            %PDF-1.4 data\n\
            --=Snap.Websites=AAAAAAAAAAAAAAAAAAAA--\n\
            \n\
            .\n";
        assert_eq!(tail, expected_tail);
        // the message itself is untouched by rendering
        assert_eq!(
            email.attachment(1).unwrap().get_header("Content-Type").unwrap(),
            "application/pdf"
        );
    }

    #[test]
    fn test_compose_multipart_without_text_keeps_body_in_outer_level() {
        let mut email = base_email();
        let mut body = Attachment::new();
        body.set_data(b"raw bytes\n".to_vec(), "application/octet-stream");
        email.set_body_attachment(&body);
        let mut second = Attachment::new();
        second.set_data(b"more\n".to_vec(), "text/plain");
        email.add_attachment(&second);

        let stream = compose(&email, b"", TEST_BOUNDARY).unwrap();
        let text = std::str::from_utf8(&stream).unwrap();

        assert!(!text.contains("multipart/alternative"));
        assert!(text.contains(
            "read this email.\n\n\
             --=Snap.Websites=AAAAAAAAAAAAAAAAAAAA\n\
             Content-Type: application/octet-stream\n\n\
             raw bytes\n"
        ));
    }

    #[test]
    fn test_propagate_filename_from_disposition() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "application/pdf").unwrap();
        headers
            .set("Content-Disposition", "attachment; filename=x.pdf;")
            .unwrap();

        propagate_filename(&mut headers);
        assert_eq!(
            headers.get("Content-Type").unwrap(),
            "application/pdf; name=x.pdf"
        );

        // a second pass changes nothing
        let snapshot = headers.clone();
        propagate_filename(&mut headers);
        assert_eq!(headers, snapshot);
    }

    #[test]
    fn test_propagate_filename_back_into_disposition() {
        let mut headers = HeaderMap::new();
        headers
            .set("Content-Type", "image/png; name=\"chart.png\"")
            .unwrap();
        headers.set("Content-Disposition", "inline").unwrap();

        propagate_filename(&mut headers);
        assert_eq!(
            headers.get("Content-Disposition").unwrap(),
            "inline; filename=chart.png"
        );
    }

    #[test]
    fn test_propagate_filename_disposition_wins() {
        let mut headers = HeaderMap::new();
        headers
            .set("Content-Type", "application/pdf; name=old.pdf")
            .unwrap();
        headers
            .set("Content-Disposition", "attachment; filename=new.pdf;")
            .unwrap();

        propagate_filename(&mut headers);
        assert_eq!(
            headers.get("Content-Type").unwrap(),
            "application/pdf; name=new.pdf"
        );
        assert_eq!(
            headers.get("Content-Disposition").unwrap(),
            "attachment; filename=new.pdf;"
        );
    }

    #[test]
    fn test_propagate_filename_needs_both_headers() {
        let mut headers = HeaderMap::new();
        headers
            .set("Content-Disposition", "attachment; filename=x.pdf;")
            .unwrap();
        let snapshot = headers.clone();
        propagate_filename(&mut headers);
        assert_eq!(headers, snapshot);
    }

    #[test]
    fn test_quoted_parameter_values_survive() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "application/pdf").unwrap();
        headers
            .set(
                "Content-Disposition",
                "attachment; filename=\"two words.pdf\";",
            )
            .unwrap();

        propagate_filename(&mut headers);
        assert_eq!(
            headers.get("Content-Type").unwrap(),
            "application/pdf; name=\"two words.pdf\""
        );
    }
}
