//! End-to-end composition tests.
//!
//! Messages are sent through a capturing transport and a fixed text
//! extractor, so the complete rendered stream can be inspected without
//! running any external program.

use std::io;

use rand::SeedableRng as _;
use rand::rngs::StdRng;

use mimemail::{Attachment, Email, Priority, TextExtractor, Transport};

/// Extractor returning a fixed text, standing in for `html2text`.
struct FixedText(&'static str);

impl TextExtractor for FixedText {
    fn extract(&self, _html: &[u8]) -> io::Result<Vec<u8>> {
        Ok(self.0.as_bytes().to_vec())
    }
}

/// Transport that captures everything it is handed.
#[derive(Default)]
struct Capture {
    sender: String,
    recipient: String,
    message: Vec<u8>,
}

impl Transport for Capture {
    fn deliver(&mut self, sender: &str, recipient: &str, message: &[u8]) -> io::Result<bool> {
        self.sender = sender.to_string();
        self.recipient = recipient.to_string();
        self.message = message.to_vec();
        Ok(true)
    }
}

fn addressed_email() -> Email {
    let mut email = Email::new();
    email.set_from("Alexis <alexis@example.com>").unwrap();
    email.set_to("contact@example.com, archive@example.com").unwrap();
    email.set_subject("Greetings");
    email
}

fn send(email: &Email, text: &'static str) -> Capture {
    let mut capture = Capture::default();
    let mut rng = StdRng::seed_from_u64(42);
    let accepted = email
        .send_with(&FixedText(text), &mut capture, &mut rng)
        .unwrap();
    assert!(accepted);
    capture
}

/// Pull the outer boundary out of the rendered `Content-Type` header.
fn outer_boundary(message: &str) -> &str {
    let marker = "boundary=\"";
    let start = message.find(marker).unwrap() + marker.len();
    let length = message[start..].find('"').unwrap();
    &message[start..start + length]
}

#[test]
fn test_plain_body_renders_without_multipart() {
    let mut email = addressed_email();
    let mut body = Attachment::new();
    body.set_data(b"Hello, world!\n".to_vec(), "text/plain; charset=utf-8");
    email.set_body_attachment(&body);

    let capture = send(&email, "");
    assert_eq!(capture.sender, "alexis@example.com");
    assert_eq!(capture.recipient, "contact@example.com");

    let text = std::str::from_utf8(&capture.message).unwrap();
    assert!(text.starts_with("Content-Language: en-us\n"));
    assert!(text.contains("\nContent-Type: text/plain; charset=utf-8\nDate: "));
    assert!(text.contains(
        "\nFrom: Alexis <alexis@example.com>\nSubject: Greetings\n\
         To: contact@example.com, archive@example.com\nX-Generated-By: mimemail v"
    ));
    assert!(!text.contains("multipart"));
    assert!(!text.contains("boundary"));
    assert!(text.ends_with("\n\nHello, world!\n\n.\n"));
}

#[test]
fn test_html_body_gains_plain_text_alternative() {
    let mut email = addressed_email();
    let mut body = Attachment::new();
    body.set_data(b"<p>Hi everyone!</p>".to_vec(), "text/html");
    email.set_body_attachment(&body);

    let capture = send(&email, "Hi everyone!\n");
    let text = std::str::from_utf8(&capture.message).unwrap();
    let boundary = outer_boundary(text);

    assert!(boundary.starts_with("=Snap.Websites="));
    let suffix = boundary.strip_prefix("=Snap.Websites=").unwrap();
    assert_eq!(suffix.len(), 20);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));

    assert!(text.contains(&format!(
        "\nContent-Type: multipart/mixed;\n  boundary=\"{boundary}\"\n"
    )));
    assert!(text.contains("\nMIME-Version: 1.0\n"));
    assert!(text.contains("\n\nThe following are various parts of a multipart email.\n"));
    assert!(text.contains(&format!(
        "--{boundary}\n\
         Content-Type: multipart/alternative;\n\
         \x20 boundary=\"{boundary}.msg\"\n\
         \n\
         --{boundary}.msg\n\
         Content-Type: text/plain; charset=\"utf-8\"\n\
         Content-Transfer-Encoding: quoted-printable\n\
         Content-Description: Mail message body\n\
         \n\
         Hi everyone!\n\
         --{boundary}.msg\n\
         Content-Type: text/html\n\
         \n\
         <p>Hi everyone!</p>\n\
         --{boundary}.msg--\n"
    )));
    assert!(text.ends_with(&format!("--{boundary}--\n\n.\n")));
}

#[test]
fn test_attachment_filename_reaches_content_type() {
    let mut email = addressed_email();
    let mut body = Attachment::new();
    body.set_data(b"<p>The report is attached.</p>".to_vec(), "text/html");
    email.set_body_attachment(&body);

    let mut report = Attachment::new();
    // empty MIME type, the %PDF- magic decides
    report.set_data(b"%PDF-1.4 fake report".to_vec(), "");
    report
        .set_content_disposition("/tmp/out/report.pdf", None, "attachment")
        .unwrap();
    email.add_attachment(&report);

    let capture = send(&email, "The report is attached.\n");
    let text = std::str::from_utf8(&capture.message).unwrap();

    assert!(text.contains("\nContent-Disposition: attachment; filename=report.pdf; "));
    assert!(text.contains("\nContent-Type: application/pdf; name=report.pdf\n"));

    // rendering must not touch the message itself
    assert_eq!(
        email.attachment(1).unwrap().get_header("Content-Type").unwrap(),
        "application/pdf"
    );
}

#[test]
fn test_priority_headers_agree() {
    let mut email = addressed_email();
    email.set_priority(Priority::Urgent);
    let mut body = Attachment::new();
    body.set_data(b"Now!\n".to_vec(), "text/plain");
    email.set_body_attachment(&body);

    let capture = send(&email, "");
    let text = std::str::from_utf8(&capture.message).unwrap();
    assert!(text.contains("\nImportance: urgent\n"));
    assert!(text.contains("\nPrecedence: urgent\n"));
    assert!(text.contains("\nX-MSMail-Priority: urgent\n"));
    assert!(text.contains("\nX-Priority: 5 (urgent)\n"));
}

#[test]
fn test_headers_are_case_insensitive_but_keep_their_form() {
    let mut email = addressed_email();
    email.add_header("X-Campaign", "spring-launch").unwrap();
    assert_eq!(email.get_header("x-campaign").unwrap(), "spring-launch");
    assert!(email.has_header("X-CAMPAIGN").unwrap());

    let mut body = Attachment::new();
    body.set_data(b"Hello\n".to_vec(), "text/plain");
    email.set_body_attachment(&body);

    let capture = send(&email, "");
    let text = std::str::from_utf8(&capture.message).unwrap();
    assert!(text.contains("\nX-Campaign: spring-launch\n"));

    email.remove_header("x-CAMPAIGN");
    assert!(!email.has_header("X-Campaign").unwrap());
}

#[test]
fn test_related_parts_stay_one_level_deep() {
    let mut logo = Attachment::new();
    logo.set_data(b"\x89PNG\r\n\x1a\nfake".to_vec(), "");
    assert_eq!(logo.get_header("Content-Type").unwrap(), "image/png");

    let mut body = Attachment::new();
    body.set_data(b"<p>Hi</p>".to_vec(), "text/html");
    body.add_related(&logo).unwrap();
    assert_eq!(body.related_count(), 1);
    assert!(body.related(0).unwrap().is_sub_attachment());

    // a stored sub-part cannot nest further
    let mut stored = body.related(0).unwrap().clone();
    assert!(stored.add_related(&logo).is_err());

    // a part that already holds related parts cannot become one
    let mut carrier = Attachment::new();
    carrier.set_data(b"<p>Outer</p>".to_vec(), "text/html");
    assert!(carrier.add_related(&body).is_err());
}

#[test]
fn test_archive_round_trip() {
    let mut email = addressed_email();
    email.set_branding(false);
    email.set_cumulative("weekly-digest");
    email.set_site_key("news.example.com");
    email.set_email_path("digest/weekly");
    email.set_email_key("digest-2023-14");
    email.set_priority(Priority::Low);
    email.add_parameter("attempts", "2").unwrap();

    let mut logo = Attachment::new();
    logo.set_data(b"\x89PNG\r\n\x1a\nfake".to_vec(), "");
    let mut body = Attachment::new();
    body.set_data(b"<p>News of the week.</p>".to_vec(), "text/html");
    body.add_related(&logo).unwrap();
    email.set_body_attachment(&body);

    let mut report = Attachment::new();
    report.set_data(b"%PDF-1.4 fake report".to_vec(), "");
    report
        .set_content_disposition("report.pdf", None, "attachment")
        .unwrap();
    email.add_attachment(&report);

    let bytes = email.serialize();
    let restored = Email::deserialize(&bytes);
    assert_eq!(restored, email);
    assert_eq!(restored.cumulative(), "weekly-digest");
    assert_eq!(restored.parameter("attempts").unwrap(), "2");
    assert_eq!(restored.attachment_count(), 2);
    assert_eq!(restored.attachment(0).unwrap().related_count(), 1);
    assert!(restored.attachment(0).unwrap().related(0).unwrap().is_sub_attachment());

    // the reloaded message is still fully sendable
    let reloaded = send(&restored, "News of the week.\n");
    let text = std::str::from_utf8(&reloaded.message).unwrap();
    assert!(text.contains("<p>News of the week.</p>"));
    assert!(text.contains("%PDF-1.4 fake report"));
    assert!(text.contains("name=report.pdf"));
}

#[test]
fn test_send_without_envelope_spawns_nothing() {
    let mut email = Email::new();
    let mut body = Attachment::new();
    body.set_data(b"Hello\n".to_vec(), "text/plain");
    email.set_body_attachment(&body);

    let mut capture = Capture::default();
    let mut rng = StdRng::seed_from_u64(42);
    let result = email.send_with(&FixedText(""), &mut capture, &mut rng);
    assert!(result.is_err());
    assert!(capture.message.is_empty());
}
