//! Delivery of a finished message.
//!
//! Sending runs in three steps: derive a plain-text rendition of an HTML
//! body, render the full stream, hand it to the local mailer. The two
//! external programs involved sit behind the [`TextExtractor`] and
//! [`Transport`] traits so the pipeline can run against fakes; the shipped
//! implementations pipe through `html2text` and `sendmail`.

use std::io::{self, Write as _};
use std::process::{Command, Stdio};

use rand::Rng;
use tracing::{error, trace, warn};

use crate::address;
use crate::email::Email;
use crate::encoding;
use crate::error::{Error, Result};
use crate::render;

/// Derives a plain-text rendition from an HTML body.
pub trait TextExtractor {
    /// Convert `html` into readable plain text.
    ///
    /// # Errors
    ///
    /// Returns an error when the conversion cannot run to completion.
    fn extract(&self, html: &[u8]) -> io::Result<Vec<u8>>;
}

/// Converts HTML by piping it through the `html2text` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Html2Text;

impl TextExtractor for Html2Text {
    fn extract(&self, html: &[u8]) -> io::Result<Vec<u8>> {
        let mut child = Command::new("html2text")
            .args(["-nobs", "-utf8", "-style", "pretty", "-width", "70"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("html2text stdin was not captured"))?;
        // feed the input from a second thread so a converter that writes
        // before draining its input cannot deadlock the pipe
        let html = html.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&html));
        let output = child.wait_with_output()?;
        let write_result = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "html2text exited with {}",
                output.status
            )));
        }
        write_result?;
        Ok(output.stdout)
    }
}

/// Hands a rendered message stream to a delivery mechanism.
pub trait Transport {
    /// Deliver `message` from `sender` to `recipient`.
    ///
    /// Returns whether the mechanism accepted the message.
    ///
    /// # Errors
    ///
    /// Returns an error when the mechanism could not be reached at all.
    fn deliver(&mut self, sender: &str, recipient: &str, message: &[u8]) -> io::Result<bool>;
}

/// Delivers by piping the stream into the local `sendmail` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sendmail;

impl Transport for Sendmail {
    fn deliver(&mut self, sender: &str, recipient: &str, message: &[u8]) -> io::Result<bool> {
        trace!("Running sendmail -f {sender} {recipient}");
        let mut child = Command::new("sendmail")
            .arg("-f")
            .arg(sender)
            .arg(recipient)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(message),
            None => Err(io::Error::other("sendmail stdin was not captured")),
        };
        // reap the child before looking at the write outcome
        let status = child.wait()?;
        write_result?;
        Ok(status.success())
    }
}

impl Email {
    /// Render this message and hand it to the local mailer.
    ///
    /// An HTML body is first converted to a plain-text alternative with
    /// `html2text`; the rendered stream then goes to `sendmail` with the
    /// first `From` and `To` addresses on the envelope. Returns `Ok(true)`
    /// when the mailer accepted the message and `Ok(false)` when it could
    /// not be started or rejected it, with the reason logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] when `From`, `To` or the body
    /// part is absent and [`Error::InvalidParameter`] when an envelope
    /// header cannot be parsed.
    pub fn send(&self) -> Result<bool> {
        self.send_with(&Html2Text, &mut Sendmail, &mut rand::thread_rng())
    }

    /// [`send`](Self::send) with every external effect injectable.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send`](Self::send).
    pub fn send_with<R: Rng + ?Sized>(
        &self,
        extractor: &dyn TextExtractor,
        transport: &mut dyn Transport,
        rng: &mut R,
    ) -> Result<bool> {
        let from = self.get_header("From")?;
        if from.is_empty() {
            return Err(Error::MissingParameter(
                "a From header is required to send a message".to_string(),
            ));
        }
        let to = self.get_header("To")?;
        if to.is_empty() {
            return Err(Error::MissingParameter(
                "a To header is required to send a message".to_string(),
            ));
        }
        if self.attachment_count() == 0 {
            return Err(Error::MissingParameter(
                "a message needs at least a body part to be sent".to_string(),
            ));
        }
        let sender = envelope_address(from)?;
        let recipient = envelope_address(to)?;

        let plain_text = derive_plain_text(self, extractor)?;
        let boundary = render::generate_boundary(rng);
        let message = render::compose(self, &plain_text, &boundary)?;

        match transport.deliver(&sender, &recipient, &message) {
            Ok(accepted) => Ok(accepted),
            Err(e) => {
                error!("Failed to hand the message to the transport: {e}");
                Ok(false)
            }
        }
    }
}

/// Derive the plain-text alternative of the body part.
///
/// Only an HTML body gets one; a quoted-printable body is decoded before
/// the conversion. A failing extractor downgrades the message to HTML-only
/// rather than blocking the send.
fn derive_plain_text(email: &Email, extractor: &dyn TextExtractor) -> Result<Vec<u8>> {
    let body = email.attachment(0)?;
    if !body.get_header("Content-Type")?.starts_with("text/html") {
        return Ok(Vec::new());
    }

    let decoded;
    let html = if body.get_header("Content-Transfer-Encoding")? == "quoted-printable" {
        decoded = encoding::decode_quoted_printable(body.data());
        decoded.as_slice()
    } else {
        body.data()
    };
    match extractor.extract(html) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!("Failed to derive a plain-text body: {e}");
            Ok(Vec::new())
        }
    }
}

/// Extract the bare address put on the MTA envelope.
///
/// The header may hold a full list; only its first mailbox rides on the
/// envelope.
fn envelope_address(list: &str) -> Result<String> {
    let first = address::parse_address_list(list)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidParameter("address list is empty".to_string()))?;
    Ok(first.address.to_string())
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
    use std::cell::RefCell;

    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    use super::*;
    use crate::attachment::Attachment;
    use crate::encoding::QpFlags;

    struct StaticText(&'static str);

    impl TextExtractor for StaticText {
        fn extract(&self, _html: &[u8]) -> io::Result<Vec<u8>> {
            Ok(self.0.as_bytes().to_vec())
        }
    }

    struct RecordingExtractor {
        seen: RefCell<Vec<u8>>,
        reply: &'static str,
    }

    impl TextExtractor for RecordingExtractor {
        fn extract(&self, html: &[u8]) -> io::Result<Vec<u8>> {
            *self.seen.borrow_mut() = html.to_vec();
            Ok(self.reply.as_bytes().to_vec())
        }
    }

    struct BrokenExtractor;

    impl TextExtractor for BrokenExtractor {
        fn extract(&self, _html: &[u8]) -> io::Result<Vec<u8>> {
            Err(io::Error::other("converter not installed"))
        }
    }

    /// Panics when used; for checks that nothing must run.
    struct NoExtractor;

    impl TextExtractor for NoExtractor {
        fn extract(&self, _html: &[u8]) -> io::Result<Vec<u8>> {
            panic!("the extractor must not run");
        }
    }

    #[derive(Default)]
    struct CaptureTransport {
        sender: String,
        recipient: String,
        message: Vec<u8>,
    }

    impl Transport for CaptureTransport {
        fn deliver(&mut self, sender: &str, recipient: &str, message: &[u8]) -> io::Result<bool> {
            self.sender = sender.to_string();
            self.recipient = recipient.to_string();
            self.message = message.to_vec();
            Ok(true)
        }
    }

    struct RejectingTransport;

    impl Transport for RejectingTransport {
        fn deliver(&mut self, _: &str, _: &str, _: &[u8]) -> io::Result<bool> {
            Ok(false)
        }
    }

    struct BrokenTransport;

    impl Transport for BrokenTransport {
        fn deliver(&mut self, _: &str, _: &str, _: &[u8]) -> io::Result<bool> {
            Err(io::Error::other("mailer not installed"))
        }
    }

    /// Panics when used; for checks that nothing must be delivered.
    struct NoTransport;

    impl Transport for NoTransport {
        fn deliver(&mut self, _: &str, _: &str, _: &[u8]) -> io::Result<bool> {
            panic!("the transport must not run");
        }
    }

    fn addressed_email() -> Email {
        let mut email = Email::new();
        email.set_from("Alexis <alexis@example.com>").unwrap();
        email
            .set_to("contact@example.com, second@example.com")
            .unwrap();
        email.set_subject("Greetings");
        email
    }

    fn html_email() -> Email {
        let mut email = addressed_email();
        let mut body = Attachment::new();
        body.set_data(b"<p>Hi</p>".to_vec(), "text/html");
        email.set_body_attachment(&body);
        email
    }

    #[test]
    fn test_send_with_delivers_rendered_stream() {
        let email = html_email();
        let mut transport = CaptureTransport::default();
        let mut rng = StdRng::seed_from_u64(1);

        let accepted = email
            .send_with(&StaticText("Hi\n"), &mut transport, &mut rng)
            .unwrap();

        assert!(accepted);
        assert_eq!(transport.sender, "alexis@example.com");
        assert_eq!(transport.recipient, "contact@example.com");
        let text = std::str::from_utf8(&transport.message).unwrap();
        assert!(text.contains("Content-Type: multipart/mixed;"));
        assert!(text.contains("boundary=\"=Snap.Websites="));
        assert!(text.ends_with("\n.\n"));
    }

    #[test]
    fn test_send_with_requires_envelope_headers() {
        let mut email = Email::new();
        let mut body = Attachment::new();
        body.set_data(b"Hello\n".to_vec(), "text/plain");
        email.set_body_attachment(&body);

        let result = email.send_with(&NoExtractor, &mut NoTransport, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(Error::MissingParameter(_))));

        email.set_from("alexis@example.com").unwrap();
        let result = email.send_with(&NoExtractor, &mut NoTransport, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(Error::MissingParameter(_))));
    }

    #[test]
    fn test_send_with_requires_a_body_part() {
        let mut email = Email::new();
        email.set_from("alexis@example.com").unwrap();
        email.set_to("contact@example.com").unwrap();

        let result = email.send_with(&NoExtractor, &mut NoTransport, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(Error::MissingParameter(_))));
    }

    #[test]
    fn test_send_with_rejects_unparseable_envelope() {
        let mut email = html_email();
        email.add_header("To", "not an address").unwrap_err();
        // force a bad value past validation the way a raw import would
        email.headers_mut().set_raw("To", "not an address");

        let result = email.send_with(&NoExtractor, &mut NoTransport, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_extractor_gets_decoded_html() {
        let mut email = addressed_email();
        let mut body = Attachment::new();
        body.set_data_quoted_printable(
            "<p>caf\u{e9}</p>".as_bytes(),
            "text/html; charset=\"utf-8\"",
            QpFlags::text(),
        );
        email.set_body_attachment(&body);

        let extractor = RecordingExtractor {
            seen: RefCell::new(Vec::new()),
            reply: "cafe\n",
        };
        let mut transport = CaptureTransport::default();
        let mut rng = StdRng::seed_from_u64(1);
        email.send_with(&extractor, &mut transport, &mut rng).unwrap();

        assert_eq!(
            extractor.seen.borrow().as_slice(),
            "<p>caf\u{e9}</p>".as_bytes()
        );
        let text = std::str::from_utf8(&transport.message).unwrap();
        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("\ncafe\n"));
    }

    #[test]
    fn test_plain_body_skips_extraction() {
        let mut email = addressed_email();
        let mut body = Attachment::new();
        body.set_data(b"Hello\n".to_vec(), "text/plain; charset=utf-8");
        email.set_body_attachment(&body);

        let mut transport = CaptureTransport::default();
        let mut rng = StdRng::seed_from_u64(1);
        let accepted = email
            .send_with(&NoExtractor, &mut transport, &mut rng)
            .unwrap();

        assert!(accepted);
        let text = std::str::from_utf8(&transport.message).unwrap();
        assert!(!text.contains("multipart"));
        assert!(text.contains("\nHello\n"));
    }

    #[test]
    fn test_failing_extractor_downgrades_to_html_only() {
        let email = html_email();
        let mut transport = CaptureTransport::default();
        let mut rng = StdRng::seed_from_u64(1);

        let accepted = email
            .send_with(&BrokenExtractor, &mut transport, &mut rng)
            .unwrap();

        assert!(accepted);
        let text = std::str::from_utf8(&transport.message).unwrap();
        assert!(!text.contains("multipart"));
        assert!(text.contains("Content-Type: text/html"));
    }

    #[test]
    fn test_rejecting_transport_reports_false() {
        let email = html_email();
        let mut rng = StdRng::seed_from_u64(1);
        let accepted = email
            .send_with(&StaticText("Hi\n"), &mut RejectingTransport, &mut rng)
            .unwrap();
        assert!(!accepted);
    }

    #[test]
    fn test_broken_transport_reports_false() {
        let email = html_email();
        let mut rng = StdRng::seed_from_u64(1);
        let accepted = email
            .send_with(&StaticText("Hi\n"), &mut BrokenTransport, &mut rng)
            .unwrap();
        assert!(!accepted);
    }

    #[test]
    fn test_envelope_address_takes_first_mailbox() {
        let address =
            envelope_address("\"Doe, Jo\" <jo@example.com>, second@example.com").unwrap();
        assert_eq!(address, "jo@example.com");
        assert!(envelope_address("garbage").is_err());
    }
}
