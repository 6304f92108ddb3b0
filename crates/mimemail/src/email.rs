//! The top-level email message model.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::address::{self, FieldClass};
use crate::attachment::Attachment;
use crate::error::{Error, Result};
use crate::header::HeaderMap;

/// Delivery priority of a message.
///
/// A priority is stamped into four coherent headers at once so the various
/// mail clients that each read a different one all agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Mass mailing, the lowest priority.
    Bulk,
    /// Low priority.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// High priority.
    High,
    /// Urgent, the highest priority.
    Urgent,
}

impl Priority {
    /// The numeric value used in `X-Priority`.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Bulk => 1,
            Self::Low => 2,
            Self::Normal => 3,
            Self::High => 4,
            Self::Urgent => 5,
        }
    }

    /// The lowercase name used in the other priority headers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Bulk),
            2 => Ok(Self::Low),
            3 => Ok(Self::Normal),
            4 => Ok(Self::High),
            5 => Ok(Self::Urgent),
            _ => Err(Error::InvalidParameter(format!(
                "unknown priority value {value}, expected 1 to 5"
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An email message: headers, parts, and bookkeeping fields.
///
/// The first part (index 0) is the body; further parts are attachments.
/// Besides the RFC 5322 headers the message carries a private side table of
/// parameters, looked up with case-sensitive names, which callers use to
/// track application state alongside the message without it ever reaching
/// the wire.
#[derive(Debug, Clone)]
pub struct Email {
    branding: bool,
    cumulative: String,
    site_key: String,
    email_path: String,
    email_key: String,
    created_at: DateTime<Utc>,
    headers: HeaderMap,
    attachments: Vec<Attachment>,
    parameters: BTreeMap<String, String>,
}

impl Default for Email {
    fn default() -> Self {
        Self {
            branding: true,
            cumulative: String::new(),
            site_key: String::new(),
            email_path: String::new(),
            email_key: String::new(),
            created_at: Utc::now(),
            headers: HeaderMap::new(),
            attachments: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }
}

impl PartialEq for Email {
    fn eq(&self, other: &Self) -> bool {
        // created_at is bookkeeping, not content; a reloaded archive must
        // compare equal to the message it was made from
        self.branding == other.branding
            && self.cumulative == other.cumulative
            && self.site_key == other.site_key
            && self.email_path == other.email_path
            && self.email_key == other.email_key
            && self.headers == other.headers
            && self.attachments == other.attachments
            && self.parameters == other.parameters
    }
}

impl Eq for Email {}

impl Email {
    /// Create an empty message with branding enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn the `X-Generated-By` / `X-Mailer` branding headers on or off.
    pub fn set_branding(&mut self, branding: bool) {
        self.branding = branding;
    }

    /// Whether branding headers will be emitted.
    #[must_use]
    pub const fn branding(&self) -> bool {
        self.branding
    }

    /// Set the key used to accumulate similar messages into one.
    pub fn set_cumulative(&mut self, cumulative: impl Into<String>) {
        self.cumulative = cumulative.into();
    }

    /// The accumulation key, empty when unused.
    #[must_use]
    pub fn cumulative(&self) -> &str {
        &self.cumulative
    }

    /// Set the originating site key.
    pub fn set_site_key(&mut self, site_key: impl Into<String>) {
        self.site_key = site_key.into();
    }

    /// The originating site key.
    #[must_use]
    pub fn site_key(&self) -> &str {
        &self.site_key
    }

    /// Set the path naming the source of this message.
    pub fn set_email_path(&mut self, email_path: impl Into<String>) {
        self.email_path = email_path.into();
    }

    /// The path naming the source of this message.
    #[must_use]
    pub fn email_path(&self) -> &str {
        &self.email_path
    }

    /// Set the unique key of this message.
    pub fn set_email_key(&mut self, email_key: impl Into<String>) {
        self.email_key = email_key.into();
    }

    /// The unique key of this message.
    #[must_use]
    pub fn email_key(&self) -> &str {
        &self.email_key
    }

    /// When this in-memory message object was created.
    ///
    /// Not part of message equality and not archived; a deserialized
    /// message gets a fresh timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set the `From` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless `from` parses to exactly
    /// one valid mailbox.
    pub fn set_from(&mut self, from: &str) -> Result<()> {
        let mailboxes = address::parse_address_list(from)?;
        if mailboxes.len() != 1 {
            return Err(Error::InvalidParameter(format!(
                "a From header expects exactly one mailbox, found {}",
                mailboxes.len()
            )));
        }
        self.headers.set_raw("From", from);
        Ok(())
    }

    /// Set the `To` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless `to` parses to at least
    /// one valid mailbox.
    pub fn set_to(&mut self, to: &str) -> Result<()> {
        address::parse_address_list(to)?;
        self.headers.set_raw("To", to);
        Ok(())
    }

    /// Overwrite the `Subject` header.
    pub fn set_subject(&mut self, subject: &str) {
        self.headers.set_raw("Subject", subject);
    }

    /// Stamp the priority headers.
    ///
    /// Writes `X-Priority`, `X-MSMail-Priority`, `Importance` and
    /// `Precedence` so they all tell the same story.
    pub fn set_priority(&mut self, priority: Priority) {
        let name = priority.name();
        self.headers
            .set_raw("X-Priority", &format!("{} ({name})", priority.number()));
        self.headers.set_raw("X-MSMail-Priority", name);
        self.headers.set_raw("Importance", name);
        self.headers.set_raw("Precedence", name);
    }

    /// Add a header to the message.
    ///
    /// Address-bearing fields (`From`, `To`, `Cc`, `Sender`, and the rest
    /// of the RFC 5322 address fields) have their value validated before it
    /// is stored; anything else is stored as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when `name` is empty or not a
    /// valid field name, or when an address-bearing field carries a value
    /// that does not parse.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        match address::classify_field(name) {
            FieldClass::Invalid => Err(Error::InvalidParameter(format!(
                "{name:?} is not a valid header field name"
            ))),
            FieldClass::Unknown => self.headers.set(name, value),
            class => {
                // an optional address list may be left empty (e.g. Bcc)
                if !(class == FieldClass::AddressListOpt && value.is_empty()) {
                    let mailboxes = address::parse_address_list(value)?;
                    if class == FieldClass::Mailbox && mailboxes.len() != 1 {
                        return Err(Error::InvalidParameter(format!(
                            "header {name:?} expects exactly one mailbox, found {}",
                            mailboxes.len()
                        )));
                    }
                }
                self.headers.set(name, value)
            }
        }
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

    /// All headers of the message.
    #[must_use]
    pub const fn all_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Install `body` as the body of the message.
    ///
    /// The part is copied to the front of the part list; existing parts
    /// shift up by one.
    pub fn set_body_attachment(&mut self, body: &Attachment) {
        self.attachments.insert(0, body.clone());
    }

    /// Append a copy of `attachment` to the part list.
    pub fn add_attachment(&mut self, attachment: &Attachment) {
        self.attachments.push(attachment.clone());
    }

    /// Number of parts, body included.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Access a part by index; the body is index 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `index` is past the end.
    pub fn attachment(&self, index: usize) -> Result<&Attachment> {
        self.attachments.get(index).ok_or_else(|| {
            Error::OutOfRange(format!(
                "attachment index {index} out of range (count: {})",
                self.attachments.len()
            ))
        })
    }

    /// All parts in order, for rendering and archiving.
    pub(crate) fn parts(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Store a parameter in the side table.
    ///
    /// Parameter names are case-sensitive and never reach the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn add_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "a parameter name cannot be empty".to_string(),
            ));
        }
        self.parameters.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Remove a parameter, silently ignoring absent or empty names.
    pub fn remove_parameter(&mut self, name: &str) {
        self.parameters.remove(name);
    }

    /// Check whether a parameter is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn has_parameter(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "a parameter name cannot be empty".to_string(),
            ));
        }
        Ok(self.parameters.contains_key(name))
    }

    /// Read a parameter value, or `""` when the parameter is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn parameter(&self, name: &str) -> Result<&str> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "a parameter name cannot be empty".to_string(),
            ));
        }
        Ok(self.parameters.get(name).map_or("", String::as_str))
    }

    /// All parameters in name order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Header map access for the archive decoder.
    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
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
    use super::*;

    #[test]
    fn test_new_defaults() {
        let email = Email::new();
        assert!(email.branding());
        assert_eq!(email.cumulative(), "");
        assert_eq!(email.attachment_count(), 0);
    }

    #[test]
    fn test_set_from_stores_display_form() {
        let mut email = Email::new();
        email.set_from("Alphonse <alphonse@example.com>").unwrap();
        assert_eq!(
            email.get_header("From").unwrap(),
            "Alphonse <alphonse@example.com>"
        );
    }

    #[test]
    fn test_set_from_rejects_lists_and_garbage() {
        let mut email = Email::new();
        assert!(matches!(
            email.set_from("a@example.com, b@example.com"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            email.set_from("not-an-address"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(!email.has_header("From").unwrap());
    }

    #[test]
    fn test_set_to_accepts_lists() {
        let mut email = Email::new();
        email.set_to("a@example.com, Bea <b@example.com>").unwrap();
        assert_eq!(
            email.get_header("To").unwrap(),
            "a@example.com, Bea <b@example.com>"
        );
        assert!(matches!(email.set_to(""), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_set_priority_writes_quartet() {
        let mut email = Email::new();
        email.set_priority(Priority::High);
        assert_eq!(email.get_header("X-Priority").unwrap(), "4 (high)");
        assert_eq!(email.get_header("X-MSMail-Priority").unwrap(), "high");
        assert_eq!(email.get_header("Importance").unwrap(), "high");
        assert_eq!(email.get_header("Precedence").unwrap(), "high");
    }

    #[test]
    fn test_priority_from_number() {
        assert_eq!(Priority::try_from(1).unwrap(), Priority::Bulk);
        assert_eq!(Priority::try_from(5).unwrap(), Priority::Urgent);
        assert!(matches!(
            Priority::try_from(6),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_add_header_unknown_field_stored_verbatim() {
        let mut email = Email::new();
        email.add_header("X-Campaign", "summer (not=valid email)").unwrap();
        assert_eq!(
            email.get_header("x-campaign").unwrap(),
            "summer (not=valid email)"
        );
    }

    #[test]
    fn test_add_header_rejects_bad_field_name() {
        let mut email = Email::new();
        assert!(matches!(
            email.add_header("Bad Name", "x"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            email.add_header("Bad:Name", "x"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_add_header_validates_address_fields() {
        let mut email = Email::new();
        assert!(matches!(
            email.add_header("Cc", "not-an-address"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            email.add_header("Sender", "a@example.com, b@example.com"),
            Err(Error::InvalidParameter(_))
        ));
        email.add_header("Cc", "cc@example.com").unwrap();
        email.add_header("Sender", "sender@example.com").unwrap();
    }

    #[test]
    fn test_add_header_allows_empty_bcc() {
        let mut email = Email::new();
        email.add_header("Bcc", "").unwrap();
        assert!(email.has_header("Bcc").unwrap());
        assert!(matches!(
            email.add_header("To", ""),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_body_attachment_goes_first() {
        let mut email = Email::new();
        let mut report = Attachment::new();
        report.set_data(b"%PDF-1.4".to_vec(), "");
        email.add_attachment(&report);

        let mut body = Attachment::new();
        body.set_data(b"hello".to_vec(), "text/plain");
        email.set_body_attachment(&body);

        assert_eq!(email.attachment_count(), 2);
        assert_eq!(email.attachment(0).unwrap().data(), b"hello");
        assert_eq!(email.attachment(1).unwrap().data(), b"%PDF-1.4");
        assert!(matches!(email.attachment(2), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_parameters_are_case_sensitive() {
        let mut email = Email::new();
        email.add_parameter("Key", "one").unwrap();
        email.add_parameter("key", "two").unwrap();
        assert_eq!(email.parameter("Key").unwrap(), "one");
        assert_eq!(email.parameter("key").unwrap(), "two");
        assert_eq!(email.parameter("KEY").unwrap(), "");
        assert!(email.has_parameter("Key").unwrap());
        assert!(!email.has_parameter("KEY").unwrap());

        email.remove_parameter("Key");
        email.remove_parameter("");
        assert!(!email.has_parameter("Key").unwrap());
        assert!(matches!(
            email.add_parameter("", "x"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_equality_ignores_created_at() {
        let first = Email::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Email::new();
        assert_ne!(first.created_at(), second.created_at());
        assert_eq!(first, second);
    }

    #[test]
    fn test_equality_covers_content() {
        let mut first = Email::new();
        first.set_subject("same");
        let mut second = first.clone();
        assert_eq!(first, second);

        second.set_branding(false);
        assert_ne!(first, second);

        let mut third = first.clone();
        third.add_parameter("k", "v").unwrap();
        assert_ne!(first, third);
    }
}
