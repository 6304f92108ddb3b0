//! Email address parsing and header field classification.
//!
//! The composer does not need a full RFC 5322 grammar: it validates the
//! addresses callers store into address-bearing headers and extracts the
//! bare addresses used for the MTA envelope.

use crate::error::{Error, Result};

/// A bare email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates an email address (basic validation).
    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidParameter(
                "address cannot be empty".to_string(),
            ));
        }

        let parts: Vec<&str> = addr.split('@').collect();
        if parts.len() != 2 {
            return Err(Error::InvalidParameter(format!(
                "address {addr:?} must have exactly one @"
            )));
        }

        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::InvalidParameter(format!(
                "address {addr:?} must have a local part and a domain"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

/// How the address validator treats a header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// The name itself is not a valid header field name.
    Invalid,
    /// Not an address-bearing field; the value is stored as-is.
    Unknown,
    /// Exactly one mailbox (`Sender`).
    Mailbox,
    /// One or more mailboxes (`From`).
    MailboxList,
    /// One or more addresses (`To`, `Cc`, ...).
    AddressList,
    /// Zero or more addresses (`Bcc`; the value may be empty).
    AddressListOpt,
}

/// Classify a header field name per RFC 5322 address semantics.
#[must_use]
pub fn classify_field(name: &str) -> FieldClass {
    // ftext: printable US-ASCII except the colon
    if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b) && b != b':') {
        return FieldClass::Invalid;
    }

    match name.to_ascii_lowercase().as_str() {
        "sender" | "resent-sender" => FieldClass::Mailbox,
        "from" | "resent-from" => FieldClass::MailboxList,
        "to" | "cc" | "reply-to" | "resent-to" | "resent-cc" => FieldClass::AddressList,
        "bcc" | "resent-bcc" => FieldClass::AddressListOpt,
        _ => FieldClass::Unknown,
    }
}

/// Parse a comma-separated address list.
///
/// Accepts bare addresses (`user@example.com`) and named mailboxes
/// (`"User Name" <user@example.com>`); commas inside quoted strings or angle
/// brackets do not split.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the list is empty or any entry
/// fails address validation.
pub fn parse_address_list(input: &str) -> Result<Vec<Mailbox>> {
    let mut mailboxes = Vec::new();
    for item in split_list(input) {
        mailboxes.push(parse_mailbox(item)?);
    }
    if mailboxes.is_empty() {
        return Err(Error::InvalidParameter(
            "address list is empty".to_string(),
        ));
    }
    Ok(mailboxes)
}

/// Split on commas that sit outside quoted strings and angle brackets.
fn split_list(input: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                items.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&input[start..]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse one list entry into a mailbox.
fn parse_mailbox(item: &str) -> Result<Mailbox> {
    if let Some(open) = item.find('<') {
        let close = item.rfind('>').ok_or_else(|| {
            Error::InvalidParameter(format!("unterminated angle bracket in {item:?}"))
        })?;
        if close < open {
            return Err(Error::InvalidParameter(format!(
                "mismatched angle brackets in {item:?}"
            )));
        }
        let address = Address::new(item[open + 1..close].trim())?;
        let name = item[..open].trim().trim_matches('"').trim();
        Ok(Mailbox {
            name: (!name.is_empty()).then(|| name.to_string()),
            address,
        })
    } else {
        Ok(Mailbox {
            name: None,
            address: Address::new(item)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::new("").is_err());
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("a@b@c").is_err());
    }

    #[test]
    fn test_parse_bare_address() {
        let list = parse_address_list("user@example.com").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].address.as_str(), "user@example.com");
        assert!(list[0].name.is_none());
    }

    #[test]
    fn test_parse_named_mailbox() {
        let list = parse_address_list("\"Doe, John\" <john@example.com>").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name.as_deref(), Some("Doe, John"));
        assert_eq!(list[0].address.as_str(), "john@example.com");
    }

    #[test]
    fn test_parse_list() {
        let list = parse_address_list("a@example.com, Bea <b@example.com> , c@example.com").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].name.as_deref(), Some("Bea"));
        assert_eq!(list[2].address.as_str(), "c@example.com");
    }

    #[test]
    fn test_parse_empty_list_fails() {
        assert!(parse_address_list("").is_err());
        assert!(parse_address_list("   ").is_err());
    }

    #[test]
    fn test_parse_bad_entry_fails() {
        assert!(parse_address_list("a@example.com, not-an-address").is_err());
        assert!(parse_address_list("Name <unclosed@example.com").is_err());
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_field("From"), FieldClass::MailboxList);
        assert_eq!(classify_field("sender"), FieldClass::Mailbox);
        assert_eq!(classify_field("To"), FieldClass::AddressList);
        assert_eq!(classify_field("CC"), FieldClass::AddressList);
        assert_eq!(classify_field("Bcc"), FieldClass::AddressListOpt);
        assert_eq!(classify_field("X-Priority"), FieldClass::Unknown);
        assert_eq!(classify_field(""), FieldClass::Invalid);
        assert_eq!(classify_field("Bad Name"), FieldClass::Invalid);
        assert_eq!(classify_field("Bad:Name"), FieldClass::Invalid);
    }
}
