//! Case-insensitive header map.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// One stored header: the display form of the name plus the value.
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

/// Case-insensitive, single-valued header map.
///
/// Lookup and storage fold ASCII case; the display form of a name is the one
/// supplied on the most recent [`set`](HeaderMap::set). Iteration follows the
/// folded-name lexical order, which also fixes the order headers are rendered
/// and archived in.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: BTreeMap<String, Entry>,
}

impl HeaderMap {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Store a header, replacing any previous value stored under the same
    /// case-folded name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "cannot store a header with an empty name".to_string(),
            ));
        }
        self.set_raw(name, value);
        Ok(())
    }

    /// Store a header whose name is a known non-empty literal.
    pub(crate) fn set_raw(&mut self, name: &str, value: &str) {
        self.entries.insert(
            name.to_ascii_lowercase(),
            Entry {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
    }

    /// The value stored under `name`, or `""` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn get(&self, name: &str) -> Result<&str> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "cannot retrieve a header with an empty name".to_string(),
            ));
        }
        Ok(self
            .entries
            .get(&name.to_ascii_lowercase())
            .map_or("", |entry| entry.value.as_str()))
    }

    /// Whether a header is stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `name` is empty.
    pub fn has(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Err(Error::InvalidParameter(
                "cannot check for a header with an empty name".to_string(),
            ));
        }
        Ok(self.entries.contains_key(&name.to_ascii_lowercase()))
    }

    /// Remove the header stored under `name`; no-op when absent.
    pub fn remove(&mut self, name: &str) {
        self.entries.remove(&name.to_ascii_lowercase());
    }

    /// Iterate over `(display name, value)` pairs in folded-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.name.as_str(), entry.value.as_str()))
    }

    /// Iterate over `(folded name, value)` pairs, the form the archival
    /// codec stores.
    pub(crate) fn iter_folded(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(folded, entry)| (folded.as_str(), entry.value.as_str()))
    }

    /// Number of stored headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for HeaderMap {
    /// Two maps are equal when they hold the same fields with the same
    /// values. The display form of the names does not participate, so a
    /// message reloaded from an archive (which stores folded names) still
    /// compares equal to the message it was made from.
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((folded_a, entry_a), (folded_b, entry_b))| {
                    folded_a == folded_b && entry_a.value == entry_b.value
                })
    }
}

impl Eq for HeaderMap {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "text/plain").unwrap();
        assert_eq!(headers.get("Content-Type").unwrap(), "text/plain");
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(headers.get("CONTENT-TYPE").unwrap(), "text/plain");
        assert!(headers.has("cOnTeNt-TyPe").unwrap());
    }

    #[test]
    fn test_last_write_wins() {
        let mut headers = HeaderMap::new();
        headers.set("Subject", "first").unwrap();
        headers.set("SUBJECT", "second").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("subject").unwrap(), "second");
    }

    #[test]
    fn test_display_form_follows_last_set() {
        let mut headers = HeaderMap::new();
        headers.set("MIME-Version", "1.0").unwrap();
        headers.set("Mime-version", "1.0").unwrap();
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Mime-version"]);
    }

    #[test]
    fn test_get_absent_yields_empty() {
        let headers = HeaderMap::new();
        assert_eq!(headers.get("From").unwrap(), "");
        assert!(!headers.has("From").unwrap());
    }

    #[test]
    fn test_empty_name_fails() {
        let mut headers = HeaderMap::new();
        assert!(headers.set("", "x").is_err());
        assert!(headers.get("").is_err());
        assert!(headers.has("").is_err());
    }

    #[test]
    fn test_remove_is_lenient() {
        let mut headers = HeaderMap::new();
        headers.set("X-Test", "1").unwrap();
        headers.remove("x-test");
        assert!(!headers.has("X-Test").unwrap());
        // absent and empty names are both no-ops
        headers.remove("x-test");
        headers.remove("");
    }

    #[test]
    fn test_iteration_is_sorted_by_folded_name() {
        let mut headers = HeaderMap::new();
        headers.set("To", "b@example.com").unwrap();
        headers.set("From", "a@example.com").unwrap();
        headers.set("Date", "today").unwrap();
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Date", "From", "To"]);
    }

    #[test]
    fn test_folded_iteration_lowercases_names() {
        let mut headers = HeaderMap::new();
        headers.set("X-Priority", "3 (normal)").unwrap();
        let folded: Vec<(&str, &str)> = headers.iter_folded().collect();
        assert_eq!(folded, vec![("x-priority", "3 (normal)")]);
    }

    #[test]
    fn test_equality_ignores_display_form() {
        let mut original = HeaderMap::new();
        original.set("Subject", "hello").unwrap();
        let mut reloaded = HeaderMap::new();
        reloaded.set("subject", "hello").unwrap();
        assert_eq!(original, reloaded);

        let mut different = HeaderMap::new();
        different.set("Subject", "goodbye").unwrap();
        assert_ne!(original, different);
    }
}
