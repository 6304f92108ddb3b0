//! Record stream writer.

use byteorder::{ByteOrder, LittleEndian};

use crate::{KIND_BOOL, KIND_BYTES, KIND_STREAM};

/// Builds a record stream in memory.
///
/// All append operations are infallible; the encoded stream is recovered
/// with [`Writer::into_bytes`].
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return the encoded stream.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append a bool record.
    pub fn bool_field(&mut self, tag: &str, value: bool) {
        self.record_header(tag, None, KIND_BOOL);
        self.buf.push(u8::from(value));
    }

    /// Append a byte-string record.
    pub fn bytes_field(&mut self, tag: &str, data: &[u8]) {
        self.record_header(tag, None, KIND_BYTES);
        self.push_len_prefixed(data);
    }

    /// Append a string record.
    pub fn string_field(&mut self, tag: &str, value: &str) {
        self.bytes_field(tag, value.as_bytes());
    }

    /// Append a string record, or nothing when the value is empty.
    pub fn string_field_if_not_empty(&mut self, tag: &str, value: &str) {
        if !value.is_empty() {
            self.string_field(tag, value);
        }
    }

    /// Append a string record carrying a sub-tag, for map-valued tags.
    pub fn keyed_field(&mut self, tag: &str, sub_tag: &str, value: &str) {
        self.record_header(tag, Some(sub_tag), KIND_BYTES);
        self.push_len_prefixed(value.as_bytes());
    }

    /// Append a nested record stream built by `build`.
    pub fn nested(&mut self, tag: &str, build: impl FnOnce(&mut Writer)) {
        let mut sub = Writer::new();
        build(&mut sub);
        self.record_header(tag, None, KIND_STREAM);
        self.push_len_prefixed(&sub.buf);
    }

    /// Write the tag, optional sub-tag and kind byte of one record.
    ///
    /// Tags are short internal constants; sub-tags are caller-supplied names.
    /// Either is truncated at its length field's maximum, which no sane name
    /// reaches.
    fn record_header(&mut self, tag: &str, sub_tag: Option<&str>, kind: u8) {
        debug_assert!(!tag.is_empty(), "record tags must not be empty");

        let tag_len = u8::try_from(tag.len()).unwrap_or(u8::MAX);
        self.buf.push(tag_len);
        self.buf
            .extend_from_slice(&tag.as_bytes()[..usize::from(tag_len)]);

        let sub = sub_tag.unwrap_or("");
        let sub_len = u16::try_from(sub.len()).unwrap_or(u16::MAX);
        let mut len = [0_u8; 2];
        LittleEndian::write_u16(&mut len, sub_len);
        self.buf.extend_from_slice(&len);
        self.buf
            .extend_from_slice(&sub.as_bytes()[..usize::from(sub_len)]);

        self.buf.push(kind);
    }

    /// Write a `u32` little-endian length followed by the bytes.
    fn push_len_prefixed(&mut self, data: &[u8]) {
        let data_len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let mut len = [0_u8; 4];
        LittleEndian::write_u32(&mut len, data_len);
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(&data[..data_len as usize]);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_field_layout() {
        let mut w = Writer::new();
        w.bool_field("on", true);
        assert_eq!(
            w.into_bytes(),
            vec![2, b'o', b'n', 0, 0, KIND_BOOL, 1],
        );
    }

    #[test]
    fn test_string_field_layout() {
        let mut w = Writer::new();
        w.string_field("k", "ab");
        assert_eq!(
            w.into_bytes(),
            vec![1, b'k', 0, 0, KIND_BYTES, 2, 0, 0, 0, b'a', b'b'],
        );
    }

    #[test]
    fn test_keyed_field_carries_sub_tag() {
        let mut w = Writer::new();
        w.keyed_field("header", "to", "x");
        let bytes = w.into_bytes();
        // tag_len, "header", sub_len (LE), "to", kind
        assert_eq!(
            &bytes[..12],
            &[6, b'h', b'e', b'a', b'd', b'e', b'r', 2, 0, b't', b'o', KIND_BYTES]
        );
    }

    #[test]
    fn test_if_not_empty_skips_empty_values() {
        let mut w = Writer::new();
        w.string_field_if_not_empty("k", "");
        assert!(w.into_bytes().is_empty());
    }

    #[test]
    fn test_nested_is_length_prefixed() {
        let mut inner = Writer::new();
        inner.bool_field("on", false);
        let inner_bytes = inner.into_bytes();

        let mut w = Writer::new();
        w.nested("sub", |w| w.bool_field("on", false));
        let bytes = w.into_bytes();

        // tag_len + "sub" + sub_len + kind + u32 length + payload
        let header_len = 1 + 3 + 2 + 1 + 4;
        assert_eq!(bytes.len(), header_len + inner_bytes.len());
        assert_eq!(&bytes[header_len..], &inner_bytes[..]);
        assert_eq!(bytes[header_len - 4], u8::try_from(inner_bytes.len()).unwrap());
    }
}
