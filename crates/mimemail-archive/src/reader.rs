//! Record stream reader.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::{KIND_BOOL, KIND_BYTES, KIND_STREAM};

/// One decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A bool record.
    Bool(bool),
    /// A byte-string record (may hold binary data).
    Bytes(Vec<u8>),
    /// A nested record stream, to be walked with a fresh [`Reader`].
    Stream(Vec<u8>),
}

impl Value {
    /// The bool payload, if this is a bool record.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The byte payload, if this is a byte-string record.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// The payload as UTF-8 text, if this is a byte-string record holding
    /// valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bytes(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// The nested stream bytes, if this is a nested record.
    #[must_use]
    pub fn as_stream(&self) -> Option<&[u8]> {
        match self {
            Self::Stream(data) => Some(data),
            _ => None,
        }
    }
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The record tag.
    pub tag: String,
    /// The optional sub-tag (set for map-valued tags such as headers).
    pub sub_tag: Option<String>,
    /// The payload.
    pub value: Value,
}

/// Walks a record stream one record at a time.
#[derive(Debug)]
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over an encoded stream.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Decode the next record.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends mid-record, a record declares an
    /// empty tag, or a record carries an unknown payload kind. The reader is
    /// not usable past the first error.
    pub fn next_field(&mut self) -> Result<Option<Field>> {
        if self.pos == self.input.len() {
            return Ok(None);
        }

        let record_start = self.pos;
        let tag_len = usize::from(self.take_u8()?);
        if tag_len == 0 {
            return Err(Error::EmptyTag {
                offset: record_start,
            });
        }
        let tag = String::from_utf8_lossy(self.take(tag_len)?).into_owned();

        let sub_len = usize::from(self.take_u16()?);
        let sub_tag = if sub_len == 0 {
            None
        } else {
            Some(String::from_utf8_lossy(self.take(sub_len)?).into_owned())
        };

        let kind_offset = self.pos;
        let kind = self.take_u8()?;
        let value = match kind {
            KIND_BOOL => Value::Bool(self.take_u8()? != 0),
            KIND_BYTES => Value::Bytes(self.take_len_prefixed()?),
            KIND_STREAM => Value::Stream(self.take_len_prefixed()?),
            _ => {
                return Err(Error::UnknownKind {
                    kind,
                    offset: kind_offset,
                });
            }
        };

        Ok(Some(Field {
            tag,
            sub_tag,
            value,
        }))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.input.len() - self.pos;
        if available < n {
            return Err(Error::Truncated {
                offset: self.pos,
                needed: n - available,
            });
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn take_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn take_len_prefixed(&mut self) -> Result<Vec<u8>> {
        let len = self.take_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::Writer;

    #[test]
    fn test_empty_stream_yields_nothing() {
        let mut r = Reader::new(&[]);
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn test_bool_round_trip() {
        let mut w = Writer::new();
        w.bool_field("branding", true);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        let field = r.next_field().unwrap().unwrap();
        assert_eq!(field.tag, "branding");
        assert_eq!(field.sub_tag, None);
        assert_eq!(field.value, Value::Bool(true));
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn test_keyed_round_trip() {
        let mut w = Writer::new();
        w.keyed_field("header", "content-type", "text/plain");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        let field = r.next_field().unwrap().unwrap();
        assert_eq!(field.tag, "header");
        assert_eq!(field.sub_tag.as_deref(), Some("content-type"));
        assert_eq!(field.value.as_str(), Some("text/plain"));
    }

    #[test]
    fn test_nested_round_trip() {
        let mut w = Writer::new();
        w.nested("attachment", |w| {
            w.bytes_field("data", b"\x00\x01binary");
        });
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        let field = r.next_field().unwrap().unwrap();
        assert_eq!(field.tag, "attachment");
        let inner = field.value.as_stream().unwrap();

        let mut sub = Reader::new(inner);
        let data = sub.next_field().unwrap().unwrap();
        assert_eq!(data.tag, "data");
        assert_eq!(data.value.as_bytes(), Some(&b"\x00\x01binary"[..]));
        assert!(sub.next_field().unwrap().is_none());
    }

    #[test]
    fn test_truncated_stream_errors() {
        let mut w = Writer::new();
        w.string_field("data", "hello world");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes[..bytes.len() - 3]);
        assert!(matches!(
            r.next_field(),
            Err(Error::Truncated { needed: 3, .. })
        ));
    }

    #[test]
    fn test_empty_tag_errors() {
        // tag_len of zero
        let mut r = Reader::new(&[0]);
        assert!(matches!(r.next_field(), Err(Error::EmptyTag { offset: 0 })));
    }

    #[test]
    fn test_unknown_kind_errors() {
        // tag "x", no sub-tag, kind 9
        let mut r = Reader::new(&[1, b'x', 0, 0, 9]);
        assert!(matches!(
            r.next_field(),
            Err(Error::UnknownKind { kind: 9, .. })
        ));
    }

    #[test]
    fn test_value_accessors_reject_other_kinds() {
        assert_eq!(Value::Bool(true).as_bytes(), None);
        assert_eq!(Value::Bytes(vec![1]).as_bool(), None);
        assert_eq!(Value::Bytes(vec![0xFF]).as_str(), None);
        assert_eq!(Value::Stream(vec![]).as_bytes(), None);
    }

    proptest! {
        #[test]
        fn test_record_stream_round_trips(
            records in prop::collection::vec(
                (
                    "[a-z]{1,12}",
                    prop::option::of("[a-zA-Z-]{1,24}"),
                    prop::collection::vec(any::<u8>(), 0..256),
                ),
                0..16,
            )
        ) {
            let mut w = Writer::new();
            for (tag, sub, data) in &records {
                match sub {
                    Some(sub) => w.keyed_field(tag, sub, &String::from_utf8_lossy(data)),
                    None => w.bytes_field(tag, data),
                }
            }
            let bytes = w.into_bytes();

            let mut r = Reader::new(&bytes);
            for (tag, sub, data) in &records {
                let field = r.next_field().unwrap().unwrap();
                prop_assert_eq!(&field.tag, tag);
                prop_assert_eq!(&field.sub_tag, sub);
                match sub {
                    Some(_) => {
                        let expected = String::from_utf8_lossy(data);
                        prop_assert_eq!(
                            field.value.as_bytes().unwrap(),
                            expected.as_bytes()
                        );
                    }
                    None => prop_assert_eq!(field.value.as_bytes().unwrap(), &data[..]),
                }
            }
            prop_assert!(r.next_field().unwrap().is_none());
        }
    }
}
