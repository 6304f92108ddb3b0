//! Quoted-printable payload encoding (RFC 2045 section 6.7).
//!
//! The encoder takes a set of [`QpFlags`] so callers can choose between
//! textual and binary treatment of line endings, pick the soft break style,
//! and protect lone periods from dot-terminated transports. The decoder is
//! deliberately lenient: soft breaks of either style are unfolded and
//! malformed escapes are kept verbatim.

use std::fmt::Write as _;

/// Maximum length of an encoded line, including the soft break marker.
const MAX_LINE_LENGTH: usize = 76;

/// Behavior switches for [`encode_quoted_printable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QpFlags {
    /// Encode CR and LF like any other control byte instead of passing them
    /// through as line breaks.
    pub binary: bool,
    /// Emit `=\n` soft breaks instead of `=\r\n`.
    pub lf_only: bool,
    /// Encode a period standing alone on a line so the output survives
    /// dot-terminated transports such as a sendmail pipe.
    pub no_lone_period: bool,
}

impl QpFlags {
    /// Flags for textual payloads headed to the local MTA: line-feed soft
    /// breaks and lone-period protection.
    #[must_use]
    pub const fn text() -> Self {
        Self {
            binary: false,
            lf_only: true,
            no_lone_period: true,
        }
    }
}

/// Encode data as quoted-printable.
///
/// Printable US-ASCII passes through untouched, everything else becomes an
/// `=XX` escape, and lines are folded with soft breaks so no encoded line
/// exceeds 76 characters. With `flags.binary` unset, CR and LF are treated
/// as line structure and emitted as-is.
#[must_use]
pub fn encode_quoted_printable(data: &[u8], flags: QpFlags) -> String {
    let soft_break = if flags.lf_only { "=\n" } else { "=\r\n" };
    let mut result = String::with_capacity(data.len() + data.len() / 8);
    let mut line_length = 0;
    let mut at_line_start = true;

    for (index, &byte) in data.iter().enumerate() {
        if !flags.binary && byte == b'\n' {
            result.push('\n');
            line_length = 0;
            at_line_start = true;
            continue;
        }
        if !flags.binary && byte == b'\r' {
            // carried through untouched as part of a CRLF pair
            result.push('\r');
            continue;
        }

        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str(soft_break);
            line_length = 0;
            at_line_start = true;
        }

        let next = data.get(index + 1).copied();
        let at_line_end = match next {
            None => true,
            Some(b'\n' | b'\r') => !flags.binary,
            Some(_) => false,
        };

        let escape = match byte {
            b'=' => true,
            b'.' => flags.no_lone_period && at_line_start && at_line_end,
            // trailing whitespace would be stripped in transit
            b' ' | b'\t' => at_line_end,
            b'!'..=b'~' => false,
            _ => true,
        };

        if escape {
            result.push('=');
            let _ = write!(result, "{byte:02X}");
            line_length += 3;
        } else {
            result.push(char::from(byte));
            line_length += 1;
        }
        at_line_start = false;
    }

    result
}

/// Decode quoted-printable data.
///
/// Soft breaks (`=\r\n` and `=\n`) are removed, `=XX` escapes are expanded
/// with either hex case accepted, and anything malformed is kept verbatim so
/// a damaged stream still yields its readable portions.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut index = 0;

    while index < data.len() {
        let byte = data[index];
        if byte != b'=' {
            result.push(byte);
            index += 1;
            continue;
        }
        if data.get(index + 1) == Some(&b'\r') && data.get(index + 2) == Some(&b'\n') {
            index += 3;
            continue;
        }
        if data.get(index + 1) == Some(&b'\n') {
            index += 2;
            continue;
        }
        if let (Some(high), Some(low)) = (
            data.get(index + 1).copied().and_then(hex_value),
            data.get(index + 2).copied().and_then(hex_value),
        ) {
            result.push(high << 4 | low);
            index += 3;
            continue;
        }
        result.push(byte);
        index += 1;
    }

    result
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode_plain_ascii_unchanged() {
        let result = encode_quoted_printable(b"Hello, World!", QpFlags::default());
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_encode_utf8_escaped() {
        let result = encode_quoted_printable("Héllo".as_bytes(), QpFlags::default());
        assert_eq!(result, "H=C3=A9llo");
    }

    #[test]
    fn test_encode_equals_sign() {
        let result = encode_quoted_printable(b"a=b", QpFlags::default());
        assert_eq!(result, "a=3Db");
    }

    #[test]
    fn test_encode_newline_passes_through_in_text_mode() {
        let result = encode_quoted_printable(b"line one\nline two\n", QpFlags::default());
        assert_eq!(result, "line one\nline two\n");
    }

    #[test]
    fn test_encode_newline_escaped_in_binary_mode() {
        let flags = QpFlags {
            binary: true,
            ..QpFlags::default()
        };
        let result = encode_quoted_printable(b"a\r\nb", flags);
        assert_eq!(result, "a=0D=0Ab");
    }

    #[test]
    fn test_encode_trailing_space_escaped() {
        let result = encode_quoted_printable(b"end \nnext", QpFlags::default());
        assert_eq!(result, "end=20\nnext");
    }

    #[test]
    fn test_encode_interior_space_unchanged() {
        let result = encode_quoted_printable(b"a b", QpFlags::default());
        assert_eq!(result, "a b");
    }

    #[test]
    fn test_encode_lone_period_protected() {
        let result = encode_quoted_printable(b"before\n.\nafter", QpFlags::text());
        assert_eq!(result, "before\n=2E\nafter");
    }

    #[test]
    fn test_encode_period_with_company_unchanged() {
        let result = encode_quoted_printable(b".hidden\nsome. thing\n", QpFlags::text());
        assert_eq!(result, ".hidden\nsome. thing\n");
    }

    #[test]
    fn test_encode_lone_period_kept_without_flag() {
        let result = encode_quoted_printable(b"a\n.\nb", QpFlags::default());
        assert_eq!(result, "a\n.\nb");
    }

    #[test]
    fn test_encode_soft_break_style() {
        let long = vec![b'a'; 200];
        let crlf = encode_quoted_printable(&long, QpFlags::default());
        assert!(crlf.contains("=\r\n"));
        let lf = encode_quoted_printable(&long, QpFlags::text());
        assert!(lf.contains("=\n"));
        assert!(!lf.contains('\r'));
    }

    #[test]
    fn test_encode_lines_stay_under_limit() {
        let long = vec![b'x'; 500];
        let result = encode_quoted_printable(&long, QpFlags::text());
        for line in result.split('\n') {
            assert!(line.len() <= MAX_LINE_LENGTH, "line too long: {line:?}");
        }
    }

    #[test]
    fn test_decode_escapes() {
        let result = decode_quoted_printable(b"H=C3=A9llo");
        assert_eq!(result, "Héllo".as_bytes());
    }

    #[test]
    fn test_decode_lowercase_hex() {
        let result = decode_quoted_printable(b"=c3=a9");
        assert_eq!(result, "é".as_bytes());
    }

    #[test]
    fn test_decode_soft_breaks_both_styles() {
        assert_eq!(decode_quoted_printable(b"foo=\r\nbar"), b"foobar");
        assert_eq!(decode_quoted_printable(b"foo=\nbar"), b"foobar");
    }

    #[test]
    fn test_decode_malformed_escape_kept() {
        assert_eq!(decode_quoted_printable(b"=G1"), b"=G1");
        assert_eq!(decode_quoted_printable(b"trailing="), b"trailing=");
    }

    proptest! {
        #[test]
        fn test_round_trip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..512),
                                     binary in any::<bool>(),
                                     lf_only in any::<bool>(),
                                     no_lone_period in any::<bool>()) {
            let flags = QpFlags { binary, lf_only, no_lone_period };
            let encoded = encode_quoted_printable(&data, flags);
            prop_assert_eq!(decode_quoted_printable(encoded.as_bytes()), data);
        }
    }
}
