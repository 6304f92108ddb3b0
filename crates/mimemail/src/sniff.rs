//! MIME type classification by content.
//!
//! Used when a payload is attached without an explicit type. The classifier
//! checks well-known magic prefixes first, then probes for HTML markup and
//! plain text, and falls back to `application/octet-stream`.

/// Magic prefixes of common attachment formats, first match wins.
const MAGIC_PREFIXES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B", "application/gzip"),
    (b"<?xml", "text/xml"),
];

/// Classify a payload by its content.
#[must_use]
pub fn mime_type_of(data: &[u8]) -> &'static str {
    for (prefix, mime_type) in MAGIC_PREFIXES {
        if data.starts_with(prefix) {
            return mime_type;
        }
    }
    if looks_like_html(data) {
        return "text/html";
    }
    if looks_like_text(data) {
        return "text/plain";
    }
    "application/octet-stream"
}

fn looks_like_html(data: &[u8]) -> bool {
    let trimmed = skip_ascii_whitespace(data);
    let head_len = trimmed.len().min(16);
    let Some(head) = trimmed.get(..head_len) else {
        return false;
    };
    let head = head.to_ascii_lowercase();
    head.starts_with(b"<!doctype html") || head.starts_with(b"<html")
}

fn looks_like_text(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    match std::str::from_utf8(data) {
        Ok(text) => !text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')),
        Err(_) => false,
    }
}

fn skip_ascii_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(data.len());
    data.get(start..).unwrap_or(&[])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_prefix() {
        assert_eq!(mime_type_of(b"%PDF-1.7 ..."), "application/pdf");
    }

    #[test]
    fn test_png_prefix() {
        assert_eq!(mime_type_of(b"\x89PNG\r\n\x1a\n....IHDR"), "image/png");
    }

    #[test]
    fn test_jpeg_prefix() {
        assert_eq!(mime_type_of(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), "image/jpeg");
    }

    #[test]
    fn test_gif_prefixes() {
        assert_eq!(mime_type_of(b"GIF87a......"), "image/gif");
        assert_eq!(mime_type_of(b"GIF89a......"), "image/gif");
    }

    #[test]
    fn test_html_with_leading_whitespace() {
        assert_eq!(mime_type_of(b"\n  <!DOCTYPE html><html>"), "text/html");
        assert_eq!(mime_type_of(b"<HTML><body>x</body></HTML>"), "text/html");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(mime_type_of(b"just a note\nwith two lines\n"), "text/plain");
        assert_eq!(mime_type_of("accented: héllo".as_bytes()), "text/plain");
    }

    #[test]
    fn test_markup_that_is_not_html_stays_text() {
        assert_eq!(mime_type_of(b"<p>fragment</p>"), "text/plain");
    }

    #[test]
    fn test_binary_fallback() {
        assert_eq!(mime_type_of(&[0x00, 0x01, 0x02, 0xFE]), "application/octet-stream");
        assert_eq!(mime_type_of(b""), "application/octet-stream");
    }
}
