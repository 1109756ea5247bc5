//! XML Encoding Detection
//!
//! Picks the initial decoder from a byte order mark or the byte pattern of
//! `<` in the first two bytes, and resolves encoding labels from the XML
//! declaration through `encoding_rs`.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// Encoding family detected from the first bytes of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl XmlEncoding {
    /// Bytes needed before detection is reliable
    pub const SNIFF_LEN: usize = 3;

    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        if input.len() < 2 {
            return XmlEncoding::Utf8;
        }

        match (input[0], input[1]) {
            (0xFF, 0xFE) => XmlEncoding::Utf16Le,
            (0xFE, 0xFF) => XmlEncoding::Utf16Be,
            (0xEF, 0xBB) if input.len() >= 3 && input[2] == 0xBF => XmlEncoding::Utf8Bom,
            // No BOM: '<' next to a NUL byte
            (0x00, b'<') => XmlEncoding::Utf16Be,
            (b'<', 0x00) => XmlEncoding::Utf16Le,
            _ => XmlEncoding::Utf8,
        }
    }

    pub fn encoding(self) -> &'static Encoding {
        match self {
            XmlEncoding::Utf8 | XmlEncoding::Utf8Bom => UTF_8,
            XmlEncoding::Utf16Le => UTF_16LE,
            XmlEncoding::Utf16Be => UTF_16BE,
        }
    }

    /// Length of the byte order mark to skip
    pub fn bom_len(self, input: &[u8]) -> usize {
        match self {
            XmlEncoding::Utf8Bom => 3,
            XmlEncoding::Utf16Le if input.starts_with(&[0xFF, 0xFE]) => 2,
            XmlEncoding::Utf16Be if input.starts_with(&[0xFE, 0xFF]) => 2,
            _ => 0,
        }
    }

    /// Whether the detected encoding is fixed regardless of the declaration
    ///
    /// Plain UTF-8 is only an assumption until the XML declaration is seen.
    pub fn is_authoritative(self) -> bool {
        self != XmlEncoding::Utf8
    }
}

/// Resolve an encoding label such as `ISO-8859-1` or `utf-8`
pub fn for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}
