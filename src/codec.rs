//! Format facade.
//!
//! Callers that do not care which serialization a document uses go through
//! this module: [`decode`] sniffs the bytes and dispatches, [`encode`]
//! takes an explicit [`Format`].
//!
//! # Detection
//!
//! | Format   | Rule                                                  |
//! |----------|-------------------------------------------------------|
//! | `Binary` | Buffer starts with the 8-byte magic `bplist00`        |
//! | `Xml`    | First byte after ASCII whitespace is `<`              |
//!
//! The rules are checked in that order and nothing else is attempted; a
//! buffer matching neither is rejected with [`Error::FormatDetection`].

use std::fmt;

use crate::binary;
use crate::error::{Error, Result};
use crate::value::Value;
use crate::xml;

// ── Format ───────────────────────────────────────────────────────────────────

/// One of the two plist serializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Length-prefixed binary layout (`bplist00`).
    Binary,
    /// Indented UTF-8 XML.
    Xml,
}

impl Format {
    /// Stable lowercase name, the inverse of [`Format::from_name`].
    pub fn name(&self) -> &'static str {
        match self {
            Format::Binary => "binary",
            Format::Xml => "xml",
        }
    }

    /// Parses a user-supplied format name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Format> {
        match name.to_ascii_lowercase().as_str() {
            "binary" | "bin" => Some(Format::Binary),
            "xml" => Some(Format::Xml),
            _ => None,
        }
    }

    /// Sniffs which serialization `data` holds, without parsing it.
    pub fn detect(data: &[u8]) -> Option<Format> {
        if data.starts_with(binary::MAGIC) {
            return Some(Format::Binary);
        }
        let first = data.iter().find(|b| !b.is_ascii_whitespace())?;
        (*first == b'<').then_some(Format::Xml)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Facade ───────────────────────────────────────────────────────────────────

/// Serializes a value tree in the requested format.
pub fn encode(root: &Value, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Binary => binary::encode(root),
        Format::Xml => xml::encode(root),
    }
}

/// Detects the serialization of `data` and parses it.
pub fn decode(data: &[u8]) -> Result<Value> {
    match Format::detect(data) {
        Some(Format::Binary) => binary::decode(data),
        Some(Format::Xml) => xml::decode(data),
        None => Err(Error::FormatDetection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_binary_magic() {
        assert_eq!(Format::detect(b"bplist00junk"), Some(Format::Binary));
    }

    #[test]
    fn detects_xml_with_declaration() {
        assert_eq!(Format::detect(b"<?xml version=\"1.0\"?>"), Some(Format::Xml));
    }

    #[test]
    fn detects_xml_after_leading_whitespace() {
        assert_eq!(Format::detect(b"\n\t  <plist>"), Some(Format::Xml));
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        assert_eq!(Format::detect(b"hello"), None);
        assert_eq!(Format::detect(b""), None);
        assert_eq!(Format::detect(b"   \n "), None);
    }

    #[test]
    fn rejects_truncated_magic() {
        assert_eq!(Format::detect(b"bplist0"), None);
    }

    #[test]
    fn format_names_round_trip() {
        assert_eq!(Format::from_name("binary"), Some(Format::Binary));
        assert_eq!(Format::from_name("BIN"), Some(Format::Binary));
        assert_eq!(Format::from_name("Xml"), Some(Format::Xml));
        assert_eq!(Format::from_name("yaml"), None);
        assert_eq!(Format::from_name(Format::Binary.name()), Some(Format::Binary));
        assert_eq!(Format::from_name(Format::Xml.name()), Some(Format::Xml));
    }

    #[test]
    fn decode_dispatches_on_content() {
        let value = Value::Integer(7);
        for format in [Format::Binary, Format::Xml] {
            let bytes = encode(&value, format).unwrap();
            assert_eq!(Format::detect(&bytes), Some(format));
            assert_eq!(decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn decode_rejects_unrecognized_bytes() {
        assert!(matches!(decode(b"not a plist"), Err(Error::FormatDetection)));
    }
}
