//! Failure kinds shared by both wire formats.
//!
//! Every decode failure is terminal: no partial tree is ever returned.
//! Binary-side variants carry byte offsets into the input buffer; XML-side
//! variants carry byte offsets into the document text, so a caller can point
//! at the exact spot that broke.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Input starts with neither the binary magic nor anything tag-shaped.
    #[error("Unrecognized input: neither a binary nor an XML property list")]
    FormatDetection,

    /// Binary input whose leading bytes are not the `bplist00` magic.
    #[error("Malformed binary plist header")]
    MalformedHeader,

    /// A declared size runs past the end of the input.
    #[error("Truncated buffer: need {needed} bytes, have {available}")]
    TruncatedBuffer { needed: usize, available: usize },

    /// Object index outside the table declared by the trailer.
    #[error("Object reference {index} out of range for {count} objects")]
    InvalidReference { index: usize, count: usize },

    /// Object reached again while still being resolved.
    #[error("Object {index} participates in a reference cycle")]
    CyclicReference { index: usize },

    /// Marker byte whose type or width nibble is outside the supported set.
    #[error("Unsupported marker byte {marker:#04x} at offset {offset}")]
    UnsupportedMarker { marker: u8, offset: usize },

    /// Structurally addressable binary object with an undecodable payload.
    #[error("Invalid {what} at offset {offset}")]
    InvalidObject { what: &'static str, offset: usize },

    /// Non-well-formed XML document.
    #[error("XML syntax error at byte {offset}: {reason}")]
    XmlSyntax { offset: usize, reason: String },

    /// Element name outside the fixed plist schema.
    #[error("Unknown element <{name}> at byte {offset}")]
    UnknownElement { offset: usize, name: String },

    /// Dict children that do not alternate key, value, key, value.
    #[error("Key/value mismatch at byte {offset}: {reason}")]
    KeyValueMismatch { offset: usize, reason: String },

    /// Well-formed scalar element whose text does not parse.
    #[error("Invalid <{element}> content: {text:?}")]
    InvalidContent { element: &'static str, text: String },

    /// The XML text node character set cannot carry this character.
    #[error("Character {ch:?} cannot be encoded in an XML text node")]
    UnencodableText { ch: char },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
