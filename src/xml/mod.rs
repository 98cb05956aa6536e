//! The XML property list format.
//!
//! Documents look like:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "...">
//! <plist version="1.0">
//! <dict>
//!     <key>name</key>
//!     <string>aurora</string>
//! </dict>
//! </plist>
//! ```
//!
//! The element set is fixed: `plist`, `dict`, `key`, `array`, `string`,
//! `integer`, `real`, `true`, `false`, `date`, `data`. The writer always
//! emits the full prolog; the reader skips prolog pieces it finds and also
//! accepts a bare root value without the `plist` wrapper.

mod reader;
mod writer;

pub use reader::decode;
pub use writer::encode;

/// True for characters permitted in an XML text node: tab, LF, CR, and
/// everything from U+0020 up except the non-characters U+FFFE/U+FFFF.
/// The writer refuses to emit anything else; the reader refuses to accept
/// it, whether literal, inside CDATA, or via a character reference.
pub(crate) fn is_text_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Declaration emitted at the top of every document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Document type declaration emitted after the XML declaration. Never
/// fetched or validated against; readers skip it entirely.
pub const DOCTYPE: &str = r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#;
