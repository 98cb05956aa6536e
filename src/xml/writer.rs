//! XML plist encoder.
//!
//! Output is built directly into a `String`: the element vocabulary is tiny
//! and the nesting discipline is simple enough that a templating layer would
//! only get in the way. Nesting is indented four spaces per level.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::date;
use crate::error::{Error, Result};
use crate::value::Value;

use super::{is_text_char, DOCTYPE, XML_DECLARATION};

const INDENT: &str = "    ";

/// Serializes `root` as a complete XML plist document.
pub fn encode(root: &Value) -> Result<Vec<u8>> {
    let mut out = String::new();
    out.push_str(XML_DECLARATION);
    out.push('\n');
    out.push_str(DOCTYPE);
    out.push('\n');
    out.push_str("<plist version=\"1.0\">\n");
    write_value(&mut out, root, 0)?;
    out.push_str("</plist>\n");
    Ok(out.into_bytes())
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> Result<()> {
    indent(out, depth);
    match value {
        Value::String(s) => {
            out.push_str("<string>");
            escape_into(out, s)?;
            out.push_str("</string>\n");
        }
        Value::Integer(n) => out.push_str(&format!("<integer>{}</integer>\n", n)),
        // f64 Display is the shortest decimal that parses back to the same
        // bits, which is exactly the round-trip guarantee needed here.
        Value::Real(r) => out.push_str(&format!("<real>{}</real>\n", r)),
        Value::Boolean(true) => out.push_str("<true/>\n"),
        Value::Boolean(false) => out.push_str("<false/>\n"),
        Value::Date(d) => out.push_str(&format!("<date>{}</date>\n", date::format_xml(d))),
        Value::Data(bytes) => {
            out.push_str("<data>");
            out.push_str(&STANDARD.encode(bytes));
            out.push_str("</data>\n");
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("<array/>\n");
            } else {
                out.push_str("<array>\n");
                for item in items {
                    write_value(out, item, depth + 1)?;
                }
                indent(out, depth);
                out.push_str("</array>\n");
            }
        }
        Value::Dict(dict) => {
            if dict.is_empty() {
                out.push_str("<dict/>\n");
            } else {
                out.push_str("<dict>\n");
                for (key, value) in dict.iter() {
                    indent(out, depth + 1);
                    out.push_str("<key>");
                    escape_into(out, key)?;
                    out.push_str("</key>\n");
                    write_value(out, value, depth + 1)?;
                }
                indent(out, depth);
                out.push_str("</dict>\n");
            }
        }
    }
    Ok(())
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Escapes text content. XML 1.0 excludes most control characters outright,
/// so those are a hard error rather than an entity.
fn escape_into(out: &mut String, text: &str) -> Result<()> {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if is_text_char(c) => out.push(c),
            c => return Err(Error::UnencodableText { ch: c }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dictionary;
    use chrono::{TimeZone, Utc};

    fn encode_str(value: &Value) -> String {
        String::from_utf8(encode(value).unwrap()).unwrap()
    }

    #[test]
    fn document_has_full_prolog() {
        let doc = encode_str(&Value::from(1i64));
        assert!(doc.starts_with(XML_DECLARATION));
        assert!(doc.contains(DOCTYPE));
        assert!(doc.contains("<plist version=\"1.0\">\n<integer>1</integer>\n</plist>\n"));
    }

    #[test]
    fn text_is_escaped() {
        let doc = encode_str(&Value::from("a < b & c > d"));
        assert!(doc.contains("<string>a &lt; b &amp; c &gt; d</string>"));
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = encode(&Value::from("nul\u{0}")).unwrap_err();
        assert!(matches!(err, Error::UnencodableText { ch: '\u{0}' }));

        let mut dict = Dictionary::new();
        dict.insert("bad\u{1}key", 1);
        assert!(matches!(
            encode(&Value::Dict(dict)),
            Err(Error::UnencodableText { ch: '\u{1}' })
        ));
    }

    #[test]
    fn tab_and_newline_survive() {
        let doc = encode_str(&Value::from("a\tb\nc"));
        assert!(doc.contains("<string>a\tb\nc</string>"));
    }

    #[test]
    fn empty_containers_self_close() {
        assert!(encode_str(&Value::Array(Vec::new())).contains("<array/>"));
        assert!(encode_str(&Value::Dict(Dictionary::new())).contains("<dict/>"));
    }

    #[test]
    fn nested_structure_is_indented() {
        let mut inner = Dictionary::new();
        inner.insert("deep", true);
        let mut dict = Dictionary::new();
        dict.insert("inner", inner);
        let doc = encode_str(&Value::Dict(dict));
        assert!(doc.contains("<dict>\n    <key>inner</key>\n    <dict>\n        <key>deep</key>\n        <true/>\n    </dict>\n</dict>"));
    }

    #[test]
    fn date_is_fraction_free_utc() {
        let date = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let doc = encode_str(&Value::from(date));
        assert!(doc.contains("<date>2025-01-01T12:00:00Z</date>"));
    }

    #[test]
    fn data_is_standard_base64() {
        let doc = encode_str(&Value::Data(b"BinaryData".to_vec()));
        assert!(doc.contains("<data>QmluYXJ5RGF0YQ==</data>"));
    }
}
