//! XML plist decoder.
//!
//! A hand-rolled pull tokenizer walks the document once, handing tags and
//! text to a recursive-descent builder. The tokenizer understands exactly
//! as much XML as plists need: tags with ignorable attributes, character
//! data with entities, CDATA, comments, processing instructions and the
//! doctype. Text is held to the XML character set whether it arrives
//! literally, inside CDATA, or as a character reference. The builder
//! enforces the plist schema on top of that, with one tolerance: a bare
//! root value without the `<plist>` wrapper is accepted.
//!
//! All positions in errors are byte offsets into the document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::date;
use crate::error::{Error, Result};
use crate::value::{Dictionary, Value};

use super::is_text_char;

/// Deepest accepted container nesting; deeper documents fail with a syntax
/// error instead of growing the stack without bound.
const MAX_DEPTH: usize = 512;

/// Parses a complete XML plist document into a value tree.
pub fn decode(buf: &[u8]) -> Result<Value> {
    let src = std::str::from_utf8(buf).map_err(|e| Error::XmlSyntax {
        offset: e.valid_up_to(),
        reason: "document is not valid UTF-8".to_string(),
    })?;
    let mut parser = Parser::new(src);
    parser.parse_document()
}

// ── Tokenizer ────────────────────────────────────────────────────────────────

enum Token<'a> {
    /// `<name ...>` or `<name ... />`. Attributes are skipped.
    Open { name: &'a str, self_closing: bool, offset: usize },
    /// `</name>`.
    Close { name: &'a str, offset: usize },
    /// Character data between tags, entity-decoded. CDATA arrives raw.
    Text { content: String, offset: usize },
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser { src, pos: 0, depth: 0 }
    }

    /// Next tag or text run. Prolog pieces (declaration, doctype, comments,
    /// processing instructions) are consumed silently.
    fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        loop {
            if self.pos >= self.src.len() {
                return Ok(None);
            }
            let rest = &self.src[self.pos..];
            if let Some(after_bracket) = rest.strip_prefix('<') {
                if after_bracket.starts_with('?') {
                    self.skip_processing_instruction()?;
                } else if after_bracket.starts_with("!--") {
                    self.skip_comment()?;
                } else if after_bracket.starts_with("![CDATA[") {
                    return self.read_cdata().map(Some);
                } else if after_bracket.starts_with('!') {
                    self.skip_declaration()?;
                } else if after_bracket.starts_with('/') {
                    return self.read_close_tag().map(Some);
                } else {
                    return self.read_open_tag().map(Some);
                }
            } else {
                return self.read_text().map(Some);
            }
        }
    }

    /// Like [`next_token`], but drops whitespace-only text. Used everywhere
    /// except inside scalar elements, where whitespace is content.
    fn next_significant(&mut self) -> Result<Option<Token<'a>>> {
        loop {
            match self.next_token()? {
                Some(Token::Text { content, offset }) => {
                    if !content.trim().is_empty() {
                        return Ok(Some(Token::Text { content, offset }));
                    }
                }
                other => return Ok(other),
            }
        }
    }

    fn read_text(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let end = self.src[start..]
            .find('<')
            .map(|i| start + i)
            .unwrap_or(self.src.len());
        self.pos = end;
        Ok(Token::Text {
            content: decode_entities(&self.src[start..end], start)?,
            offset: start,
        })
    }

    fn read_open_tag(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let end = self.find_tag_end(start)?;
        let inner = &self.src[start + 1..end];
        let (inner, self_closing) = match inner.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (inner, false),
        };
        let name = inner
            .split_whitespace()
            .next()
            .ok_or_else(|| self.syntax(start, "tag without a name"))?;
        self.pos = end + 1;
        Ok(Token::Open { name, self_closing, offset: start })
    }

    fn read_close_tag(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let end = self.find_tag_end(start)?;
        let name = self.src[start + 2..end].trim();
        if name.is_empty() {
            return Err(self.syntax(start, "closing tag without a name"));
        }
        self.pos = end + 1;
        Ok(Token::Close { name, offset: start })
    }

    fn read_cdata(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let content_start = start + "<![CDATA[".len();
        let end = self.src[content_start..]
            .find("]]>")
            .map(|i| content_start + i)
            .ok_or_else(|| self.syntax(start, "unterminated CDATA section"))?;
        let content = &self.src[content_start..end];
        check_text_chars(content, content_start)?;
        self.pos = end + 3;
        Ok(Token::Text {
            content: content.to_string(),
            offset: start,
        })
    }

    fn skip_processing_instruction(&mut self) -> Result<()> {
        let start = self.pos;
        let end = self.src[start..]
            .find("?>")
            .map(|i| start + i)
            .ok_or_else(|| self.syntax(start, "unterminated processing instruction"))?;
        self.pos = end + 2;
        Ok(())
    }

    fn skip_comment(&mut self) -> Result<()> {
        let start = self.pos;
        let end = self.src[start + 4..]
            .find("-->")
            .map(|i| start + 4 + i)
            .ok_or_else(|| self.syntax(start, "unterminated comment"))?;
        self.pos = end + 3;
        Ok(())
    }

    /// Skips `<!DOCTYPE ...>`, including an internal subset in brackets.
    fn skip_declaration(&mut self) -> Result<()> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut depth = 0usize;
        let mut i = start;
        while i < bytes.len() {
            match bytes[i] {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => {
                    self.pos = i + 1;
                    return Ok(());
                }
                _ => {}
            }
            i += 1;
        }
        Err(self.syntax(start, "unterminated markup declaration"))
    }

    /// Index of the `>` closing the tag at `start`, honoring quoted
    /// attribute values.
    fn find_tag_end(&self, start: usize) -> Result<usize> {
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        let mut i = start;
        while i < bytes.len() {
            match (quote, bytes[i]) {
                (None, b'>') => return Ok(i),
                (None, q @ (b'"' | b'\'')) => quote = Some(q),
                (Some(q), byte) if byte == q => quote = None,
                _ => {}
            }
            i += 1;
        }
        Err(self.syntax(start, "unterminated tag"))
    }

    fn syntax(&self, offset: usize, reason: &str) -> Error {
        Error::XmlSyntax {
            offset,
            reason: reason.to_string(),
        }
    }

    /// Counts one level of container nesting; fails past [`MAX_DEPTH`].
    /// The matching decrement sits at each call site.
    fn enter(&mut self, offset: usize) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(self.syntax(offset, "container nesting exceeds the supported depth"));
        }
        self.depth += 1;
        Ok(())
    }

    // ── Schema ───────────────────────────────────────────────────────────────

    fn parse_document(&mut self) -> Result<Value> {
        let root = match self.next_significant()? {
            Some(Token::Open { name: "plist", self_closing, offset }) => {
                if self_closing {
                    return Err(self.syntax(offset, "<plist> holds no value"));
                }
                let value = self.expect_value("plist")?;
                self.expect_close("plist")?;
                value
            }
            Some(Token::Open { name, self_closing, offset }) => {
                self.parse_value(name, self_closing, offset)?
            }
            Some(Token::Close { name, offset }) => {
                return Err(self.syntax(offset, &format!("closing </{}> before any value", name)));
            }
            Some(Token::Text { offset, .. }) => {
                return Err(self.syntax(offset, "text outside any element"));
            }
            None => return Err(self.syntax(0, "document holds no value")),
        };
        match self.next_significant()? {
            None => Ok(root),
            Some(
                Token::Open { offset, .. }
                | Token::Close { offset, .. }
                | Token::Text { offset, .. },
            ) => Err(self.syntax(offset, "content after the document root")),
        }
    }

    /// One value element, already opened. Everything outside the fixed
    /// element set is an unknown-element failure, never skipped.
    fn parse_value(&mut self, name: &'a str, self_closing: bool, offset: usize) -> Result<Value> {
        match name {
            "dict" => {
                if self_closing {
                    Ok(Value::Dict(Dictionary::new()))
                } else {
                    self.enter(offset)?;
                    let dict = self.parse_dict()?;
                    self.depth -= 1;
                    Ok(dict)
                }
            }
            "array" => {
                if self_closing {
                    Ok(Value::Array(Vec::new()))
                } else {
                    self.enter(offset)?;
                    let array = self.parse_array()?;
                    self.depth -= 1;
                    Ok(array)
                }
            }
            "string" => Ok(Value::String(self.element_text("string", self_closing)?)),
            "integer" => {
                let text = self.element_text("integer", self_closing)?;
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| Error::InvalidContent {
                        element: "integer",
                        text: trimmed.to_string(),
                    })
            }
            "real" => {
                let text = self.element_text("real", self_closing)?;
                let trimmed = text.trim();
                trimmed
                    .parse::<f64>()
                    .map(Value::Real)
                    .map_err(|_| Error::InvalidContent {
                        element: "real",
                        text: trimmed.to_string(),
                    })
            }
            "true" => {
                self.finish_empty("true", self_closing)?;
                Ok(Value::Boolean(true))
            }
            "false" => {
                self.finish_empty("false", self_closing)?;
                Ok(Value::Boolean(false))
            }
            "date" => {
                let text = self.element_text("date", self_closing)?;
                let trimmed = text.trim();
                date::parse_xml(trimmed)
                    .map(Value::Date)
                    .ok_or_else(|| Error::InvalidContent {
                        element: "date",
                        text: trimmed.to_string(),
                    })
            }
            "data" => {
                let text = self.element_text("data", self_closing)?;
                let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(cleaned.as_bytes())
                    .map(Value::Data)
                    .map_err(|_| Error::InvalidContent {
                        element: "data",
                        text: cleaned,
                    })
            }
            "key" => Err(Error::KeyValueMismatch {
                offset,
                reason: "key element outside a dict".to_string(),
            }),
            "plist" => Err(self.syntax(offset, "nested <plist> element")),
            _ => Err(Error::UnknownElement {
                offset,
                name: name.to_string(),
            }),
        }
    }

    /// Children must strictly alternate `<key>` and a value element.
    fn parse_dict(&mut self) -> Result<Value> {
        let mut dict = Dictionary::new();
        loop {
            match self.next_significant()? {
                Some(Token::Open { name: "key", self_closing, .. }) => {
                    let key = self.element_text("key", self_closing)?;
                    match self.next_significant()? {
                        Some(Token::Open { name, self_closing, offset }) => {
                            if name == "key" {
                                return Err(Error::KeyValueMismatch {
                                    offset,
                                    reason: format!("key {:?} has no value", key),
                                });
                            }
                            let value = self.parse_value(name, self_closing, offset)?;
                            dict.insert(key, value);
                        }
                        Some(Token::Close { name: "dict", offset }) => {
                            return Err(Error::KeyValueMismatch {
                                offset,
                                reason: format!("key {:?} has no value", key),
                            });
                        }
                        Some(Token::Close { name, offset }) => {
                            return Err(self.syntax(
                                offset,
                                &format!("expected a value element, found </{}>", name),
                            ));
                        }
                        Some(Token::Text { offset, .. }) => {
                            return Err(self.syntax(offset, "unexpected text inside <dict>"));
                        }
                        None => return Err(self.syntax(self.pos, "unterminated <dict> element")),
                    }
                }
                Some(Token::Open { name, offset, .. }) => {
                    return Err(Error::KeyValueMismatch {
                        offset,
                        reason: format!("<{}> value with no preceding key", name),
                    });
                }
                Some(Token::Close { name: "dict", .. }) => return Ok(Value::Dict(dict)),
                Some(Token::Close { name, offset }) => {
                    return Err(self.syntax(offset, &format!("expected </dict>, found </{}>", name)));
                }
                Some(Token::Text { offset, .. }) => {
                    return Err(self.syntax(offset, "unexpected text inside <dict>"));
                }
                None => return Err(self.syntax(self.pos, "unterminated <dict> element")),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match self.next_significant()? {
                Some(Token::Open { name, self_closing, offset }) => {
                    items.push(self.parse_value(name, self_closing, offset)?);
                }
                Some(Token::Close { name: "array", .. }) => return Ok(Value::Array(items)),
                Some(Token::Close { name, offset }) => {
                    return Err(
                        self.syntax(offset, &format!("expected </array>, found </{}>", name))
                    );
                }
                Some(Token::Text { offset, .. }) => {
                    return Err(self.syntax(offset, "unexpected text inside <array>"));
                }
                None => return Err(self.syntax(self.pos, "unterminated <array> element")),
            }
        }
    }

    /// Raw text content up to the matching close tag. Nothing is trimmed
    /// here; `<string>` and `<key>` content is taken verbatim.
    fn element_text(&mut self, name: &'static str, self_closing: bool) -> Result<String> {
        if self_closing {
            return Ok(String::new());
        }
        let mut text = String::new();
        loop {
            match self.next_token()? {
                Some(Token::Text { content, .. }) => text.push_str(&content),
                Some(Token::Close { name: n, offset }) => {
                    if n == name {
                        return Ok(text);
                    }
                    return Err(self.syntax(offset, &format!("expected </{}>, found </{}>", name, n)));
                }
                Some(Token::Open { name: n, offset, .. }) => {
                    return Err(self.syntax(offset, &format!("unexpected <{}> inside <{}>", n, name)));
                }
                None => {
                    return Err(self.syntax(self.pos, &format!("unterminated <{}> element", name)));
                }
            }
        }
    }

    fn finish_empty(&mut self, name: &'static str, self_closing: bool) -> Result<()> {
        if self_closing {
            return Ok(());
        }
        self.expect_close(name)
    }

    fn expect_value(&mut self, parent: &'static str) -> Result<Value> {
        match self.next_significant()? {
            Some(Token::Open { name, self_closing, offset }) => {
                self.parse_value(name, self_closing, offset)
            }
            Some(Token::Close { offset, .. }) => {
                Err(self.syntax(offset, &format!("<{}> holds no value", parent)))
            }
            Some(Token::Text { offset, .. }) => {
                Err(self.syntax(offset, &format!("unexpected text inside <{}>", parent)))
            }
            None => Err(self.syntax(self.pos, &format!("unterminated <{}> element", parent))),
        }
    }

    fn expect_close(&mut self, name: &'static str) -> Result<()> {
        match self.next_significant()? {
            Some(Token::Close { name: n, .. }) if n == name => Ok(()),
            Some(Token::Open { offset, .. }) => {
                Err(self.syntax(offset, &format!("multiple values inside <{}>", name)))
            }
            Some(Token::Close { name: n, offset }) => {
                Err(self.syntax(offset, &format!("expected </{}>, found </{}>", name, n)))
            }
            Some(Token::Text { offset, .. }) => {
                Err(self.syntax(offset, &format!("unexpected text inside <{}>", name)))
            }
            None => Err(self.syntax(self.pos, &format!("unterminated <{}> element", name))),
        }
    }
}

// ── Entities ─────────────────────────────────────────────────────────────────

/// Decodes the five named entities plus decimal and hex character
/// references. Unknown entities, and references resolving outside the XML
/// character set, are syntax failures.
fn decode_entities(raw: &str, base: usize) -> Result<String> {
    check_text_chars(raw, base)?;
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while let Some(amp) = raw[i..].find('&') {
        out.push_str(&raw[i..i + amp]);
        let entity_start = i + amp;
        let semi = raw[entity_start..].find(';').ok_or(Error::XmlSyntax {
            offset: base + entity_start,
            reason: "unterminated entity reference".to_string(),
        })?;
        let entity = &raw[entity_start + 1..entity_start + semi];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()));
                match code.and_then(|parsed| parsed.ok()).and_then(char::from_u32) {
                    Some(ch) if is_text_char(ch) => out.push(ch),
                    Some(_) => {
                        return Err(Error::XmlSyntax {
                            offset: base + entity_start,
                            reason: format!(
                                "character reference &{}; is outside the XML character set",
                                entity
                            ),
                        })
                    }
                    None => {
                        return Err(Error::XmlSyntax {
                            offset: base + entity_start,
                            reason: format!("unknown entity &{};", entity),
                        })
                    }
                }
            }
        }
        i = entity_start + semi + 1;
    }
    out.push_str(&raw[i..]);
    Ok(out)
}

/// Rejects literal text containing characters XML forbids, pointing at the
/// first offender.
fn check_text_chars(text: &str, base: usize) -> Result<()> {
    match text.char_indices().find(|&(_, c)| !is_text_char(c)) {
        Some((i, ch)) => Err(Error::XmlSyntax {
            offset: base + i,
            reason: format!("character {:?} is not allowed in XML text", ch),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn parse(doc: &str) -> Result<Value> {
        decode(doc.as_bytes())
    }

    #[test]
    fn bare_root_value_is_accepted() {
        assert_eq!(parse("<integer>5</integer>").unwrap(), Value::Integer(5));
    }

    #[test]
    fn plist_wrapper_and_version_attribute_are_ignored() {
        let value = parse("<plist version=\"1.0\"><true/></plist>").unwrap();
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn prolog_pieces_are_skipped() {
        let doc = "<?xml version=\"1.0\"?>\n\
                   <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
                   <!-- generated -->\n\
                   <plist version=\"1.0\"><integer>3</integer></plist>\n";
        assert_eq!(parse(doc).unwrap(), Value::Integer(3));
    }

    #[test]
    fn self_closing_variants_are_accepted() {
        assert_eq!(parse("<true />").unwrap(), Value::Boolean(true));
        assert_eq!(parse("<false></false>").unwrap(), Value::Boolean(false));
        assert_eq!(parse("<string/>").unwrap(), Value::String(String::new()));
        assert_eq!(parse("<dict />").unwrap(), Value::Dict(Dictionary::new()));
        assert_eq!(parse("<array/>").unwrap(), Value::Array(Vec::new()));
    }

    #[test]
    fn string_content_is_verbatim() {
        assert_eq!(
            parse("<string>  spaced  </string>").unwrap(),
            Value::String("  spaced  ".to_string())
        );
    }

    #[test]
    fn numeric_content_is_trimmed() {
        assert_eq!(parse("<integer>\n    42\n</integer>").unwrap(), Value::Integer(42));
        assert_eq!(parse("<real> 2.5 </real>").unwrap(), Value::Real(2.5));
    }

    #[test]
    fn entities_decode() {
        assert_eq!(
            parse("<string>a &lt;&gt; b &amp; &quot;c&apos; &#65;&#x42;</string>").unwrap(),
            Value::String("a <> b & \"c' AB".to_string())
        );
    }

    #[test]
    fn unknown_entity_is_a_syntax_error() {
        assert!(matches!(
            parse("<string>&nbsp;</string>"),
            Err(Error::XmlSyntax { .. })
        ));
    }

    #[test]
    fn character_references_stay_inside_the_xml_set() {
        // Tab and newline are referencable; NUL, other controls and the
        // non-characters are not, no matter how they are spelled.
        assert_eq!(
            parse("<string>a&#9;b&#xA;c</string>").unwrap(),
            Value::String("a\tb\nc".to_string())
        );
        for doc in [
            "<string>&#0;</string>",
            "<string>&#x1F;</string>",
            "<string>&#xFFFF;</string>",
        ] {
            assert!(matches!(parse(doc), Err(Error::XmlSyntax { .. })), "{doc}");
        }
    }

    #[test]
    fn literal_control_characters_are_rejected() {
        assert!(matches!(
            parse("<string>bad\u{1}text</string>"),
            Err(Error::XmlSyntax { .. })
        ));
        assert!(matches!(
            parse("<string><![CDATA[bad\u{1}text]]></string>"),
            Err(Error::XmlSyntax { .. })
        ));
    }

    #[test]
    fn cdata_is_raw_text() {
        assert_eq!(
            parse("<string><![CDATA[1 < 2 & 3]]></string>").unwrap(),
            Value::String("1 < 2 & 3".to_string())
        );
    }

    #[test]
    fn data_tolerates_wrapped_base64() {
        let value = parse("<data>\n    SGVsbG8g\n    V29ybGQ=\n</data>").unwrap();
        assert_eq!(value, Value::Data(b"Hello World".to_vec()));
    }

    #[test]
    fn dates_accept_offsets() {
        let value = parse("<date>2025-01-01T14:00:00+02:00</date>").unwrap();
        assert_eq!(
            value,
            Value::Date(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn dict_pairs_in_document_order() {
        let doc = "<dict>\n\
                     <key>b</key><integer>2</integer>\n\
                     <key>a</key><integer>1</integer>\n\
                   </dict>";
        let value = parse(doc).unwrap();
        let dict = value.as_dict().unwrap();
        let keys: Vec<&str> = dict.keys().collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn unknown_elements_fail() {
        let err = parse("<plist><widget/></plist>").unwrap_err();
        match err {
            Error::UnknownElement { name, .. } => assert_eq!(name, "widget"),
            other => panic!("expected UnknownElement, got {:?}", other),
        }
    }

    #[test]
    fn content_after_root_fails() {
        assert!(matches!(
            parse("<integer>1</integer><integer>2</integer>"),
            Err(Error::XmlSyntax { .. })
        ));
    }

    #[test]
    fn multiple_values_inside_plist_fail() {
        assert!(matches!(
            parse("<plist><true/><false/></plist>"),
            Err(Error::XmlSyntax { .. })
        ));
    }
}
