//! Character set handling for feed bodies.
//!
//! Feeds arrive as bytes in whatever encoding the publisher chose; plenty of
//! older French and Japanese feeds are still ISO-8859-1 or Shift_JIS. The body
//! is decoded once, up front, and the XML declaration is rewritten to say
//! UTF-8 so the parser does not decode it a second time.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// How far into the body the XML declaration is looked for.
const DECLARATION_WINDOW: usize = 1024;

/// Decodes a feed body to text.
///
/// The encoding comes from a byte order mark, else the XML declaration,
/// else UTF-8. Undecodable bytes become U+FFFD.
pub fn decode_body(bytes: &[u8]) -> Cow<'_, str> {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| declared_encoding(bytes))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = used.name(), "Feed body contains undecodable bytes");
    }
    text
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(DECLARATION_WINDOW)]);
    let declaration = xml_declaration(head.trim_start())?;
    let (start, end) = encoding_label_range(declaration)?;
    Encoding::for_label(declaration[start..end].trim().as_bytes())
}

/// Rewrites the declared encoding of already-decoded text to `UTF-8`.
///
/// `xml` must start with its declaration, as [`sanitize_xml`](super::sanitize_xml) output does.
pub fn declare_utf8(xml: &str) -> Cow<'_, str> {
    let Some((start, end)) = xml_declaration(xml).and_then(encoding_label_range) else {
        return Cow::Borrowed(xml);
    };
    if xml[start..end].eq_ignore_ascii_case("utf-8") {
        return Cow::Borrowed(xml);
    }
    Cow::Owned(format!("{}UTF-8{}", &xml[..start], &xml[end..]))
}

/// `<?xml ...` up to (not including) its `?>`.
fn xml_declaration(text: &str) -> Option<&str> {
    // `<?xml-stylesheet` is a processing instruction, not the declaration
    let rest = text.strip_prefix("<?xml")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    text.find("?>").map(|end| &text[..end])
}

/// Byte range of the quoted `encoding` value inside a declaration.
fn encoding_label_range(declaration: &str) -> Option<(usize, usize)> {
    const KEY: &str = "encoding";

    let key = declaration.find(KEY)?;
    let after_key = &declaration[key + KEY.len()..];
    let eq = after_key.find('=')?;
    if !after_key[..eq].trim().is_empty() {
        return None;
    }

    let value = &after_key[eq + 1..];
    let padding = value.len() - value.trim_start().len();
    let value = value.trim_start();
    let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let len = value[1..].find(quote)?;

    let start = key + KEY.len() + eq + 1 + padding + 1;
    Some((start, start + len))
}
