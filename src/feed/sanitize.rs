//! Best-effort repair of feed bodies that are not well-formed XML.
//!
//! Real-world feeds routinely carry raw `&` in titles, HTML entities XML does
//! not define, stray control characters and HTML void tags such as `<br>`.
//! A strict parser rejects all of these, so [`sanitize_xml`] rewrites them
//! into well-formed equivalents before the body reaches `feed-rs`.

/// Void tags that HTML writes without a closing slash.
///
/// `link` and `source` are deliberately absent: both are regular elements
/// with text content in RSS/Atom.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "wbr", "area", "col"];

const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

/// HTML named entities commonly found in feeds, mapped to code points.
const HTML_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("iexcl", 161),
    ("copy", 169),
    ("laquo", 171),
    ("reg", 174),
    ("deg", 176),
    ("middot", 183),
    ("raquo", 187),
    ("agrave", 224),
    ("ccedil", 231),
    ("egrave", 232),
    ("eacute", 233),
    ("ecirc", 234),
    ("oelig", 339),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("bull", 8226),
    ("hellip", 8230),
    ("euro", 8364),
    ("trade", 8482),
];

/// Longest entity name we look ahead for.
const MAX_ENTITY_LEN: usize = 32;

/// Rewrites `input` into something a strict XML parser accepts.
///
/// - leading BOM and whitespace are dropped (a declaration must come first)
/// - characters outside the XML 1.0 `Char` production are dropped everywhere
/// - CDATA sections and comments are otherwise copied verbatim
/// - unclosed void tags are self-closed and their end tags dropped
/// - the predefined entities and valid numeric references are kept, common
///   HTML entities become numeric references, every other `&` becomes `&amp;`
pub fn sanitize_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 16);
    // Byte offset of the `>` that ends the void tag currently being copied.
    let mut close_at: Option<usize> = None;
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];

        if close_at == Some(i) {
            close_at = None;
            if !out.trim_end().ends_with('/') {
                out.push('/');
            }
            out.push('>');
            i += 1;
            continue;
        }

        if close_at.is_none() {
            if let Some(len) = verbatim_section(rest) {
                out.extend(rest[..len].chars().filter(|&c| is_xml_char(c)));
                i += len;
                continue;
            }
            if let Some(len) = void_end_tag(rest) {
                i += len;
                continue;
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };

        match c {
            '&' => {
                let (replacement, consumed) = reference(rest);
                out.push_str(&replacement);
                i += consumed;
            }
            '<' => {
                if close_at.is_none() {
                    close_at = void_start_tag(rest).map(|gt| i + gt);
                }
                out.push('<');
                i += 1;
            }
            c => {
                if is_xml_char(c) {
                    out.push(c);
                }
                i += c.len_utf8();
            }
        }
    }

    let leading = out.len()
        - out
            .trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace())
            .len();
    out.drain(..leading);
    out
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{d7ff}').contains(&c)
        || ('\u{e000}'..='\u{fffd}').contains(&c)
        || c >= '\u{10000}'
}

/// Length of a CDATA section or comment starting at `rest`, through its terminator.
fn verbatim_section(rest: &str) -> Option<usize> {
    let terminator = if rest.starts_with("<![CDATA[") {
        "]]>"
    } else if rest.starts_with("<!--") {
        "-->"
    } else {
        return None;
    };

    // Unterminated sections run to the end of the document
    Some(
        rest.find(terminator)
            .map(|pos| pos + terminator.len())
            .unwrap_or(rest.len()),
    )
}

/// The ASCII tag name at the start of `s`.
fn tag_name(s: &str) -> &str {
    let end = s
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    &s[..end]
}

fn is_void(name: &str) -> bool {
    VOID_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(name))
}

/// If `rest` opens a void tag, the byte offset of its closing `>`.
fn void_start_tag(rest: &str) -> Option<usize> {
    let after = rest.strip_prefix('<')?;
    let name = tag_name(after);
    if name.is_empty() || !is_void(name) {
        return None;
    }

    let body = &after[name.len()..];
    match body.chars().next() {
        Some(c) if c.is_whitespace() || c == '/' || c == '>' => {}
        _ => return None,
    }

    tag_end(body).map(|offset| 1 + name.len() + offset)
}

/// Offset of the first `>` in `body` outside a quoted attribute value.
///
/// `None` when a bare `<` or the end of input comes first.
pub(super) fn tag_end(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(offset),
            (None, '<') => return None,
            _ => {}
        }
    }

    None
}

/// If `rest` is an end tag of a void element (`</br>`), its length.
fn void_end_tag(rest: &str) -> Option<usize> {
    let after = rest.strip_prefix("</")?;
    let name = tag_name(after);
    if name.is_empty() || !is_void(name) {
        return None;
    }
    let tail = &after[name.len()..];
    let trimmed = tail.trim_start();
    trimmed
        .starts_with('>')
        .then(|| 2 + name.len() + (tail.len() - trimmed.len()) + 1)
}

/// Resolves the `&` at the start of `rest` into its replacement and the
/// number of input bytes it consumes.
fn reference(rest: &str) -> (String, usize) {
    const ESCAPED: (&str, usize) = ("&amp;", 1);

    let body = &rest[1..];
    let name_len = body
        .char_indices()
        .take(MAX_ENTITY_LEN)
        .find(|&(idx, c)| !(c.is_ascii_alphanumeric() || (idx == 0 && c == '#')))
        .map(|(idx, _)| idx);

    let Some(name_len) = name_len else {
        return (ESCAPED.0.to_string(), ESCAPED.1);
    };
    if name_len == 0 || !body[name_len..].starts_with(';') {
        return (ESCAPED.0.to_string(), ESCAPED.1);
    }

    let name = &body[..name_len];
    let consumed = 1 + name_len + 1;

    if XML_ENTITIES.contains(&name) {
        return (rest[..consumed].to_string(), consumed);
    }

    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse::<u32>().ok(),
        };
        return match code.and_then(char::from_u32) {
            Some(c) if is_xml_char(c) => (rest[..consumed].to_string(), consumed),
            _ => (ESCAPED.0.to_string(), ESCAPED.1),
        };
    }

    match HTML_ENTITIES.iter().find(|(entity, _)| *entity == name) {
        Some((_, code)) => (format!("&#{code};"), consumed),
        None => (ESCAPED.0.to_string(), ESCAPED.1),
    }
}
