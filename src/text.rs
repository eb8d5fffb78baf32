//! String helpers used to turn e-mail text into article markup.
//!
//! Everything here is pure: no I/O, no logging. The parser composes these
//! functions into the lead/body pipeline.

use lazy_static::lazy_static;
use regex::{Captures, Regex, RegexBuilder};

/// Tags accepted as body markup and kept by [`sanitize_html`].
pub const HTML_BODY_TAGS: [&str; 8] = ["p", "br", "div", "b", "em", "i", "strong", "u"];

const EMPTY_PARAGRAPH: &str = "<p></p>";

lazy_static! {
    static ref CID_REFERENCE: Regex = Regex::new(r"\[cid:.*?\]\n*").unwrap();
    static ref HTML_BODY_TAG: Regex =
        Regex::new(r"(?is)<(p|br|div|b|em|i|strong|u)\b[^>]*>").unwrap();
    static ref PARAGRAPH_OPEN: Regex = Regex::new(r"(?i)<p(\s[^>]*)?>").unwrap();
    static ref PARAGRAPH_CLOSE: Regex = Regex::new(r"(?i)</p\s*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref DECLARATION: Regex = Regex::new(r"<![^>]*>").unwrap();
    static ref ELEMENT_TAG: Regex = Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").unwrap();
    static ref DROPPED_ELEMENTS: Vec<Regex> = ["head", "script", "style", "title"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect();
    static ref XML_ENTITY: Regex =
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos);").unwrap();
}

/// Converts `\r\n` and lone `\r` to `\n`. A space right after a line break
/// (format=flowed continuation) is dropped as well.
pub fn normalize_line_endings<'a>(text: impl Into<Option<&'a str>>) -> String {
    match text.into() {
        Some(text) => text
            .replace("\r\n", "\n")
            .replace("\n ", "\n")
            .replace('\r', "\n"),
        None => String::new(),
    }
}

/// Removes `[cid:...]` inline image placeholders and the newlines following them.
pub fn remove_inlined_cid_references(text: &str) -> String {
    CID_REFERENCE.replace_all(text, "").into_owned()
}

pub fn is_html_body(text: &str) -> bool {
    HTML_BODY_TAG.is_match(text.trim())
}

pub fn trim_lines(text: &str) -> String {
    text.split('\n').map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Wraps every line in `<p>...</p>`, leaving tags that are already present.
/// Trailing empty lines are ignored and empty input yields `<p></p>`.
pub fn lines_to_paragraphs(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    while lines.last().map_or(false, |line| line.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return EMPTY_PARAGRAPH.to_string();
    }

    lines
        .into_iter()
        .map(|line| {
            let mut paragraph = String::with_capacity(line.len() + EMPTY_PARAGRAPH.len());
            if !starts_with_ignore_case(line, "<p>") {
                paragraph.push_str("<p>");
            }
            paragraph.push_str(line);
            if !ends_with_ignore_case(line.trim(), "</p>") {
                paragraph.push_str("</p>");
            }
            paragraph
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`lines_to_paragraphs`]: one line per paragraph, with the
/// newlines inside a paragraph removed. Text found outside paragraphs is
/// kept on its own line; whitespace between paragraphs is dropped.
pub fn paragraphs_to_lines(text: &str) -> String {
    let mut lines = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = PARAGRAPH_OPEN.find(rest) {
        let prefix = rest[..open.start()].trim();
        if !prefix.is_empty() {
            lines.push_str(prefix);
            lines.push('\n');
        }

        let content = &rest[open.end()..];
        match PARAGRAPH_CLOSE.find(content) {
            Some(close) => {
                lines.push_str(&content[..close.start()].replace('\n', ""));
                lines.push('\n');
                rest = &content[close.end()..];
            }
            None => {
                lines.push_str(&content.replace('\n', ""));
                lines.push('\n');
                rest = "";
            }
        }
    }

    let tail = rest.trim();
    if !tail.is_empty() {
        lines.push_str(tail);
    }
    lines
}

/// A compiled signature rule: a multi-line regex and the number of lines
/// preceding the match that belong to the signature.
#[derive(Debug, Clone)]
pub struct SignatureMatcher {
    pattern: Regex,
    before: usize,
}

impl SignatureMatcher {
    pub fn new(regex: &str, before: usize) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(regex).multi_line(true).build()?;
        Ok(Self { pattern, before })
    }

    pub fn before(&self) -> usize {
        self.before
    }

    /// Cuts `text` at the match, drops the `before` preceding lines and
    /// any trailing blank lines. `None` when the pattern does not match.
    fn strip(&self, text: &str) -> Option<String> {
        let found = self.pattern.find(text)?;

        let mut lines: Vec<&str> = text[..found.start()].split('\n').collect();
        while lines.last().map_or(false, |line| line.is_empty()) {
            lines.pop();
        }
        let keep = lines.len().saturating_sub(self.before);
        lines.truncate(keep);
        while lines.last().map_or(false, |line| line.trim().is_empty()) {
            lines.pop();
        }

        Some(lines.join("\n"))
    }
}

/// Applies the first matching signature rule to line-oriented text.
pub fn remove_signature_lines(text: &str, signatures: &[SignatureMatcher]) -> String {
    signatures
        .iter()
        .find_map(|signature| signature.strip(text))
        .unwrap_or_else(|| text.to_string())
}

/// Paragraph-markup variant of [`remove_signature_lines`].
pub fn remove_signature_paragraphs(text: &str, signatures: &[SignatureMatcher]) -> String {
    let lines = paragraphs_to_lines(text);
    match signatures.iter().find_map(|signature| signature.strip(&lines)) {
        Some(stripped) => lines_to_paragraphs(&stripped),
        None => text.to_string(),
    }
}

/// Removes signatures, picking the variant from the presence of `<p>` markup.
pub fn remove_signatures(text: &str, signatures: &[SignatureMatcher]) -> String {
    if text.is_empty() || signatures.is_empty() {
        return text.to_string();
    }
    if text.to_lowercase().contains("<p>") {
        remove_signature_paragraphs(text, signatures)
    } else {
        remove_signature_lines(text, signatures)
    }
}

const LATIN1_ENTITIES: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect", "uml", "copy", "ordf",
    "laquo", "not", "shy", "reg", "macr", "deg", "plusmn", "sup2", "sup3", "acute", "micro",
    "para", "middot", "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil", "Egrave", "Eacute",
    "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml", "ETH", "Ntilde", "Ograve", "Oacute",
    "Ocirc", "Otilde", "Ouml", "times", "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml", "Yacute",
    "THORN", "szlig", "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig", "ccedil",
    "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml", "eth", "ntilde",
    "ograve", "oacute", "ocirc", "otilde", "ouml", "divide", "oslash", "ugrave", "uacute",
    "ucirc", "uuml", "yacute", "thorn", "yuml",
];

fn named_entity(c: char) -> Option<&'static str> {
    match c {
        '\u{a0}'..='\u{ff}' => Some(LATIN1_ENTITIES[c as usize - 0xa0]),
        '\u{20ac}' => Some("euro"),
        '\u{2013}' => Some("ndash"),
        '\u{2014}' => Some("mdash"),
        '\u{2018}' => Some("lsquo"),
        '\u{2019}' => Some("rsquo"),
        '\u{201c}' => Some("ldquo"),
        '\u{201d}' => Some("rdquo"),
        '\u{2022}' => Some("bull"),
        '\u{2026}' => Some("hellip"),
        '\u{2122}' => Some("trade"),
        _ => None,
    }
}

/// Escapes markup characters and turns every non-ASCII character into a
/// named or numeric HTML entity.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c if c.is_ascii() => escaped.push(c),
            c => match named_entity(c) {
                Some(name) => {
                    escaped.push('&');
                    escaped.push_str(name);
                    escaped.push(';');
                }
                None => escaped.push_str(&format!("&#{};", c as u32)),
            },
        }
    }
    escaped
}

/// Resolves the five XML entities and numeric character references.
pub fn unescape_xml(text: &str) -> String {
    XML_ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let resolved = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            match resolved {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Re-encodes non-ASCII characters as entities while leaving markup intact.
pub fn normalize_entities(text: &str) -> String {
    unescape_xml(&escape_html(text))
}

/// Reduces HTML to the [`HTML_BODY_TAGS`] whitelist. Attributes are dropped,
/// `head`, `script`, `style` and `title` elements are removed with their
/// content, and every other tag is removed keeping its text.
pub fn sanitize_html(html: &str) -> String {
    let mut cleaned = COMMENT.replace_all(html, "").into_owned();
    for element in DROPPED_ELEMENTS.iter() {
        cleaned = element.replace_all(&cleaned, "").into_owned();
    }
    cleaned = DECLARATION.replace_all(&cleaned, "").into_owned();

    ELEMENT_TAG
        .replace_all(&cleaned, |caps: &Captures| {
            let name = caps[2].to_ascii_lowercase();
            if !HTML_BODY_TAGS.contains(&name.as_str()) {
                String::new()
            } else if name == "br" {
                "<br>".to_string()
            } else {
                format!("<{}{}>", &caps[1], name)
            }
        })
        .trim()
        .to_string()
}

/// Counts whitespace-separated words once markup has been stripped.
///
/// Tags are replaced by a space before splitting: published bodies are
/// paragraph markup, so `<p>one</p><p>two</p>` counts two words and the
/// tags themselves never count.
pub fn word_count(text: &str) -> usize {
    ANY_TAG.replace_all(text, " ").split_whitespace().count()
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    text.len() >= suffix.len()
        && text
            .get(text.len() - suffix.len()..)
            .map_or(false, |tail| tail.eq_ignore_ascii_case(suffix))
}
