use crate::config::RouteConfig;
use crate::error::ParseError;
use crate::mail::{Attachment, Attachments, MailRecord};
use crate::text::{
    escape_html, is_html_body, lines_to_paragraphs, normalize_entities, normalize_line_endings,
    paragraphs_to_lines, remove_inlined_cid_references, remove_signatures, sanitize_html,
    trim_lines, SignatureMatcher,
};
use lazy_static::lazy_static;
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use regex::Regex;

lazy_static! {
    // lead <p>{whitespace}</p> body
    static ref LEAD_SEPARATOR: Regex =
        Regex::new(r"(?is)^(.*?)<p>(?:\s|&nbsp;)*</p>(.*)$").unwrap();
}

const PARAGRAPH_DELIMITER: &str = "\n\n";

/// Turns a raw RFC 822 message into a [`MailRecord`].
pub trait MailParser: Send + Sync {
    fn parse(&self, raw: &[u8], route: Option<&RouteConfig>) -> Result<MailRecord, ParseError>;
}

/// [`MailParser`] backed by the `mail-parser` crate.
#[derive(Debug, Default, Clone)]
pub struct MimeMailParser;

impl MimeMailParser {
    pub fn new() -> Self {
        MimeMailParser
    }
}

impl MailParser for MimeMailParser {
    fn parse(&self, raw: &[u8], route: Option<&RouteConfig>) -> Result<MailRecord, ParseError> {
        let message = MessageParser::default()
            .parse(raw)
            .filter(|message| !message.headers().is_empty())
            .ok_or(ParseError::UnrecognizedFormat)?;

        let subject = message.subject().unwrap_or("").trim().to_string();
        let from = message
            .from()
            .and_then(|from| from.first())
            .and_then(|addr| addr.address())
            .unwrap_or("")
            .to_string();
        let to = message
            .to()
            .map(|to| {
                to.iter()
                    .filter_map(|addr| {
                        let address = addr.address()?;
                        Some(match addr.name() {
                            Some(name) if !name.is_empty() => format!("\"{}\" <{}>", name, address),
                            _ => address.to_string(),
                        })
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();

        let min_image_size = route.map_or(-1, |route| route.image_min_size);
        let attachments = collect_attachments(&message, min_image_size);

        let text = normalize_line_endings(message_text(&message).as_str());
        let signatures = route
            .map(RouteConfig::signature_matchers)
            .unwrap_or_default();

        let (lead, body) = if is_html_body(&text) {
            html_content(&text, &signatures)
        } else {
            plain_text_content(&text, &signatures)
        };

        log::debug!(
            "Parsed message '{}' from {} with {} attachment(s)",
            subject,
            from,
            attachments.len()
        );

        Ok(MailRecord {
            subject,
            from,
            to,
            lead,
            body,
            attachments,
        })
    }
}

/// Keeps every attachment except images whose size does not exceed
/// `min_image_size`. A negative threshold keeps everything.
fn collect_attachments(message: &Message, min_image_size: i64) -> Attachments {
    let mut attachments = Attachments::new();

    for (index, part) in message.attachments().enumerate() {
        let filename = part
            .attachment_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("attachment-{}", index + 1));
        let content_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_default()
            .to_lowercase();
        let data = part.contents();

        if !content_type.starts_with("image") || data.len() as i64 > min_image_size {
            log::info!(
                "Found attachment {} ({}) of size {}",
                filename,
                content_type,
                data.len()
            );
            attachments.insert(filename, Attachment::new(content_type, data.to_vec()));
        } else {
            log::warn!(
                "Skipping attachment {} ({} of size {}) minImageSize is {}",
                filename,
                content_type,
                data.len(),
                min_image_size
            );
        }
    }

    attachments
}

/// Plain text body when present, otherwise the sanitized HTML body.
fn message_text(message: &Message) -> String {
    let plain = message
        .text_body
        .iter()
        .filter_map(|id| message.part(*id))
        .find_map(|part| match &part.body {
            PartType::Text(text) if !text.is_empty() => Some(text.to_string()),
            _ => None,
        });
    if let Some(plain) = plain {
        return plain;
    }

    message
        .html_body
        .iter()
        .filter_map(|id| message.part(*id))
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(sanitize_html(html)),
            _ => None,
        })
        .unwrap_or_default()
}

fn plain_text_content(text: &str, signatures: &[SignatureMatcher]) -> (String, String) {
    let (lead, body) = match text.find(PARAGRAPH_DELIMITER) {
        Some(index) => (
            text[..index].trim(),
            text[index + PARAGRAPH_DELIMITER.len()..].trim(),
        ),
        None => ("", text.trim()),
    };

    // Mail clients mark inlined images with [cid:...] placeholders.
    let lead = remove_inlined_cid_references(lead);
    let body = remove_inlined_cid_references(body).replace('\u{a0}', " ");
    let body = remove_signatures(&body, signatures);

    (escape_html(&lead), format!("<p>{}</p>", escape_html(&body)))
}

fn html_content(text: &str, signatures: &[SignatureMatcher]) -> (String, String) {
    let (lead, body) = match LEAD_SEPARATOR.captures(text) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (String::new(), text.trim().to_string()),
    };

    let lead = normalize_entities(&remove_inlined_cid_references(&lead));
    let lead = trim_lines(paragraphs_to_lines(&lead).trim());

    let body = normalize_entities(&remove_inlined_cid_references(&body));
    let body = remove_signatures(&lines_to_paragraphs(&body), signatures);

    (lead, body)
}
