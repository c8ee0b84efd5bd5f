//! Read-only digest of a stored message: body text, HTML, attachment listing.
//!
//! This goes through `mail-parser` rather than the part tree, so it is an
//! independent reading of the bytes we write.

use mail_parser::{MessageParser, MimeHeaders};
use serde::Serialize;

/// What a mail client would show for a message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Digest {
    pub subject: Option<String>,
    pub from: Option<String>,
    /// Plain-text body; `mail-parser` renders an HTML-only body as text.
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<AttachmentSummary>,
}

/// One attachment as seen by `mail-parser`.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentSummary {
    pub filename: String,
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: u64,
    pub is_inline: bool,
}

/// Parse a raw message and extract its visible content.
///
/// Returns `None` when `mail-parser` cannot make sense of the bytes.
pub fn summarize(raw_message: &[u8]) -> Option<Digest> {
    let message_bytes = skip_from_line(raw_message);
    let msg = MessageParser::default().parse(message_bytes)?;

    let text = msg.body_text(0).map(|s| s.into_owned());
    let html = msg.body_html(0).map(|s| s.into_owned());

    let from = msg
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(String::from);

    Some(Digest {
        subject: msg.subject().map(String::from),
        from,
        text,
        html,
        attachments: list_attachments(&msg),
    })
}

fn list_attachments(msg: &mail_parser::Message<'_>) -> Vec<AttachmentSummary> {
    msg.attachments()
        .enumerate()
        .map(|(idx, part)| {
            let filename = part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{idx}"));

            let content_type = part
                .content_type()
                .map(|ct: &mail_parser::ContentType| {
                    let main = ct.ctype();
                    match ct.subtype() {
                        Some(sub) => format!("{main}/{sub}"),
                        None => main.to_string(),
                    }
                })
                .unwrap_or_else(|| crate::mime::OCTET_STREAM.to_string());

            let is_inline = part
                .content_disposition()
                .map(|d: &mail_parser::ContentType| d.ctype() == "inline")
                .unwrap_or(false);

            AttachmentSummary {
                filename,
                content_type,
                size: part.contents().len() as u64,
                is_inline,
            }
        })
        .collect()
}

fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_plain() {
        let data = b"From: Alice <alice@example.com>\r\nSubject: Hi\r\n\r\nHello\r\n";
        let digest = summarize(data).unwrap();
        assert_eq!(digest.subject.as_deref(), Some("Hi"));
        assert_eq!(digest.from.as_deref(), Some("alice@example.com"));
        assert!(digest.text.unwrap().contains("Hello"));
        assert!(digest.attachments.is_empty());
    }

    #[test]
    fn test_summarize_attachment() {
        let data = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\nContent-Type: text/plain\r\n\r\nBody\r\n\
--b\r\nContent-Type: application/octet-stream; name=a.bin\r\n\
Content-Disposition: attachment; filename=a.bin\r\n\
Content-Transfer-Encoding: base64\r\n\r\nAQID\r\n--b--\r\n";
        let digest = summarize(data).unwrap();
        assert_eq!(digest.attachments.len(), 1);
        assert_eq!(digest.attachments[0].filename, "a.bin");
        assert_eq!(digest.attachments[0].size, 3);
    }

    #[test]
    fn test_summarize_html_only_has_text() {
        let data = b"Subject: Rich\r\nContent-Type: text/html\r\n\r\n<p>Hello <b>world</b></p>\r\n";
        let digest = summarize(data).unwrap();
        assert!(digest.html.unwrap().contains("<b>world</b>"));
        let text = digest.text.unwrap();
        assert!(text.contains("Hello") && text.contains("world"), "{text:?}");
        assert!(!text.contains('<'));
    }
}
