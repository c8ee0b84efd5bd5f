//! MIME part tree: header handling, transfer encodings, an arena of parts,
//! and the reader/writer that move a tree to and from bytes.

pub mod header;
pub mod inspect;
pub mod parse;
pub mod part;
pub mod transfer;
pub mod write;

use thiserror::Error;

pub use part::{PartId, PartTree};

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";
pub const MULTIPART_MIXED: &str = "multipart/mixed";
pub const MULTIPART_ALTERNATIVE: &str = "multipart/alternative";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Preamble written in front of the first boundary of every container we build.
pub const MULTIPART_PREAMBLE: &str = "This is a multi-part message.\r\n\r\n";

/// Maximum nesting depth accepted when parsing (guards against adversarial input).
pub const MAX_DEPTH: usize = 10;

/// Errors raised by the part tree itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MimeError {
    /// The byte stream is not a structurally valid MIME message.
    #[error("Malformed MIME structure: {0}")]
    Malformed(String),

    /// A handle refers to a part that has been freed.
    #[error("Part handle is stale")]
    StalePart,

    /// The part is not a child of the given parent.
    #[error("Part is not attached to the given parent")]
    NotAttached,
}

/// True for a clean content type naming the plain-text body.
pub fn is_text_type(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case(TEXT_PLAIN)
}

/// True for a clean content type naming the HTML body.
pub fn is_html_type(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case(TEXT_HTML)
}
