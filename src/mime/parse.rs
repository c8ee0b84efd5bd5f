//! Structural MIME parser: byte stream to [`PartTree`].
//!
//! Only the structure is interpreted here. Leaf bodies are stored exactly as
//! they appear between delimiters (still transfer-encoded), and each
//! container keeps its preamble as its own body.

use tracing::{debug, trace};

use crate::mime::header;
use crate::mime::part::{PartId, PartTree};
use crate::mime::{MimeError, MAX_DEPTH};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse a complete message. Returns `Ok(None)` when the input holds no
/// content at all (empty or whitespace only).
pub fn parse_tree(data: &[u8]) -> Result<Option<PartTree>, MimeError> {
    let data = strip_envelope(data);
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }

    let mut tree = PartTree::new();
    let root = tree.root();
    parse_part(&mut tree, root, data, 0)?;
    trace!(bytes = data.len(), "Parsed MIME tree");
    Ok(Some(tree))
}

/// Drop a UTF-8 BOM and an mbox `From ` separator line.
fn strip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if data.starts_with(b"From ") {
        return match data.iter().position(|&b| b == b'\n') {
            Some(nl) => &data[nl + 1..],
            None => &[],
        };
    }
    data
}

fn parse_part(tree: &mut PartTree, id: PartId, data: &[u8], depth: usize) -> Result<(), MimeError> {
    if depth > MAX_DEPTH {
        return Err(MimeError::Malformed(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }

    let (header_bytes, body) = split_header_body(data);
    let headers = header::unfold_headers(&header::decode_header_bytes(header_bytes));
    tree.set_headers(id, headers)?;

    if !tree.content_type(id).starts_with("multipart/") {
        return tree.set_raw_body(id, body.to_vec());
    }

    let boundary = tree
        .boundary(id)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| MimeError::Malformed("multipart part without boundary".to_string()))?;
    let (preamble, children) = split_multipart(body, &boundary)?;
    tree.set_raw_body(id, preamble.to_vec())?;

    for child_data in children {
        let child = tree.alloc();
        tree.add_child(id, child)?;
        parse_part(tree, child, child_data, depth + 1)?;
    }
    Ok(())
}

/// Split at the first blank line (LF or CRLF). Input without a blank line is
/// all headers when its first line looks like a header, otherwise all body.
fn split_header_body(data: &[u8]) -> (&[u8], &[u8]) {
    if data.starts_with(b"\r\n") {
        return (&[], &data[2..]);
    }
    if data.starts_with(b"\n") {
        return (&[], &data[1..]);
    }

    let mut i = 0;
    while let Some(offset) = data[i..].iter().position(|&b| b == b'\n') {
        let nl = i + offset;
        let rest = &data[nl + 1..];
        if rest.starts_with(b"\n") {
            return (&data[..nl + 1], &data[nl + 2..]);
        }
        if rest.starts_with(b"\r\n") {
            return (&data[..nl + 1], &data[nl + 3..]);
        }
        i = nl + 1;
    }

    if looks_like_header(data) {
        (data, &[])
    } else {
        (&[], data)
    }
}

fn looks_like_header(data: &[u8]) -> bool {
    let line_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let line = &data[..line_end];
    match line.iter().position(|&b| b == b':') {
        Some(colon) => colon > 0 && line[..colon].iter().all(|b| b.is_ascii_graphic()),
        None => false,
    }
}

/// A boundary delimiter line found in a multipart body.
#[derive(Debug)]
struct Delimiter {
    /// End of the content before it (the line break preceding the
    /// delimiter belongs to the delimiter).
    content_end: usize,
    /// First byte after the delimiter line.
    next: usize,
    closing: bool,
}

fn split_multipart<'a>(
    body: &'a [u8],
    boundary: &str,
) -> Result<(&'a [u8], Vec<&'a [u8]>), MimeError> {
    let marker = format!("--{boundary}");
    let first = find_delimiter(body, marker.as_bytes(), 0).ok_or_else(|| {
        MimeError::Malformed(format!("boundary \"{boundary}\" not found in body"))
    })?;

    let preamble = &body[..first.content_end];
    let mut children = Vec::new();
    let mut current = first;

    while !current.closing {
        match find_delimiter(body, marker.as_bytes(), current.next) {
            Some(next) => {
                children.push(&body[current.next..next.content_end]);
                current = next;
            }
            None => {
                debug!(boundary, "Multipart body has no closing delimiter");
                children.push(&body[current.next..]);
                break;
            }
        }
    }

    Ok((preamble, children))
}

/// Find the next delimiter line at or after `from`, which must be a line start.
fn find_delimiter(body: &[u8], marker: &[u8], from: usize) -> Option<Delimiter> {
    let mut pos = from;
    while pos <= body.len() {
        if body[pos..].starts_with(marker) {
            if let Some((next, closing)) = delimiter_line_end(body, pos + marker.len()) {
                let content_end = if pos >= from + 2 && &body[pos - 2..pos] == b"\r\n" {
                    pos - 2
                } else if pos > from && body[pos - 1] == b'\n' {
                    pos - 1
                } else {
                    pos
                };
                return Some(Delimiter {
                    content_end,
                    next,
                    closing,
                });
            }
        }
        match body[pos..].iter().position(|&b| b == b'\n') {
            Some(offset) => pos += offset + 1,
            None => break,
        }
    }
    None
}

/// Check what follows the marker: optional `--`, optional blanks, then a
/// line end or end of input.
fn delimiter_line_end(body: &[u8], mut idx: usize) -> Option<(usize, bool)> {
    let closing = body[idx..].starts_with(b"--");
    if closing {
        idx += 2;
    }
    while idx < body.len() && (body[idx] == b' ' || body[idx] == b'\t') {
        idx += 1;
    }
    let rest = &body[idx..];
    if rest.is_empty() {
        Some((idx, closing))
    } else if rest.starts_with(b"\r\n") {
        Some((idx + 2, closing))
    } else if rest.starts_with(b"\n") {
        Some((idx + 1, closing))
    } else {
        None
    }
}
