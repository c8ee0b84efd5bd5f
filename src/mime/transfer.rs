//! Content-Transfer-Encoding and charset conversion.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use tracing::warn;

/// Base64 engine that accepts missing padding and trailing bits, as real mail does.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encoded line length used for base64 and quoted-printable output.
const LINE_LENGTH: usize = 76;

/// The transfer encodings we know how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    /// `7bit`, `8bit`, `binary`, or absent: bytes are stored as-is.
    Identity,
}

impl TransferEncoding {
    /// Interpret a Content-Transfer-Encoding header value.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("base64") => Self::Base64,
            Some("quoted-printable") => Self::QuotedPrintable,
            _ => Self::Identity,
        }
    }

    /// Decode stored bytes into content bytes.
    pub fn decode(self, raw: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => decode_base64(raw),
            Self::QuotedPrintable => decode_quoted_printable(raw),
            Self::Identity => raw.to_vec(),
        }
    }

    /// Encode content bytes for storage.
    pub fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => encode_base64(data),
            Self::QuotedPrintable => encode_quoted_printable(data),
            Self::Identity => data.to_vec(),
        }
    }
}

/// Base64-encode with CRLF line breaks every 76 characters.
pub fn encode_base64(data: &[u8]) -> Vec<u8> {
    let encoded = LENIENT_BASE64.encode(data);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / LINE_LENGTH * 2 + 2);
    for line in encoded.as_bytes().chunks(LINE_LENGTH) {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Decode base64, ignoring whitespace. Undecodable input yields what
/// could be decoded before the first bad quantum.
pub fn decode_base64(raw: &[u8]) -> Vec<u8> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    match LENIENT_BASE64.decode(&compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Invalid base64 content, decoding the valid prefix");
            let valid = compact
                .iter()
                .position(|&b| !(b.is_ascii_alphanumeric() || b == b'+' || b == b'/'))
                .unwrap_or(compact.len());
            let valid = valid - valid % 4;
            LENIENT_BASE64.decode(&compact[..valid]).unwrap_or_default()
        }
    }
}

/// Quoted-printable encoding (RFC 2045 §6.7) with soft breaks at 76 columns.
///
/// Hard line breaks in the input are written as CRLF.
pub fn encode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    let mut lines = data.split(|&b| b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let has_break = lines.peek().is_some();
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut column = 0;

        for (idx, &byte) in line.iter().enumerate() {
            let at_end = idx + 1 == line.len();
            let literal = match byte {
                b'=' => false,
                b' ' | b'\t' => !at_end,
                33..=126 => true,
                _ => false,
            };
            let width = if literal { 1 } else { 3 };
            // Leave room for the soft-break "=" marker
            if column + width > LINE_LENGTH - 1 {
                out.extend_from_slice(b"=\r\n");
                column = 0;
            }
            if literal {
                out.push(byte);
            } else {
                out.extend_from_slice(format!("={byte:02X}").as_bytes());
            }
            column += width;
        }

        if has_break {
            out.extend_from_slice(b"\r\n");
        }
    }
    out
}

/// Quoted-printable decoding. Soft line breaks (LF or CRLF) are removed;
/// invalid escapes are passed through untransformed.
pub fn decode_quoted_printable(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'=' {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let rest = &raw[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let Some(byte) = rest
            .get(..2)
            .and_then(|pair| crate::mime::header::hex_byte(pair[0], pair[1]))
        {
            out.push(byte);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }
    out
}

/// Decode bytes using a named charset.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let label = charset.trim();
    if label.is_empty()
        || label.eq_ignore_ascii_case("utf-8")
        || label.eq_ignore_ascii_case("utf8")
        || label.eq_ignore_ascii_case("us-ascii")
    {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            warn!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Encode text into a named charset. Unknown charsets are written as UTF-8.
///
/// Returns `None` when the charset cannot represent every character of
/// `text`; the caller must store the text as UTF-8 and relabel the part.
pub fn encode_charset(charset: &str, text: &str) -> Option<Vec<u8>> {
    let label = charset.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
        return Some(text.as_bytes().to_vec());
    }
    if label.eq_ignore_ascii_case("us-ascii") || label.eq_ignore_ascii_case("ascii") {
        return text.is_ascii().then(|| text.as_bytes().to_vec());
    }
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        // UTF-16 labels encode to UTF-8 in encoding_rs, which would mislabel the part
        Some(encoding) if encoding.output_encoding() != encoding => None,
        Some(encoding) => {
            let (encoded, _, had_errors) = encoding.encode(text);
            if had_errors {
                None
            } else {
                Some(encoded.into_owned())
            }
        }
        None => {
            warn!(charset = label, "Unknown charset, writing UTF-8");
            Some(text.as_bytes().to_vec())
        }
    }
}
