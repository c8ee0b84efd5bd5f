//! RFC 5322 header handling: unfolding, encoded-words (RFC 2047),
//! structured parameters, and date parsing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// One header line, with the name as written and the value unfolded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold a header block: continuation lines (leading space or tab) are
/// joined to the previous field with a single space.
///
/// Lines that are neither a continuation nor contain a colon are dropped.
pub fn unfold_headers(text: &str) -> Vec<HeaderField> {
    let mut result: Vec<HeaderField> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                if !last.value.is_empty() {
                    last.value.push(' ');
                }
                last.value.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim();
            if name.is_empty() {
                continue;
            }
            result.push(HeaderField::new(name, line[colon_pos + 1..].trim()));
        }
    }

    result
}

// ── Encoded words ───────────────────────────────────────────────

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Tokens that fail to decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is not part of the text
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match decode_one_word(after_start) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`, returning the text and the bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(encoded_text.trim()).ok()?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 allows a language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    let consumed = first_q + 1 + second_q + 1 + end + 2;
    Some((crate::mime::transfer::decode_charset(charset, &bytes), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match hex_byte(bytes[i + 1], bytes[i + 2]) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

pub(crate) fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let digit = |c: u8| (c as char).to_digit(16);
    Some((digit(hi)? * 16 + digit(lo)?) as u8)
}

/// Encode a unicode header value for the wire.
///
/// Pure ASCII is returned unchanged; anything else becomes a run of
/// `=?UTF-8?B?...?=` words, each carrying at most 45 bytes of UTF-8 so
/// that no word exceeds 75 characters.
pub fn encode_unicode_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_len = 0;
    for (idx, ch) in value.char_indices() {
        if chunk_len + ch.len_utf8() > 45 {
            words.push(encode_word(&value[chunk_start..idx]));
            chunk_start = idx;
            chunk_len = 0;
        }
        chunk_len += ch.len_utf8();
    }
    if chunk_start < value.len() {
        words.push(encode_word(&value[chunk_start..]));
    }
    words.join(" ")
}

fn encode_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(text.as_bytes()))
}

// ── Structured parameters ───────────────────────────────────────

/// Split a structured value (`type/sub; a=b; c="d; e"`) into its main token
/// and its parameters. Parameter names are lower-cased; quotes are removed.
pub fn parse_params(value: &str) -> (String, Vec<(String, String)>) {
    let mut segments = split_unquoted(value, ';').into_iter();
    let main = segments.next().unwrap_or_default().trim().to_string();

    let params = segments
        .filter_map(|segment| {
            let (name, val) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, unquote(val.trim())))
        })
        .collect();

    (main, params)
}

/// Build a structured value from a main token and parameters, quoting
/// parameter values that are not plain tokens.
pub fn format_params(main: &str, params: &[(String, String)]) -> String {
    let mut out = main.to_string();
    for (name, value) in params {
        out.push_str("; ");
        out.push_str(name);
        out.push('=');
        if !value.is_empty() && value.bytes().all(is_token_byte) {
            out.push_str(value);
        } else {
            out.push('"');
            for ch in value.chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
        }
    }
    out
}

/// Look up a parameter by name (case-insensitive), honouring RFC 2231
/// `name*=charset''percent-encoded` values.
pub fn get_param(params: &[(String, String)], name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    let extended = format!("{name}*");
    if let Some((_, v)) = params.iter().find(|(k, _)| *k == extended) {
        return Some(decode_rfc2231(v));
    }
    params
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.clone())
}

/// Replace (or append) a parameter, dropping any extended variant of it.
pub fn set_param(params: &mut Vec<(String, String)>, name: &str, value: &str) {
    let name = name.to_ascii_lowercase();
    let extended = format!("{name}*");
    params.retain(|(k, _)| *k != extended);
    match params.iter_mut().find(|(k, _)| *k == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => params.push((name, value.to_string())),
    }
}

fn decode_rfc2231(value: &str) -> String {
    let mut parts = value.splitn(3, '\'');
    let (charset, _lang, encoded) = match (parts.next(), parts.next(), parts.next()) {
        (Some(c), Some(l), Some(e)) => (c, l, e),
        _ => return value.to_string(),
    };
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(b) = hex_byte(bytes[i + 1], bytes[i + 2]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    crate::mime::transfer::decode_charset(charset, &out)
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let inner = &s[1..s.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut escaped = false;
        for ch in inner.chars() {
            if escaped {
                out.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        s.to_string()
    }
}

fn split_unquoted(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in s.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c == sep && !in_quotes => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

// ── Dates ───────────────────────────────────────────────────────

/// Parse an RFC 2822 `Date:` value, tolerating a missing day-of-week and
/// a few common named zones.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = match trimmed.split_once(',') {
        Some((dow, rest)) if dow.len() <= 3 => rest.trim(),
        _ => trimmed,
    };
    let normalized = replace_named_tz(no_dow);

    for fmt in ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(no_dow, "%d %b %Y %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 10] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UT", "+0000"),
    ];
    for (name, offset) in ZONES {
        if let Some(prefix) = s.strip_suffix(name) {
            return format!("{prefix}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_adjacent_words_drop_whitespace() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_broken_word_kept() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_encode_unicode_roundtrip() {
        let value = "Résumé du projet, très long sujet avec des accents partout";
        let encoded = encode_unicode_value(value);
        assert!(encoded.is_ascii());
        assert!(encoded.split(' ').all(|w| w.len() <= 75));
        assert_eq!(decode_encoded_words(&encoded), value);
    }

    #[test]
    fn test_encode_ascii_untouched() {
        assert_eq!(encode_unicode_value("Hello"), "Hello");
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\r\n\tsubject line\r\nFrom: user@example.com\r\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert!(headers[0].is("subject"));
        assert_eq!(headers[0].name, "Subject");
        assert_eq!(headers[0].value, "This is a long subject line");
    }

    #[test]
    fn test_parse_params_quoted() {
        let (main, params) =
            parse_params("multipart/mixed; boundary=\"a;b\"; Charset=utf-8");
        assert_eq!(main, "multipart/mixed");
        assert_eq!(get_param(&params, "boundary").as_deref(), Some("a;b"));
        assert_eq!(get_param(&params, "charset").as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_format_params_quotes_when_needed() {
        let params = vec![
            ("charset".to_string(), "utf-8".to_string()),
            ("name".to_string(), "my file.txt".to_string()),
        ];
        assert_eq!(
            format_params("text/plain", &params),
            "text/plain; charset=utf-8; name=\"my file.txt\""
        );
    }

    #[test]
    fn test_set_param_replaces() {
        let mut params = vec![("charset".to_string(), "us-ascii".to_string())];
        set_param(&mut params, "Charset", "utf-8");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].1, "utf-8");
    }

    #[test]
    fn test_rfc2231_filename() {
        let (_, params) = parse_params("attachment; filename*=utf-8''r%C3%A9sum%C3%A9.pdf");
        assert_eq!(get_param(&params, "filename").as_deref(), Some("résumé.pdf"));
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_named_tz() {
        let dt = parse_date("04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(dt.format("%H").to_string(), "15");
    }
}
