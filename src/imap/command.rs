//! Command line splitting and argument words.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

const MUTF7: GeneralPurpose = GeneralPurpose::new(
    &alphabet::IMAP_MUTF7,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// One argument word of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    /// A bare token.
    Atom(String),
    /// A quoted string, unescaped, without its quotes.
    Quoted(String),
    /// A parenthesized list, the text between the outer parentheses.
    List(String),
    /// A literal length marker `{N}` or the non-synchronizing `{N+}`.
    Literal { size: u64, synchronizing: bool },
}

impl Word {
    /// The word's text: the value for strings and lists, the marker for literals.
    pub fn text(&self) -> String {
        match self {
            Word::Atom(s) | Word::Quoted(s) | Word::List(s) => s.clone(),
            Word::Literal { size, synchronizing } => {
                format!("{{{}{}}}", size, if *synchronizing { "" } else { "+" })
            }
        }
    }

    pub fn is_quoted(&self) -> bool {
        matches!(self, Word::Quoted(_))
    }
}

/// Split `tag COMMAND arguments` into its three parts. The arguments may be
/// empty; a line without a command yields `None`.
pub fn split_command_line(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, rest) = line.trim_start().split_once(' ')?;
    let rest = rest.trim_start();
    let (command, arguments) = rest.split_once(' ').unwrap_or((rest, ""));
    if tag.is_empty() || command.is_empty() {
        return None;
    }
    Some((tag, command, arguments.trim()))
}

/// Split an argument string into words. Unterminated quotes and lists run to
/// the end of the input.
pub fn tokenize(arguments: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut chars = arguments.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        c => value.push(c),
                    }
                }
                words.push(Word::Quoted(value));
            }
            '(' => {
                chars.next();
                let mut depth = 1;
                let mut value = String::new();
                for c in chars.by_ref() {
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    value.push(c);
                }
                words.push(Word::List(value));
            }
            _ => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' || c == '\t' {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                words.push(parse_literal_marker(&token).unwrap_or(Word::Atom(token)));
            }
        }
    }

    words
}

fn parse_literal_marker(token: &str) -> Option<Word> {
    let inner = token.strip_prefix('{')?.strip_suffix('}')?;
    let (digits, synchronizing) = match inner.strip_suffix('+') {
        Some(digits) => (digits, false),
        None => (inner, true),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size = digits.parse().ok()?;
    Some(Word::Literal { size, synchronizing })
}

/// Decode a mailbox name from modified UTF-7 (RFC 3501 section 5.1.3).
///
/// Malformed shift sequences are kept as they are.
pub fn decode_mailbox_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('-') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let encoded = &after[..end];
        if encoded.is_empty() {
            out.push('&');
        } else {
            match decode_utf16_run(encoded) {
                Some(decoded) => out.push_str(&decoded),
                None => out.push_str(&rest[start..start + end + 2]),
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn decode_utf16_run(encoded: &str) -> Option<String> {
    let bytes = MUTF7.decode(encoded).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("a1 APPEND INBOX {5}\r\n"),
            Some(("a1", "APPEND", "INBOX {5}"))
        );
        assert_eq!(split_command_line("a1 NOOP"), Some(("a1", "NOOP", "")));
        assert_eq!(split_command_line("lonely"), None);
    }

    #[test]
    fn test_tokenize_full_append() {
        let words = tokenize(r#"INBOX (\Seen \Flagged) " 7-Feb-1994 21:52:25 -0800" {310}"#);
        assert_eq!(
            words,
            vec![
                Word::Atom("INBOX".into()),
                Word::List(r"\Seen \Flagged".into()),
                Word::Quoted(" 7-Feb-1994 21:52:25 -0800".into()),
                Word::Literal {
                    size: 310,
                    synchronizing: true
                },
            ]
        );
    }

    #[test]
    fn test_tokenize_quoted_escapes_and_lists() {
        let words = tokenize(r#""My \"Box\"" () {0+}"#);
        assert_eq!(words[0], Word::Quoted(r#"My "Box""#.into()));
        assert_eq!(words[1], Word::List(String::new()));
        assert_eq!(
            words[2],
            Word::Literal {
                size: 0,
                synchronizing: false
            }
        );
    }

    #[test]
    fn test_invalid_literal_marker_is_an_atom() {
        assert_eq!(tokenize("{abc}"), vec![Word::Atom("{abc}".into())]);
        assert_eq!(tokenize("{}"), vec![Word::Atom("{}".into())]);
    }

    #[test]
    fn test_decode_mailbox_name() {
        assert_eq!(decode_mailbox_name("INBOX"), "INBOX");
        assert_eq!(decode_mailbox_name("Tom &- Jerry"), "Tom & Jerry");
        assert_eq!(decode_mailbox_name("Entw&APw-rfe"), "Entwürfe");
        assert_eq!(decode_mailbox_name("&ZeVnLIqe-"), "日本語");
    }

    #[test]
    fn test_decode_mailbox_name_malformed() {
        assert_eq!(decode_mailbox_name("a&b"), "a&b");
        assert_eq!(decode_mailbox_name("x&!!-y"), "x&!!-y");
    }
}
