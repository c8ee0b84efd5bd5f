//! The message envelope: logical access to a stored MIME message.
//!
//! [`MessageData`] owns the part tree of one message and presents it as a
//! handful of logical fields (headers, a plain-text body, an HTML body and a
//! list of attachments). Setting a body that the current shape of the tree
//! cannot hold rebuilds the tree (see [`MessageData::create_part`]).

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{self, Config};
use crate::error::{MailError, Result};
use crate::mime::{
    is_html_type, is_text_type, PartId, PartTree, MULTIPART_ALTERNATIVE, MULTIPART_MIXED,
    MULTIPART_PREAMBLE, TEXT_HTML, TEXT_PLAIN,
};
use crate::model::attachment::Attachment;
use crate::model::message::{guid_token, SharedMessage};

/// Header counting how many times filtering rules have re-processed a message.
pub const LOOP_COUNT_HEADER: &str = "X-Mailcore-LoopCount";

/// Messages above this size are never parsed.
pub const DEFAULT_MAX_LOAD_SIZE: u64 = 80 * 1024 * 1024;

/// How header values and body text are read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldEncoding {
    /// Header values are decoded from (and encoded to) RFC 2047 words and
    /// bodies go through their transfer encoding and charset.
    #[default]
    Unicode,
    /// Values are stored and returned exactly as they appear in the file.
    Raw,
}

/// Settings that govern [`MessageData::load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Files larger than this are refused without being read.
    pub max_size: u64,
    /// Where to copy files that fail to parse. `None` disables the copy.
    pub quarantine_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_LOAD_SIZE,
            quarantine_dir: None,
        }
    }
}

impl LoadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size: config.limits.max_load_size,
            quarantine_dir: Some(config::quarantine_dir(config)),
        }
    }
}

/// One message: its part tree plus an optional back-reference to its record.
#[derive(Debug)]
pub struct MessageData {
    pub(crate) tree: PartTree,
    path: Option<PathBuf>,
    owner: Option<SharedMessage>,
    options: LoadOptions,
    encoding: FieldEncoding,
    pub(crate) attachments: Option<Vec<Attachment>>,
}

impl Default for MessageData {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageData {
    /// A new, empty message: UTF-8 charset and a `MIME-Version` header.
    pub fn new() -> Self {
        let mut message = Self::with_tree(PartTree::new());
        message.seed_new();
        message
    }

    fn with_tree(tree: PartTree) -> Self {
        Self {
            tree,
            path: None,
            owner: None,
            options: LoadOptions::default(),
            encoding: FieldEncoding::default(),
            attachments: None,
        }
    }

    fn seed_new(&mut self) {
        let root = self.tree.root();
        // The root is always live
        let _ = self.tree.set_charset(root, "utf-8");
        let _ = self.tree.set_field(root, "MIME-Version", "1.0");
    }

    /// Load a message file.
    ///
    /// A missing or empty file yields a new message. A file above
    /// `options.max_size` is refused with [`MailError::TooLarge`] before it is
    /// read. A file that cannot be parsed is copied to the quarantine
    /// directory and reported as [`MailError::ParseCorruption`].
    pub fn load(path: &Path, owner: Option<SharedMessage>, options: &LoadOptions) -> Result<Self> {
        let tree = match std::fs::metadata(path) {
            Ok(meta) if meta.len() > options.max_size => {
                warn!(
                    path = %path.display(),
                    size = meta.len(),
                    limit = options.max_size,
                    "Message too large to load"
                );
                return Err(MailError::TooLarge {
                    path: path.to_path_buf(),
                    size: meta.len(),
                    limit: options.max_size,
                });
            }
            Ok(_) => {
                let data = std::fs::read(path).map_err(|e| MailError::io(path, e))?;
                match PartTree::parse(&data) {
                    Ok(tree) => tree,
                    Err(e) => {
                        let backup = quarantine(path, options.quarantine_dir.as_deref());
                        error!(
                            path = %path.display(),
                            backup = ?backup,
                            error = %e,
                            "Failed to parse message"
                        );
                        return Err(MailError::ParseCorruption {
                            path: path.to_path_buf(),
                            reason: e.to_string(),
                            backup,
                        });
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(MailError::io(path, e)),
        };

        let mut message = match tree {
            Some(tree) => Self::with_tree(tree),
            None => {
                debug!(path = %path.display(), "No content, treating as a new message");
                Self::new()
            }
        };
        message.path = Some(path.to_path_buf());
        message.owner = owner;
        message.options = options.clone();
        Ok(message)
    }

    /// Reload from the file and record this message was loaded from.
    ///
    /// Returns `Ok(false)` when the message was never loaded for a record.
    pub fn refresh(&mut self) -> Result<bool> {
        let (Some(path), Some(owner)) = (self.path.clone(), self.owner.clone()) else {
            return Ok(false);
        };
        let encoding = self.encoding;
        *self = Self::load(&path, Some(owner), &self.options.clone())?;
        self.encoding = encoding;
        Ok(true)
    }

    /// The file this message was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn owner(&self) -> Option<&SharedMessage> {
        self.owner.as_ref()
    }

    pub fn tree(&self) -> &PartTree {
        &self.tree
    }

    pub fn field_encoding(&self) -> FieldEncoding {
        self.encoding
    }

    pub fn set_field_encoding(&mut self, encoding: FieldEncoding) {
        self.encoding = encoding;
    }

    // ── Header fields ───────────────────────────────────────────

    /// Value of a root header field, empty when absent.
    pub fn field(&self, name: &str) -> String {
        let root = self.tree.root();
        match self.encoding {
            FieldEncoding::Unicode => self.tree.unicode_field(root, name).unwrap_or_default(),
            FieldEncoding::Raw => self.tree.field(root, name).unwrap_or_default().to_string(),
        }
    }

    pub fn set_field(&mut self, name: &str, value: &str) {
        let root = self.tree.root();
        let _ = match self.encoding {
            FieldEncoding::Unicode => self.tree.set_unicode_field(root, name, value),
            FieldEncoding::Raw => self.tree.set_field(root, name, value),
        };
    }

    /// Remove every occurrence of a root header field.
    pub fn delete_field(&mut self, name: &str) {
        let root = self.tree.root();
        self.tree.remove_field(root, name);
    }

    /// The whole root header block, one `Name: value` line per field.
    pub fn header_text(&self) -> String {
        let root = self.tree.root();
        self.tree
            .fields(root)
            .iter()
            .map(|f| {
                let value = match self.encoding {
                    FieldEncoding::Unicode => crate::mime::header::decode_encoded_words(&f.value),
                    FieldEncoding::Raw => f.value.clone(),
                };
                format!("{}: {}\r\n", f.name, value)
            })
            .collect()
    }

    pub fn subject(&self) -> String {
        self.field("Subject")
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.set_field("Subject", subject);
    }

    pub fn from(&self) -> String {
        self.field("From")
    }

    pub fn set_from(&mut self, from: &str) {
        self.set_field("From", from);
    }

    pub fn to(&self) -> String {
        self.field("To")
    }

    pub fn set_to(&mut self, to: &str) {
        self.set_field("To", to);
    }

    pub fn cc(&self) -> String {
        self.field("CC")
    }

    pub fn set_cc(&mut self, cc: &str) {
        self.set_field("CC", cc);
    }

    pub fn bcc(&self) -> String {
        self.field("BCC")
    }

    pub fn set_bcc(&mut self, bcc: &str) {
        self.set_field("BCC", bcc);
    }

    pub fn return_path(&self) -> String {
        self.field("Return-Path")
    }

    /// Set `Return-Path`, wrapping the address in angle brackets.
    pub fn set_return_path(&mut self, address: &str) {
        self.set_field("Return-Path", &format!("<{address}>"));
    }

    pub fn sent_time(&self) -> String {
        self.field("Date")
    }

    /// Set the `Date` header. An empty value means now.
    pub fn set_sent_time(&mut self, date: &str) {
        if date.is_empty() {
            let now = Utc::now().to_rfc2822();
            self.set_field("Date", &now);
        } else {
            self.set_field("Date", date);
        }
    }

    pub fn charset(&self) -> String {
        self.tree.charset(self.tree.root()).unwrap_or_default()
    }

    pub fn set_charset(&mut self, charset: &str) {
        let root = self.tree.root();
        let _ = self.tree.set_charset(root, charset);
    }

    /// Size recorded on the owning record, 0 without one.
    pub fn size(&self) -> u64 {
        self.owner
            .as_ref()
            .map(|owner| lock(owner).size)
            .unwrap_or(0)
    }

    // ── Rule loop counter ───────────────────────────────────────

    pub fn rule_loop_count(&self) -> u32 {
        self.tree
            .field(self.tree.root(), LOOP_COUNT_HEADER)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn increase_rule_loop_count(&mut self) {
        let next = self.rule_loop_count().saturating_add(1);
        self.set_rule_loop_count(next);
    }

    pub fn set_rule_loop_count(&mut self, count: u32) {
        let root = self.tree.root();
        let _ = self.tree.set_field(root, LOOP_COUNT_HEADER, &count.to_string());
    }

    // ── Misc markers ────────────────────────────────────────────

    /// Assign a new `Message-ID` of the form `<TOKEN@host>` and return it.
    pub fn generate_message_id(&mut self, host: &str) -> String {
        let id = format!("<{}@{}>", guid_token(), host);
        self.set_field("Message-ID", &id);
        id
    }

    pub fn set_auto_replied(&mut self) {
        self.set_field("Auto-Submitted", "auto-replied");
    }

    /// True unless `Auto-Submitted` is absent or `no`.
    pub fn is_auto_submitted(&self) -> bool {
        let value = self.field("Auto-Submitted");
        let value = value.trim();
        !value.is_empty() && !value.eq_ignore_ascii_case("no")
    }

    // ── Bodies ──────────────────────────────────────────────────

    /// The plain-text body, empty when there is none.
    pub fn body(&self) -> String {
        self.part_text(TEXT_PLAIN)
    }

    pub fn set_body(&mut self, text: &str) -> Result<()> {
        self.set_part_text(TEXT_PLAIN, text)
    }

    /// The HTML body, empty when there is none.
    pub fn html_body(&self) -> String {
        self.part_text(TEXT_HTML)
    }

    pub fn set_html_body(&mut self, html: &str) -> Result<()> {
        self.set_part_text(TEXT_HTML, html)
    }

    pub fn has_body_type(&self, content_type: &str) -> bool {
        self.find_part(content_type).is_some()
    }

    fn part_text(&self, content_type: &str) -> String {
        match self.find_part(content_type) {
            Some(part) => match self.encoding {
                FieldEncoding::Unicode => self.tree.text(part),
                FieldEncoding::Raw => self.tree.raw_text(part),
            },
            None => String::new(),
        }
    }

    fn set_part_text(&mut self, content_type: &str, text: &str) -> Result<()> {
        let part = match self.find_part(content_type) {
            Some(part) => part,
            None => self.create_part(content_type)?,
        };

        let mut text = text.to_string();
        if !text.ends_with("\r\n") {
            text.push_str("\r\n");
        }

        match self.encoding {
            FieldEncoding::Unicode => self.tree.set_text(part, &text)?,
            FieldEncoding::Raw => self.tree.set_raw_body(part, text.into_bytes())?,
        }
        Ok(())
    }

    /// Find a part by content type: the root itself, a direct child, or a
    /// child of a direct multipart child. Deeper parts are not searched.
    pub fn find_part(&self, content_type: &str) -> Option<PartId> {
        let tree = &self.tree;
        let root = tree.root();
        if tree.content_type(root).eq_ignore_ascii_case(content_type) {
            return Some(root);
        }

        for &child in tree.children(root) {
            if tree.content_type(child).eq_ignore_ascii_case(content_type) {
                return Some(child);
            }
            if tree.is_multipart(child) {
                if let Some(sub) = tree.find_child(child, content_type) {
                    return Some(sub);
                }
            }
        }
        None
    }

    /// Rebuild the tree so that it holds a part of `content_type` and
    /// return that part.
    ///
    /// For `text/plain` and `text/html` the result is the message's single
    /// text or HTML body; an existing one is reused. Any other type yields a
    /// new, empty attachment leaf. Attachments and the sibling body part are
    /// always preserved, and the root takes the narrowest shape that holds
    /// them: `multipart/mixed` with attachments, `multipart/alternative`
    /// with both bodies, otherwise a single leaf.
    pub fn create_part(&mut self, content_type: &str) -> Result<PartId> {
        let tree = &mut self.tree;
        let root = tree.root();

        let main_type = tree.content_type(root);
        let main_charset = tree.charset(root).filter(|c| !c.is_empty());
        let main_encoding = tree.transfer_encoding(root);

        let mut text = tree.find_child(root, TEXT_PLAIN);
        let mut html = tree.find_child(root, TEXT_HTML);

        // The alternative grouping is always rebuilt from scratch
        let alternative = tree.find_child(root, MULTIPART_ALTERNATIVE);
        let mut alternative_rest = Vec::new();
        if let Some(alt) = alternative {
            if text.is_none() {
                text = tree.find_child(alt, TEXT_PLAIN);
            }
            if html.is_none() {
                html = tree.find_child(alt, TEXT_HTML);
            }
            alternative_rest = tree
                .clear_children(alt)
                .into_iter()
                .filter(|&c| Some(c) != text && Some(c) != html)
                .collect();
        }

        // Demote the root's own body so it survives becoming a container
        if text.is_none() && html.is_none() && !tree.raw_body(root).is_empty() {
            let migrated = if main_type.is_empty() || is_text_type(&main_type) {
                Some(TEXT_PLAIN)
            } else if is_html_type(&main_type) {
                Some(TEXT_HTML)
            } else {
                None
            };
            if let Some(kind) = migrated {
                let part = tree.alloc_leaf(kind);
                let body = tree.raw_body(root).to_vec();
                tree.set_raw_body(part, body)?;
                if let Some(ref charset) = main_charset {
                    tree.set_charset(part, charset)?;
                }
                if let Some(ref encoding) = main_encoding {
                    tree.set_transfer_encoding(part, encoding)?;
                }
                if kind == TEXT_PLAIN {
                    text = Some(part);
                } else {
                    html = Some(part);
                }
            }
        }

        let mut attachments = Vec::new();
        for child in tree.clear_children(root) {
            if Some(child) == text || Some(child) == html {
                continue;
            }
            if Some(child) == alternative {
                attachments.append(&mut alternative_rest);
                tree.free(child)?;
                continue;
            }
            attachments.push(child);
        }

        let root_was_container = main_type.starts_with("multipart/");
        let mut root_charset = main_charset.clone();

        let requested = if is_text_type(content_type) || is_html_type(content_type) {
            let wants_text = is_text_type(content_type);
            let (slot, other) = if wants_text {
                (&mut text, html)
            } else {
                (&mut html, text)
            };
            let kind = if wants_text { TEXT_PLAIN } else { TEXT_HTML };

            if attachments.is_empty() && other.is_none() {
                // The root is the only body part
                let existing = slot.take();
                tree.set_content_type(root, kind)?;
                match existing {
                    Some(part) => {
                        absorb_into_root(tree, part)?;
                        if let Some(charset) = tree.charset(part) {
                            root_charset = Some(charset);
                        }
                        tree.free(part)?;
                    }
                    None if root_was_container => tree.set_raw_body(root, Vec::new())?,
                    None => {}
                }
                *slot = Some(root);
                root
            } else {
                match *slot {
                    Some(part) => part,
                    None => {
                        let part = tree.alloc_leaf(kind);
                        if let Some(ref encoding) = main_encoding {
                            tree.set_transfer_encoding(part, encoding)?;
                        }
                        if let Some(ref charset) = main_charset {
                            tree.set_charset(part, charset)?;
                        }
                        *slot = Some(part);
                        part
                    }
                }
            }
        } else {
            let part = tree.alloc_leaf(content_type);
            attachments.push(part);
            part
        };

        let shape = if !attachments.is_empty() {
            MULTIPART_MIXED
        } else if text.is_some() && html.is_some() {
            MULTIPART_ALTERNATIVE
        } else if html.is_some() {
            TEXT_HTML
        } else {
            TEXT_PLAIN
        };

        match (text, html) {
            (Some(t), Some(h)) if shape == MULTIPART_MIXED => {
                let alt = tree.alloc_leaf(MULTIPART_ALTERNATIVE);
                tree.set_raw_body(alt, MULTIPART_PREAMBLE.as_bytes().to_vec())?;
                tree.add_child(alt, t)?;
                tree.add_child(alt, h)?;
                tree.set_boundary(alt)?;
                tree.add_child(root, alt)?;
            }
            (t, h) => {
                for part in [t, h].into_iter().flatten() {
                    if part != root {
                        tree.add_child(root, part)?;
                    }
                }
            }
        }
        for part in attachments {
            tree.add_child(root, part)?;
        }

        tree.set_content_type(root, shape)?;
        if let Some(ref charset) = root_charset {
            tree.set_charset(root, charset)?;
        }
        if tree.part_count(root) > 0 {
            tree.remove_field(root, "Content-Transfer-Encoding");
            tree.set_raw_body(root, MULTIPART_PREAMBLE.as_bytes().to_vec())?;
            tree.set_boundary(root)?;
        }

        debug!(requested = content_type, shape, "Rebuilt message structure");
        Ok(requested)
    }

    // ── Attachments ─────────────────────────────────────────────

    /// Forget the cached attachment list; the next access re-derives it.
    pub fn reload_attachments(&mut self) {
        self.attachments = None;
    }

    /// Detach and free an attachment's part.
    pub fn remove_attachment(&mut self, attachment: &Attachment) -> Result<()> {
        self.tree.free(attachment.part())?;
        Ok(())
    }

    // ── Storage ─────────────────────────────────────────────────

    /// Serialize to `path`, creating parent directories, and record the
    /// written size on the owning record.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| MailError::io(parent, e))?;
            }
        }
        self.tree.save_file(path)?;

        if let Some(ref owner) = self.owner {
            let size = std::fs::metadata(path)
                .map_err(|e| MailError::io(path, e))?
                .len();
            lock(owner).size = size;
        }
        info!(path = %path.display(), "Wrote message");
        Ok(())
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.tree.to_bytes()
    }
}

/// Move a leaf's body, charset and transfer encoding onto the root.
fn absorb_into_root(tree: &mut PartTree, part: PartId) -> Result<()> {
    let root = tree.root();
    let body = tree.raw_body(part).to_vec();
    tree.set_raw_body(root, body)?;
    match tree.transfer_encoding(part) {
        Some(encoding) => tree.set_transfer_encoding(root, &encoding)?,
        None => {
            tree.remove_field(root, "Content-Transfer-Encoding");
        }
    }
    Ok(())
}

fn quarantine(path: &Path, dir: Option<&Path>) -> Option<PathBuf> {
    let dir = dir?;
    let name = path.file_name()?;
    let target = dir.join(name);
    let copied = std::fs::create_dir_all(dir).and_then(|_| std::fs::copy(path, &target));
    match copied {
        Ok(_) => Some(target),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not keep a copy of the message");
            None
        }
    }
}

fn lock(owner: &SharedMessage) -> std::sync::MutexGuard<'_, crate::model::message::Message> {
    owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::OCTET_STREAM;

    fn count_type(message: &MessageData, content_type: &str) -> usize {
        fn walk(tree: &PartTree, id: PartId, ct: &str, n: &mut usize) {
            if tree.content_type(id) == ct {
                *n += 1;
            }
            for &c in tree.children(id) {
                walk(tree, c, ct, n);
            }
        }
        let mut n = 0;
        walk(message.tree(), message.tree().root(), content_type, &mut n);
        n
    }

    #[test]
    fn test_new_message_defaults() {
        let message = MessageData::new();
        assert_eq!(message.charset(), "utf-8");
        assert_eq!(message.field("MIME-Version"), "1.0");
        assert_eq!(message.body(), "");
    }

    #[test]
    fn test_set_body_reuses_root() {
        let mut message = MessageData::new();
        message.set_body("Hello").unwrap();
        let root = message.tree().root();
        assert_eq!(message.find_part(TEXT_PLAIN), Some(root));
        assert_eq!(message.body(), "Hello\r\n");
        assert_eq!(message.charset(), "utf-8");
    }

    #[test]
    fn test_text_then_html_gives_alternative() {
        let mut message = MessageData::new();
        message.set_body("plain").unwrap();
        message.set_html_body("<b>html</b>").unwrap();
        let tree = message.tree();
        assert_eq!(tree.content_type(tree.root()), MULTIPART_ALTERNATIVE);
        assert_eq!(tree.part_count(tree.root()), 2);
        assert_eq!(message.body(), "plain\r\n");
        assert_eq!(message.html_body(), "<b>html</b>\r\n");
    }

    #[test]
    fn test_html_only_message() {
        let mut message = MessageData::new();
        message.set_html_body("<p>x</p>\r\n").unwrap();
        let tree = message.tree();
        assert_eq!(tree.content_type(tree.root()), TEXT_HTML);
        assert_eq!(message.html_body(), "<p>x</p>\r\n");
    }

    #[test]
    fn test_attachment_then_bodies_nests_alternative() {
        let mut message = MessageData::new();
        message.set_body("plain").unwrap();
        let file = message.create_part(OCTET_STREAM).unwrap();
        message.set_html_body("<i>h</i>").unwrap();

        let tree = message.tree();
        let root = tree.root();
        assert_eq!(tree.content_type(root), MULTIPART_MIXED);
        let children = tree.children(root).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.content_type(children[0]), MULTIPART_ALTERNATIVE);
        assert_eq!(children[1], file);
        assert_eq!(message.body(), "plain\r\n");
        assert_eq!(message.html_body(), "<i>h</i>\r\n");
    }

    #[test]
    fn test_create_part_is_idempotent() {
        let mut message = MessageData::new();
        message.set_body("one").unwrap();
        message.set_html_body("two").unwrap();
        let first = message.create_part(TEXT_PLAIN).unwrap();
        let second = message.create_part(TEXT_PLAIN).unwrap();
        assert_eq!(first, second);
        assert_eq!(count_type(&message, TEXT_PLAIN), 1);
        assert_eq!(count_type(&message, TEXT_HTML), 1);
        assert_eq!(message.body(), "one\r\n");
    }

    #[test]
    fn test_create_plain_on_plain_leaf_keeps_content() {
        let mut message = MessageData::new();
        message.set_body("keep me").unwrap();
        let part = message.create_part(TEXT_PLAIN).unwrap();
        assert_eq!(part, message.tree().root());
        assert_eq!(message.body(), "keep me\r\n");
        assert_eq!(message.tree().part_count(part), 0);
    }

    #[test]
    fn test_root_body_migrates_when_demoted() {
        let data = b"Subject: x\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\ncaf=E9\r\n";
        let tree = PartTree::parse(data).unwrap().unwrap();
        let mut message = MessageData::with_tree(tree);
        message.set_html_body("<p>café</p>").unwrap();

        assert_eq!(message.body(), "café\r\n");
        assert_eq!(message.html_body(), "<p>café</p>\r\n");
        let root = message.tree().root();
        assert_eq!(message.tree().transfer_encoding(root), None);
        assert_eq!(message.charset(), "iso-8859-1");
    }

    #[test]
    fn test_find_part_two_levels_only() {
        let mut tree = PartTree::new();
        let root = tree.root();
        tree.set_content_type(root, MULTIPART_MIXED).unwrap();
        let level1 = tree.alloc_leaf("multipart/related");
        let level2 = tree.alloc_leaf(MULTIPART_ALTERNATIVE);
        let deep = tree.alloc_leaf(TEXT_HTML);
        tree.add_child(root, level1).unwrap();
        tree.add_child(level1, level2).unwrap();
        tree.add_child(level2, deep).unwrap();

        let message = MessageData::with_tree(tree);
        assert_eq!(message.find_part(MULTIPART_ALTERNATIVE), Some(level2));
        assert_eq!(message.find_part("TEXT/HTML"), None);
    }

    #[test]
    fn test_raw_encoding_mode() {
        let mut message = MessageData::new();
        message.set_subject("Été");
        assert!(message.tree().field(message.tree().root(), "Subject").unwrap().starts_with("=?UTF-8?B?"));

        message.set_field_encoding(FieldEncoding::Raw);
        message.set_subject("=?UTF-8?Q?x?=");
        assert_eq!(message.subject(), "=?UTF-8?Q?x?=");
        message.set_field_encoding(FieldEncoding::Unicode);
        assert_eq!(message.subject(), "x");
    }

    #[test]
    fn test_loop_count() {
        let mut message = MessageData::new();
        assert_eq!(message.rule_loop_count(), 0);
        message.increase_rule_loop_count();
        message.increase_rule_loop_count();
        assert_eq!(message.rule_loop_count(), 2);
        assert_eq!(message.field(LOOP_COUNT_HEADER), "2");
        message.set_rule_loop_count(9);
        assert_eq!(message.rule_loop_count(), 9);
    }

    #[test]
    fn test_message_id_and_auto_submitted() {
        let mut message = MessageData::new();
        let id = message.generate_message_id("mx.example.com");
        assert!(id.starts_with('<') && id.ends_with("@mx.example.com>"));
        assert_eq!(message.field("Message-ID"), id);

        assert!(!message.is_auto_submitted());
        message.set_field("Auto-Submitted", "No");
        assert!(!message.is_auto_submitted());
        message.set_auto_replied();
        assert!(message.is_auto_submitted());
    }

    #[test]
    fn test_return_path_and_date() {
        let mut message = MessageData::new();
        message.set_return_path("bounce@example.com");
        assert_eq!(message.return_path(), "<bounce@example.com>");
        message.set_sent_time("");
        assert!(crate::mime::header::parse_date(&message.sent_time()).is_some());
    }

    #[test]
    fn test_delete_field_removes_all() {
        let mut message = MessageData::new();
        message.set_field("X-Test", "a");
        message.delete_field("x-test");
        assert_eq!(message.field("X-Test"), "");
        assert!(!message.header_text().contains("X-Test"));
    }
}
