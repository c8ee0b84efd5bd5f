//! The MIME part tree, stored as a generational arena.
//!
//! Every part lives in a slot of [`PartTree`] and is addressed by a
//! [`PartId`]. Detaching a part only unlinks it, so a rebuild can move parts
//! around freely; freeing a part bumps its slot generation so that any
//! handle still pointing at it fails with [`MimeError::StalePart`] instead of
//! silently reaching whatever part reuses the slot.

use std::path::Path;

use rand::Rng;
use tracing::debug;

use crate::error::{MailError, Result};
use crate::mime::header::{self, HeaderField};
use crate::mime::transfer::{self, TransferEncoding};
use crate::mime::{is_html_type, is_text_type, MimeError, OCTET_STREAM};

/// Stable handle to a part of a [`PartTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartId {
    index: u32,
    generation: u32,
}

/// One node: headers, stored body bytes, and ordered children.
///
/// For a leaf, `body` is the transfer-encoded content. For a container it
/// is the preamble written before the first boundary.
#[derive(Debug, Clone, Default)]
struct Part {
    headers: Vec<HeaderField>,
    body: Vec<u8>,
    children: Vec<PartId>,
    parent: Option<PartId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    part: Option<Part>,
}

/// An arena of MIME parts with a fixed root.
#[derive(Debug, Clone)]
pub struct PartTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: PartId,
}

impl Default for PartTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartTree {
    /// An empty tree holding only a root with no headers and no body.
    pub fn new() -> Self {
        let root = PartId {
            index: 0,
            generation: 0,
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                part: Some(Part::default()),
            }],
            free: Vec::new(),
            root,
        }
    }

    pub fn root(&self) -> PartId {
        self.root
    }

    /// Parse a tree from bytes. `Ok(None)` means there was nothing to parse.
    pub fn parse(data: &[u8]) -> std::result::Result<Option<Self>, MimeError> {
        crate::mime::parse::parse_tree(data)
    }

    /// Read and parse a file.
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        let data = std::fs::read(path).map_err(|e| MailError::read(path, e))?;
        Ok(Self::parse(&data)?)
    }

    /// Serialize the whole tree.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::mime::write::write_tree(self)
    }

    /// Serialize the whole tree to a file, replacing it.
    pub fn save_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()).map_err(|e| MailError::io(path, e))
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate a detached, empty part.
    pub fn alloc(&mut self) -> PartId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.part = Some(Part::default());
                PartId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    part: Some(Part::default()),
                });
                PartId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Allocate a detached leaf with the given content type.
    pub fn alloc_leaf(&mut self, content_type: &str) -> PartId {
        let id = self.alloc();
        if let Some(part) = self.part_mut(id) {
            part.headers
                .push(HeaderField::new("Content-Type", content_type));
        }
        id
    }

    /// Free a part and everything below it. The root is never freed; it is
    /// cleared instead.
    pub fn free(&mut self, id: PartId) -> std::result::Result<(), MimeError> {
        if id == self.root {
            self.clear_all();
            return Ok(());
        }
        let parent = self.part(id).ok_or(MimeError::StalePart)?.parent;
        if let Some(parent) = parent {
            self.detach(parent, id)?;
        }
        self.release(id);
        Ok(())
    }

    fn release(&mut self, id: PartId) {
        let children = match self.part_mut(id) {
            Some(part) => std::mem::take(&mut part.children),
            None => return,
        };
        for child in children {
            self.release(child);
        }
        let slot = &mut self.slots[id.index as usize];
        slot.part = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    /// True while the handle still refers to a live part.
    pub fn contains(&self, id: PartId) -> bool {
        self.part(id).is_some()
    }

    fn part(&self, id: PartId) -> Option<&Part> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.part.as_ref()
    }

    fn part_mut(&mut self, id: PartId) -> Option<&mut Part> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.part.as_mut()
    }

    fn live(&self, id: PartId) -> std::result::Result<&Part, MimeError> {
        self.part(id).ok_or(MimeError::StalePart)
    }

    fn live_mut(&mut self, id: PartId) -> std::result::Result<&mut Part, MimeError> {
        self.part_mut(id).ok_or(MimeError::StalePart)
    }

    // ── Structure ───────────────────────────────────────────────

    /// Direct children, in order. Empty for stale handles.
    pub fn children(&self, id: PartId) -> &[PartId] {
        self.part(id).map(|p| p.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: PartId) -> Option<PartId> {
        self.part(id).and_then(|p| p.parent)
    }

    /// Number of direct children.
    pub fn part_count(&self, id: PartId) -> usize {
        self.children(id).len()
    }

    /// True when the part is a container, by content type or by having children.
    pub fn is_multipart(&self, id: PartId) -> bool {
        self.part_count(id) > 0 || self.content_type(id).starts_with("multipart/")
    }

    /// Append `child` to `parent`, moving it out of any previous parent.
    pub fn add_child(&mut self, parent: PartId, child: PartId) -> std::result::Result<(), MimeError> {
        self.live(parent)?;
        if let Some(old) = self.live(child)?.parent {
            self.detach(old, child)?;
        }
        self.live_mut(parent)?.children.push(child);
        self.live_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlink `child` from `parent` without freeing it.
    pub fn detach(&mut self, parent: PartId, child: PartId) -> std::result::Result<(), MimeError> {
        let children = &mut self.live_mut(parent)?.children;
        let pos = children
            .iter()
            .position(|&c| c == child)
            .ok_or(MimeError::NotAttached)?;
        children.remove(pos);
        if let Some(part) = self.part_mut(child) {
            part.parent = None;
        }
        Ok(())
    }

    /// Unlink every child of `id`, returning them in order. They stay alive.
    pub fn clear_children(&mut self, id: PartId) -> Vec<PartId> {
        let children = match self.part_mut(id) {
            Some(part) => std::mem::take(&mut part.children),
            None => return Vec::new(),
        };
        for &child in &children {
            if let Some(part) = self.part_mut(child) {
                part.parent = None;
            }
        }
        children
    }

    /// Drop all non-root content: every part below the root is freed and the
    /// root body emptied. Root headers are kept.
    pub fn clear_all(&mut self) {
        let root = self.root;
        for child in self.clear_children(root) {
            self.release(child);
        }
        if let Some(part) = self.part_mut(root) {
            part.body.clear();
        }
    }

    /// First direct child whose clean content type matches (case-insensitive).
    pub fn find_child(&self, parent: PartId, content_type: &str) -> Option<PartId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.content_type(c).eq_ignore_ascii_case(content_type))
    }

    /// Leaf parts below the root that are neither the text nor the HTML body,
    /// descending through containers.
    pub fn attachment_parts(&self) -> Vec<PartId> {
        let mut out = Vec::new();
        self.collect_attachments(self.root, &mut out);
        out
    }

    fn collect_attachments(&self, id: PartId, out: &mut Vec<PartId>) {
        for &child in self.children(id) {
            if self.is_multipart(child) {
                self.collect_attachments(child, out);
                continue;
            }
            let ct = self.content_type(child);
            if !is_text_type(&ct) && !is_html_type(&ct) {
                out.push(child);
            }
        }
    }

    // ── Header fields ───────────────────────────────────────────

    /// All header fields of a part, in order.
    pub fn fields(&self, id: PartId) -> &[HeaderField] {
        self.part(id).map(|p| p.headers.as_slice()).unwrap_or(&[])
    }

    /// Raw value of the first field with this name.
    pub fn field(&self, id: PartId, name: &str) -> Option<&str> {
        self.fields(id)
            .iter()
            .find(|f| f.is(name))
            .map(|f| f.value.as_str())
    }

    /// Value of the first field with this name, with encoded-words decoded.
    pub fn unicode_field(&self, id: PartId, name: &str) -> Option<String> {
        self.field(id, name).map(header::decode_encoded_words)
    }

    /// Set a field to a raw value, replacing the first occurrence or appending.
    pub fn set_field(&mut self, id: PartId, name: &str, value: &str) -> std::result::Result<(), MimeError> {
        let part = self.live_mut(id)?;
        match part.headers.iter_mut().find(|f| f.is(name)) {
            Some(field) => field.value = value.to_string(),
            None => part.headers.push(HeaderField::new(name, value)),
        }
        Ok(())
    }

    /// Set a field from unicode text, encoding non-ASCII as encoded-words.
    pub fn set_unicode_field(&mut self, id: PartId, name: &str, value: &str) -> std::result::Result<(), MimeError> {
        self.set_field(id, name, &header::encode_unicode_value(value))
    }

    /// Remove every occurrence of a field. Returns how many were removed.
    pub fn remove_field(&mut self, id: PartId, name: &str) -> usize {
        match self.part_mut(id) {
            Some(part) => {
                let before = part.headers.len();
                part.headers.retain(|f| !f.is(name));
                before - part.headers.len()
            }
            None => 0,
        }
    }

    pub(crate) fn set_headers(&mut self, id: PartId, headers: Vec<HeaderField>) -> std::result::Result<(), MimeError> {
        self.live_mut(id)?.headers = headers;
        Ok(())
    }

    // ── Content type, charset, encoding ─────────────────────────

    /// Content type without parameters, lower-cased. Empty when absent.
    pub fn content_type(&self, id: PartId) -> String {
        self.field(id, "Content-Type")
            .map(|v| header::parse_params(v).0.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Replace the whole Content-Type value; previous parameters are dropped.
    pub fn set_content_type(&mut self, id: PartId, content_type: &str) -> std::result::Result<(), MimeError> {
        self.set_field(id, "Content-Type", content_type)
    }

    fn param(&self, id: PartId, field: &str, name: &str) -> Option<String> {
        let value = self.field(id, field)?;
        let (_, params) = header::parse_params(value);
        header::get_param(&params, name)
    }

    fn set_param(&mut self, id: PartId, field: &str, name: &str, value: &str) -> std::result::Result<(), MimeError> {
        let current = self.field(id, field).unwrap_or("").to_string();
        let (mut main, mut params) = header::parse_params(&current);
        if main.is_empty() && field.eq_ignore_ascii_case("Content-Type") {
            main = "text/plain".to_string();
        }
        header::set_param(&mut params, name, value);
        self.set_field(id, field, &header::format_params(&main, &params))
    }

    /// The `charset` parameter of the Content-Type, if any.
    pub fn charset(&self, id: PartId) -> Option<String> {
        self.param(id, "Content-Type", "charset")
    }

    pub fn set_charset(&mut self, id: PartId, charset: &str) -> std::result::Result<(), MimeError> {
        self.set_param(id, "Content-Type", "charset", charset)
    }

    pub fn boundary(&self, id: PartId) -> Option<String> {
        self.param(id, "Content-Type", "boundary")
    }

    /// Assign a fresh random boundary marker.
    pub fn set_boundary(&mut self, id: PartId) -> std::result::Result<String, MimeError> {
        let boundary = generate_boundary();
        self.set_param(id, "Content-Type", "boundary", &boundary)?;
        Ok(boundary)
    }

    pub fn transfer_encoding(&self, id: PartId) -> Option<String> {
        self.field(id, "Content-Transfer-Encoding")
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }

    /// Set the Content-Transfer-Encoding header. The stored body is not re-encoded.
    pub fn set_transfer_encoding(&mut self, id: PartId, encoding: &str) -> std::result::Result<(), MimeError> {
        self.set_field(id, "Content-Transfer-Encoding", encoding)
    }

    // ── Body ────────────────────────────────────────────────────

    /// Stored (still transfer-encoded) body bytes.
    pub fn raw_body(&self, id: PartId) -> &[u8] {
        self.part(id).map(|p| p.body.as_slice()).unwrap_or(&[])
    }

    pub fn set_raw_body(&mut self, id: PartId, body: Vec<u8>) -> std::result::Result<(), MimeError> {
        self.live_mut(id)?.body = body;
        Ok(())
    }

    /// Stored body as text, without any decoding beyond lossy UTF-8.
    pub fn raw_text(&self, id: PartId) -> String {
        String::from_utf8_lossy(self.raw_body(id)).into_owned()
    }

    /// Body bytes after transfer decoding.
    pub fn decoded_body(&self, id: PartId) -> Vec<u8> {
        TransferEncoding::from_header(self.transfer_encoding(id).as_deref())
            .decode(self.raw_body(id))
    }

    /// Body text after transfer decoding and charset conversion.
    pub fn text(&self, id: PartId) -> String {
        let charset = self.charset(id).unwrap_or_default();
        transfer::decode_charset(&charset, &self.decoded_body(id))
    }

    /// Replace the body with text, encoded in the part's charset and
    /// transfer encoding. Text the charset cannot hold is stored as UTF-8 and
    /// the part is relabelled.
    pub fn set_text(&mut self, id: PartId, text: &str) -> std::result::Result<(), MimeError> {
        let charset = self.charset(id).unwrap_or_default();
        match transfer::encode_charset(&charset, text) {
            Some(bytes) => self.set_decoded_body(id, &bytes),
            None => {
                debug!(charset = %charset, "Charset cannot hold the text, switching part to UTF-8");
                self.set_charset(id, "utf-8")?;
                self.set_decoded_body(id, text.as_bytes())
            }
        }
    }

    /// Replace the body with content bytes, applying the transfer encoding.
    pub fn set_decoded_body(&mut self, id: PartId, data: &[u8]) -> std::result::Result<(), MimeError> {
        let encoded = TransferEncoding::from_header(self.transfer_encoding(id).as_deref())
            .encode(data);
        self.set_raw_body(id, encoded)
    }

    /// Decoded content length in bytes.
    pub fn content_length(&self, id: PartId) -> usize {
        self.decoded_body(id).len()
    }

    /// File name from Content-Disposition `filename`, else Content-Type `name`,
    /// with encoded-words decoded.
    pub fn filename(&self, id: PartId) -> Option<String> {
        self.param(id, "Content-Disposition", "filename")
            .or_else(|| self.param(id, "Content-Type", "name"))
            .map(|name| header::decode_encoded_words(&name))
    }

    // ── Files ───────────────────────────────────────────────────

    /// Load a file into a part as an attachment: content is stored with
    /// the part's transfer encoding and the file name is recorded.
    pub fn read_file_into(&mut self, id: PartId, path: &Path) -> Result<()> {
        let data = std::fs::read(path).map_err(|e| MailError::read(path, e))?;
        self.set_file_content(id, &attachment_name(path), &data)?;
        Ok(())
    }

    /// Store file content in a part under the given file name.
    pub fn set_file_content(&mut self, id: PartId, name: &str, data: &[u8]) -> std::result::Result<(), MimeError> {
        if self.content_type(id).is_empty() {
            self.set_content_type(id, OCTET_STREAM)?;
        }
        let encoded_name = header::encode_unicode_value(name);
        self.set_param(id, "Content-Type", "name", &encoded_name)?;
        self.set_field(id, "Content-Disposition", "attachment")?;
        self.set_param(id, "Content-Disposition", "filename", &encoded_name)?;
        self.set_decoded_body(id, data)
    }

    /// Write the decoded content of a part to a file.
    pub fn write_part_to_file(&self, id: PartId, path: &Path) -> Result<()> {
        self.live(id)?;
        std::fs::write(path, self.decoded_body(id)).map_err(|e| MailError::io(path, e))
    }
}

/// A boundary marker unlikely to appear in any body.
fn generate_boundary() -> String {
    let token: u128 = rand::thread_rng().gen();
    format!("----=_Part_{token:032X}")
}

/// The name an attached file is recorded under.
pub fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}
