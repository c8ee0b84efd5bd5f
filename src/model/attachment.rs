//! Attachments: handles into a message's part tree.
//!
//! An [`Attachment`] is only a reference to a part of a [`MessageData`];
//! nothing is copied. The list returned by [`MessageData::attachments`] is
//! derived once and cached, so after a part is removed or the tree is
//! reshaped by hand it may hold handles to freed parts. Those fail with
//! [`MimeError::StalePart`] rather than reaching another part; call
//! [`MessageData::reload_attachments`] to re-derive the list.

use std::path::Path;

use tracing::debug;

use crate::error::{MailError, Result};
use crate::mime::part::attachment_name;
use crate::mime::{MimeError, PartId, OCTET_STREAM};
use crate::model::envelope::MessageData;

/// A non-owning reference to an attachment part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attachment {
    part: PartId,
}

impl Attachment {
    pub fn new(part: PartId) -> Self {
        Self { part }
    }

    pub fn part(&self) -> PartId {
        self.part
    }

    fn check(&self, message: &MessageData) -> Result<()> {
        if message.tree.contains(self.part) {
            Ok(())
        } else {
            Err(MimeError::StalePart.into())
        }
    }

    /// Decoded file name, empty when the part carries none.
    pub fn file_name(&self, message: &MessageData) -> Result<String> {
        self.check(message)?;
        Ok(message.tree.filename(self.part).unwrap_or_default())
    }

    /// Decoded content size in bytes.
    pub fn size(&self, message: &MessageData) -> Result<u64> {
        self.check(message)?;
        Ok(message.tree.content_length(self.part) as u64)
    }

    pub fn content_type(&self, message: &MessageData) -> Result<String> {
        self.check(message)?;
        Ok(message.tree.content_type(self.part))
    }

    /// Write the decoded content to `path`.
    pub fn save_as(&self, message: &MessageData, path: &Path) -> Result<()> {
        self.check(message)?;
        message.tree.write_part_to_file(self.part, path)
    }
}

/// The attachment list of one message.
pub struct Attachments<'a> {
    message: &'a mut MessageData,
}

impl MessageData {
    /// The attachments of this message, derived from the tree on first use.
    pub fn attachments(&mut self) -> Attachments<'_> {
        if self.attachments.is_none() {
            let list = self
                .tree
                .attachment_parts()
                .into_iter()
                .map(Attachment::new)
                .collect();
            self.attachments = Some(list);
        }
        Attachments { message: self }
    }
}

impl Attachments<'_> {
    fn list(&self) -> &[Attachment] {
        self.message.attachments.as_deref().unwrap_or(&[])
    }

    fn list_mut(&mut self) -> &mut Vec<Attachment> {
        self.message.attachments.get_or_insert_with(Vec::new)
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Attachment> {
        self.list().get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Attachment> + '_ {
        self.list().iter().copied()
    }

    /// The message the list belongs to, for per-attachment accessors.
    pub fn message(&self) -> &MessageData {
        &*self.message
    }

    /// Attach a file: a new base64 `application/octet-stream` part holding
    /// the file content, named after the file. The tree is changed
    /// immediately.
    pub fn add_file(&mut self, path: &Path) -> Result<Attachment> {
        if !path.is_file() {
            return Err(MailError::FileNotFound(path.to_path_buf()));
        }
        // A failed read must leave the tree untouched
        let data = std::fs::read(path).map_err(|e| MailError::read(path, e))?;

        let part = self.message.create_part(OCTET_STREAM)?;
        let tree = &mut self.message.tree;
        tree.set_transfer_encoding(part, "base64")?;
        tree.set_file_content(part, &attachment_name(path), &data)?;

        debug!(path = %path.display(), "Attached file");
        let attachment = Attachment::new(part);
        self.list_mut().push(attachment);
        Ok(attachment)
    }

    /// Append an existing handle without touching the tree.
    pub fn push(&mut self, attachment: Attachment) {
        self.list_mut().push(attachment);
    }

    /// Remove an attachment's part from the tree. The cached list is left
    /// as it is.
    pub fn remove(&mut self, attachment: &Attachment) -> Result<()> {
        self.message.remove_attachment(attachment)
    }

    /// Empty the list and drop every part below the root.
    pub fn clear(&mut self) {
        self.list_mut().clear();
        self.message.tree.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::MULTIPART_MIXED;

    #[test]
    fn test_add_file_and_accessors() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, b"twelve bytes").unwrap();

        let mut message = MessageData::new();
        message.set_body("Body").unwrap();
        let att = message.attachments().add_file(&file).unwrap();

        assert_eq!(message.attachments().len(), 1);
        assert_eq!(att.file_name(&message).unwrap(), "notes.txt");
        assert_eq!(att.size(&message).unwrap(), 12);
        assert_eq!(att.content_type(&message).unwrap(), OCTET_STREAM);
        assert_eq!(message.tree().content_type(message.tree().root()), MULTIPART_MIXED);
        assert_eq!(message.body(), "Body\r\n");
    }

    #[test]
    fn test_add_missing_file() {
        let mut message = MessageData::new();
        let err = message
            .attachments()
            .add_file(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert!(matches!(err, MailError::FileNotFound(_)));
        assert_eq!(message.tree().part_count(message.tree().root()), 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_unreadable_file_leaves_tree_unchanged() {
        // A regular file whose first page cannot be read
        let unreadable = Path::new("/proc/self/mem");

        let mut message = MessageData::new();
        message.set_body("Body").unwrap();
        let before = message.to_bytes();

        let err = message.attachments().add_file(unreadable).unwrap_err();
        assert!(matches!(err, MailError::Io { .. }), "got {err:?}");
        assert_eq!(message.tree().content_type(message.tree().root()), "text/plain");
        assert_eq!(message.tree().part_count(message.tree().root()), 0);
        assert!(message.attachments().is_empty());
        assert_eq!(message.to_bytes(), before);
    }

    #[test]
    fn test_remove_leaves_stale_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.bin");
        std::fs::write(&file, [1u8, 2, 3]).unwrap();

        let mut message = MessageData::new();
        let att = message.attachments().add_file(&file).unwrap();
        message.attachments().remove(&att).unwrap();

        // The cache is not re-derived
        assert_eq!(message.attachments().len(), 1);
        assert!(matches!(
            att.size(&message),
            Err(MailError::Mime(MimeError::StalePart))
        ));

        message.reload_attachments();
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_save_as() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("in.bin");
        std::fs::write(&file, [9u8, 8, 7]).unwrap();

        let mut message = MessageData::new();
        let att = message.attachments().add_file(&file).unwrap();
        let out = tmp.path().join("out.bin");
        att.save_as(&message, &out).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), vec![9u8, 8, 7]);
    }

    #[test]
    fn test_clear_drops_parts() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("x.bin");
        std::fs::write(&file, [0u8]).unwrap();

        let mut message = MessageData::new();
        message.attachments().add_file(&file).unwrap();
        message.attachments().clear();
        assert!(message.attachments().is_empty());
        assert_eq!(message.tree().part_count(message.tree().root()), 0);
    }

    #[test]
    fn test_push_existing_handle() {
        let mut message = MessageData::new();
        let part = message.create_part("image/png").unwrap();
        message.reload_attachments();
        let mut list = message.attachments();
        assert_eq!(list.len(), 1);
        list.push(Attachment::new(part));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1), Some(Attachment::new(part)));
    }
}
