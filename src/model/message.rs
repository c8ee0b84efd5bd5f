//! The message record: the bookkeeping a mailbox keeps for one stored message.

use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use rand::Rng;

use super::{AccountId, FolderId, MessageId};

bitflags! {
    /// IMAP system flags stored with a message.
    #[derive(Default)]
    pub struct MessageFlags: u32 {
        const SEEN = 1 << 0;
        const DELETED = 1 << 1;
        const DRAFT = 1 << 2;
        const ANSWERED = 1 << 3;
        const FLAGGED = 1 << 4;
        const RECENT = 1 << 5;
    }
}

impl MessageFlags {
    /// Parse an IMAP flag list such as `(\Seen \Flagged)`, case-insensitively.
    ///
    /// Unknown flags and keywords are ignored. `\Recent` cannot be set by a
    /// client and is ignored too.
    pub fn from_imap_list(list: &str) -> Self {
        list.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .filter(|token| !token.is_empty())
            .fold(Self::empty(), |flags, token| {
                let flag = match token.to_ascii_lowercase().as_str() {
                    "\\seen" => Self::SEEN,
                    "\\deleted" => Self::DELETED,
                    "\\draft" => Self::DRAFT,
                    "\\answered" => Self::ANSWERED,
                    "\\flagged" => Self::FLAGGED,
                    _ => Self::empty(),
                };
                flags | flag
            })
    }
}

/// Delivery state of a message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageState {
    /// Allocated but its content is not yet complete.
    #[default]
    Created,
    /// Content written and visible in its folder.
    Delivered,
}

/// One stored message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Zero until the record has been saved.
    pub id: MessageId,
    pub account_id: AccountId,
    pub folder_id: FolderId,
    /// Unique token naming the message file on disk.
    pub file_token: String,
    /// Size of the message file in bytes.
    pub size: u64,
    pub state: MessageState,
    pub flags: MessageFlags,
    /// Internal date. `None` means "when it was saved".
    pub create_time: Option<DateTime<Utc>>,
}

/// A record shared between the component that owns it and the envelopes
/// that were loaded for it.
pub type SharedMessage = Arc<Mutex<Message>>;

impl Message {
    /// A fresh, unsaved record in the given folder with a new file token.
    pub fn new(account_id: AccountId, folder_id: FolderId) -> Self {
        Self {
            id: 0,
            account_id,
            folder_id,
            file_token: guid_token(),
            size: 0,
            state: MessageState::Created,
            flags: MessageFlags::empty(),
            create_time: None,
        }
    }

    /// The message file name, `<token>.eml`.
    pub fn file_name(&self) -> String {
        format!("{}.eml", self.file_token)
    }

    pub fn set_flag(&mut self, flag: MessageFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn into_shared(self) -> SharedMessage {
        Arc::new(Mutex::new(self))
    }
}

/// A random token formatted like a GUID: `8-4-4-4-12` upper-case hex digits.
pub fn guid_token() -> String {
    let v: u128 = rand::thread_rng().gen();
    let hex = format!("{v:032X}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
