//! The server around the message core: accounts, folders, storage,
//! permissions and change notifications.
//!
//! Everything here is reached through the traits below and handed to the
//! IMAP layer as one [`Services`] bundle, so the ingestion logic never
//! looks anything up globally.

pub mod cache;
pub mod memory;
pub mod notify;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::{AccountId, DomainId, FolderId, Message};

/// Identifies one client connection.
pub type ClientId = u64;

/// A mail account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub domain_id: DomainId,
    pub address: String,
    /// Storage quota in bytes, 0 for unlimited.
    pub quota_bytes: u64,
    pub used_bytes: u64,
}

impl Account {
    /// True when `bytes` more can be stored without exceeding the quota.
    pub fn space_available(&self, bytes: u64) -> bool {
        self.quota_bytes == 0 || self.used_bytes.saturating_add(bytes) <= self.quota_bytes
    }

    /// The part of the address before `@`.
    pub fn local_part(&self) -> &str {
        self.address
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.address)
    }

    /// The part of the address after `@`, empty when there is none.
    pub fn domain_part(&self) -> &str {
        self.address
            .split_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("")
    }
}

/// A mail domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    /// Largest message accepted for this domain in KB, 0 for no limit.
    pub max_message_size_kb: u64,
}

/// A mailbox. Public folders are shared and belong to no account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub account_id: AccountId,
    pub path: String,
    pub public: bool,
}

/// Message counts reported to a client that has the folder selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderCounts {
    pub exists: u32,
    pub recent: u32,
}

/// Folder permissions (RFC 4314 rights).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Lookup,
    Read,
    WriteSeen,
    WriteOthers,
    Insert,
    DeleteMessages,
    Administer,
}

/// What happened in a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    MessageAdded,
    MessageDeleted,
    FlagsChanged,
    FolderRefresh,
}

/// A change other connections watching the folder should learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub account_id: AccountId,
    pub folder_id: FolderId,
    pub kind: ChangeKind,
}

/// State of one client connection as far as the message core cares.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub client_id: ClientId,
    /// The logged-in account, `None` before authentication.
    pub account_id: Option<AccountId>,
    /// The currently selected folder.
    pub selected: Option<FolderId>,
}

impl Session {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            ..Self::default()
        }
    }

    pub fn authenticated(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn select(&mut self, folder_id: FolderId) {
        self.selected = Some(folder_id);
    }

    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some()
    }
}

/// Server-wide limits for message ingestion.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Largest APPEND accepted in KB, 0 for no limit.
    pub max_message_size_kb: u64,
    /// Literal bytes buffered before an early flush to disk.
    pub flush_threshold: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Limits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_message_size_kb: config.limits.max_message_size_kb,
            flush_threshold: config.limits.flush_threshold,
        }
    }
}

/// Account and domain lookup.
pub trait Directory: Send + Sync {
    fn account(&self, id: AccountId) -> Option<Account>;
    fn domain(&self, id: DomainId) -> Option<Domain>;
    /// Drop any cached copy of an account after its usage changed.
    fn refresh_account(&self, _id: AccountId) {}
}

/// Folder lookup and folder state.
pub trait FolderRepository: Send + Sync {
    /// Resolve a folder path for an account. `INBOX` matches case-insensitively.
    fn folder_by_path(&self, account_id: AccountId, path: &str) -> Option<Folder>;
    fn counts(&self, folder_id: FolderId) -> FolderCounts;
    fn mark_needs_refresh(&self, folder_id: FolderId);
    fn needs_refresh(&self, folder_id: FolderId) -> bool;
}

/// Message record persistence.
pub trait MessageRepository: Send + Sync {
    /// Where the file of `message` lives. `owner` is `None` for public folders.
    fn file_path(&self, owner: Option<&Account>, message: &Message) -> PathBuf;
    /// Store the record: assigns its id, links it into its folder and
    /// charges its size to the account.
    fn save(&self, message: &mut Message) -> Result<()>;
}

/// Folder access control.
pub trait AccessControl: Send + Sync {
    fn check(&self, session: &Session, folder: &Folder, permission: Permission) -> bool;
}

/// Distribution point for folder changes.
pub trait ChangeNotifier: Send + Sync {
    /// Publish a change to every interested connection except `origin`.
    fn publish(&self, origin: Option<ClientId>, notification: ChangeNotification);
}

/// Everything the IMAP layer needs from the rest of the server.
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn Directory>,
    pub folders: Arc<dyn FolderRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub acl: Arc<dyn AccessControl>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub limits: Limits,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(quota: u64, used: u64) -> Account {
        Account {
            id: 1,
            domain_id: 1,
            address: "user@example.com".to_string(),
            quota_bytes: quota,
            used_bytes: used,
        }
    }

    #[test]
    fn test_space_available_boundary() {
        let acc = account(1000, 400);
        assert!(acc.space_available(600));
        assert!(!acc.space_available(601));
    }

    #[test]
    fn test_unlimited_quota() {
        assert!(account(0, u64::MAX).space_available(u64::MAX));
    }

    #[test]
    fn test_address_parts() {
        let acc = account(0, 0);
        assert_eq!(acc.local_part(), "user");
        assert_eq!(acc.domain_part(), "example.com");
    }

    #[test]
    fn test_session_flow() {
        let mut session = Session::new(7);
        assert!(!session.is_authenticated());
        session = session.authenticated(3);
        session.select(11);
        assert_eq!(session.account_id, Some(3));
        assert_eq!(session.selected, Some(11));
    }
}
