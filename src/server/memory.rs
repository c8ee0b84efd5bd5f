//! In-memory collaborators with message files on disk.
//!
//! Used by the command-line tool and by tests. Accounts, folders and
//! permissions live in memory; message files are written under a data
//! directory laid out as `<domain>/<local>/<xx>/<token>.eml`, with public
//! folders under `public/`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{
    AccessControl, Account, Directory, Domain, Folder, FolderCounts, FolderRepository,
    MessageRepository, Permission, Session,
};
use crate::error::Result;
use crate::model::{AccountId, DomainId, FolderId, Message, MessageFlags};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Directory ───────────────────────────────────────────────────

/// Accounts and domains held in memory.
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Mutex<HashMap<AccountId, Account>>,
    domains: Mutex<HashMap<DomainId, Domain>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account: Account) {
        lock(&self.accounts).insert(account.id, account);
    }

    pub fn add_domain(&self, domain: Domain) {
        lock(&self.domains).insert(domain.id, domain);
    }

    /// Add `bytes` to an account's used space.
    pub fn charge(&self, account_id: AccountId, bytes: u64) {
        if let Some(account) = lock(&self.accounts).get_mut(&account_id) {
            account.used_bytes = account.used_bytes.saturating_add(bytes);
        }
    }

    pub fn find_by_address(&self, address: &str) -> Option<Account> {
        lock(&self.accounts)
            .values()
            .find(|a| a.address.eq_ignore_ascii_case(address))
            .cloned()
    }
}

impl Directory for MemoryDirectory {
    fn account(&self, id: AccountId) -> Option<Account> {
        lock(&self.accounts).get(&id).cloned()
    }

    fn domain(&self, id: DomainId) -> Option<Domain> {
        lock(&self.domains).get(&id).cloned()
    }
}

// ── Folders ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FolderState {
    folder: Option<Folder>,
    messages: Vec<Message>,
    needs_refresh: bool,
}

/// Folders and their message lists held in memory.
#[derive(Default)]
pub struct MemoryFolders {
    folders: Mutex<HashMap<FolderId, FolderState>>,
    next_id: AtomicU64,
}

impl MemoryFolders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a folder. Public folders get account id 0.
    pub fn add_folder(&self, account_id: AccountId, path: &str, public: bool) -> Folder {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let folder = Folder {
            id,
            account_id: if public { 0 } else { account_id },
            path: path.to_string(),
            public,
        };
        lock(&self.folders).insert(
            id,
            FolderState {
                folder: Some(folder.clone()),
                ..FolderState::default()
            },
        );
        folder
    }

    /// Link a saved message into its folder.
    pub fn link(&self, message: &Message) {
        if let Some(state) = lock(&self.folders).get_mut(&message.folder_id) {
            state.messages.push(message.clone());
        }
    }

    /// Snapshot of the messages in a folder.
    pub fn messages(&self, folder_id: FolderId) -> Vec<Message> {
        lock(&self.folders)
            .get(&folder_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }
}

impl FolderRepository for MemoryFolders {
    fn folder_by_path(&self, account_id: AccountId, path: &str) -> Option<Folder> {
        let matches = |folder: &Folder| {
            if folder.path.eq_ignore_ascii_case("INBOX") {
                path.eq_ignore_ascii_case("INBOX")
            } else {
                folder.path == path
            }
        };
        let folders = lock(&self.folders);
        let candidates = || folders.values().filter_map(|s| s.folder.as_ref());
        candidates()
            .find(|f| !f.public && f.account_id == account_id && matches(*f))
            .or_else(|| candidates().find(|f| f.public && matches(*f)))
            .cloned()
    }

    fn counts(&self, folder_id: FolderId) -> FolderCounts {
        lock(&self.folders)
            .get(&folder_id)
            .map(|s| FolderCounts {
                exists: s.messages.len() as u32,
                recent: s
                    .messages
                    .iter()
                    .filter(|m| m.flags.contains(MessageFlags::RECENT))
                    .count() as u32,
            })
            .unwrap_or_default()
    }

    fn mark_needs_refresh(&self, folder_id: FolderId) {
        if let Some(state) = lock(&self.folders).get_mut(&folder_id) {
            state.needs_refresh = true;
        }
    }

    fn needs_refresh(&self, folder_id: FolderId) -> bool {
        lock(&self.folders)
            .get(&folder_id)
            .map(|s| s.needs_refresh)
            .unwrap_or(false)
    }
}

// ── Messages ────────────────────────────────────────────────────

/// Message records kept in [`MemoryFolders`], files under a data directory.
pub struct FileMessageRepository {
    data_dir: PathBuf,
    directory: Arc<MemoryDirectory>,
    folders: Arc<MemoryFolders>,
    next_id: AtomicU64,
}

impl FileMessageRepository {
    pub fn new(data_dir: PathBuf, directory: Arc<MemoryDirectory>, folders: Arc<MemoryFolders>) -> Self {
        Self {
            data_dir,
            directory,
            folders,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }
}

impl MessageRepository for FileMessageRepository {
    fn file_path(&self, owner: Option<&Account>, message: &Message) -> PathBuf {
        let base = match owner {
            Some(account) => self
                .data_dir
                .join(account.domain_part())
                .join(account.local_part()),
            None => self.data_dir.join("public"),
        };
        let bucket: String = message.file_token.chars().take(2).collect();
        base.join(bucket).join(message.file_name())
    }

    fn save(&self, message: &mut Message) -> Result<()> {
        if message.id == 0 {
            message.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.folders.link(message);
        self.directory.charge(message.account_id, message.size);
        debug!(id = message.id, folder = message.folder_id, size = message.size, "Saved message");
        Ok(())
    }
}

// ── Access control ──────────────────────────────────────────────

/// A fixed permission table with a default grant for unlisted folders.
pub struct StaticAcl {
    default: HashSet<Permission>,
    grants: Mutex<HashMap<(AccountId, FolderId), HashSet<Permission>>>,
}

impl StaticAcl {
    pub fn new(default: &[Permission]) -> Self {
        Self {
            default: default.iter().copied().collect(),
            grants: Mutex::new(HashMap::new()),
        }
    }

    /// Every permission on every folder.
    pub fn allow_all() -> Self {
        Self::new(&[
            Permission::Lookup,
            Permission::Read,
            Permission::WriteSeen,
            Permission::WriteOthers,
            Permission::Insert,
            Permission::DeleteMessages,
            Permission::Administer,
        ])
    }

    /// Set the exact permissions an account has on a folder.
    pub fn grant(&self, account_id: AccountId, folder_id: FolderId, permissions: &[Permission]) {
        lock(&self.grants).insert(
            (account_id, folder_id),
            permissions.iter().copied().collect(),
        );
    }
}

impl AccessControl for StaticAcl {
    fn check(&self, session: &Session, folder: &Folder, permission: Permission) -> bool {
        let Some(account_id) = session.account_id else {
            return false;
        };
        match lock(&self.grants).get(&(account_id, folder.id)) {
            Some(set) => set.contains(&permission),
            None => self.default.contains(&permission),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: 1,
            domain_id: 1,
            address: "alice@example.com".to_string(),
            quota_bytes: 0,
            used_bytes: 0,
        }
    }

    #[test]
    fn test_inbox_is_case_insensitive() {
        let folders = MemoryFolders::new();
        let inbox = folders.add_folder(1, "INBOX", false);
        folders.add_folder(1, "Sent", false);
        assert_eq!(folders.folder_by_path(1, "inbox"), Some(inbox));
        assert!(folders.folder_by_path(1, "sent").is_none());
        assert!(folders.folder_by_path(2, "INBOX").is_none());
    }

    #[test]
    fn test_public_folder_visible_to_all() {
        let folders = MemoryFolders::new();
        let shared = folders.add_folder(1, "#Public/News", true);
        assert_eq!(folders.folder_by_path(42, "#Public/News"), Some(shared));
    }

    #[test]
    fn test_file_path_layout() {
        let repo = FileMessageRepository::new(
            PathBuf::from("/data"),
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryFolders::new()),
        );
        let mut message = Message::new(1, 1);
        message.file_token = "AB12-token".to_string();
        assert_eq!(
            repo.file_path(Some(&account()), &message),
            PathBuf::from("/data/example.com/alice/AB/AB12-token.eml")
        );
        assert_eq!(
            repo.file_path(None, &message),
            PathBuf::from("/data/public/AB/AB12-token.eml")
        );
    }

    #[test]
    fn test_save_links_and_charges() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_account(account());
        let folders = Arc::new(MemoryFolders::new());
        let inbox = folders.add_folder(1, "INBOX", false);
        let repo = FileMessageRepository::new(PathBuf::from("/data"), directory.clone(), folders.clone());

        let mut message = Message::new(1, inbox.id);
        message.size = 120;
        message.flags = MessageFlags::RECENT;
        repo.save(&mut message).unwrap();

        assert_eq!(message.id, 1);
        assert_eq!(folders.counts(inbox.id), FolderCounts { exists: 1, recent: 1 });
        assert_eq!(directory.account(1).unwrap().used_bytes, 120);
    }

    #[test]
    fn test_static_acl() {
        let acl = StaticAcl::new(&[Permission::Insert]);
        let folder = Folder {
            id: 3,
            account_id: 1,
            path: "INBOX".to_string(),
            public: false,
        };
        let session = Session::new(1).authenticated(1);
        assert!(acl.check(&session, &folder, Permission::Insert));
        assert!(!acl.check(&session, &folder, Permission::WriteSeen));

        acl.grant(1, 3, &[Permission::WriteSeen]);
        assert!(acl.check(&session, &folder, Permission::WriteSeen));
        assert!(!acl.check(&session, &folder, Permission::Insert));

        assert!(!acl.check(&Session::new(2), &folder, Permission::Insert));
    }
}
