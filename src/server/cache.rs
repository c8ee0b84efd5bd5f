//! LRU cache in front of a [`Directory`].

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::trace;

use super::{Account, Directory, Domain};
use crate::model::{AccountId, DomainId};

/// Caches account and domain lookups of an inner [`Directory`].
///
/// Accounts carry quota usage, which changes as messages are stored; call
/// [`CachedDirectory::invalidate_account`] after such a change.
pub struct CachedDirectory {
    inner: Arc<dyn Directory>,
    accounts: Mutex<LruCache<AccountId, Account>>,
    domains: Mutex<LruCache<DomainId, Domain>>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn Directory>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            accounts: Mutex::new(LruCache::new(capacity)),
            domains: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn invalidate_account(&self, id: AccountId) {
        lock(&self.accounts).pop(&id);
    }

    pub fn invalidate_domain(&self, id: DomainId) {
        lock(&self.domains).pop(&id);
    }
}

impl Directory for CachedDirectory {
    fn account(&self, id: AccountId) -> Option<Account> {
        if let Some(account) = lock(&self.accounts).get(&id) {
            trace!(account = id, "Account cache hit");
            return Some(account.clone());
        }
        let account = self.inner.account(id)?;
        lock(&self.accounts).put(id, account.clone());
        Some(account)
    }

    fn domain(&self, id: DomainId) -> Option<Domain> {
        if let Some(domain) = lock(&self.domains).get(&id) {
            return Some(domain.clone());
        }
        let domain = self.inner.domain(id)?;
        lock(&self.domains).put(id, domain.clone());
        Some(domain)
    }

    fn refresh_account(&self, id: AccountId) {
        self.invalidate_account(id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::memory::MemoryDirectory;

    fn setup() -> (Arc<MemoryDirectory>, CachedDirectory) {
        let dir = Arc::new(MemoryDirectory::new());
        dir.add_domain(Domain {
            id: 1,
            name: "example.com".to_string(),
            max_message_size_kb: 0,
        });
        dir.add_account(Account {
            id: 5,
            domain_id: 1,
            address: "a@example.com".to_string(),
            quota_bytes: 100,
            used_bytes: 0,
        });
        let cached = CachedDirectory::new(dir.clone(), 4);
        (dir, cached)
    }

    #[test]
    fn test_cached_until_invalidated() {
        let (dir, cached) = setup();
        assert_eq!(cached.account(5).unwrap().used_bytes, 0);

        dir.charge(5, 40);
        assert_eq!(cached.account(5).unwrap().used_bytes, 0);

        cached.invalidate_account(5);
        assert_eq!(cached.account(5).unwrap().used_bytes, 40);
    }

    #[test]
    fn test_missing_entries_are_not_cached() {
        let (_, cached) = setup();
        assert!(cached.account(99).is_none());
        assert_eq!(cached.domain(1).unwrap().name, "example.com");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cached = CachedDirectory::new(Arc::new(MemoryDirectory::new()), 0);
        assert!(cached.account(1).is_none());
    }
}
