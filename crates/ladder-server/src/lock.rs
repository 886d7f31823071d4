use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Process-wide matchmaker locks, one per queue name.
///
/// Locks are not persisted. A guard releases its lock on drop; an admin
/// override can clear every lock, after which stale guards release nothing.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    inner: Arc<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    held: DashMap<String, u64>,
    next_token: AtomicU64,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `queue` unless someone already holds it.
    pub fn try_acquire(&self, queue: &str) -> Option<LockGuard> {
        let key = queue.to_lowercase();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        match self.inner.held.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(token);
                Some(LockGuard {
                    registry: self.inner.clone(),
                    key,
                    token,
                })
            }
        }
    }

    pub fn is_locked(&self, queue: &str) -> bool {
        self.inner.held.contains_key(&queue.to_lowercase())
    }

    /// Names of the queues currently locked.
    pub fn held(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.held.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Force-release every lock. Returns how many were held.
    pub fn clear_all(&self) -> usize {
        let count = self.inner.held.len();
        self.inner.held.clear();
        count
    }
}

/// Holds a queue lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    registry: Arc<Registry>,
    key: String,
    token: u64,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only release if the lock is still ours; it may have been force-cleared
        // and re-taken since.
        self.registry
            .held
            .remove_if(&self.key, |_, token| *token == self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let locks = LockRegistry::new();
        let guard = locks.try_acquire("Blitz").unwrap();
        assert!(locks.try_acquire("blitz").is_none());
        assert!(locks.is_locked("BLITZ"));
        drop(guard);
        assert!(!locks.is_locked("blitz"));
        assert!(locks.try_acquire("blitz").is_some());
    }

    #[test]
    fn queues_lock_independently() {
        let locks = LockRegistry::new();
        let _a = locks.try_acquire("blitz").unwrap();
        let _b = locks.try_acquire("rapid").unwrap();
        assert_eq!(locks.held(), vec!["blitz".to_string(), "rapid".to_string()]);
    }

    #[test]
    fn stale_guard_does_not_release_new_holder() {
        let locks = LockRegistry::new();
        let stale = locks.try_acquire("blitz").unwrap();
        assert_eq!(locks.clear_all(), 1);

        let fresh = locks.try_acquire("blitz").unwrap();
        drop(stale);
        assert!(locks.is_locked("blitz"));
        drop(fresh);
        assert!(!locks.is_locked("blitz"));
    }
}
