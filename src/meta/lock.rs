//! Per-key population locks.
//!
//! A lock is advisory and self-expiring: whoever holds it is populating the
//! fast cache for that key, everybody else waits a bounded time and then
//! proceeds without it. Every acquisition gets its own token, and only the
//! matching token releases the lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

const POLL_INITIAL: Duration = Duration::from_millis(25);
const POLL_MAX: Duration = Duration::from_millis(500);

/// Identifies one acquisition of a lock.
pub type LockToken = u64;

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Non-blocking. The lock expires by itself after `ttl`.
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<LockToken>;

    /// Waits until the lock is released or `timeout` elapses.
    /// Returns `true` if the lock is still held when the wait ends.
    async fn wait(&self, key: &str, timeout: Duration) -> bool;

    /// No-op unless `token` still owns the lock.
    async fn release(&self, key: &str, token: LockToken);
}

struct Held {
    token: LockToken,
    expiry: Instant,
}

/// Process-local lock table.
#[derive(Default)]
pub struct LocalLockManager {
    held: Mutex<HashMap<String, Held>>,
    next_token: AtomicU64,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_held(&self, key: &str) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        match held.get(key) {
            Some(lock) if lock.expiry > Instant::now() => true,
            Some(_) => {
                held.remove(key);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<LockToken> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        // drop locks abandoned by cancelled populations
        held.retain(|_, lock| lock.expiry > now);
        if held.contains_key(key) {
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        held.insert(
            key.to_string(),
            Held {
                token,
                expiry: now + ttl,
            },
        );
        trace!(key, token, "population lock acquired");
        Some(token)
    }

    async fn wait(&self, key: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut delay = POLL_INITIAL;
        loop {
            if !self.is_held(key) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }

    async fn release(&self, key: &str, token: LockToken) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.get(key).is_some_and(|lock| lock.token == token) {
            held.remove(key);
            trace!(key, token, "population lock released");
        } else {
            trace!(key, token, "population lock already expired or taken over");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let locks = LocalLockManager::new();
        let token = locks.acquire("k", Duration::from_secs(5)).await.unwrap();
        assert!(locks.acquire("k", Duration::from_secs(5)).await.is_none());
        assert!(locks.acquire("other", Duration::from_secs(5)).await.is_some());

        locks.release("k", token).await;
        assert!(locks.acquire("k", Duration::from_secs(5)).await.is_some());
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let locks = LocalLockManager::new();
        assert!(locks.acquire("k", Duration::from_millis(20)).await.is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(locks.acquire("k", Duration::from_millis(20)).await.is_some());
    }

    #[tokio::test]
    async fn test_stale_release_keeps_new_holder() {
        let locks = LocalLockManager::new();
        let first = locks.acquire("k", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = locks.acquire("k", Duration::from_secs(5)).await.unwrap();
        assert_ne!(first, second);

        // the expired holder finishing late must not unlock the new one
        locks.release("k", first).await;
        assert!(locks.acquire("k", Duration::from_secs(5)).await.is_none());
        assert!(locks.wait("k", Duration::from_millis(30)).await);

        locks.release("k", second).await;
        assert!(locks.acquire("k", Duration::from_secs(5)).await.is_some());
    }

    #[tokio::test]
    async fn test_acquire_purges_expired_entries() {
        let locks = LocalLockManager::new();
        for key in ["a", "b", "c"] {
            assert!(locks.acquire(key, Duration::from_millis(10)).await.is_some());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(locks.acquire("d", Duration::from_secs(5)).await.is_some());
        let held = locks.held.lock().unwrap();
        assert_eq!(held.len(), 1);
        assert!(held.contains_key("d"));
    }

    #[tokio::test]
    async fn test_wait_returns_on_release() {
        let locks = Arc::new(LocalLockManager::new());
        let token = locks.acquire("k", Duration::from_secs(5)).await.unwrap();

        let releaser = locks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            releaser.release("k", token).await;
        });

        assert!(!locks.wait("k", Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_times_out_while_held() {
        let locks = LocalLockManager::new();
        assert!(locks.acquire("k", Duration::from_secs(5)).await.is_some());
        assert!(locks.wait("k", Duration::from_millis(60)).await);
        assert!(!locks.wait("free", Duration::from_millis(60)).await);
    }
}
