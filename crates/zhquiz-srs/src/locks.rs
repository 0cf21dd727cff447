//! Per-item locks for serializing read-modify-write on one quiz item.

use crate::models::{QuizId, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type ItemKey = (UserId, QuizId);

/// Registry of async mutexes keyed by `(user, quiz)`.
///
/// Entries are held weakly: once the last guard for a key is dropped the
/// slot is reclaimed on a later acquire.
#[derive(Debug, Default)]
pub struct ItemLocks {
    slots: Mutex<HashMap<ItemKey, Weak<AsyncMutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one item.
    pub async fn acquire(&self, user_id: &str, id: QuizId) -> OwnedMutexGuard<()> {
        let lock = self.slot(user_id, id);
        lock.lock_owned().await
    }

    fn slot(&self, user_id: &str, id: QuizId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock();
        let key = (user_id.to_string(), id);

        if let Some(existing) = slots.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        slots.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        slots.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Number of keys currently tracked, live or not yet pruned.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(ItemLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.acquire("alice", id).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("alice", id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = ItemLocks::new();
        let id = Uuid::new_v4();

        let _a = locks.acquire("alice", id).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bob", id))
            .await
            .unwrap();
        let _c = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire("alice", Uuid::new_v4()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_released_slots_are_pruned() {
        let locks = ItemLocks::new();
        for _ in 0..10 {
            let _g = locks.acquire("alice", Uuid::new_v4()).await;
        }
        let _g = locks.acquire("alice", Uuid::new_v4()).await;
        assert_eq!(locks.tracked(), 1);
    }
}
