//! Per-conversation concurrency control.
//!
//! Every mutation of a conversation happens under its own `Semaphore(1)`.
//! Concurrent turns on the same conversation queue; waiting is bounded,
//! and exceeding the bound surfaces as a 503 with a retry-after hint so
//! the widget can back off instead of piling up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-conversation turn locks.
pub struct ConversationLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ConversationLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a conversation, waiting at most `wait`.
    ///
    /// The permit auto-releases on drop, on every exit path.
    pub async fn acquire(
        &self,
        key: &str,
        wait: Duration,
    ) -> Result<OwnedSemaphorePermit, LockTimeout> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        match tokio::time::timeout(wait, sem.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(LockTimeout),
        }
    }

    /// Number of tracked conversations (for monitoring).
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop lock entries that nobody currently holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// Bounded lock wait exceeded; the handler answers 503.
#[derive(Debug)]
pub struct LockTimeout;

impl std::fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conversation is busy, try again shortly")
    }
}

impl std::error::Error for LockTimeout {}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn sequential_access() {
        let map = ConversationLockMap::new();
        let p1 = map.acquire("AB1234", WAIT).await.unwrap();
        drop(p1);
        let p2 = map.acquire("AB1234", WAIT).await.unwrap();
        drop(p2);
    }

    #[tokio::test]
    async fn different_conversations_run_in_parallel() {
        let map = ConversationLockMap::new();
        let _p1 = map.acquire("AB1234", WAIT).await.unwrap();
        let _p2 = map.acquire("CD5678", WAIT).await.unwrap();
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let map = ConversationLockMap::new();
        let _held = map.acquire("AB1234", WAIT).await.unwrap();
        let start = std::time::Instant::now();
        let result = map.acquire("AB1234", Duration::from_millis(20)).await;
        assert!(result.is_err());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let map = Arc::new(ConversationLockMap::new());
        let p1 = map.acquire("AB1234", WAIT).await.unwrap();

        let map2 = map.clone();
        let handle = tokio::spawn(async move {
            map2.acquire("AB1234", Duration::from_secs(2)).await.is_ok()
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(p1);
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = ConversationLockMap::new();
        let _held = map.acquire("AB1234", WAIT).await.unwrap();
        let released = map.acquire("CD5678", WAIT).await.unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.len(), 1);
    }
}
