//! Per-key async mutexes.
//!
//! The processor retries and fans out webhook deliveries concurrently;
//! handlers serialize per subscription (or session) id through this lock so
//! two deliveries for the same entity never interleave. Database unique
//! constraints remain the backstop for anything that slips through (multiple
//! engine replicas).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A map of named async mutexes.
///
/// Entries are created on first use and kept for the process lifetime; the
/// key space is bounded by the number of live subscriptions.
#[derive(Default)]
pub struct KeyedLock {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                map.entry(key.to_owned())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLock::new());
        let concurrent = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("sub_1").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLock::new();
        let _a = locks.acquire("sub_1").await;
        // Would deadlock if keys shared a mutex.
        let _b = locks.acquire("sub_2").await;
    }
}
