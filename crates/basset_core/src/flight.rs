//! Per-key single-flight locks.

use std::collections::HashMap;
use std::sync::Arc;

use basset_cache::AssetKey;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per key so that concurrent resolves of the same
/// asset do the work once. The table lock is only held to look up the slot.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<AssetKey, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive access to one key. Dropping it releases the key and removes
/// the slot once nobody else is waiting on it.
#[derive(Debug)]
pub struct KeyGuard {
    key: AssetKey,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<AssetKey, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and takes it.
    pub async fn lock(&self, key: &AssetKey) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        KeyGuard {
            key: key.clone(),
            guard: Some(slot.lock_owned().await),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if let Some(guard) = self.guard.take() {
            let mutex = OwnedMutexGuard::mutex(&guard).clone();
            drop(guard);
            // One reference in the table, one held here.
            if Arc::strong_count(&mutex) == 2 {
                slots.remove(&self.key);
            }
        }
    }
}
