// ABOUTME: In-process per-key async locks serialising writes to one slot, path or request
// ABOUTME: Keys are strings like "slot:<project>/<stage>/<key>"; idle entries are pruned lazily

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `key` remains; the guard releases on drop.
    pub async fn lock(&self, key: impl Into<String>) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(key.into()).or_default().clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }
}

pub fn slot_key(project_id: Uuid, stage_id: Uuid, slot_key: &str) -> String {
    format!("slot:{}/{}/{}", project_id, stage_id, slot_key)
}

pub fn archive_key(project_id: Uuid, path: &str) -> String {
    format!("path:{}/{}", project_id, path)
}

pub fn stages_key(project_id: Uuid) -> String {
    format!("stages:{}", project_id)
}

pub fn request_key(target_id: Uuid) -> String {
    format!("target:{}", target_id)
}
