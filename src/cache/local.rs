//! Process-local cache tier holding decoded values

use crate::cache::{CacheEntry, CacheValue, EntryOptions};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

struct LocalSlot {
    origin_version: i64,
    value: Arc<dyn Any + Send + Sync>,
    options: EntryOptions,
    created_at: Instant,
    last_access: Instant,
}

impl LocalSlot {
    fn is_expired(&self, now: Instant) -> bool {
        self.options
            .is_expired(self.created_at, self.last_access, now)
    }
}

/// Best-effort accelerator in front of the shared tier.
///
/// Entries are replaced, never mutated; a read only refreshes the sliding
/// window of a live entry.
#[derive(Default)]
pub struct LocalTier {
    entries: DashMap<String, LocalSlot>,
}

impl LocalTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload when present, unexpired, of type `T` and built
    /// against `required_version`
    pub fn get<T: CacheValue>(&self, key: &str, required_version: i64) -> Option<T> {
        let now = Instant::now();
        if let Some(mut slot) = self.entries.get_mut(key) {
            if !slot.is_expired(now) {
                if slot.origin_version != required_version {
                    return None;
                }
                slot.last_access = now;
                return slot.value.downcast_ref::<T>().cloned();
            }
        }
        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        None
    }

    pub fn insert<T: CacheValue>(&self, key: &str, entry: CacheEntry<T>, options: EntryOptions) {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            LocalSlot {
                origin_version: entry.origin_version,
                value: Arc::new(entry.payload),
                options,
                created_at: now,
                last_access: now,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_version_mismatch_is_a_miss() {
        let tier = LocalTier::new();
        tier.insert("k", CacheEntry::new(5, 99i64), EntryOptions::default());
        assert_eq!(tier.get::<i64>("k", 5), Some(99));
        assert_eq!(tier.get::<i64>("k", 6), None);
        // Stale entries are left for the engine to evict
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let tier = LocalTier::new();
        tier.insert("k", CacheEntry::unversioned("text".to_string()), EntryOptions::default());
        assert_eq!(tier.get::<i64>("k", 0), None);
        assert_eq!(tier.get::<String>("k", 0), Some("text".to_string()));
    }

    #[test]
    fn test_expired_entries_are_removed_on_read() {
        let tier = LocalTier::new();
        tier.insert(
            "k",
            CacheEntry::unversioned(1i64),
            EntryOptions::absolute(Duration::from_millis(5)),
        );
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(tier.get::<i64>("k", 0), None);
        assert!(tier.is_empty());
    }
}
