//! Shared (cross-process) cache tier

use crate::cache::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Expiration options for a cache entry.
///
/// `sliding` is renewed on every read, `absolute` is measured from the write.
/// An entry expires as soon as either window has elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    pub sliding: Option<Duration>,
    pub absolute: Option<Duration>,
}

impl EntryOptions {
    pub fn sliding(sliding: Duration) -> Self {
        Self {
            sliding: Some(sliding),
            absolute: None,
        }
    }

    pub fn absolute(absolute: Duration) -> Self {
        Self {
            sliding: None,
            absolute: Some(absolute),
        }
    }

    pub fn with_absolute(mut self, absolute: Duration) -> Self {
        self.absolute = Some(absolute);
        self
    }

    pub fn is_expired(&self, created_at: Instant, last_access: Instant, now: Instant) -> bool {
        let absolute_elapsed = self
            .absolute
            .is_some_and(|absolute| now.duration_since(created_at) >= absolute);
        let sliding_elapsed = self
            .sliding
            .is_some_and(|sliding| now.duration_since(last_access) >= sliding);
        absolute_elapsed || sliding_elapsed
    }

    /// Options of a copy of an entry written `age` ago; the absolute deadline
    /// stays where the original write put it
    pub fn aged(mut self, age: Duration) -> Self {
        self.absolute = self
            .absolute
            .map(|absolute| absolute.saturating_sub(age));
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.absolute.is_some_and(|absolute| absolute.is_zero())
    }

    /// Time-to-live right after a read, bounded by the absolute deadline
    pub fn remaining(&self, created_at: Instant, now: Instant) -> Option<Duration> {
        let absolute_left = self
            .absolute
            .map(|absolute| absolute.saturating_sub(now.duration_since(created_at)));
        match (self.sliding, absolute_left) {
            (Some(sliding), Some(left)) => Some(sliding.min(left)),
            (Some(sliding), None) => Some(sliding),
            (None, left) => left,
        }
    }
}

/// String-keyed store shared by every proxy instance.
///
/// Values are opaque UTF-8 strings. Implementations report faults as
/// [`CacheError::SharedTierUnavailable`]; callers treat them as misses.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, options: EntryOptions) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct SharedSlot {
    value: String,
    options: EntryOptions,
    created_at: Instant,
    last_access: Instant,
}

/// Process-local stand-in for a distributed cache
#[derive(Debug, Default)]
pub struct InMemorySharedCache {
    entries: DashMap<String, SharedSlot>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| !slot.options.is_expired(slot.created_at, slot.last_access, now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(mut slot) = self.entries.get_mut(key) {
            if !slot.options.is_expired(slot.created_at, slot.last_access, now) {
                slot.last_access = now;
                return Ok(Some(slot.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, slot| {
            slot.options.is_expired(slot.created_at, slot.last_access, now)
        });
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, options: EntryOptions) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            SharedSlot {
                value,
                options,
                created_at: now,
                last_access: now,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
