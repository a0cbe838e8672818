//! Two-tier cache engine with single-flight population and origin-version
//! invalidation

use crate::cache::value::{structured_cache_value, StoredEntry};
use crate::cache::{
    CacheEntry, CacheError, CacheValue, EntryOptions, LocalTier, SharedCache, UNVERSIONED,
};
use crate::config::{CacheSettings, SiteSettings};
use crate::origin::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Builds are attempted at most this many times when the origin version moves
/// while a build is in flight
pub const MAX_BUILD_ATTEMPTS: u32 = 2;

/// Source of the origin's coarse content version
#[async_trait]
pub trait OriginVersionSource: Send + Sync {
    async fn current_version(&self, site: &SiteSettings) -> Result<i64, ApiError>;
}

/// Timing policy of the engine
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub default_options: EntryOptions,
    pub version_poll_interval: Duration,
    pub version_record_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            default_options: EntryOptions::sliding(Duration::from_secs(60 * 60))
                .with_absolute(Duration::from_secs(6 * 60 * 60)),
            version_poll_interval: Duration::from_secs(5),
            version_record_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl From<&CacheSettings> for CachePolicy {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            default_options: EntryOptions::sliding(settings.default_sliding())
                .with_absolute(settings.default_absolute()),
            version_poll_interval: settings.version_poll_interval(),
            version_record_ttl: settings.version_record_ttl(),
        }
    }
}

/// Last polled origin version and when it was polled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginVersionRecord {
    pub version: i64,
    pub checked_at: DateTime<Utc>,
}

structured_cache_value!(OriginVersionRecord);

impl OriginVersionRecord {
    fn checked_now(version: i64) -> Self {
        Self {
            version,
            checked_at: Utc::now(),
        }
    }

    fn is_fresh(&self, interval: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.checked_at)
            .to_std()
            .map(|age| age <= interval)
            .unwrap_or(true)
    }
}

pub fn origin_version_key(site: &SiteSettings) -> String {
    format!("{}|origin-version", site.origin_address())
}

/// Local tier in front of a shared tier.
///
/// `get_or_create` runs its builder at most once at a time per key within
/// this process: concurrent callers for the same key wait on a per-key mutex
/// and pick up the freshly built value. The mutex registry grows with the
/// key space and is never pruned.
pub struct CacheEngine {
    local: LocalTier,
    shared: Arc<dyn SharedCache>,
    versions: Arc<dyn OriginVersionSource>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    policy: CachePolicy,
}

impl CacheEngine {
    pub fn new(
        shared: Arc<dyn SharedCache>,
        versions: Arc<dyn OriginVersionSource>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            local: LocalTier::new(),
            shared,
            versions,
            locks: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn default_options(&self) -> EntryOptions {
        self.policy.default_options
    }

    /// Look a value up in the local tier, then the shared tier.
    ///
    /// Never builds; with `versioned` the entry must match the current origin
    /// version.
    pub async fn get<T: CacheValue>(
        &self,
        site: &SiteSettings,
        key: &str,
        versioned: bool,
    ) -> Result<Option<T>, CacheError> {
        let required = self.required_version(site, versioned).await?;
        Ok(self.lookup(key, required).await)
    }

    /// Return the cached value for `key`, building it with `builder` on a miss.
    ///
    /// Builder errors are returned unchanged and nothing is cached.
    #[instrument(skip(self, site, builder), fields(origin = %site.origin_host()))]
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        site: &SiteSettings,
        key: &str,
        options: EntryOptions,
        versioned: bool,
        mut builder: F,
    ) -> Result<T, E>
    where
        T: CacheValue,
        E: From<CacheError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let required = self.required_version(site, versioned).await?;
            let value = self
                .get_or_build(key, required, options, &mut builder)
                .await?;

            if !versioned || attempt >= MAX_BUILD_ATTEMPTS {
                return Ok(value);
            }
            let current = self.required_version(site, true).await?;
            if current == required {
                return Ok(value);
            }

            debug!(
                key = %key,
                built_against = required,
                current,
                "Origin content changed during build, rebuilding"
            );
            self.local.remove(key);
            attempt += 1;
        }
    }

    /// Write `value` to both tiers
    pub async fn set<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        origin_version: i64,
        options: EntryOptions,
    ) {
        self.write_through(key, CacheEntry::new(origin_version, value), options)
            .await;
    }

    /// Evict `key` from both tiers
    pub async fn remove(&self, key: &str) {
        self.local.remove(key);
        if let Err(error) = self.shared.remove(key).await {
            warn!(key = %key, error = %error, "Shared cache remove failed");
        }
    }

    /// Current origin version, polling the origin at most once per interval
    pub async fn origin_version(&self, site: &SiteSettings) -> Result<i64, CacheError> {
        let key = origin_version_key(site);
        let options = EntryOptions::sliding(self.policy.version_record_ttl);

        let record: OriginVersionRecord = self
            .get_or_build(&key, UNVERSIONED, options, &mut || async {
                let version = self.versions.current_version(site).await?;
                Ok::<_, CacheError>(OriginVersionRecord::checked_now(version))
            })
            .await?;

        let interval = self.policy.version_poll_interval;
        if record.is_fresh(interval) {
            return Ok(record.version);
        }

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        if let Some(current) = self.lookup::<OriginVersionRecord>(&key, UNVERSIONED).await {
            if current.is_fresh(interval) {
                return Ok(current.version);
            }
        }

        match self.versions.current_version(site).await {
            Ok(version) => {
                if version != record.version {
                    debug!(
                        origin = %site.origin_host(),
                        previous = record.version,
                        version,
                        "Origin content version changed"
                    );
                }
                self.write_through(
                    &key,
                    CacheEntry::unversioned(OriginVersionRecord::checked_now(version)),
                    options,
                )
                .await;
                Ok(version)
            }
            Err(error) => {
                warn!(
                    origin = %site.origin_host(),
                    error = %error,
                    "Origin version poll failed, keeping last known version"
                );
                Ok(record.version)
            }
        }
    }

    pub fn local_entry_count(&self) -> usize {
        self.local.len()
    }

    /// Remove expired local entries
    pub fn purge_expired(&self) -> usize {
        self.local.purge_expired()
    }

    async fn required_version(
        &self,
        site: &SiteSettings,
        versioned: bool,
    ) -> Result<i64, CacheError> {
        if versioned {
            self.origin_version(site).await
        } else {
            Ok(UNVERSIONED)
        }
    }

    /// Steps shared by every population path: fast path, lock, recheck local,
    /// adopt from shared, build once and write through
    async fn get_or_build<T, E, F, Fut>(
        &self,
        key: &str,
        required: i64,
        options: EntryOptions,
        builder: &mut F,
    ) -> Result<T, E>
    where
        T: CacheValue,
        E: From<CacheError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.local.get::<T>(key, required) {
            return Ok(value);
        }

        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        if let Some(value) = self.local.get::<T>(key, required) {
            return Ok(value);
        }

        if let Some((entry, stored_options)) = self.read_shared::<T>(key).await {
            if entry.is_valid_for(required) {
                debug!(key = %key, "Adopted entry from shared tier");
                let payload = entry.payload.clone();
                self.local.insert(key, entry, stored_options);
                return Ok(payload);
            }
        }

        let payload = builder().await?;
        self.write_through(key, CacheEntry::new(required, payload.clone()), options)
            .await;
        Ok(payload)
    }

    async fn lookup<T: CacheValue>(&self, key: &str, required: i64) -> Option<T> {
        if let Some(value) = self.local.get::<T>(key, required) {
            return Some(value);
        }
        let (entry, options) = self.read_shared::<T>(key).await?;
        if !entry.is_valid_for(required) {
            return None;
        }
        let payload = entry.payload.clone();
        self.local.insert(key, entry, options);
        Some(payload)
    }

    async fn read_shared<T: CacheValue>(&self, key: &str) -> Option<(CacheEntry<T>, EntryOptions)> {
        let raw = match self.shared.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(key = %key, error = %error, "Shared cache read failed, treating as miss");
                return None;
            }
        };

        match StoredEntry::from_json(&raw).and_then(CacheEntry::<T>::from_stored) {
            Ok((_, options)) if options.is_exhausted() => {
                debug!(key = %key, "Shared entry is past its absolute deadline, treating as miss");
                None
            }
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(key = %key, error = %error, "Undecodable shared cache entry, treating as miss");
                None
            }
        }
    }

    async fn write_through<T: CacheValue>(
        &self,
        key: &str,
        entry: CacheEntry<T>,
        options: EntryOptions,
    ) {
        match entry.to_stored(options).and_then(|stored| stored.to_json()) {
            Ok(raw) => {
                if let Err(error) = self.shared.set(key, raw, options).await {
                    warn!(key = %key, error = %error, "Shared cache write failed");
                }
            }
            Err(error) => {
                warn!(key = %key, error = %error, "Cache entry could not be encoded for the shared tier");
            }
        }
        self.local.insert(key, entry, options);
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }
}
