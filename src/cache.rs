//! Short-TTL local result cache.
//!
//! Entries are stored as `{ "data": ..., "ts": <epoch ms> }` JSON under keys
//! namespaced by crate and format version. Reads past the TTL are misses;
//! writes are best-effort and never fail the request that triggered them.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::constants::cache::{
    DEFAULT_STORE_DIR, DEFAULT_STORE_FILENAME, KEY_ABSENT, KEY_NAMESPACE,
};
use crate::data::{RecordId, ResourceKind, Scope};
use crate::errors::AggregateError;
use crate::types::{CacheKeyString, TimestampMs};

/// Time source for cache freshness checks.
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> TimestampMs;
}

/// Wall-clock time via `chrono`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `now_ms`.
    pub fn new(now_ms: TimestampMs) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    /// Jump to `now_ms`.
    pub fn set(&self, now_ms: TimestampMs) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Identity of one cached aggregation result.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Resource class.
    pub kind: ResourceKind,
    /// Owning company/branch and type filter.
    pub scope: Scope,
    /// Cursor (or page number for windowed resources) the result starts at.
    pub cursor: RecordId,
    /// Requested result size.
    pub size: usize,
    /// Include-disabled flag as requested.
    pub include_disabled: bool,
}

impl CacheKey {
    /// Deterministic string form under `version`.
    pub fn render(&self, version: &str) -> CacheKeyString {
        format!(
            "{KEY_NAMESPACE}:{version}:{kind}:c={company}:b={branch}:t={filter}:cur={cursor}:n={size}:dis={disabled}",
            kind = self.kind.as_str(),
            company = escape_part(Some(&self.scope.company_id)),
            branch = escape_part(self.scope.branch_id.as_ref()),
            filter = escape_part(self.scope.kind_filter.as_ref()),
            cursor = self.cursor,
            size = self.size,
            disabled = u8::from(self.include_disabled),
        )
    }
}

fn escape_part(part: Option<&String>) -> String {
    match part {
        None => KEY_ABSENT.to_string(),
        Some(value) => value
            .replace('%', "%25")
            .replace(':', "%3A")
            .replace('=', "%3D")
            .replace('-', "%2D"),
    }
}

/// Persisted cache payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cached aggregation result.
    pub data: T,
    /// Write time in epoch milliseconds.
    pub ts: TimestampMs,
}

/// Key-value persistence behind the result cache.
pub trait CacheStore: Send + Sync {
    /// Raw payload stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AggregateError>;
    /// Store `payload` under `key`, replacing any previous value.
    fn store(&self, key: &str, payload: &[u8]) -> Result<(), AggregateError>;
    /// Remove `key` if present.
    fn remove(&self, key: &str) -> Result<(), AggregateError>;
}

/// In-process store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKeyString, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemoryCacheStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once total payload bytes would exceed `quota`.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache store poisoned").len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AggregateError> {
        let entries = self.entries.read().expect("cache store poisoned");
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, payload: &[u8]) -> Result<(), AggregateError> {
        let mut entries = self.entries.write().expect("cache store poisoned");
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(_, bytes)| bytes.len())
                .sum();
            if used + payload.len() > quota {
                return Err(AggregateError::CacheStore(format!(
                    "quota exceeded ({} + {} > {quota} bytes)",
                    used,
                    payload.len()
                )));
            }
        }
        entries.insert(key.to_string(), payload.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AggregateError> {
        self.entries
            .write()
            .expect("cache store poisoned")
            .remove(key);
        Ok(())
    }
}

/// File-backed store on a single `simd-r-drive` append-only data file.
///
/// Writes append a new version of the key and reads return the latest one,
/// so concurrent writers to the same key never observe a torn entry.
pub struct FileCacheStore {
    store: DataStore,
    path: PathBuf,
}

impl fmt::Debug for FileCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCacheStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileCacheStore {
    /// Open (or create) a store at `path`.
    ///
    /// An existing directory resolves to the default file name inside it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, AggregateError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        Ok(Self { store, path })
    }

    /// Default store file relative to the working directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default store file inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Data file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AggregateError> {
        self.store
            .read(key.as_bytes())
            .map_err(map_store_err)?
            .map(|entry| Ok(entry.as_ref().to_vec()))
            .transpose()
    }

    fn store(&self, key: &str, payload: &[u8]) -> Result<(), AggregateError> {
        self.store
            .write(key.as_bytes(), payload)
            .map_err(map_store_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AggregateError> {
        if self.load(key)?.is_none() {
            return Ok(());
        }
        self.store.delete(key.as_bytes()).map_err(map_store_err)?;
        Ok(())
    }
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return FileCacheStore::default_path_in_dir(path);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), AggregateError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> AggregateError {
    AggregateError::CacheStore(err.to_string())
}

/// TTL-bounded cache of aggregation results.
///
/// Concurrent writers to the same key simply overwrite each other.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    version: String,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("version", &self.version)
            .finish()
    }
}

impl ResultCache {
    /// Cache over `store` using wall-clock time.
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Cache over `store` using `clock`.
    pub fn with_clock(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: config.ttl,
            version: config.key_version.clone(),
        }
    }

    /// Freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh payload for `key`, or `None` on miss, expiry, or unreadable entry.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let rendered = key.render(&self.version);
        let bytes = match self.store.load(&rendered) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %rendered, "result cache miss");
                return None;
            }
            Err(err) => {
                warn!(key = %rendered, error = %err, "result cache read failed");
                return None;
            }
        };
        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = %rendered, error = %err, "discarding unreadable cache entry");
                return None;
            }
        };
        let age = self.clock.now_ms().saturating_sub(entry.ts);
        if age < duration_ms(self.ttl) {
            debug!(key = %rendered, age_ms = age, "result cache hit");
            Some(entry.data)
        } else {
            debug!(key = %rendered, age_ms = age, "result cache entry expired");
            None
        }
    }

    /// Store `data` under `key`; returns `false` when the write was dropped.
    pub fn put<T: Serialize>(&self, key: &CacheKey, data: &T) -> bool {
        let rendered = key.render(&self.version);
        let entry = CacheEntry {
            data,
            ts: self.clock.now_ms(),
        };
        let result = serde_json::to_vec(&entry)
            .map_err(AggregateError::from)
            .and_then(|payload| self.store.store(&rendered, &payload));
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %rendered, error = %err, "result cache write dropped");
                false
            }
        }
    }

    /// Remove the entry for `key`, ignoring store failures.
    pub fn invalidate(&self, key: &CacheKey) {
        let rendered = key.render(&self.version);
        if let Err(err) = self.store.remove(&rendered) {
            warn!(key = %rendered, error = %err, "result cache invalidation failed");
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(cursor: RecordId) -> CacheKey {
        CacheKey {
            kind: ResourceKind::Employee,
            scope: Scope::company("12").with_branch("3"),
            cursor,
            size: 20,
            include_disabled: false,
        }
    }

    fn cache_with(store: Arc<dyn CacheStore>, clock: Arc<ManualClock>) -> ResultCache {
        ResultCache::with_clock(store, clock, &CacheConfig::default())
    }

    #[test]
    fn key_rendering_is_deterministic_and_versioned() {
        assert_eq!(
            key(0).render("v1"),
            "pagewise:v1:employee:c=12:b=3:t=-:cur=0:n=20:dis=0"
        );
        assert_ne!(key(0).render("v1"), key(0).render("v2"));
        assert_ne!(key(0).render("v1"), key(5).render("v1"));
    }

    #[test]
    fn key_parts_cannot_collide_through_separators() {
        let tricky = CacheKey {
            scope: Scope::company("12:b=3"),
            ..key(0)
        };
        let absent = CacheKey {
            scope: Scope::company("-"),
            ..key(0)
        };
        assert_ne!(tricky.render("v1"), key(0).render("v1"));
        assert!(absent.render("v1").contains("c=%2D"));
    }

    #[test]
    fn ttl_boundary_hit_then_miss() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = cache_with(Arc::new(MemoryCacheStore::new()), clock.clone());
        assert!(cache.put(&key(0), &vec![1, 2, 3]));

        clock.advance(cache.ttl() - Duration::from_millis(1));
        assert_eq!(cache.get::<Vec<i32>>(&key(0)), Some(vec![1, 2, 3]));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get::<Vec<i32>>(&key(0)), None);
    }

    #[test]
    fn expired_entries_are_overwritten() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(Arc::new(MemoryCacheStore::new()), clock.clone());
        cache.put(&key(0), &"old");
        clock.advance(Duration::from_secs(600));
        assert_eq!(cache.get::<String>(&key(0)), None);
        cache.put(&key(0), &"new");
        assert_eq!(cache.get::<String>(&key(0)).as_deref(), Some("new"));
    }

    #[test]
    fn write_failures_are_swallowed() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(Arc::new(MemoryCacheStore::with_quota(4)), clock);
        assert!(!cache.put(&key(0), &"far too large for the quota"));
        assert_eq!(cache.get::<String>(&key(0)), None);
    }

    #[test]
    fn corrupt_entries_read_as_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        store.store(&key(0).render("v1"), b"{not json").unwrap();
        let cache = cache_with(store, Arc::new(ManualClock::new(0)));
        assert_eq!(cache.get::<String>(&key(0)), None);
    }

    #[test]
    fn file_store_round_trips_and_invalidates() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileCacheStore::open(dir.path().join("cache")).unwrap());
        let clock = Arc::new(ManualClock::new(10));
        let cache = cache_with(store.clone(), clock);
        cache.put(&key(7), &vec!["a".to_string()]);
        assert_eq!(cache.get::<Vec<String>>(&key(7)), Some(vec!["a".to_string()]));

        let raw = store.load(&key(7).render("v1")).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["ts"], 10);
        assert_eq!(value["data"][0], "a");

        cache.invalidate(&key(7));
        assert_eq!(cache.get::<Vec<String>>(&key(7)), None);
        cache.invalidate(&key(7));
    }

    #[test]
    fn file_store_keeps_one_valid_entry_under_concurrent_writers() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileCacheStore::open(dir.path()).unwrap());
        assert_eq!(store.path(), FileCacheStore::default_path_in_dir(dir.path()));
        let cache = cache_with(store, Arc::new(ManualClock::new(0)));

        std::thread::scope(|scope| {
            for writer in 0..8u32 {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..25u32 {
                        assert!(cache.put(&key(1), &vec![writer; (round % 5 + 1) as usize]));
                    }
                });
            }
        });

        let value = cache.get::<Vec<u32>>(&key(1)).unwrap();
        assert!(!value.is_empty());
        assert!(value.iter().all(|writer| *writer == value[0]));
    }

    #[test]
    fn file_store_reopens_with_latest_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.bin");
        {
            let store = FileCacheStore::open(&path).unwrap();
            store.store("k", b"first").unwrap();
            store.store("k", b"second").unwrap();
            store.remove("gone").unwrap();
        }
        let store = FileCacheStore::open(&path).unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some(&b"second"[..]));
        store.remove("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
    }
}
