//! Persistent blob stores backing the disk cache.
//!
//! `DirBlobStore` keeps one file per logical key inside a cache directory.
//! File names are the SHA-256 of the key, so keys may contain any characters
//! and the directory layout never leaks document identities. The store is
//! bounded by a byte budget and evicts least recently used blobs to stay
//! under it. `MemoryBlobStore` offers the same contract without touching the
//! filesystem.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::CacheError;

const BLOB_EXTENSION: &str = "blob";

/// Name-spaced key/value store for opaque blobs
///
/// Treated as a cache, not a database: no enumeration, no transactions.
/// Concurrent writers of the same key resolve as last-write-wins.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn contains(&self, key: &str) -> Result<bool, CacheError>;
}

/// Statistics for monitoring disk cache performance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskCacheStats {
    /// Number of cache hits (successful retrievals)
    pub hits: u64,
    /// Number of cache misses (failed retrievals)
    pub misses: u64,
    /// Number of blobs evicted to free space
    pub evictions: u64,
    /// Total number of blobs in the store
    pub blob_count: usize,
    /// Total disk space used in bytes
    pub disk_used: usize,
}

impl DiskCacheStats {
    /// Calculate cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct StoreState {
    /// File name -> blob size
    entries: HashMap<String, usize>,
    /// front = least recently used, back = most recently used
    lru_queue: VecDeque<String>,
    stats: DiskCacheStats,
    disk_limit: usize,
    cache_dir: PathBuf,
}

impl StoreState {
    fn touch(&mut self, name: &str) {
        self.lru_queue.retain(|n| n != name);
        self.lru_queue.push_back(name.to_string());
    }

    fn forget(&mut self, name: &str) -> Option<usize> {
        let size = self.entries.remove(name)?;
        self.lru_queue.retain(|n| n != name);
        self.stats.disk_used = self.stats.disk_used.saturating_sub(size);
        self.stats.blob_count = self.entries.len();
        Some(size)
    }

    fn evict_lru(&mut self) -> io::Result<()> {
        if let Some(name) = self.lru_queue.front().cloned() {
            self.forget(&name);
            remove_if_present(&self.cache_dir.join(&name))?;
            self.stats.evictions += 1;
            log::trace!("evicted disk blob {}", name);
        }
        Ok(())
    }

    fn evict_until_space_available(&mut self, needed: usize) -> io::Result<()> {
        while self.stats.disk_used + needed > self.disk_limit && !self.lru_queue.is_empty() {
            self.evict_lru()?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Content-addressed directory store with an LRU byte budget
#[derive(Clone)]
pub struct DirBlobStore {
    state: Arc<Mutex<StoreState>>,
}

impl DirBlobStore {
    /// Open (or create) a store rooted at `cache_dir` with a limit in bytes
    ///
    /// Blobs already in the directory are indexed oldest-modified first, so
    /// the least recently written ones are the first to go.
    pub fn new<P: AsRef<Path>>(cache_dir: P, disk_limit: usize) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;

        let mut found: Vec<(SystemTime, String, usize)> = Vec::new();
        for entry in fs::read_dir(&cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, name.to_string(), metadata.len() as usize));
        }
        found.sort();

        let mut state = StoreState {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: DiskCacheStats::default(),
            disk_limit,
            cache_dir,
        };
        for (_, name, size) in found {
            state.stats.disk_used += size;
            state.entries.insert(name.clone(), size);
            state.lru_queue.push_back(name);
        }
        state.stats.blob_count = state.entries.len();
        state.evict_until_space_available(0)?;

        log::debug!(
            "disk store at {} holds {} blobs ({} bytes)",
            state.cache_dir.display(),
            state.stats.blob_count,
            state.stats.disk_used
        );

        Ok(Self { state: Arc::new(Mutex::new(state)) })
    }

    /// Open a store with its limit given in megabytes
    pub fn with_mb_limit<P: AsRef<Path>>(
        cache_dir: P,
        megabytes: usize,
    ) -> Result<Self, CacheError> {
        Self::new(cache_dir, megabytes.saturating_mul(1024 * 1024))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// File name for a logical key
    fn file_name(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}.{}", hex::encode(digest), BLOB_EXTENSION)
    }

    pub fn stats(&self) -> DiskCacheStats {
        self.lock().stats
    }

    pub fn disk_limit(&self) -> usize {
        self.lock().disk_limit
    }

    pub fn disk_used(&self) -> usize {
        self.lock().stats.disk_used
    }

    pub fn blob_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.lock().cache_dir.clone()
    }

    /// Update the byte budget, evicting if now over it
    pub fn set_disk_limit(&self, new_limit: usize) -> Result<(), CacheError> {
        let mut state = self.lock();
        state.disk_limit = new_limit;
        state.evict_until_space_available(0)?;
        Ok(())
    }

    /// Remove every blob
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.lock();
        let names: Vec<String> = state.entries.keys().cloned().collect();
        for name in names {
            remove_if_present(&state.cache_dir.join(&name))?;
        }
        state.entries.clear();
        state.lru_queue.clear();
        state.stats.blob_count = 0;
        state.stats.disk_used = 0;
        Ok(())
    }
}

impl BlobStore for DirBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let name = Self::file_name(key);
        let mut state = self.lock();

        if !state.entries.contains_key(&name) {
            state.stats.misses += 1;
            return Ok(None);
        }

        match fs::read(state.cache_dir.join(&name)) {
            Ok(bytes) => {
                state.touch(&name);
                state.stats.hits += 1;
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Removed behind our back (another process or a manual wipe)
                state.forget(&name);
                state.stats.misses += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let name = Self::file_name(key);
        let mut state = self.lock();

        if bytes.len() > state.disk_limit {
            return Err(CacheError::TooLarge { size: bytes.len(), limit: state.disk_limit });
        }

        state.forget(&name);
        state.evict_until_space_available(bytes.len())?;

        // Write-then-rename so a reader never sees a torn blob
        let path = state.cache_dir.join(&name);
        let staging = path.with_extension(format!("tmp-{}", std::process::id()));
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &path)?;

        state.entries.insert(name.clone(), bytes.len());
        state.lru_queue.push_back(name);
        state.stats.disk_used += bytes.len();
        state.stats.blob_count = state.entries.len();
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let name = Self::file_name(key);
        let mut state = self.lock();
        if state.forget(&name).is_some() {
            remove_if_present(&state.cache_dir.join(&name))?;
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock().entries.contains_key(&Self::file_name(key)))
    }
}

/// Process-local store, for hosts without a writable cache directory
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock().contains_key(key))
    }
}
