//! Disk cache bridge between the viewer and a persistent blob store.
//!
//! Keys are composed of a namespace version, the document identity, the
//! tier and the page:
//!
//! ```text
//! pageflow-v1/<identity>/<tier>/page-<n>.png
//! pageflow-v1/<identity>/warm-complete.marker
//! ```
//!
//! Every operation is best-effort. Store and codec failures are logged and
//! reported as a miss or silently dropped; nothing here is allowed to fail a
//! render.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bitmap::Tier;
use crate::codec::{decode_png, encode_png, BLOB_EXTENSION};
use crate::config::CacheConfig;
use crate::disk::{BlobStore, DirBlobStore, MemoryBlobStore};
use crate::writer::PersistWriter;
use crate::CacheError;

/// Contents of the warm-complete marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmMarker {
    pub identity: String,
    pub page_count: u32,
    /// Seconds since the Unix epoch
    pub written_at: u64,
}

/// Persistent page cache keyed by (identity, tier, page)
pub struct DiskCacheBridge {
    store: Arc<dyn BlobStore>,
    namespace: String,
    writer: Option<PersistWriter>,
}

impl DiskCacheBridge {
    /// Bridge over `store`, writing inline
    pub fn new(store: Arc<dyn BlobStore>, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into(), writer: None }
    }

    /// Build the bridge described by `config`
    ///
    /// Falls back to a process-local store when the cache directory cannot
    /// be opened, and to inline writes when the writer thread cannot start.
    pub fn from_config(config: &CacheConfig) -> Self {
        let store: Arc<dyn BlobStore> =
            match DirBlobStore::new(&config.disk_cache_dir, config.disk_cache_bytes()) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    log::warn!(
                        "disk cache at {} unavailable, keeping pages in memory: {}",
                        config.disk_cache_dir.display(),
                        e
                    );
                    Arc::new(MemoryBlobStore::new())
                }
            };

        let bridge = Self::new(store, config.namespace.clone());
        if config.background_writes {
            bridge.with_background_writer()
        } else {
            bridge
        }
    }

    /// Route writes through a dedicated writer thread
    pub fn with_background_writer(mut self) -> Self {
        match PersistWriter::spawn(Arc::clone(&self.store)) {
            Ok(writer) => self.writer = Some(writer),
            Err(e) => log::warn!("persist writer failed to start, writing inline: {}", e),
        }
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn page_key(&self, identity: &str, tier: Tier, page: u32) -> String {
        format!("{}/{}/{}/page-{}.{}", self.namespace, identity, tier, page, BLOB_EXTENSION)
    }

    pub fn marker_key(&self, identity: &str) -> String {
        format!("{}/{}/warm-complete.marker", self.namespace, identity)
    }

    /// Read a persisted page blob
    pub fn read(&self, identity: &str, tier: Tier, page: u32) -> Option<Vec<u8>> {
        let key = self.page_key(identity, tier, page);
        match self.store.get(&key) {
            Ok(blob) => blob,
            Err(e) => {
                log::debug!("disk read {} failed: {}", key, e);
                None
            }
        }
    }

    /// Read and decode a persisted page
    ///
    /// A blob that no longer decodes is removed so it stops costing reads.
    pub fn read_bitmap(&self, identity: &str, tier: Tier, page: u32) -> Option<RgbaImage> {
        let blob = self.read(identity, tier, page)?;
        match decode_png(&blob) {
            Ok(image) => Some(image),
            Err(e) => {
                let key = self.page_key(identity, tier, page);
                log::warn!("dropping undecodable blob {}: {}", key, e);
                if let Err(e) = self.store.remove(&key) {
                    log::debug!("removing {} failed: {}", key, e);
                }
                None
            }
        }
    }

    /// Whether a blob for the page is stored, without reading it
    pub fn contains(&self, identity: &str, tier: Tier, page: u32) -> bool {
        let key = self.page_key(identity, tier, page);
        match self.store.contains(&key) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("disk lookup {} failed: {}", key, e);
                false
            }
        }
    }

    /// Persist an encoded page blob
    pub fn write(&self, identity: &str, tier: Tier, page: u32, blob: Vec<u8>) {
        let key = self.page_key(identity, tier, page);
        self.put(key, blob);
    }

    /// Encode and persist a page bitmap, off-thread when a writer is running
    pub fn write_bitmap(&self, identity: &str, tier: Tier, page: u32, image: Arc<RgbaImage>) {
        let key = self.page_key(identity, tier, page);

        if let Some(writer) = &self.writer {
            match writer.submit_bitmap(key.clone(), Arc::clone(&image)) {
                Ok(()) => return,
                Err(e) => log::debug!("writer rejected {}: {}", key, e),
            }
        }

        let result = encode_png(&image).and_then(|bytes| self.store.put(&key, &bytes));
        if let Err(e) = result {
            log::debug!("disk write {} failed: {}", key, e);
        }
    }

    /// Whether a prior session warmed the entire document
    ///
    /// The marker only counts while every warm page it vouches for is still
    /// stored. A marker that outlived an evicted page is removed.
    pub fn has_warm_marker(&self, identity: &str) -> bool {
        let Some(marker) = self.read_warm_marker(identity) else {
            return false;
        };

        let missing =
            (1..=marker.page_count).find(|&page| !self.contains(identity, Tier::Warm, page));
        let Some(page) = missing else {
            return true;
        };

        let key = self.marker_key(identity);
        log::debug!("warm page {} of {} is gone, dropping marker {}", page, identity, key);
        if let Err(e) = self.store.remove(&key) {
            log::debug!("removing {} failed: {}", key, e);
        }
        false
    }

    pub fn read_warm_marker(&self, identity: &str) -> Option<WarmMarker> {
        let key = self.marker_key(identity);
        let bytes = match self.store.get(&key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                log::debug!("marker read {} failed: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice::<WarmMarker>(&bytes) {
            Ok(marker) if marker.identity == identity => Some(marker),
            Ok(_) => None,
            Err(e) => {
                log::debug!("ignoring malformed marker {}: {}", key, e);
                None
            }
        }
    }

    /// Record that every page of `identity` has been warmed
    pub fn write_warm_marker(&self, identity: &str, page_count: u32) {
        let written_at =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let marker = WarmMarker { identity: identity.to_string(), page_count, written_at };

        match serde_json::to_vec(&marker) {
            Ok(bytes) => self.put(self.marker_key(identity), bytes),
            Err(e) => log::debug!("marker encode failed: {}", CacheError::from(e)),
        }
    }

    /// Block until queued background writes are on disk
    pub fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush();
        }
    }

    fn put(&self, key: String, bytes: Vec<u8>) {
        if let Some(writer) = &self.writer {
            match writer.submit_blob(key.clone(), bytes.clone()) {
                Ok(()) => return,
                Err(e) => log::debug!("writer rejected {}: {}", key, e),
            }
        }

        if let Err(e) = self.store.put(&key, &bytes) {
            log::debug!("disk write {} failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_bridge() -> (DiskCacheBridge, MemoryBlobStore) {
        let store = MemoryBlobStore::new();
        (DiskCacheBridge::new(Arc::new(store.clone()), "pageflow-test"), store)
    }

    #[test]
    fn keys_are_namespaced() {
        let (bridge, _) = memory_bridge();

        assert_eq!(bridge.page_key("doc-1", Tier::Warm, 7), "pageflow-test/doc-1/warm/page-7.png");
        assert_eq!(bridge.marker_key("doc-1"), "pageflow-test/doc-1/warm-complete.marker");
    }

    #[test]
    fn test_write_then_read() {
        let (bridge, _) = memory_bridge();

        bridge.write("doc", Tier::Warm, 1, vec![9, 9]);

        assert_eq!(bridge.read("doc", Tier::Warm, 1), Some(vec![9, 9]));
        assert_eq!(bridge.read("doc", Tier::Display, 1), None);
        assert_eq!(bridge.read("other", Tier::Warm, 1), None);
    }

    #[test]
    fn test_bitmap_round_trip() {
        let (bridge, _) = memory_bridge();

        bridge.write_bitmap("doc", Tier::Warm, 2, Arc::new(RgbaImage::new(6, 8)));

        let image = bridge.read_bitmap("doc", Tier::Warm, 2).expect("bitmap should persist");
        assert_eq!(image.dimensions(), (6, 8));
    }

    #[test]
    fn corrupt_blob_is_a_miss_and_removed() {
        let (bridge, store) = memory_bridge();
        bridge.write("doc", Tier::Warm, 3, b"garbage".to_vec());

        assert!(bridge.read_bitmap("doc", Tier::Warm, 3).is_none());
        assert!(!store.contains(&bridge.page_key("doc", Tier::Warm, 3)).unwrap());
    }

    fn write_warm_pages(bridge: &DiskCacheBridge, identity: &str, pages: u32) {
        for page in 1..=pages {
            bridge.write(identity, Tier::Warm, page, vec![page as u8; 4]);
        }
    }

    #[test]
    fn test_warm_marker() {
        let (bridge, _) = memory_bridge();
        assert!(!bridge.has_warm_marker("doc"));

        write_warm_pages(&bridge, "doc", 50);
        bridge.write_warm_marker("doc", 50);

        assert!(bridge.has_warm_marker("doc"));
        assert!(!bridge.has_warm_marker("other"));
        assert_eq!(bridge.read_warm_marker("doc").map(|m| m.page_count), Some(50));
    }

    #[test]
    fn malformed_marker_is_ignored() {
        let (bridge, store) = memory_bridge();
        store.put(&bridge.marker_key("doc"), b"{").unwrap();

        assert!(!bridge.has_warm_marker("doc"));
    }

    #[test]
    fn namespace_rotation_orphans_old_entries() {
        let store = MemoryBlobStore::new();
        let v1 = DiskCacheBridge::new(Arc::new(store.clone()), "pageflow-v1");
        v1.write("doc", Tier::Warm, 1, vec![1]);
        v1.write_warm_marker("doc", 1);
        assert!(v1.has_warm_marker("doc"));

        let v2 = DiskCacheBridge::new(Arc::new(store), "pageflow-v2");
        assert!(v2.read("doc", Tier::Warm, 1).is_none());
        assert!(!v2.has_warm_marker("doc"));
    }

    #[test]
    fn test_background_writer_flush() {
        let store = MemoryBlobStore::new();
        let bridge = DiskCacheBridge::new(Arc::new(store.clone()), "ns").with_background_writer();

        bridge.write_bitmap("doc", Tier::Warm, 1, Arc::new(RgbaImage::new(2, 2)));
        bridge.write_warm_marker("doc", 1);
        bridge.flush();

        assert!(bridge.read_bitmap("doc", Tier::Warm, 1).is_some());
        assert!(bridge.has_warm_marker("doc"));
    }

    #[test]
    fn marker_without_its_pages_is_dropped() {
        let (bridge, store) = memory_bridge();
        write_warm_pages(&bridge, "doc", 5);
        bridge.write_warm_marker("doc", 5);
        store.remove(&bridge.page_key("doc", Tier::Warm, 3)).unwrap();

        assert!(!bridge.has_warm_marker("doc"));
        assert!(bridge.read_warm_marker("doc").is_none());
    }

    #[test]
    fn evicted_warm_pages_invalidate_marker() {
        let temp = tempfile::tempdir().unwrap();
        // Room for two pages and the marker
        let store = DirBlobStore::new(temp.path(), 2_500).unwrap();
        let bridge = DiskCacheBridge::new(Arc::new(store.clone()), "ns");

        for page in 1..=5 {
            bridge.write("doc", Tier::Warm, page, vec![7u8; 1_000]);
        }
        bridge.write_warm_marker("doc", 5);

        assert!(store.stats().evictions >= 3);
        assert!(!bridge.contains("doc", Tier::Warm, 1));
        assert!(bridge.contains("doc", Tier::Warm, 5));
        assert!(!bridge.has_warm_marker("doc"));
        assert!(!store.contains(&bridge.marker_key("doc")).unwrap());
    }

    #[test]
    fn test_contains_does_not_read() {
        let (bridge, _) = memory_bridge();
        bridge.write("doc", Tier::Warm, 4, vec![1, 2, 3]);

        assert!(bridge.contains("doc", Tier::Warm, 4));
        assert!(!bridge.contains("doc", Tier::Display, 4));
        assert!(!bridge.contains("doc", Tier::Warm, 5));
    }

    #[test]
    fn store_failures_are_swallowed() {
        let temp = tempfile::tempdir().unwrap();
        let store = DirBlobStore::new(temp.path(), 4).unwrap();
        let bridge = DiskCacheBridge::new(Arc::new(store), "ns");

        bridge.write("doc", Tier::Warm, 1, vec![0u8; 64]);

        assert!(bridge.read("doc", Tier::Warm, 1).is_none());
    }
}
