//! Two-tier page bitmap cache with LRU eviction
//!
//! Holds rasterized pages in memory, split into a `display` tier (full
//! quality, what is on screen) and a `warm` tier (reduced quality,
//! prefetched in the background). Each tier carries its own capacity and
//! its own render signature: a layout or zoom change invalidates every page
//! of a tier at once, so a signature mismatch purges the whole tier instead
//! of checking entries one by one.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CacheConfig;

/// Cache quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Full quality, on-screen rendering
    Display,

    /// Reduced quality, background-prefetched rendering
    Warm,
}

impl Tier {
    /// Both tiers, display first
    pub const ALL: [Tier; 2] = [Tier::Display, Tier::Warm];

    /// Stable lowercase name, used in persisted keys
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Display => "display",
            Tier::Warm => "warm",
        }
    }

    fn index(self) -> usize {
        match self {
            Tier::Display => 0,
            Tier::Warm => 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout fingerprint of a rendered bitmap
///
/// Derived from viewport width, zoom level and output scale. Two bitmaps of
/// the same page are interchangeable only if their signatures are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderSignature(String);

impl RenderSignature {
    /// Build a signature from layout inputs
    pub fn new(viewport_width: f32, zoom: f32, output_scale: f32) -> Self {
        Self(format!("{:.0}x{:.1}@{:.2}", viewport_width.max(0.0), zoom, output_scale))
    }

    /// The empty signature, held by a tier that has never been stamped
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rasterized page held by the cache
///
/// The pixel buffer is shared; surfaces painting the bitmap hold a clone of
/// the `Arc`, and the buffer is released once the cache and every surface
/// have let go of it.
#[derive(Debug, Clone)]
pub struct CachedBitmap {
    /// RGBA pixels at device resolution
    pub image: Arc<RgbaImage>,

    /// Layout width (pixels divided by output scale)
    pub css_width: f32,

    /// Layout height (pixels divided by output scale)
    pub css_height: f32,

    /// Signature the bitmap was rendered under
    pub signature: RenderSignature,
}

impl CachedBitmap {
    /// Wrap a freshly rendered or decoded image
    pub fn new(image: RgbaImage, output_scale: f32, signature: RenderSignature) -> Self {
        let scale = if output_scale > 0.0 { output_scale } else { 1.0 };
        let css_width = image.width() as f32 / scale;
        let css_height = image.height() as f32 / scale;

        Self { image: Arc::new(image), css_width, css_height, signature }
    }

    /// Override the layout size, for bitmaps rendered below layout resolution
    pub fn with_css_size(mut self, css_width: f32, css_height: f32) -> Self {
        self.css_width = css_width;
        self.css_height = css_height;
        self
    }

    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    /// Size of the pixel buffer in bytes
    pub fn memory_size(&self) -> usize {
        self.image.as_raw().len()
    }
}

/// Statistics for one cache tier
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TierStats {
    /// Number of pages currently cached
    pub entry_count: usize,

    /// Maximum number of pages
    pub capacity: usize,

    /// Bytes held by cached pixel buffers
    pub memory_used: usize,

    /// Lookups answered from the tier
    pub hits: u64,

    /// Lookups that found nothing usable
    pub misses: u64,

    /// Entries dropped to respect capacity
    pub evictions: u64,

    /// Whole-tier purges caused by a signature change
    pub invalidations: u64,
}

impl TierStats {
    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct TierState {
    entries: HashMap<u32, CachedBitmap>,

    /// Most recently used at back, least recently used at front
    lru_queue: VecDeque<u32>,

    capacity: usize,
    signature: RenderSignature,
    memory_used: usize,
    stats: TierStats,
}

impl TierState {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            capacity,
            signature: RenderSignature::empty(),
            memory_used: 0,
            stats: TierStats { capacity, ..Default::default() },
        }
    }

    fn touch(&mut self, page: u32) {
        self.lru_queue.retain(|&p| p != page);
        self.lru_queue.push_back(page);
    }

    fn evict_lru(&mut self) -> Option<CachedBitmap> {
        let page = self.lru_queue.pop_front()?;
        let bitmap = self.entries.remove(&page)?;
        self.memory_used = self.memory_used.saturating_sub(bitmap.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        log::trace!("evicted page {} ({} bytes)", page, bitmap.memory_size());
        Some(bitmap)
    }

    fn purge(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
        count
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
        self.stats.capacity = self.capacity;
    }
}

/// Two-tier bitmap cache keyed by page number
///
/// Cloning yields another handle onto the same cache.
///
/// # Example
///
/// ```
/// use pageflow_cache::{BitmapCache, CachedBitmap, RenderSignature, Tier};
/// use image::RgbaImage;
///
/// let cache = BitmapCache::new(8, 32);
/// let signature = RenderSignature::new(800.0, 100.0, 2.0);
///
/// cache.invalidate_if_stale(Tier::Display, &signature);
/// let bitmap = CachedBitmap::new(RgbaImage::new(16, 16), 2.0, signature.clone());
/// cache.insert(Tier::Display, 1, bitmap);
///
/// assert!(cache.get(Tier::Display, 1, &signature).is_some());
/// ```
#[derive(Clone)]
pub struct BitmapCache {
    tiers: Arc<Mutex<[TierState; 2]>>,
}

impl BitmapCache {
    /// Create a cache with per-tier entry capacities
    pub fn new(display_capacity: usize, warm_capacity: usize) -> Self {
        Self {
            tiers: Arc::new(Mutex::new([
                TierState::new(display_capacity),
                TierState::new(warm_capacity),
            ])),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.display_capacity, config.warm_capacity)
    }

    fn lock(&self) -> MutexGuard<'_, [TierState; 2]> {
        self.tiers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Purge a tier if its signature is stale, then adopt `signature`
    ///
    /// Returns `true` if entries were dropped.
    pub fn invalidate_if_stale(&self, tier: Tier, signature: &RenderSignature) -> bool {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];

        if state.signature == *signature {
            return false;
        }

        let mut purged = false;
        if !state.signature.is_empty() {
            let count = state.purge();
            state.stats.invalidations += 1;
            purged = count > 0;
            log::debug!(
                "{} tier signature {} -> {}, dropped {} pages",
                tier,
                state.signature,
                signature,
                count
            );
        }
        state.signature = signature.clone();
        purged
    }

    /// Current signature of a tier
    pub fn signature(&self, tier: Tier) -> RenderSignature {
        self.lock()[tier.index()].signature.clone()
    }

    /// Store a page bitmap
    ///
    /// A bitmap rendered under a signature other than the tier's current one
    /// is rejected, so a render that finishes after a layout change cannot
    /// repopulate the tier with stale pixels. Returns whether it was stored.
    pub fn insert(&self, tier: Tier, page: u32, bitmap: CachedBitmap) -> bool {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];

        if state.signature.is_empty() {
            state.signature = bitmap.signature.clone();
        } else if state.signature != bitmap.signature {
            log::trace!(
                "rejecting {} page {} under stale signature {}",
                tier,
                page,
                bitmap.signature
            );
            return false;
        }

        if let Some(old) = state.entries.remove(&page) {
            state.memory_used = state.memory_used.saturating_sub(old.memory_size());
            state.lru_queue.retain(|&p| p != page);
        }

        while state.entries.len() >= state.capacity {
            if state.evict_lru().is_none() {
                break;
            }
        }

        state.memory_used += bitmap.memory_size();
        state.entries.insert(page, bitmap);
        state.touch(page);
        state.sync_stats();
        true
    }

    /// Look up a page valid for `signature`, marking it most recently used
    pub fn get(&self, tier: Tier, page: u32, signature: &RenderSignature) -> Option<CachedBitmap> {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];

        let found = if state.signature == *signature {
            state.entries.get(&page).filter(|b| b.signature == *signature).cloned()
        } else {
            None
        };

        match found {
            Some(bitmap) => {
                state.touch(page);
                state.stats.hits += 1;
                Some(bitmap)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Check for a page under any signature, without touching LRU order
    pub fn contains(&self, tier: Tier, page: u32) -> bool {
        self.lock()[tier.index()].entries.contains_key(&page)
    }

    /// Check both tiers for a page
    pub fn contains_any(&self, page: u32) -> bool {
        let tiers = self.lock();
        tiers.iter().any(|state| state.entries.contains_key(&page))
    }

    pub fn remove(&self, tier: Tier, page: u32) -> Option<CachedBitmap> {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];

        let bitmap = state.entries.remove(&page)?;
        state.memory_used = state.memory_used.saturating_sub(bitmap.memory_size());
        state.lru_queue.retain(|&p| p != page);
        state.sync_stats();
        Some(bitmap)
    }

    /// Release every entry of one tier and forget its signature
    pub fn clear_tier(&self, tier: Tier) {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];
        state.purge();
        state.signature = RenderSignature::empty();
    }

    /// Release every entry of both tiers
    pub fn clear(&self) {
        for tier in Tier::ALL {
            self.clear_tier(tier);
        }
    }

    pub fn len(&self, tier: Tier) -> usize {
        self.lock()[tier.index()].entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter().all(|state| state.entries.is_empty())
    }

    pub fn stats(&self, tier: Tier) -> TierStats {
        self.lock()[tier.index()].stats
    }

    /// Change a tier's capacity, evicting down to it if needed
    pub fn set_capacity(&self, tier: Tier, capacity: usize) {
        let mut tiers = self.lock();
        let state = &mut tiers[tier.index()];
        state.capacity = capacity.max(1);

        while state.entries.len() > state.capacity {
            if state.evict_lru().is_none() {
                break;
            }
        }
        state.sync_stats();
    }
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(signature: &RenderSignature) -> CachedBitmap {
        CachedBitmap::new(RgbaImage::new(4, 4), 1.0, signature.clone())
    }

    fn stamped(display: usize, warm: usize) -> (BitmapCache, RenderSignature) {
        let cache = BitmapCache::new(display, warm);
        let signature = RenderSignature::new(800.0, 100.0, 1.0);
        cache.invalidate_if_stale(Tier::Display, &signature);
        cache.invalidate_if_stale(Tier::Warm, &signature);
        (cache, signature)
    }

    #[test]
    fn test_basic_insert_get() {
        let (cache, signature) = stamped(4, 4);

        assert!(cache.insert(Tier::Display, 3, bitmap(&signature)));

        let hit = cache.get(Tier::Display, 3, &signature).expect("page should be cached");
        assert_eq!(hit.pixel_width(), 4);
        assert_eq!(hit.css_width, 4.0);
        assert_eq!(cache.stats(Tier::Display).hits, 1);
    }

    #[test]
    fn test_cache_miss() {
        let (cache, signature) = stamped(4, 4);

        assert!(cache.get(Tier::Display, 9, &signature).is_none());

        let stats = cache.stats(Tier::Display);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let (cache, signature) = stamped(2, 4);

        cache.insert(Tier::Display, 1, bitmap(&signature));
        cache.insert(Tier::Display, 2, bitmap(&signature));
        cache.insert(Tier::Display, 3, bitmap(&signature));

        assert!(!cache.contains(Tier::Display, 1));
        assert!(cache.contains(Tier::Display, 2));
        assert!(cache.contains(Tier::Display, 3));
        assert_eq!(cache.stats(Tier::Display).evictions, 1);
    }

    #[test]
    fn test_lru_touch_on_read() {
        let (cache, signature) = stamped(2, 4);

        cache.insert(Tier::Display, 1, bitmap(&signature));
        cache.insert(Tier::Display, 2, bitmap(&signature));

        assert!(cache.get(Tier::Display, 1, &signature).is_some());
        cache.insert(Tier::Display, 3, bitmap(&signature));

        assert!(cache.contains(Tier::Display, 1));
        assert!(!cache.contains(Tier::Display, 2));
        assert!(cache.contains(Tier::Display, 3));
    }

    #[test]
    fn signature_change_purges_whole_tier() {
        let (cache, signature) = stamped(8, 8);
        for page in 1..=5 {
            cache.insert(Tier::Display, page, bitmap(&signature));
        }

        let wider = RenderSignature::new(1024.0, 100.0, 1.0);
        assert!(cache.invalidate_if_stale(Tier::Display, &wider));

        assert_eq!(cache.len(Tier::Display), 0);
        assert!(cache.get(Tier::Display, 3, &wider).is_none());
        assert!(cache.get(Tier::Display, 3, &signature).is_none());
        assert_eq!(cache.stats(Tier::Display).invalidations, 1);
        assert_eq!(cache.signature(Tier::Display), wider);
    }

    #[test]
    fn invalidation_leaves_other_tier_alone() {
        let (cache, signature) = stamped(8, 8);
        cache.insert(Tier::Display, 1, bitmap(&signature));
        cache.insert(Tier::Warm, 1, bitmap(&signature));

        cache.invalidate_if_stale(Tier::Display, &RenderSignature::new(800.0, 150.0, 1.0));

        assert!(!cache.contains(Tier::Display, 1));
        assert!(cache.get(Tier::Warm, 1, &signature).is_some());
    }

    #[test]
    fn first_stamp_is_not_an_invalidation() {
        let cache = BitmapCache::new(4, 4);
        let signature = RenderSignature::new(800.0, 100.0, 1.0);

        assert!(!cache.invalidate_if_stale(Tier::Warm, &signature));
        assert!(!cache.invalidate_if_stale(Tier::Warm, &signature));
        assert_eq!(cache.stats(Tier::Warm).invalidations, 0);
    }

    #[test]
    fn stale_insert_is_rejected() {
        let (cache, _) = stamped(4, 4);
        let old = RenderSignature::new(640.0, 100.0, 1.0);

        assert!(!cache.insert(Tier::Display, 1, bitmap(&old)));
        assert!(!cache.contains(Tier::Display, 1));
    }

    #[test]
    fn test_contains_any_and_remove() {
        let (cache, signature) = stamped(4, 4);
        cache.insert(Tier::Warm, 7, bitmap(&signature));

        assert!(cache.contains_any(7));
        assert!(cache.remove(Tier::Warm, 7).is_some());
        assert!(!cache.contains_any(7));
        assert!(cache.remove(Tier::Warm, 7).is_none());
    }

    #[test]
    fn test_clear() {
        let (cache, signature) = stamped(4, 4);
        cache.insert(Tier::Display, 1, bitmap(&signature));
        cache.insert(Tier::Warm, 2, bitmap(&signature));

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.signature(Tier::Display).is_empty());
        assert_eq!(cache.stats(Tier::Warm).memory_used, 0);
    }

    #[test]
    fn test_set_capacity_evicts() {
        let (cache, signature) = stamped(4, 4);
        for page in 1..=4 {
            cache.insert(Tier::Warm, page, bitmap(&signature));
        }

        cache.set_capacity(Tier::Warm, 2);

        assert_eq!(cache.len(Tier::Warm), 2);
        assert!(cache.contains(Tier::Warm, 3));
        assert!(cache.contains(Tier::Warm, 4));
    }

    #[test]
    fn test_memory_tracking() {
        let (cache, signature) = stamped(4, 4);
        cache.insert(Tier::Display, 1, bitmap(&signature));

        assert_eq!(cache.stats(Tier::Display).memory_used, 4 * 4 * 4);
    }
}
