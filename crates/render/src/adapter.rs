//! Render Surface Adapter
//!
//! Fills a page surface from the cheapest available source:
//!
//! 1. the bitmap cache, for the requested tier under its live signature
//! 2. for a `display` request, the warm tier as a placeholder while a full
//!    quality render proceeds
//! 3. the disk cache, requested tier first and then the warm tier
//! 4. a fresh render through the [`PageRenderer`]
//!
//! Fresh warm renders are persisted to disk. At most one render per
//! (page, tier) is in flight; a result whose task was superseded or
//! cancelled is discarded instead of being written to the cache.

use pageflow_cache::{BitmapCache, CachedBitmap, DiskCacheBridge, Tier};
use pageflow_scheduler::RenderTaskRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::{DocumentHandle, PageRenderer, PageSize, RenderError, RenderRequest};
use crate::layout::RenderLayout;
use crate::surface::SurfaceArena;

/// Key of a render task
pub type TaskKey = (u32, Tier);

/// What to render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub tier: Tier,
    /// Fraction of full resolution, in `(0, 1]`
    pub quality_scale: f32,
}

impl RenderParams {
    pub fn display() -> Self {
        Self { tier: Tier::Display, quality_scale: 1.0 }
    }

    pub fn warm(quality_scale: f32) -> Self {
        Self { tier: Tier::Warm, quality_scale }
    }

    fn effective_quality(&self) -> f32 {
        if self.quality_scale > 0.0 {
            self.quality_scale.min(1.0)
        } else {
            1.0
        }
    }
}

/// Document a render belongs to
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub identity: &'a str,
    pub handle: DocumentHandle,
    pub layout: &'a RenderLayout,
}

/// Where the bitmap for a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Bitmap cache hit for the requested tier
    Memory,
    /// Hydrated from the disk cache entry of the given tier
    Disk(Tier),
    /// Rendered by the page renderer
    Rendered,
    /// Cancelled or superseded; nothing was stored
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub memory_hits: u64,
    pub placeholders: u64,
    pub disk_hits: u64,
    pub renders: u64,
    pub cancelled: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    placeholders: AtomicU64,
    disk_hits: AtomicU64,
    renders: AtomicU64,
    cancelled: AtomicU64,
    failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct RenderSurfaceAdapter {
    cache: BitmapCache,
    disk: Arc<DiskCacheBridge>,
    tasks: RenderTaskRegistry<TaskKey>,
    counters: Counters,
}

impl RenderSurfaceAdapter {
    pub fn new(cache: BitmapCache, disk: Arc<DiskCacheBridge>) -> Self {
        Self { cache, disk, tasks: RenderTaskRegistry::new(), counters: Counters::default() }
    }

    pub fn cache(&self) -> &BitmapCache {
        &self.cache
    }

    pub fn disk(&self) -> &DiskCacheBridge {
        &self.disk
    }

    pub fn tasks(&self) -> &RenderTaskRegistry<TaskKey> {
        &self.tasks
    }

    /// Stamp both tiers with the signatures of `layout`
    ///
    /// Returns `true` if either tier was purged.
    pub fn sync_signatures(&self, layout: &RenderLayout) -> bool {
        let mut purged = false;
        for tier in Tier::ALL {
            purged |= self.cache.invalidate_if_stale(tier, &layout.signature(tier));
        }
        purged
    }

    /// Fill the surface of `page` for `params`
    ///
    /// The page does not need to be mounted: warm-up renders straight into
    /// the cache. Cancellation is reported as [`RenderOutcome::Cancelled`];
    /// every other renderer failure is returned.
    pub fn render<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        ctx: &RenderContext<'_>,
        surfaces: &mut SurfaceArena,
        page: u32,
        params: RenderParams,
    ) -> Result<RenderOutcome, RenderError> {
        let tier = params.tier;
        let signature = ctx.layout.signature(tier);
        self.cache.invalidate_if_stale(tier, &signature);

        if let Some(bitmap) = self.cache.get(tier, page, &signature) {
            bump(&self.counters.memory_hits);
            self.paint(surfaces, ctx.layout, page, bitmap, tier);
            return Ok(RenderOutcome::Memory);
        }

        let mut has_placeholder = false;
        if tier == Tier::Display {
            let warm_signature = ctx.layout.signature(Tier::Warm);
            self.cache.invalidate_if_stale(Tier::Warm, &warm_signature);
            if let Some(placeholder) = self.cache.get(Tier::Warm, page, &warm_signature) {
                bump(&self.counters.placeholders);
                self.paint(surfaces, ctx.layout, page, placeholder, Tier::Warm);
                has_placeholder = true;
            }
        }

        let size = renderer.page_size(ctx.handle, page)?;

        for &source in disk_sources(tier) {
            if source != tier && has_placeholder {
                continue;
            }
            if let Some(bitmap) = self.hydrate(ctx, page, source, size) {
                bump(&self.counters.disk_hits);
                self.paint(surfaces, ctx.layout, page, bitmap, source);
                return Ok(RenderOutcome::Disk(source));
            }
        }

        self.render_fresh(renderer, ctx, surfaces, page, params, size)
    }

    fn hydrate(
        &self,
        ctx: &RenderContext<'_>,
        page: u32,
        tier: Tier,
        size: PageSize,
    ) -> Option<CachedBitmap> {
        let image = self.disk.read_bitmap(ctx.identity, tier, page)?;
        let (css_width, css_height) = ctx.layout.css_size(tier, size);
        let bitmap = CachedBitmap::new(image, ctx.layout.output_scale, ctx.layout.signature(tier))
            .with_css_size(css_width, css_height);

        self.cache.insert(tier, page, bitmap.clone());
        log::trace!("page {} hydrated from disk ({} tier)", page, tier);
        Some(bitmap)
    }

    fn render_fresh<R: PageRenderer + ?Sized>(
        &self,
        renderer: &R,
        ctx: &RenderContext<'_>,
        surfaces: &mut SurfaceArena,
        page: u32,
        params: RenderParams,
        size: PageSize,
    ) -> Result<RenderOutcome, RenderError> {
        let tier = params.tier;
        let layout = ctx.layout;
        let ticket = self.tasks.begin((page, tier));

        let request = RenderRequest {
            page,
            scale: layout.page_scale(tier, size) * params.effective_quality(),
            output_scale: layout.output_scale,
        };
        let result = renderer.render_page(ctx.handle, request, &ticket.token);
        let publishable = self.tasks.finish(&ticket);

        let image = match result {
            Ok(image) => image,
            Err(e) if e.is_cancellation() => {
                bump(&self.counters.cancelled);
                log::trace!("render of page {} ({} tier) cancelled", page, tier);
                return Ok(RenderOutcome::Cancelled);
            }
            Err(e) => {
                bump(&self.counters.failures);
                log::warn!("render of page {} ({} tier) failed: {}", page, tier, e);
                return Err(e);
            }
        };

        if !publishable {
            bump(&self.counters.cancelled);
            log::trace!("discarding superseded render of page {} ({} tier)", page, tier);
            return Ok(RenderOutcome::Cancelled);
        }

        let (css_width, css_height) = layout.css_size(tier, size);
        let bitmap = CachedBitmap::new(image, layout.output_scale, layout.signature(tier))
            .with_css_size(css_width, css_height);

        if !self.cache.insert(tier, page, bitmap.clone()) {
            bump(&self.counters.cancelled);
            return Ok(RenderOutcome::Cancelled);
        }
        bump(&self.counters.renders);

        if tier == Tier::Warm {
            self.disk.write_bitmap(ctx.identity, Tier::Warm, page, Arc::clone(&bitmap.image));
        }

        self.paint(surfaces, layout, page, bitmap, tier);
        Ok(RenderOutcome::Rendered)
    }

    /// Paint unless it would replace a current display bitmap with a placeholder
    fn paint(
        &self,
        surfaces: &mut SurfaceArena,
        layout: &RenderLayout,
        page: u32,
        bitmap: CachedBitmap,
        tier: Tier,
    ) {
        if tier == Tier::Warm {
            let display_signature = layout.signature(Tier::Display);
            let showing_display = surfaces
                .surface(page)
                .and_then(|s| s.painted.as_ref())
                .is_some_and(|p| {
                    p.tier == Tier::Display && p.bitmap.signature == display_signature
                });
            if showing_display {
                return;
            }
        }
        surfaces.paint(page, bitmap, tier);
    }

    /// Cancel both tiers of `page`
    pub fn cancel_page(&self, page: u32) -> usize {
        self.tasks.cancel_where(|(p, _)| *p == page)
    }

    pub fn cancel_all(&self) -> usize {
        self.tasks.cancel_all()
    }

    pub fn stats(&self) -> AdapterStats {
        let c = &self.counters;
        AdapterStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            placeholders: c.placeholders.load(Ordering::Relaxed),
            disk_hits: c.disk_hits.load(Ordering::Relaxed),
            renders: c.renders.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }
}

fn disk_sources(tier: Tier) -> &'static [Tier] {
    match tier {
        Tier::Display => &[Tier::Display, Tier::Warm],
        Tier::Warm => &[Tier::Warm],
    }
}
