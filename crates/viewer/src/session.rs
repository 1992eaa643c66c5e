//! Viewer session
//!
//! [`ViewerSession`] is the only type the host application talks to. It
//! owns the document lifecycle, the page and zoom state, the mounted page
//! window and every component underneath, and it is driven entirely by
//! host callbacks: input events, scroll ticks, animation frames and idle
//! slots, each carrying the host's notion of the current time.
//!
//! Lifecycle: `Closed -> Loading -> Ready -> (Interacting <-> Idle) -> Closed`.

use pageflow_cache::{encode_png, BitmapCache, DiskCacheBridge, Tier};
use pageflow_input::{GestureEngine, GestureEvent, Point, ZoomBounds};
use pageflow_render::{
    AdapterStats, DocumentHandle, DocumentSource, OpenOptions, PageRenderer, PageSize,
    RenderContext, RenderError, RenderLayout, RenderParams, RenderSurfaceAdapter, SurfaceArena,
};
use pageflow_scheduler::{clamp_page, BackgroundScheduler, IdleQueue, WindowState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::geometry::DocumentGeometry;
use crate::identity::DocumentIdentity;
use crate::warmup::{WarmProgress, WarmRegistry, WarmTarget, WarmTick, WarmupScheduler};

/// Zoom changes smaller than this are ignored
const ZOOM_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Closed,
    Loading,
    Ready,
    Interacting,
    Idle,
}

/// Page and zoom to show once the document is open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub page: Option<u32>,
    pub zoom: Option<f32>,
}

/// Observable state for the host UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerSnapshot {
    pub phase: SessionPhase,
    pub is_loading: bool,
    pub identity: Option<String>,
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom: f32,
    pub scroll: (f32, f32),
    pub chrome_visible: bool,
    pub error: Option<String>,
    pub warm: WarmProgress,
    pub mounted: Vec<u32>,
    pub priority_focus: Option<u32>,
    pub skip_radius: u32,
}

#[derive(Debug)]
struct OpenDocument {
    identity: DocumentIdentity,
    handle: DocumentHandle,
    page_sizes: Vec<PageSize>,
    geometry: DocumentGeometry,
}

pub struct ViewerSession<R: PageRenderer, S: BackgroundScheduler = IdleQueue> {
    config: ViewerConfig,
    renderer: R,
    adapter: RenderSurfaceAdapter,
    surfaces: SurfaceArena,
    layout: RenderLayout,
    zoom_bounds: ZoomBounds,
    viewport_height: f32,
    scroll: Point,
    document: Option<OpenDocument>,
    window: WindowState,
    gestures: GestureEngine,
    warmup: WarmupScheduler<S>,
    registry: WarmRegistry,
    phase: SessionPhase,
    chrome_visible: bool,
    error: Option<String>,
}

impl<R: PageRenderer> ViewerSession<R, IdleQueue> {
    /// Session with caches built from `config.cache`
    pub fn new(renderer: R, config: ViewerConfig) -> Self {
        let disk = Arc::new(DiskCacheBridge::from_config(&config.cache));
        Self::with_parts(renderer, config, disk, WarmRegistry::new(), IdleQueue::new())
    }
}

impl<R: PageRenderer, S: BackgroundScheduler> ViewerSession<R, S> {
    /// Session over a shared disk cache and warm registry
    ///
    /// Sessions sharing `registry` skip warm-up for documents another one
    /// already finished.
    pub fn with_parts(
        renderer: R,
        config: ViewerConfig,
        disk: Arc<DiskCacheBridge>,
        registry: WarmRegistry,
        idle: S,
    ) -> Self {
        let cache = BitmapCache::from_config(&config.cache);
        let layout = config.initial_layout();
        let zoom_bounds = config.zoom.bounds();
        let gestures = GestureEngine::new(config.gestures.clone());
        let warmup = WarmupScheduler::new(config.warmup, idle);

        Self {
            renderer,
            adapter: RenderSurfaceAdapter::new(cache, disk),
            surfaces: SurfaceArena::new(),
            layout,
            zoom_bounds,
            viewport_height: 0.0,
            scroll: Point::default(),
            document: None,
            window: WindowState::new(0),
            gestures,
            warmup,
            registry,
            phase: SessionPhase::Closed,
            chrome_visible: true,
            error: None,
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn adapter(&self) -> &RenderSurfaceAdapter {
        &self.adapter
    }

    pub fn render_stats(&self) -> AdapterStats {
        self.adapter.stats()
    }

    pub fn surfaces(&self) -> &SurfaceArena {
        &self.surfaces
    }

    pub fn warmup(&self) -> &WarmupScheduler<S> {
        &self.warmup
    }

    pub fn registry(&self) -> &WarmRegistry {
        &self.registry
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }

    pub fn identity(&self) -> Option<&DocumentIdentity> {
        self.document.as_ref().map(|doc| &doc.identity)
    }

    pub fn current_page(&self) -> u32 {
        self.window.safe_page()
    }

    pub fn total_pages(&self) -> u32 {
        self.window.total_pages
    }

    pub fn zoom(&self) -> f32 {
        self.layout.zoom
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    pub fn chrome_visible(&self) -> bool {
        self.chrome_visible
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            phase: self.phase,
            is_loading: self.is_loading(),
            identity: self.identity().map(|id| id.to_string()),
            current_page: self.current_page(),
            total_pages: self.total_pages(),
            zoom: self.zoom(),
            scroll: (self.scroll.x, self.scroll.y),
            chrome_visible: self.chrome_visible,
            error: self.error.clone(),
            warm: self.warmup.progress(),
            mounted: self.window.mounted.iter().copied().collect(),
            priority_focus: self.window.priority_focus,
            skip_radius: self.window.skip_radius,
        }
    }

    /// Open a document, replacing any open one
    ///
    /// Returns once phase 1 of the warm-up has run and the mounted window
    /// is painted. Phase 2 is left scheduled on the idle queue.
    pub fn open(
        &mut self,
        url: &str,
        cache_key: Option<&str>,
        initial: Option<InitialState>,
    ) -> Result<()> {
        if self.document.is_some() {
            self.close();
        }

        let identity = DocumentIdentity::derive(url, cache_key);
        let skip_warmup = self.registry.is_complete(identity.as_str())
            || self.adapter.disk().has_warm_marker(identity.as_str());
        if skip_warmup {
            log::info!("opening {}, already warm", identity);
        } else {
            log::info!("opening {}", identity);
        }

        self.phase = SessionPhase::Loading;
        self.error = None;
        self.layout.zoom = self.config.zoom.base;
        self.scroll = Point::default();
        self.chrome_visible = true;
        self.gestures.reset();

        let document = match self.load(url, identity) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("failed to open {}: {}", url, e);
                self.phase = SessionPhase::Closed;
                self.error = Some(e.to_string());
                return Err(e);
            }
        };

        let total_pages = document.geometry.page_count();
        self.document = Some(document);
        self.window = WindowState::new(total_pages);
        self.warmup.reset(total_pages);
        self.adapter.sync_signatures(&self.layout);

        if skip_warmup {
            self.warmup.mark_complete();
        } else {
            self.run_eager_warmup();
        }

        if let Some(initial) = initial {
            if let Some(zoom) = initial.zoom {
                self.layout.zoom = self.zoom_bounds.clamp(zoom);
                self.relayout();
            }
            if let Some(page) = initial.page {
                self.window.current_page = clamp_page(i64::from(page), total_pages);
                self.scroll.y = self.page_top(self.window.current_page);
            }
        }

        self.phase = SessionPhase::Ready;
        self.refresh_window();

        if !skip_warmup && self.warmup.start_background(Instant::now()) {
            self.record_warm_complete();
        }
        Ok(())
    }

    fn load(&mut self, url: &str, identity: DocumentIdentity) -> Result<OpenDocument> {
        let source = DocumentSource::new(url);
        let handle = match self.renderer.open(&source, OpenOptions { use_worker: true }) {
            Ok(handle) => handle,
            Err(e) if e.is_worker_related() => {
                log::warn!("worker unavailable ({}), retrying {} without one", e, url);
                self.renderer
                    .open(&source, OpenOptions { use_worker: false })
                    .map_err(ViewerError::Load)?
            }
            Err(e) => return Err(ViewerError::Load(e)),
        };

        let page_sizes = match self.page_sizes(handle) {
            Ok(sizes) => sizes,
            Err(e) => {
                if let Err(close_err) = self.renderer.close(handle) {
                    log::debug!("closing half-open document failed: {}", close_err);
                }
                return Err(ViewerError::Load(e));
            }
        };

        let geometry = DocumentGeometry::new(&page_sizes, &self.layout, self.config.page_gap_px);
        log::debug!("{} opened with {} pages", identity, page_sizes.len());
        Ok(OpenDocument { identity, handle, page_sizes, geometry })
    }

    fn page_sizes(
        &self,
        handle: DocumentHandle,
    ) -> std::result::Result<Vec<PageSize>, RenderError> {
        let count = self.renderer.page_count(handle)?;
        (1..=count).map(|page| self.renderer.page_size(handle, page)).collect()
    }

    /// Close the document and release everything tied to it
    pub fn close(&mut self) {
        let cancelled = self.adapter.cancel_all();
        self.warmup.cancel();

        if let Some(document) = self.document.take() {
            if let Err(e) = self.renderer.close(document.handle) {
                log::debug!("closing {} failed: {}", document.identity, e);
            }
            log::info!("closed {} ({} renders cancelled)", document.identity, cancelled);
        }

        self.adapter.cache().clear();
        self.adapter.disk().flush();
        self.surfaces.clear();
        self.window = WindowState::new(0);
        self.gestures.reset();
        self.scroll = Point::default();
        self.phase = SessionPhase::Closed;
        self.error = None;
    }

    /// Jump to a page, clamped to the document; returns the page shown
    pub fn set_page(&mut self, page: i64) -> u32 {
        if self.document.is_none() {
            return self.current_page();
        }

        let page = clamp_page(page, self.window.total_pages);
        self.window.current_page = page;
        self.window.clear_override();
        self.scroll.y = self.page_top(page);
        self.refresh_window();
        page
    }

    /// Set the zoom, clamped to the allowed range; returns the zoom applied
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let zoom = self.zoom_bounds.clamp(zoom);
        if (zoom - self.layout.zoom).abs() < ZOOM_EPSILON {
            return self.layout.zoom;
        }

        self.layout.zoom = zoom;
        if self.document.is_some() {
            self.relayout();
            self.scroll.y = self.page_top(self.window.safe_page());
            self.rerender_mounted();
        }
        zoom
    }

    /// Update the viewport metrics that feed both render signatures
    pub fn set_viewport(&mut self, width: f32, height: f32, output_scale: f32) {
        self.layout.viewport_width = width.max(0.0);
        self.layout.output_scale = if output_scale > 0.0 { output_scale } else { 1.0 };
        self.viewport_height = height.max(0.0);

        if self.document.is_some() {
            self.relayout();
            self.clamp_scroll();
            self.rerender_mounted();
        }
    }

    /// Vertical scroll tick from the host
    pub fn on_scroll(&mut self, scroll_top: f32, now: Instant) {
        let Some(metrics) = self.document.as_ref().map(|doc| doc.geometry.metrics()) else {
            return;
        };

        self.scroll.y = scroll_top;
        self.clamp_scroll();
        self.enter_interaction();

        match self.gestures.on_scroll(self.scroll.y, now, &metrics) {
            Some(GestureEvent::FastScroll { skip_radius, priority_focus }) => {
                self.window.skip_radius = skip_radius;
                self.window.priority_focus = Some(priority_focus);
            }
            Some(GestureEvent::ScrollSettled) => self.window.clear_override(),
            _ => {}
        }

        self.window.current_page = self.page_at_viewport_center();
        self.refresh_window();
    }

    pub fn pointer_down(&mut self, pointer_id: u64, at: Point) {
        if self.document.is_none() {
            return;
        }
        self.gestures.pointer_down(pointer_id, at);
        self.enter_interaction();
    }

    pub fn pointer_move(&mut self, pointer_id: u64, at: Point) {
        if let Some(GestureEvent::PageTurn(turn)) = self.gestures.pointer_move(pointer_id, at) {
            let target = i64::from(self.window.safe_page()) + turn.delta();
            log::debug!("swipe to page {}", target);
            self.set_page(target);
        }
    }

    pub fn pointer_up(&mut self, pointer_id: u64, at: Point) {
        if let Some(GestureEvent::Tap) = self.gestures.pointer_up(pointer_id, at) {
            self.chrome_visible = !self.chrome_visible;
        }
    }

    pub fn pointer_cancel(&mut self) {
        self.gestures.pointer_cancel();
    }

    pub fn touch_start(&mut self, touches: &[Point]) {
        if self.document.is_none() {
            return;
        }
        let event = self.gestures.touch_start(touches, self.layout.zoom);
        if let Some(GestureEvent::PinchStarted) = event {
            log::trace!("pinch started at {}%", self.layout.zoom);
        }
        self.enter_interaction();
    }

    /// Pinch step; display renders wait for the pinch to end
    pub fn touch_move(&mut self, touches: &[Point]) {
        let Some(document) = &self.document else {
            return;
        };

        // Scroll range at the largest zoom this step could reach; the real
        // range is applied after relayout
        let scale = (self.zoom_bounds.max / self.layout.zoom.max(ZOOM_EPSILON)).max(1.0);
        let geometry = &document.geometry;
        let max_scroll = Point::new(
            (geometry.content_width() * scale - self.layout.viewport_width).max(0.0),
            (geometry.total_height() * scale - self.viewport_height).max(0.0),
        );

        let event = self.gestures.touch_move(
            touches,
            self.layout.zoom,
            self.scroll,
            max_scroll,
            &self.zoom_bounds,
        );
        if let Some(GestureEvent::Pinch(step)) = event {
            self.layout.zoom = step.zoom;
            self.scroll = step.scroll;
            self.relayout();
            self.clamp_scroll();
            self.window.current_page = self.page_at_viewport_center();
            self.refresh_window();
        }
    }

    pub fn touch_end(&mut self, remaining: usize) {
        if let Some(GestureEvent::PinchEnded) = self.gestures.touch_end(remaining) {
            log::debug!("pinch ended at {}%", self.layout.zoom);
            self.rerender_mounted();
        }
    }

    /// Sample one animation frame
    ///
    /// Once scroll and zoom have held still the interaction ends, the
    /// fast-scroll override is dropped and background warm-up resumes.
    pub fn on_animation_frame(&mut self, now: Instant) {
        if self.document.is_none() {
            return;
        }
        let event = self.gestures.on_frame(self.scroll, self.layout.zoom);
        if let Some(GestureEvent::Quiescent) = event {
            if self.phase == SessionPhase::Interacting || self.phase == SessionPhase::Ready {
                self.phase = SessionPhase::Idle;
            }
            if self.window.is_overridden() {
                self.window.clear_override();
                self.refresh_window();
            }
            self.warmup.resume(now);
        }
    }

    /// Give background warm-up a chance to run
    ///
    /// `host_idle` reports whether the host has nothing else to do; the
    /// idle slot also becomes due after its timeout.
    pub fn run_idle(&mut self, now: Instant, host_idle: bool) -> WarmTick {
        match self.drive_warmup(|warmup, target| warmup.run_due(now, host_idle, target)) {
            None => WarmTick::NotDue,
            Some(Ok(WarmTick::Completed)) => {
                self.record_warm_complete();
                WarmTick::Completed
            }
            Some(Ok(tick)) => tick,
            Some(Err(e)) => {
                self.record_render_error(e);
                WarmTick::Progressed
            }
        }
    }

    /// Encode the current page's best bitmap as PNG
    pub fn capture_current_view(&self) -> Result<Vec<u8>> {
        if self.document.is_none() {
            return Err(ViewerError::NotOpen);
        }

        let page = self.window.safe_page();
        let painted = self.surfaces.surface(page).and_then(|s| s.painted.as_ref());
        let bitmap = match painted {
            Some(painted) => Some(painted.bitmap.clone()),
            None => Tier::ALL.into_iter().find_map(|tier| {
                self.adapter.cache().get(tier, page, &self.layout.signature(tier))
            }),
        };

        let bitmap = bitmap.ok_or(ViewerError::NothingToCapture(page))?;
        Ok(encode_png(&bitmap.image)?)
    }

    fn run_eager_warmup(&mut self) {
        if let Some(Err(e)) = self.drive_warmup(|warmup, target| warmup.run_eager(target)) {
            self.record_render_error(e);
        }
    }

    /// Run `f` against the warm-up scheduler and a target rendering into
    /// the open document
    fn drive_warmup<T>(
        &mut self,
        f: impl FnOnce(&mut WarmupScheduler<S>, &mut dyn WarmTarget) -> T,
    ) -> Option<T> {
        let Self { renderer, adapter, surfaces, layout, document, gestures, warmup, config, .. } =
            self;
        let document = document.as_ref()?;

        let mut target = SessionWarmTarget {
            renderer,
            adapter,
            surfaces,
            ctx: RenderContext {
                identity: document.identity.as_str(),
                handle: document.handle,
                layout,
            },
            gestures,
            quality: config.warmup.quality_scale,
        };
        Some(f(warmup, &mut target))
    }

    fn record_warm_complete(&mut self) {
        let Some(document) = &self.document else {
            return;
        };
        if self.warmup.failures() > 0 {
            log::warn!(
                "{} warmed with {} failed pages, not marking complete",
                document.identity,
                self.warmup.failures()
            );
            return;
        }

        let identity = document.identity.as_str();
        let page_count = document.geometry.page_count();
        let disk = self.adapter.disk();
        disk.flush();
        if let Some(page) = (1..=page_count).find(|&p| !disk.contains(identity, Tier::Warm, p)) {
            log::warn!("{} has no stored warm page {}, not marking complete", identity, page);
            return;
        }

        disk.write_warm_marker(identity, page_count);
        disk.flush();
        self.registry.mark_complete(identity);
        log::info!("{} fully warmed", identity);
    }

    fn record_render_error(&mut self, error: RenderError) {
        if error.is_cancellation() {
            return;
        }
        self.error = Some(ViewerError::Render(error).to_string());
    }

    fn enter_interaction(&mut self) {
        if matches!(self.phase, SessionPhase::Ready | SessionPhase::Idle) {
            self.phase = SessionPhase::Interacting;
        }
        self.warmup.pause();
    }

    fn relayout(&mut self) {
        if let Some(document) = self.document.as_mut() {
            document.geometry =
                DocumentGeometry::new(&document.page_sizes, &self.layout, self.config.page_gap_px);
        }
        self.adapter.sync_signatures(&self.layout);
    }

    fn clamp_scroll(&mut self) {
        let Some(document) = &self.document else {
            return;
        };
        let max = document.geometry.max_scroll(self.layout.viewport_width, self.viewport_height);
        self.scroll.x = self.scroll.x.clamp(0.0, max.x);
        self.scroll.y = self.scroll.y.clamp(0.0, max.y);
    }

    fn page_top(&self, page: u32) -> f32 {
        self.document.as_ref().map_or(0.0, |doc| doc.geometry.page_top(page))
    }

    fn page_at_viewport_center(&self) -> u32 {
        self.document.as_ref().map_or(1, |doc| {
            doc.geometry.page_at_center(self.scroll.y, self.viewport_height)
        })
    }

    /// Recompute the mounted window and render pages that joined it
    fn refresh_window(&mut self) {
        let previous = self.window.mounted.clone();
        self.window.recompute(&self.config.window);

        for page in previous.difference(&self.window.mounted) {
            self.adapter.cancel_page(*page);
        }
        let added = self.surfaces.sync(&self.window.mounted);
        self.render_display(added);
    }

    fn rerender_mounted(&mut self) {
        let pages: Vec<u32> = self.window.mounted.iter().copied().collect();
        self.render_display(pages);
    }

    fn render_display(&mut self, pages: Vec<u32>) {
        if self.gestures.is_pinching() {
            return;
        }
        let Some(document) = &self.document else {
            return;
        };

        let ctx = RenderContext {
            identity: document.identity.as_str(),
            handle: document.handle,
            layout: &self.layout,
        };

        let mut failure = None;
        for page in pages {
            let params = RenderParams::display();
            let result =
                self.adapter.render(&self.renderer, &ctx, &mut self.surfaces, page, params);
            if let Err(e) = result {
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            self.record_render_error(e);
        }
    }
}

impl<R: PageRenderer, S: BackgroundScheduler> Drop for ViewerSession<R, S> {
    fn drop(&mut self) {
        if self.document.is_some() {
            self.close();
        }
    }
}

struct SessionWarmTarget<'a, R: PageRenderer> {
    renderer: &'a R,
    adapter: &'a RenderSurfaceAdapter,
    surfaces: &'a mut SurfaceArena,
    ctx: RenderContext<'a>,
    gestures: &'a GestureEngine,
    quality: f32,
}

impl<R: PageRenderer> WarmTarget for SessionWarmTarget<'_, R> {
    /// Warm tier or stored warm blob; a display bitmap alone does not count
    fn is_cached(&self, page: u32) -> bool {
        self.adapter.cache().contains(Tier::Warm, page)
            || self.adapter.disk().contains(self.ctx.identity, Tier::Warm, page)
    }

    fn warm(&mut self, page: u32) -> std::result::Result<(), RenderError> {
        self.adapter
            .render(self.renderer, &self.ctx, self.surfaces, page, RenderParams::warm(self.quality))
            .map(|_| ())
    }

    fn should_yield(&self) -> bool {
        self.gestures.is_interacting() || self.gestures.is_pinching()
    }
}
