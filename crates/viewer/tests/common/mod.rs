#![allow(dead_code)]

use pageflow_cache::{CacheConfig, DiskCacheBridge, MemoryBlobStore, Tier};
use pageflow_render::{
    DocumentHandle, DocumentSource, OpenOptions, PageRenderer, PageSize, RenderError,
    RenderRequest, RgbaImage,
};
use pageflow_scheduler::{CancellationToken, IdleQueue};
use pageflow_viewer::{ViewerConfig, ViewerSession, WarmRegistry, WarmTick};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const URL: &str = "https://files.example.com/handbook.pdf?sig=abc123";
/// Identity derived from [`URL`]
pub const IDENTITY: &str = "https://files.example.com/handbook.pdf";

/// Page renderer with scripted failures that records every render call
#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    pub page_count: u32,
    /// Opens asking for a worker fail
    pub worker_broken: bool,
    /// Every open fails with this message
    pub open_error: Option<String>,
    pub failing_pages: HashSet<u32>,
    /// Pages whose render reports a backend cancellation
    pub cancelled_pages: HashSet<u32>,
    pub opens: Vec<OpenOptions>,
    pub closed: Vec<DocumentHandle>,
    pub renders: Mutex<Vec<RenderRequest>>,
    pub next_handle: u64,
}

impl ScriptedRenderer {
    pub fn new(page_count: u32) -> Self {
        Self { page_count, ..Self::default() }
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn rendered_pages(&self) -> Vec<u32> {
        self.renders.lock().unwrap().iter().map(|r| r.page).collect()
    }

    pub fn renders(&self) -> Vec<RenderRequest> {
        self.renders.lock().unwrap().clone()
    }

    pub fn reset_renders(&self) {
        self.renders.lock().unwrap().clear();
    }
}

impl PageRenderer for ScriptedRenderer {
    fn open(
        &mut self,
        _source: &DocumentSource,
        options: OpenOptions,
    ) -> Result<DocumentHandle, RenderError> {
        self.opens.push(options);
        if let Some(message) = &self.open_error {
            return Err(RenderError::Backend(message.clone()));
        }
        if options.use_worker && self.worker_broken {
            return Err(RenderError::Backend("Setting up fake worker failed".into()));
        }
        self.next_handle += 1;
        Ok(DocumentHandle::new(self.next_handle))
    }

    fn page_count(&self, _handle: DocumentHandle) -> Result<u32, RenderError> {
        Ok(self.page_count)
    }

    fn page_size(&self, _handle: DocumentHandle, page: u32) -> Result<PageSize, RenderError> {
        if page == 0 || page > self.page_count {
            return Err(RenderError::PageOutOfRange { page, page_count: self.page_count });
        }
        Ok(PageSize::letter())
    }

    fn render_page(
        &self,
        _handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if self.cancelled_pages.contains(&request.page) {
            return Err(RenderError::Backend("Rendering cancelled, page 1".into()));
        }
        if self.failing_pages.contains(&request.page) {
            return Err(RenderError::Backend(format!("bad stream on page {}", request.page)));
        }

        self.renders.lock().unwrap().push(request);
        Ok(RgbaImage::new(4, 4))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), RenderError> {
        self.closed.push(handle);
        Ok(())
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config with inline disk writes so markers are visible immediately
pub fn test_config() -> ViewerConfig {
    ViewerConfig::default().with_cache(CacheConfig::default().with_background_writes(false))
}

pub fn memory_disk() -> Arc<DiskCacheBridge> {
    Arc::new(DiskCacheBridge::new(Arc::new(MemoryBlobStore::new()), "pageflow-test"))
}

pub fn viewer(renderer: ScriptedRenderer) -> ViewerSession<ScriptedRenderer> {
    viewer_with(renderer, memory_disk(), WarmRegistry::new())
}

pub fn viewer_with(
    renderer: ScriptedRenderer,
    disk: Arc<DiskCacheBridge>,
    registry: WarmRegistry,
) -> ViewerSession<ScriptedRenderer> {
    let mut viewer =
        ViewerSession::with_parts(renderer, test_config(), disk, registry, IdleQueue::new());
    viewer.set_viewport(612.0, 800.0, 1.0);
    viewer
}

/// Scroll 2000px every 20ms from the top, then hold still until quiescent
pub fn fast_scroll_and_settle(viewer: &mut ViewerSession<ScriptedRenderer>, start: Instant) {
    for (tick, top) in [0.0, 2000.0, 4000.0, 6000.0].into_iter().enumerate() {
        viewer.on_scroll(top, start + Duration::from_millis(20 * tick as u64));
    }
    let settled = start + Duration::from_millis(200);
    for frame in 0..3 {
        viewer.on_animation_frame(settled + Duration::from_millis(16 * frame));
    }
}

/// Run idle slots until the background warm-up finishes
pub fn drain_warmup(viewer: &mut ViewerSession<ScriptedRenderer>) -> usize {
    for slot in 1..=200 {
        if viewer.run_idle(Instant::now(), true) == WarmTick::Completed {
            return slot;
        }
    }
    panic!("warm-up did not complete");
}

pub fn warm_pages(viewer: &ViewerSession<ScriptedRenderer>) -> Vec<u32> {
    viewer
        .renderer()
        .renders()
        .iter()
        .filter(|r| r.scale < 1.0)
        .map(|r| r.page)
        .collect()
}

/// Whether the disk holds a warm blob of `page` for the test document
pub fn has_warm_blob(viewer: &ViewerSession<ScriptedRenderer>, page: u32) -> bool {
    viewer.adapter().disk().contains(IDENTITY, Tier::Warm, page)
}

pub fn is_warm_cached(viewer: &ViewerSession<ScriptedRenderer>, page: u32) -> bool {
    viewer.adapter().cache().contains(Tier::Warm, page)
}
