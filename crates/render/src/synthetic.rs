//! Backend-free page renderer
//!
//! Produces white pages with a light grey border at the requested size.
//! Useful for hosts that have not wired a real rasterizer yet, for layout
//! work and for exercising the render pipeline in tests.

use image::Rgba;
use pageflow_scheduler::CancellationToken;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::{
    DocumentHandle, DocumentSource, OpenOptions, PageRenderer, PageSize, RenderError,
    RenderRequest, RgbaImage,
};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Renderer serving a fixed page layout for every document it opens
#[derive(Debug)]
pub struct SyntheticRenderer {
    pages: Vec<PageSize>,
    worker_available: bool,
    next_handle: u64,
    open: HashMap<DocumentHandle, String>,
    renders: AtomicUsize,
}

impl SyntheticRenderer {
    /// `page_count` letter-sized pages
    pub fn new(page_count: u32) -> Self {
        Self::with_pages(vec![PageSize::letter(); page_count as usize])
    }

    pub fn with_pages(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            worker_available: true,
            next_handle: 0,
            open: HashMap::new(),
            renders: AtomicUsize::new(0),
        }
    }

    /// Make opens that ask for a worker thread fail
    pub fn without_worker(mut self) -> Self {
        self.worker_available = false;
        self
    }

    /// Number of successful `render_page` calls so far
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }

    pub fn reset_render_count(&self) {
        self.renders.store(0, Ordering::Relaxed);
    }

    /// Number of documents currently open
    pub fn open_documents(&self) -> usize {
        self.open.len()
    }

    fn check_handle(&self, handle: DocumentHandle) -> Result<(), RenderError> {
        if self.open.contains_key(&handle) {
            Ok(())
        } else {
            Err(RenderError::InvalidHandle(handle.raw()))
        }
    }
}

impl PageRenderer for SyntheticRenderer {
    fn open(
        &mut self,
        source: &DocumentSource,
        options: OpenOptions,
    ) -> Result<DocumentHandle, RenderError> {
        if options.use_worker && !self.worker_available {
            return Err(RenderError::WorkerUnavailable(format!(
                "cannot start worker for {}",
                source.url
            )));
        }

        self.next_handle += 1;
        let handle = DocumentHandle::new(self.next_handle);
        self.open.insert(handle, source.url.clone());
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, RenderError> {
        self.check_handle(handle)?;
        Ok(self.pages.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSize, RenderError> {
        self.check_handle(handle)?;
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .ok_or(RenderError::PageOutOfRange { page, page_count: self.pages.len() as u32 })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        let size = self.page_size(handle, request.page)?;
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let (width, height) = request.pixel_size(size);
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        self.renders.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), RenderError> {
        self.open.remove(&handle).map(|_| ()).ok_or(RenderError::InvalidHandle(handle.raw()))
    }
}
