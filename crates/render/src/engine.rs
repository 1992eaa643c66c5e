//! Page rendering collaborator
//!
//! The viewer never parses documents itself. A [`PageRenderer`] opens a
//! document, reports page geometry and rasterizes single pages on request.

use pageflow_scheduler::CancellationToken;

pub use image::RgbaImage;

/// Opaque handle on an open document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub url: String,
}

impl DocumentSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl From<&str> for DocumentSource {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for DocumentSource {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Parse and rasterize on a worker thread
    pub use_worker: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { use_worker: true }
    }
}

/// Natural page size at scale 1, in layout pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter at 72 dpi
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }
}

/// Rasterization parameters for one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based page number
    pub page: u32,
    /// Layout scale applied to the natural page size
    pub scale: f32,
    /// Device pixels per layout pixel
    pub output_scale: f32,
}

impl RenderRequest {
    /// Pixel dimensions of the bitmap this request should produce
    pub fn pixel_size(&self, size: PageSize) -> (u32, u32) {
        let factor = self.scale.max(0.0) * self.output_scale.max(0.0);
        let width = (size.width * factor).round().max(1.0) as u32;
        let height = (size.height * factor).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl RenderError {
    /// Whether this failure is an expected cancellation rather than a fault
    ///
    /// Backends report cancellation in their own words, so any backend
    /// message mentioning "cancel" counts.
    pub fn is_cancellation(&self) -> bool {
        match self {
            RenderError::Cancelled => true,
            RenderError::Backend(message) => message.to_ascii_lowercase().contains("cancel"),
            _ => false,
        }
    }

    /// Whether opening without a worker thread might succeed
    pub fn is_worker_related(&self) -> bool {
        match self {
            RenderError::WorkerUnavailable(_) => true,
            RenderError::Backend(message) => message.to_ascii_lowercase().contains("worker"),
            _ => false,
        }
    }
}

/// External page rasterizer
///
/// Pages are numbered from 1. `render_page` must poll `cancel` and return
/// [`RenderError::Cancelled`] once it fires.
pub trait PageRenderer {
    fn open(
        &mut self,
        source: &DocumentSource,
        options: OpenOptions,
    ) -> Result<DocumentHandle, RenderError>;

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, RenderError>;

    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSize, RenderError>;

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError>;

    fn close(&mut self, handle: DocumentHandle) -> Result<(), RenderError>;
}
