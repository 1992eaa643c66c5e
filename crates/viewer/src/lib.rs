//! Pageflow Viewer Library
//!
//! Progressive page viewer session. Wires the page cache, the render
//! pipeline, the page window, background warm-up and gesture handling
//! behind [`ViewerSession`], which the host drives with input events,
//! scroll ticks, animation frames and idle slots.
//!
//! # Example
//!
//! ```
//! use pageflow_cache::{DiskCacheBridge, MemoryBlobStore};
//! use pageflow_render::SyntheticRenderer;
//! use pageflow_scheduler::IdleQueue;
//! use pageflow_viewer::{ViewerConfig, ViewerSession, WarmRegistry, WarmTick};
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! let config = ViewerConfig::default();
//! let disk = Arc::new(DiskCacheBridge::new(Arc::new(MemoryBlobStore::new()), "doc-v1"));
//! let mut viewer = ViewerSession::with_parts(
//!     SyntheticRenderer::new(30),
//!     config,
//!     disk,
//!     WarmRegistry::new(),
//!     IdleQueue::new(),
//! );
//!
//! viewer.open("https://example.com/report.pdf?sig=abc", None, None).unwrap();
//! assert_eq!(viewer.total_pages(), 30);
//!
//! // Host event loop has spare time
//! while viewer.run_idle(Instant::now(), true) != WarmTick::Completed {}
//! assert_eq!(viewer.snapshot().warm.completed, 30);
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod session;
pub mod warmup;

pub use config::{ViewerConfig, ZoomConfig};
pub use error::{Result, ViewerError};
pub use geometry::DocumentGeometry;
pub use identity::DocumentIdentity;
pub use session::{InitialState, SessionPhase, ViewerSession, ViewerSnapshot};
pub use warmup::{
    WarmPhase, WarmProgress, WarmRegistry, WarmTarget, WarmTick, WarmupConfig, WarmupScheduler,
};

pub use pageflow_input::Point;
