//! Pageflow Render Library
//!
//! Bridges the viewer and an external page rasterizer. Pages are painted
//! into page-indexed surfaces, preferring cached pixels (memory, then disk)
//! over a fresh render.

pub mod adapter;
pub mod engine;
pub mod layout;
pub mod surface;
pub mod synthetic;

pub use adapter::{
    AdapterStats, RenderContext, RenderOutcome, RenderParams, RenderSurfaceAdapter, TaskKey,
};
pub use engine::{
    DocumentHandle, DocumentSource, OpenOptions, PageRenderer, PageSize, RenderError,
    RenderRequest, RgbaImage,
};
pub use layout::RenderLayout;
pub use surface::{Painted, Surface, SurfaceArena, SurfaceId};
pub use synthetic::SyntheticRenderer;
