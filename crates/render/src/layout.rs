//! Layout inputs of a render
//!
//! Page bitmaps depend on the viewport width, the zoom level and the
//! device output scale. The same inputs produce the tier signatures, so a
//! change to any of them invalidates the affected tier.

use pageflow_cache::{RenderSignature, Tier};

use crate::engine::PageSize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderLayout {
    /// Available viewport width in layout pixels
    pub viewport_width: f32,
    /// Device pixels per layout pixel
    pub output_scale: f32,
    /// Current zoom in percent
    pub zoom: f32,
    /// Zoom the warm tier renders at, in percent
    pub base_zoom: f32,
    pub fit_scale_min: f32,
    pub fit_scale_max: f32,
}

impl Default for RenderLayout {
    fn default() -> Self {
        Self {
            viewport_width: 0.0,
            output_scale: 1.0,
            zoom: 100.0,
            base_zoom: 100.0,
            fit_scale_min: 0.5,
            fit_scale_max: 2.0,
        }
    }
}

impl RenderLayout {
    /// Zoom a tier renders at
    ///
    /// The warm tier ignores pinch zoom and always renders at the base zoom.
    pub fn tier_zoom(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Display => self.zoom,
            Tier::Warm => self.base_zoom,
        }
    }

    pub fn signature(&self, tier: Tier) -> RenderSignature {
        RenderSignature::new(self.viewport_width, self.tier_zoom(tier), self.output_scale)
    }

    /// Scale that makes a page of `page_width` fill the viewport width
    pub fn fit_scale(&self, page_width: f32) -> f32 {
        if page_width <= 0.0 || self.viewport_width <= 0.0 {
            return 1.0_f32.clamp(self.fit_scale_min, self.fit_scale_max);
        }
        (self.viewport_width / page_width).clamp(self.fit_scale_min, self.fit_scale_max)
    }

    /// Layout scale of a page in `tier`: `zoom / 100 * fit_scale`
    pub fn page_scale(&self, tier: Tier, size: PageSize) -> f32 {
        self.tier_zoom(tier) / 100.0 * self.fit_scale(size.width)
    }

    /// Layout size of a page in `tier`
    pub fn css_size(&self, tier: Tier, size: PageSize) -> (f32, f32) {
        let scale = self.page_scale(tier, size);
        (size.width * scale, size.height * scale)
    }
}
