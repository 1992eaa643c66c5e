//! Vertical page layout of an open document
//!
//! Pages stack top to bottom at their display-tier layout size with a
//! fixed gap between them. Offsets are in layout pixels from the top of
//! the first page.

use pageflow_cache::Tier;
use pageflow_input::{PageMetrics, Point};
use pageflow_render::{PageSize, RenderLayout};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentGeometry {
    /// Top offset of each page, index 0 is page 1
    tops: Vec<f32>,
    heights: Vec<f32>,
    content_width: f32,
    gap: f32,
}

impl DocumentGeometry {
    pub fn new(sizes: &[PageSize], layout: &RenderLayout, gap: f32) -> Self {
        let mut tops = Vec::with_capacity(sizes.len());
        let mut heights = Vec::with_capacity(sizes.len());
        let mut content_width = 0.0_f32;
        let mut cursor = 0.0;

        for size in sizes {
            let (width, height) = layout.css_size(Tier::Display, *size);
            tops.push(cursor);
            heights.push(height);
            content_width = content_width.max(width);
            cursor += height + gap;
        }

        Self { tops, heights, content_width, gap }
    }

    pub fn page_count(&self) -> u32 {
        self.tops.len() as u32
    }

    pub fn content_width(&self) -> f32 {
        self.content_width
    }

    pub fn total_height(&self) -> f32 {
        match (self.tops.last(), self.heights.last()) {
            (Some(top), Some(height)) => top + height,
            _ => 0.0,
        }
    }

    /// Top offset of a 1-based page, clamped to the document
    pub fn page_top(&self, page: u32) -> f32 {
        let index = (page.max(1) as usize - 1).min(self.tops.len().saturating_sub(1));
        self.tops.get(index).copied().unwrap_or(0.0)
    }

    /// 1-based page whose slot (page plus trailing gap) contains `offset`
    pub fn page_at(&self, offset: f32) -> u32 {
        let count = self.tops.partition_point(|top| *top <= offset);
        count.clamp(1, self.tops.len().max(1)) as u32
    }

    /// Page under the middle of the viewport
    pub fn page_at_center(&self, scroll_top: f32, viewport_height: f32) -> u32 {
        self.page_at(scroll_top + viewport_height.max(0.0) / 2.0)
    }

    /// Average page height including the gap
    pub fn average_page_height(&self) -> f32 {
        if self.tops.is_empty() {
            return 0.0;
        }
        (self.total_height() + self.gap) / self.tops.len() as f32
    }

    pub fn metrics(&self) -> PageMetrics {
        PageMetrics {
            average_page_height: self.average_page_height(),
            total_pages: self.page_count(),
        }
    }

    /// Largest scroll offset on each axis for a viewport of this size
    pub fn max_scroll(&self, viewport_width: f32, viewport_height: f32) -> Point {
        Point::new(
            (self.content_width - viewport_width).max(0.0),
            (self.total_height() - viewport_height).max(0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter_pages(count: usize) -> DocumentGeometry {
        DocumentGeometry::new(&vec![PageSize::letter(); count], &RenderLayout::default(), 16.0)
    }

    #[test]
    fn pages_stack_with_gap() {
        let geometry = letter_pages(3);

        assert_eq!(geometry.page_top(1), 0.0);
        assert_eq!(geometry.page_top(2), 808.0);
        assert_eq!(geometry.page_top(3), 1616.0);
        assert_eq!(geometry.total_height(), 2408.0);
        assert_eq!(geometry.content_width(), 612.0);
    }

    #[test]
    fn page_top_is_clamped() {
        let geometry = letter_pages(3);
        assert_eq!(geometry.page_top(0), 0.0);
        assert_eq!(geometry.page_top(99), 1616.0);
    }

    #[test]
    fn test_page_at() {
        let geometry = letter_pages(3);

        assert_eq!(geometry.page_at(-10.0), 1);
        assert_eq!(geometry.page_at(0.0), 1);
        assert_eq!(geometry.page_at(800.0), 1);
        assert_eq!(geometry.page_at(808.0), 2);
        assert_eq!(geometry.page_at(1.0e6), 3);
        assert_eq!(geometry.page_at_center(500.0, 800.0), 2);
    }

    #[test]
    fn zoom_scales_pages() {
        let layout = RenderLayout { zoom: 200.0, ..RenderLayout::default() };
        let geometry = DocumentGeometry::new(&[PageSize::letter(); 2], &layout, 16.0);

        assert_eq!(geometry.page_top(2), 1600.0);
        assert_eq!(geometry.content_width(), 1224.0);
    }

    #[test]
    fn test_average_and_max_scroll() {
        let geometry = letter_pages(50);

        assert_eq!(geometry.average_page_height(), 808.0);
        assert_eq!(geometry.metrics().total_pages, 50);

        let max = geometry.max_scroll(400.0, 800.0);
        assert_eq!(max.x, 212.0);
        assert_eq!(max.y, 50.0 * 808.0 - 16.0 - 800.0);
    }

    #[test]
    fn empty_document() {
        let geometry = DocumentGeometry::default();
        assert_eq!(geometry.page_at(100.0), 1);
        assert_eq!(geometry.page_top(1), 0.0);
        assert_eq!(geometry.total_height(), 0.0);
        assert_eq!(geometry.average_page_height(), 0.0);
    }
}
