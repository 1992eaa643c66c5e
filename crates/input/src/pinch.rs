//! Two-finger pinch zoom with midpoint anchoring
//!
//! Each step scales the zoom by the change in finger distance since the
//! previous step. The scroll offset is then corrected so the content point
//! under the fingers' midpoint stays under it:
//!
//! ```text
//! new_offset = k * (old_offset + anchor) - anchor
//! ```
//!
//! where `k` is the zoom ratio actually applied after clamping. Midpoint
//! drift pans the view as well; vertical drift only counts above a small
//! threshold and is clamped per step, so finger jitter does not leak into
//! the scroll position.

use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::Point;

/// Allowed zoom range in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: f32,
    pub max: f32,
}

impl ZoomBounds {
    /// Bounds `[max(floor, base_zoom), ceiling]`
    pub fn new(base_zoom: f32, floor: f32, ceiling: f32) -> Self {
        let min = floor.max(base_zoom);
        Self { min, max: ceiling.max(min) }
    }

    pub fn clamp(&self, zoom: f32) -> f32 {
        if zoom.is_nan() {
            return self.min;
        }
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self::new(100.0, 50.0, 220.0)
    }
}

/// Offset keeping `anchor` fixed across a zoom step of ratio `k`
///
/// The result is clamped to `[0, max_scroll]`.
pub fn anchored_offset(offset: f32, anchor: f32, k: f32, max_scroll: f32) -> f32 {
    (k * (offset + anchor) - anchor).clamp(0.0, max_scroll.max(0.0))
}

/// Result of one pinch step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchStep {
    pub zoom: f32,
    pub scroll: Point,
}

#[derive(Debug, Clone, Default)]
pub struct PinchTracker {
    active: bool,
    start_distance: f32,
    start_zoom: f32,
    /// Midpoint when the pinch began
    anchor: Point,
    last_distance: f32,
    last_midpoint: Point,
}

impl PinchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn start_zoom(&self) -> f32 {
        self.start_zoom
    }

    /// Total distance ratio since the pinch began
    pub fn total_ratio(&self) -> f32 {
        if self.start_distance > 0.0 {
            self.last_distance / self.start_distance
        } else {
            1.0
        }
    }

    /// Start a pinch with two touch points
    pub fn begin(&mut self, a: Point, b: Point, zoom: f32) {
        let distance = a.distance(b);
        let midpoint = a.midpoint(b);

        self.active = true;
        self.start_distance = distance;
        self.start_zoom = zoom;
        self.anchor = midpoint;
        self.last_distance = distance;
        self.last_midpoint = midpoint;
    }

    /// Apply one pinch step
    ///
    /// # Arguments
    ///
    /// * `touches` - Current positions of the two fingers
    /// * `zoom` - Zoom before this step
    /// * `scroll` - Scroll offset before this step
    /// * `max_scroll` - Largest scroll offset on each axis after this step
    pub fn update(
        &mut self,
        [a, b]: [Point; 2],
        zoom: f32,
        scroll: Point,
        max_scroll: Point,
        bounds: &ZoomBounds,
        config: &GestureConfig,
    ) -> Option<PinchStep> {
        if !self.active {
            return None;
        }

        let distance = a.distance(b);
        let midpoint = a.midpoint(b);
        if distance <= 0.0 || self.last_distance <= 0.0 {
            self.last_distance = distance;
            self.last_midpoint = midpoint;
            return None;
        }

        let ratio = distance / self.last_distance;
        let new_zoom = bounds.clamp(zoom * ratio);
        let k = if zoom > 0.0 && new_zoom > 0.0 { new_zoom / zoom } else { 1.0 };

        let prev = self.last_midpoint;
        let pan_x = midpoint.x - prev.x;
        let shift_y = midpoint.y - prev.y;
        let pan_y = if shift_y.abs() < config.pinch_pan_min_shift_px {
            0.0
        } else {
            shift_y.clamp(-config.pinch_pan_max_step_px, config.pinch_pan_max_step_px)
        };

        // Midpoint drift folds into the pre-zoom offset, so the content under
        // the previous midpoint lands under the new one
        let scroll = Point::new(
            anchored_offset(scroll.x - pan_x / k, prev.x, k, max_scroll.x),
            anchored_offset(scroll.y - pan_y / k, prev.y, k, max_scroll.y),
        );

        self.last_distance = distance;
        self.last_midpoint = midpoint;

        Some(PinchStep { zoom: new_zoom, scroll })
    }

    /// Finish the pinch; returns whether one was active
    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAR: Point = Point { x: 10_000.0, y: 10_000.0 };

    fn pt(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_zoom_bounds() {
        let bounds = ZoomBounds::new(100.0, 50.0, 220.0);
        assert_eq!(bounds.min, 100.0);
        assert_eq!(bounds.max, 220.0);

        let low_base = ZoomBounds::new(30.0, 50.0, 220.0);
        assert_eq!(low_base.min, 50.0);

        assert_eq!(bounds.clamp(400.0), 220.0);
        assert_eq!(bounds.clamp(10.0), 100.0);
        assert_eq!(bounds.clamp(f32::NAN), 100.0);
    }

    #[test]
    fn test_anchored_offset() {
        // k(O + A) - A
        assert_eq!(anchored_offset(100.0, 50.0, 2.0, 1000.0), 250.0);
        assert_eq!(anchored_offset(0.0, 200.0, 0.5, 1000.0), 0.0);
        assert_eq!(anchored_offset(900.0, 100.0, 2.0, 1000.0), 1000.0);
    }

    #[test]
    fn spread_zooms_in_around_midpoint() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(100.0, 200.0), pt(200.0, 200.0), 100.0);
        let step = pinch
            .update([pt(75.0, 200.0), pt(225.0, 200.0)], 100.0, pt(40.0, 300.0), FAR, &bounds, &config)
            .unwrap();

        assert_eq!(step.zoom, 150.0);
        // Midpoint (150, 200) stays fixed
        assert_eq!(step.scroll.x, 1.5 * (40.0 + 150.0) - 150.0);
        assert_eq!(step.scroll.y, 1.5 * (300.0 + 200.0) - 200.0);
    }

    #[test]
    fn zoom_ratio_is_clamped_before_anchoring() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(0.0, 0.0), pt(100.0, 0.0), 200.0);
        let step = pinch
            .update([pt(0.0, 0.0), pt(300.0, 0.0)], 200.0, pt(100.0, 0.0), FAR, &bounds, &config)
            .unwrap();

        assert_eq!(step.zoom, 220.0);
        // Applied k is 1.1, not 3; anchor was the previous midpoint (50, 0)
        // and the midpoint drifted 100px right
        let expected = 1.1 * (100.0 + 50.0) - 50.0 - 100.0;
        assert!((step.scroll.x - expected).abs() < 1e-3);
    }

    #[test]
    fn pinch_cannot_zoom_below_base() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(0.0, 0.0), pt(200.0, 0.0), 100.0);
        let step = pinch
            .update([pt(50.0, 0.0), pt(150.0, 0.0)], 100.0, pt(0.0, 0.0), FAR, &bounds, &config)
            .unwrap();

        assert_eq!(step.zoom, 100.0);
    }

    #[test]
    fn scroll_is_clamped_to_range() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(100.0, 100.0), pt(200.0, 100.0), 100.0);
        let step = pinch
            .update(
                [pt(50.0, 100.0), pt(250.0, 100.0)],
                100.0,
                pt(500.0, 500.0),
                pt(600.0, 300.0),
                &bounds,
                &config,
            )
            .unwrap();

        assert_eq!(step.scroll.x, 600.0);
        assert_eq!(step.scroll.y, 300.0);
    }

    #[test]
    fn small_vertical_drift_is_ignored() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(100.0, 100.0), pt(200.0, 100.0), 120.0);
        // Same distance, midpoint 1px lower
        let step = pinch
            .update([pt(100.0, 101.0), pt(200.0, 101.0)], 120.0, pt(0.0, 400.0), FAR, &bounds, &config)
            .unwrap();

        assert_eq!(step.zoom, 120.0);
        assert_eq!(step.scroll.y, 400.0);
    }

    #[test]
    fn large_vertical_drift_is_clamped() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(100.0, 100.0), pt(200.0, 100.0), 120.0);
        // Fingers jump 200px up together
        let step = pinch
            .update([pt(100.0, -100.0), pt(200.0, -100.0)], 120.0, pt(0.0, 400.0), FAR, &bounds, &config)
            .unwrap();

        assert_eq!(step.scroll.y, 400.0 + config.pinch_pan_max_step_px);
    }

    #[test]
    fn test_end() {
        let mut pinch = PinchTracker::new();
        assert!(!pinch.end());

        pinch.begin(pt(0.0, 0.0), pt(10.0, 0.0), 100.0);
        assert!(pinch.is_active());
        assert!(pinch.end());
        assert!(!pinch.is_active());

        let step = pinch.update(
            [pt(0.0, 0.0), pt(20.0, 0.0)],
            100.0,
            pt(0.0, 0.0),
            FAR,
            &ZoomBounds::default(),
            &GestureConfig::default(),
        );
        assert!(step.is_none());
    }

    #[test]
    fn test_total_ratio() {
        let config = GestureConfig::default();
        let bounds = ZoomBounds::default();
        let mut pinch = PinchTracker::new();

        pinch.begin(pt(0.0, 0.0), pt(100.0, 0.0), 100.0);
        pinch.update([pt(0.0, 0.0), pt(150.0, 0.0)], 100.0, pt(0.0, 0.0), FAR, &bounds, &config);
        pinch.update([pt(0.0, 0.0), pt(200.0, 0.0)], 150.0, pt(0.0, 0.0), FAR, &bounds, &config);

        assert_eq!(pinch.total_ratio(), 2.0);
        assert_eq!(pinch.start_zoom(), 100.0);
        assert_eq!(pinch.anchor(), pt(50.0, 0.0));
    }
}
