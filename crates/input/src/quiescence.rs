//! Motion quiescence detection
//!
//! Sampled once per animation frame. Motion is over once the scroll offset
//! and zoom have held still for a number of consecutive frames with no
//! pointer or pinch active. The detector fires once per period of motion.

use crate::config::GestureConfig;
use crate::Point;

#[derive(Debug, Clone, Default)]
pub struct QuiescenceDetector {
    last_scroll: Option<Point>,
    last_zoom: f32,
    stable_frames: u32,
    /// Motion has been seen since the last firing
    armed: bool,
}

impl QuiescenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive still frames counted so far
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }

    /// Mark motion as started, so the next quiet period fires
    pub fn arm(&mut self) {
        self.armed = true;
        self.stable_frames = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Sample one frame; returns `true` when motion has just settled
    pub fn on_frame(
        &mut self,
        scroll: Point,
        zoom: f32,
        input_active: bool,
        config: &GestureConfig,
    ) -> bool {
        let moved = match self.last_scroll {
            Some(last) => {
                (scroll.x - last.x).abs() >= config.stable_offset_px
                    || (scroll.y - last.y).abs() >= config.stable_offset_px
                    || (zoom - self.last_zoom).abs() >= config.stable_zoom
            }
            None => true,
        };
        self.last_scroll = Some(scroll);
        self.last_zoom = zoom;

        if moved || input_active {
            if moved {
                self.armed = true;
            }
            self.stable_frames = 0;
            return false;
        }

        self.stable_frames += 1;
        if self.armed && self.stable_frames >= config.stable_frames.max(1) {
            self.armed = false;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
