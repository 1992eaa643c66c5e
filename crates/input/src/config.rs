//! Gesture thresholds

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for swipe, tap, pinch, fast-scroll and quiescence detection
///
/// Distances are in layout pixels, velocities in pixels per second and
/// zoom in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Horizontal travel that turns a drag into a page swipe
    pub swipe_threshold_px: f32,
    /// Required ratio of horizontal to vertical travel for a swipe
    pub swipe_dominance: f32,
    /// Maximum travel of a pointer press still counted as a tap
    pub tap_slop_px: f32,

    /// Scroll velocity counted as a fast tick
    pub fast_velocity: f32,
    /// Scroll velocity below which fast-scroll state resets
    pub slow_velocity: f32,
    /// Two fast ticks closer than this belong to the same burst
    pub burst_window_ms: u64,
    pub max_burst: u32,
    /// Skip radius added per burst step
    pub skip_step: u32,
    pub max_skip_radius: u32,
    /// How far ahead the landing page is extrapolated
    pub prediction_lookahead_ms: u64,

    /// Smallest vertical midpoint shift applied as pinch pan
    pub pinch_pan_min_shift_px: f32,
    /// Largest vertical pinch pan applied in one step
    pub pinch_pan_max_step_px: f32,

    /// Scroll movement below this is treated as still
    pub stable_offset_px: f32,
    /// Zoom movement below this is treated as still
    pub stable_zoom: f32,
    /// Consecutive still frames that count as quiescence
    pub stable_frames: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold_px: 40.0,
            swipe_dominance: 1.2,
            tap_slop_px: 10.0,
            fast_velocity: 2800.0,
            slow_velocity: 220.0,
            burst_window_ms: 240,
            max_burst: 3,
            skip_step: 10,
            max_skip_radius: 30,
            prediction_lookahead_ms: 300,
            pinch_pan_min_shift_px: 2.0,
            pinch_pan_max_step_px: 48.0,
            stable_offset_px: 0.5,
            stable_zoom: 0.02,
            stable_frames: 2,
        }
    }
}

impl GestureConfig {
    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    pub fn prediction_lookahead(&self) -> Duration {
        Duration::from_millis(self.prediction_lookahead_ms)
    }
}
