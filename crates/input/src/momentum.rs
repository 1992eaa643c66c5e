//! Fast-scroll detection and landing page prediction
//!
//! Every scroll tick yields an instantaneous velocity. Ticks above the
//! high-water velocity that follow each other closely build a burst; the
//! burst sets a skip radius so pages flying past are not rendered, and the
//! scroll position is extrapolated to predict the page it will land on.
//! Dropping below the low-water velocity clears both.

use std::time::Instant;

use crate::config::GestureConfig;

/// Document geometry used to turn a scroll offset into a page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    /// Average page height including the gap between pages
    pub average_page_height: f32,
    pub total_pages: u32,
}

impl PageMetrics {
    /// 1-based page showing at `scroll_top`, clamped to the document
    pub fn page_at(&self, scroll_top: f32) -> u32 {
        let total = self.total_pages.max(1);
        if self.average_page_height <= 0.0 || !scroll_top.is_finite() {
            return 1;
        }
        let index = (scroll_top.max(0.0) / self.average_page_height).floor() as u64;
        (index + 1).min(u64::from(total)) as u32
    }
}

/// Change to the fast-scroll state caused by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollSignal {
    /// A fast tick; the window should skip around the current page and
    /// centre on the predicted one
    Fast { skip_radius: u32, priority_focus: u32 },
    /// Scrolling slowed down; back to the plain window
    Settled,
}

#[derive(Debug, Clone, Default)]
pub struct MomentumTracker {
    last_scroll_top: Option<f32>,
    last_at: Option<Instant>,
    last_fast_at: Option<Instant>,
    burst_count: u32,
    velocity: f32,
    skip_radius: u32,
    priority_focus: Option<u32>,
}

impl MomentumTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed velocity of the last tick, pixels per second
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn burst_count(&self) -> u32 {
        self.burst_count
    }

    pub fn skip_radius(&self) -> u32 {
        self.skip_radius
    }

    pub fn priority_focus(&self) -> Option<u32> {
        self.priority_focus
    }

    /// Feed a scroll tick
    ///
    /// Returns a signal when the fast-scroll state changes. Ticks between
    /// the low and high water marks keep the current state.
    pub fn on_scroll(
        &mut self,
        scroll_top: f32,
        now: Instant,
        metrics: &PageMetrics,
        config: &GestureConfig,
    ) -> Option<ScrollSignal> {
        let previous = self.last_scroll_top.replace(scroll_top);
        let previous_at = self.last_at.replace(now);

        let (Some(previous), Some(previous_at)) = (previous, previous_at) else {
            return None;
        };
        let dt = now.saturating_duration_since(previous_at).as_secs_f32();
        if dt <= 0.0 {
            return None;
        }

        let velocity = (scroll_top - previous) / dt;
        self.velocity = velocity;
        let speed = velocity.abs();

        if speed >= config.fast_velocity {
            let in_burst = self
                .last_fast_at
                .is_some_and(|at| now.saturating_duration_since(at) <= config.burst_window());
            self.burst_count =
                if in_burst { (self.burst_count + 1).min(config.max_burst) } else { 1 };
            self.last_fast_at = Some(now);

            self.skip_radius =
                (self.burst_count * config.skip_step).min(config.max_skip_radius);
            let predicted_top =
                scroll_top + velocity * config.prediction_lookahead().as_secs_f32();
            let focus = metrics.page_at(predicted_top);
            self.priority_focus = Some(focus);

            log::trace!(
                "fast scroll {:.0}px/s burst {} skip {} focus {}",
                velocity,
                self.burst_count,
                self.skip_radius,
                focus
            );
            return Some(ScrollSignal::Fast {
                skip_radius: self.skip_radius,
                priority_focus: focus,
            });
        }

        if speed < config.slow_velocity && self.is_fast() {
            self.reset_burst();
            return Some(ScrollSignal::Settled);
        }

        None
    }

    /// Whether a skip radius or focus override is active
    pub fn is_fast(&self) -> bool {
        self.skip_radius > 0 || self.priority_focus.is_some()
    }

    /// Drop burst state, keeping the last position for the next velocity
    pub fn reset_burst(&mut self) {
        self.burst_count = 0;
        self.last_fast_at = None;
        self.skip_radius = 0;
        self.priority_focus = None;
    }

    /// Forget everything, including the last position
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
