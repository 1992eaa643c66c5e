//! Pageflow Input Library
//!
//! Gesture recognition for the page viewer:
//! - Swipe to turn pages, tap to toggle chrome
//! - Two-finger pinch zoom anchored at the finger midpoint
//! - Fast-scroll bursts with landing page prediction
//! - Motion quiescence, which tells background work it may resume
//!
//! [`GestureEngine`] owns every tracker and the interaction flag. The host
//! forwards raw pointer, touch, scroll and frame callbacks and acts on the
//! returned [`GestureEvent`]s.

pub mod config;
pub mod momentum;
pub mod pinch;
pub mod quiescence;
pub mod swipe;

use std::time::Instant;

pub use config::GestureConfig;
pub use momentum::{MomentumTracker, PageMetrics, ScrollSignal};
pub use pinch::{anchored_offset, PinchStep, PinchTracker, ZoomBounds};
pub use quiescence::QuiescenceDetector;
pub use swipe::{PageTurn, SwipeTracker};

/// Position in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Something the viewer should act on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    PageTurn(PageTurn),
    Tap,
    PinchStarted,
    Pinch(PinchStep),
    PinchEnded,
    FastScroll { skip_radius: u32, priority_focus: u32 },
    ScrollSettled,
    /// Motion has stopped; paused background work may resume
    Quiescent,
}

/// Gesture state of one viewer
#[derive(Debug, Default)]
pub struct GestureEngine {
    config: GestureConfig,
    swipe: SwipeTracker,
    pinch: PinchTracker,
    momentum: MomentumTracker,
    quiescence: QuiescenceDetector,
    /// True while any gesture or scroll is live
    interacting: bool,
}

impl GestureEngine {
    pub fn new(config: GestureConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_active()
    }

    pub fn momentum(&self) -> &MomentumTracker {
        &self.momentum
    }

    fn begin_interaction(&mut self) {
        if !self.interacting {
            log::trace!("interaction started");
        }
        self.interacting = true;
        self.quiescence.arm();
    }

    pub fn pointer_down(&mut self, pointer_id: u64, at: Point) {
        if self.pinch.is_active() {
            return;
        }
        self.swipe.pointer_down(pointer_id, at);
        self.begin_interaction();
    }

    pub fn pointer_move(&mut self, pointer_id: u64, at: Point) -> Option<GestureEvent> {
        if self.pinch.is_active() {
            return None;
        }
        self.swipe.pointer_move(pointer_id, at, &self.config).map(GestureEvent::PageTurn)
    }

    pub fn pointer_up(&mut self, pointer_id: u64, at: Point) -> Option<GestureEvent> {
        if self.swipe.pointer_up(pointer_id, at, &self.config) {
            Some(GestureEvent::Tap)
        } else {
            None
        }
    }

    pub fn pointer_cancel(&mut self) {
        self.swipe.cancel();
    }

    /// Touches went down; two or more start a pinch
    pub fn touch_start(&mut self, touches: &[Point], zoom: f32) -> Option<GestureEvent> {
        self.begin_interaction();
        match touches {
            [a, b, ..] if !self.pinch.is_active() => {
                self.swipe.cancel();
                self.pinch.begin(*a, *b, zoom);
                Some(GestureEvent::PinchStarted)
            }
            _ => None,
        }
    }

    pub fn touch_move(
        &mut self,
        touches: &[Point],
        zoom: f32,
        scroll: Point,
        max_scroll: Point,
        bounds: &ZoomBounds,
    ) -> Option<GestureEvent> {
        match touches {
            [a, b, ..] => self
                .pinch
                .update([*a, *b], zoom, scroll, max_scroll, bounds, &self.config)
                .map(GestureEvent::Pinch),
            _ => None,
        }
    }

    /// Touches lifted, leaving `remaining` on the surface
    pub fn touch_end(&mut self, remaining: usize) -> Option<GestureEvent> {
        if remaining < 2 && self.pinch.end() {
            Some(GestureEvent::PinchEnded)
        } else {
            None
        }
    }

    pub fn on_scroll(
        &mut self,
        scroll_top: f32,
        now: Instant,
        metrics: &PageMetrics,
    ) -> Option<GestureEvent> {
        self.begin_interaction();
        match self.momentum.on_scroll(scroll_top, now, metrics, &self.config)? {
            ScrollSignal::Fast { skip_radius, priority_focus } => {
                Some(GestureEvent::FastScroll { skip_radius, priority_focus })
            }
            ScrollSignal::Settled => Some(GestureEvent::ScrollSettled),
        }
    }

    /// Sample one animation frame
    pub fn on_frame(&mut self, scroll: Point, zoom: f32) -> Option<GestureEvent> {
        let input_active = self.swipe.is_tracking() || self.pinch.is_active();
        if !self.quiescence.on_frame(scroll, zoom, input_active, &self.config) {
            return None;
        }

        self.interacting = false;
        self.momentum.reset_burst();
        log::trace!("motion quiescent");
        Some(GestureEvent::Quiescent)
    }

    /// Forget all gesture state
    pub fn reset(&mut self) {
        self.swipe.cancel();
        self.pinch.end();
        self.momentum.reset();
        self.quiescence.reset();
        self.interacting = false;
    }
}
