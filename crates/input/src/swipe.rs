//! Single-pointer swipe and tap detection
//!
//! A horizontal drag past the swipe threshold, clearly more horizontal than
//! vertical, turns the page once. The gesture is then spent until the
//! pointer is released. A press released without meaningful travel is a tap.

use crate::config::GestureConfig;
use crate::Point;

/// Direction of a page turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Next,
    Previous,
}

impl PageTurn {
    /// Page delta, `+1` or `-1`
    pub fn delta(self) -> i64 {
        match self {
            PageTurn::Next => 1,
            PageTurn::Previous => -1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwipeTracker {
    /// Pointer being tracked
    pointer_id: Option<u64>,
    start: Point,
    last: Point,
    /// A page turn already fired for this press
    handled: bool,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.pointer_id.is_some()
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Start tracking a pressed pointer
    pub fn pointer_down(&mut self, pointer_id: u64, at: Point) {
        self.pointer_id = Some(pointer_id);
        self.start = at;
        self.last = at;
        self.handled = false;
    }

    /// Follow the pointer, returning a page turn the first time one triggers
    pub fn pointer_move(
        &mut self,
        pointer_id: u64,
        at: Point,
        config: &GestureConfig,
    ) -> Option<PageTurn> {
        if self.pointer_id != Some(pointer_id) {
            return None;
        }
        self.last = at;

        if self.handled {
            return None;
        }

        let dx = at.x - self.start.x;
        let dy = at.y - self.start.y;
        let horizontal = dx.abs() > config.swipe_threshold_px
            && dx.abs() >= config.swipe_dominance * dy.abs();
        if !horizontal {
            return None;
        }

        self.handled = true;
        // Dragging content leftwards reveals the next page
        Some(if dx < 0.0 { PageTurn::Next } else { PageTurn::Previous })
    }

    /// Release the pointer; returns `true` if the press was a tap
    pub fn pointer_up(&mut self, pointer_id: u64, at: Point, config: &GestureConfig) -> bool {
        if self.pointer_id != Some(pointer_id) {
            return false;
        }
        self.last = at;

        let travel = self.start.distance(at);
        let tap = !self.handled && travel < config.tap_slop_px;
        self.cancel();
        tap
    }

    /// Abandon the current press without a tap
    pub fn cancel(&mut self) {
        self.pointer_id = None;
        self.handled = false;
    }
}
