//! Virtual window over the page list
//!
//! Decides which pages keep a live render surface. Pages are numbered from 1.
//! The window is centred on the current page, or on the predicted landing
//! page while a fast scroll is in progress. During a fast scroll the pages
//! immediately around the current page are being scrolled past and are
//! dropped from the window.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Window radii
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Pages mounted on each side of the current page
    pub radius: u32,
    /// Pages mounted on each side of a priority focus page
    pub focus_radius: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { radius: 8, focus_radius: 10 }
    }
}

/// Clamp a requested page into `[1, total_pages]`
///
/// A document reporting zero pages is treated as having one.
pub fn clamp_page(page: i64, total_pages: u32) -> u32 {
    let last = i64::from(total_pages.max(1));
    page.clamp(1, last) as u32
}

/// Compute the set of pages that should be mounted
///
/// # Arguments
///
/// * `safe_page` - Current page, already clamped to the document
/// * `total_pages` - Page count; `0` is treated as `1`
/// * `priority_focus` - Predicted landing page during a fast scroll
/// * `skip_radius` - Pages around `safe_page` withheld during a fast scroll
///
/// # Example
///
/// ```
/// use pageflow_scheduler::{compute_mounted_pages, WindowConfig};
///
/// let mounted = compute_mounted_pages(1, 50, None, 0, &WindowConfig::default());
/// assert_eq!(mounted.iter().copied().collect::<Vec<_>>(), (1..=9).collect::<Vec<_>>());
/// ```
pub fn compute_mounted_pages(
    safe_page: u32,
    total_pages: u32,
    priority_focus: Option<u32>,
    skip_radius: u32,
    config: &WindowConfig,
) -> BTreeSet<u32> {
    let total = total_pages.max(1);
    let current = safe_page.clamp(1, total);

    let (center, radius) = match priority_focus {
        Some(focus) => (focus.clamp(1, total), config.focus_radius),
        None => (current, config.radius),
    };

    let first = center.saturating_sub(radius).max(1);
    let last = center.saturating_add(radius).min(total);
    let mut mounted: BTreeSet<u32> = (first..=last).collect();

    let skipping =
        skip_radius > 0 && priority_focus.is_some_and(|focus| focus.abs_diff(current) > 1);
    if skipping {
        let skip_first = current.saturating_sub(skip_radius);
        let skip_last = current.saturating_add(skip_radius);
        mounted.retain(|page| *page < skip_first || *page > skip_last);
    }

    mounted
}

/// Window bookkeeping owned by a viewer session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub current_page: u32,
    pub total_pages: u32,
    pub priority_focus: Option<u32>,
    pub skip_radius: u32,
    pub mounted: BTreeSet<u32>,
}

impl WindowState {
    pub fn new(total_pages: u32) -> Self {
        Self {
            current_page: 1,
            total_pages,
            priority_focus: None,
            skip_radius: 0,
            mounted: BTreeSet::new(),
        }
    }

    /// Current page clamped to the document
    pub fn safe_page(&self) -> u32 {
        clamp_page(i64::from(self.current_page), self.total_pages)
    }

    /// Whether a fast-scroll override is active
    pub fn is_overridden(&self) -> bool {
        self.priority_focus.is_some() || self.skip_radius > 0
    }

    /// Drop any fast-scroll override
    pub fn clear_override(&mut self) {
        self.priority_focus = None;
        self.skip_radius = 0;
    }

    /// Recompute the mounted set
    ///
    /// Returns the pages that became mounted by this call, in ascending order.
    pub fn recompute(&mut self, config: &WindowConfig) -> Vec<u32> {
        let next = compute_mounted_pages(
            self.safe_page(),
            self.total_pages,
            self.priority_focus,
            self.skip_radius,
            config,
        );
        let added = next.difference(&self.mounted).copied().collect();
        self.mounted = next;
        added
    }
}
