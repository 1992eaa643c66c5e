//! Two-phase warm-up of the warm cache tier
//!
//! Phase 1 renders the first pages eagerly; the viewer reports ready only
//! once it is done. Phase 2 walks the remaining pages a small batch per
//! idle slot. Any interaction pauses phase 2 without rescheduling it, and
//! only motion quiescence resumes it. Finishing phase 2 is recorded per
//! document identity so later opens skip both phases.

use pageflow_render::RenderError;
use pageflow_scheduler::{BackgroundScheduler, IdleQueue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Pages rendered before the viewer is ready
    pub eager_pages: u32,
    /// Pages rendered per idle slot
    pub batch_size: u32,
    /// Idle slot fallback timeout
    pub idle_timeout_ms: u64,
    /// Resolution of warm renders relative to display quality
    pub quality_scale: f32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self { eager_pages: 20, batch_size: 3, idle_timeout_ms: 200, quality_scale: 0.6 }
    }
}

impl WarmupConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Observable warm-up progress
///
/// Only moves forward; reset when another document opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmProgress {
    /// Next page to warm
    pub next_page: u32,
    /// Pages processed so far, cached or rendered
    pub completed: u32,
    pub target: u32,
    /// Whether a progress indicator should be shown
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmPhase {
    #[default]
    Pending,
    Eager,
    Background,
    /// Background warm-up interrupted by interaction
    Paused,
    Complete,
}

/// Result of polling the background phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmTick {
    /// No slot was due, or the background phase is not running
    NotDue,
    /// A batch ran and the next slot is scheduled
    Progressed,
    /// Interaction was detected; waiting for quiescence
    Paused,
    /// The last page was warmed
    Completed,
}

/// What the warm-up renders into
pub trait WarmTarget {
    /// Whether a warm bitmap of `page` already exists, in memory or on disk
    fn is_cached(&self, page: u32) -> bool;

    /// Render `page` into the warm tier
    fn warm(&mut self, page: u32) -> Result<(), RenderError>;

    /// Whether background work must stop for user interaction
    fn should_yield(&self) -> bool;
}

/// Documents fully warmed in this process
#[derive(Debug, Clone, Default)]
pub struct WarmRegistry {
    complete: Arc<Mutex<HashSet<String>>>,
}

impl WarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&self, identity: &str) {
        self.complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.to_string());
    }

    pub fn is_complete(&self, identity: &str) -> bool {
        self.complete.lock().unwrap_or_else(PoisonError::into_inner).contains(identity)
    }

    pub fn forget(&self, identity: &str) -> bool {
        self.complete.lock().unwrap_or_else(PoisonError::into_inner).remove(identity)
    }
}

#[derive(Debug)]
pub struct WarmupScheduler<S = IdleQueue> {
    config: WarmupConfig,
    idle: S,
    phase: WarmPhase,
    progress: WarmProgress,
    failures: u32,
}

impl<S: BackgroundScheduler> WarmupScheduler<S> {
    pub fn new(config: WarmupConfig, idle: S) -> Self {
        Self {
            config,
            idle,
            phase: WarmPhase::Pending,
            progress: WarmProgress::default(),
            failures: 0,
        }
    }

    pub fn config(&self) -> &WarmupConfig {
        &self.config
    }

    pub fn phase(&self) -> WarmPhase {
        self.phase
    }

    pub fn progress(&self) -> WarmProgress {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.phase == WarmPhase::Complete
    }

    /// Pages whose warm render failed since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_scheduled(&self) -> bool {
        self.idle.is_scheduled()
    }

    /// Start over for a document of `total_pages`
    pub fn reset(&mut self, total_pages: u32) {
        self.idle.cancel();
        self.phase = WarmPhase::Pending;
        self.failures = 0;
        self.progress = WarmProgress {
            next_page: 1,
            completed: 0,
            target: total_pages,
            visible: total_pages > 0,
        };
    }

    /// Stop all background work
    pub fn cancel(&mut self) {
        self.idle.cancel();
    }

    /// Mark the whole document as warm without rendering anything
    pub fn mark_complete(&mut self) {
        self.idle.cancel();
        self.phase = WarmPhase::Complete;
        self.progress.next_page = self.progress.target + 1;
        self.progress.completed = self.progress.target;
        self.progress.visible = false;
    }

    /// Phase 1: warm the first pages in order
    ///
    /// Stops at the first failure; the failed page still counts as
    /// processed.
    pub fn run_eager<T: WarmTarget + ?Sized>(&mut self, target: &mut T) -> Result<(), RenderError> {
        self.phase = WarmPhase::Eager;
        let last = self.config.eager_pages.min(self.progress.target);
        log::debug!("warming pages 1..={} eagerly", last);

        while self.progress.next_page <= last {
            self.warm_next(target)?;
        }
        Ok(())
    }

    /// Phase 2: schedule the first idle slot
    ///
    /// Returns `true` if nothing was left to warm and the warm-up is now
    /// complete.
    pub fn start_background(&mut self, now: Instant) -> bool {
        if self.progress.next_page > self.progress.target {
            self.finish();
            return true;
        }

        self.phase = WarmPhase::Background;
        self.schedule(now);
        log::debug!(
            "background warm-up from page {} of {}",
            self.progress.next_page,
            self.progress.target
        );
        false
    }

    /// Interaction started: drop the pending slot
    pub fn pause(&mut self) -> bool {
        if self.phase != WarmPhase::Background {
            return false;
        }
        self.idle.cancel();
        self.phase = WarmPhase::Paused;
        log::debug!("warm-up paused at page {}", self.progress.next_page);
        true
    }

    /// Motion settled: continue where the warm-up left off
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.phase != WarmPhase::Paused {
            return false;
        }
        self.phase = WarmPhase::Background;
        self.schedule(now);
        log::debug!("warm-up resumed at page {}", self.progress.next_page);
        true
    }

    /// Run one batch if an idle slot is due
    ///
    /// The yield check runs before every page, so interaction never waits
    /// for a batch to drain. After a failed page the next slot is still
    /// scheduled.
    pub fn run_due<T: WarmTarget + ?Sized>(
        &mut self,
        now: Instant,
        host_idle: bool,
        target: &mut T,
    ) -> Result<WarmTick, RenderError> {
        if self.phase != WarmPhase::Background {
            return Ok(WarmTick::NotDue);
        }
        if self.idle.take_due(now, host_idle).is_none() {
            return Ok(WarmTick::NotDue);
        }

        for _ in 0..self.config.batch_size.max(1) {
            if self.progress.next_page > self.progress.target {
                break;
            }
            if target.should_yield() {
                self.phase = WarmPhase::Paused;
                log::debug!("warm-up yielded to interaction at page {}", self.progress.next_page);
                return Ok(WarmTick::Paused);
            }
            if let Err(e) = self.warm_next(target) {
                self.schedule(now);
                return Err(e);
            }
        }

        if self.progress.next_page > self.progress.target {
            self.finish();
            return Ok(WarmTick::Completed);
        }

        self.schedule(now);
        Ok(WarmTick::Progressed)
    }

    fn warm_next<T: WarmTarget + ?Sized>(&mut self, target: &mut T) -> Result<(), RenderError> {
        let page = self.progress.next_page;
        self.progress.next_page += 1;
        self.progress.completed += 1;

        if target.is_cached(page) {
            log::trace!("page {} already cached, not warming", page);
            return Ok(());
        }

        target.warm(page).map_err(|e| {
            self.failures += 1;
            e
        })
    }

    fn schedule(&mut self, now: Instant) {
        self.idle.schedule_when_idle(self.config.idle_timeout(), now);
    }

    fn finish(&mut self) {
        self.idle.cancel();
        self.phase = WarmPhase::Complete;
        self.progress.visible = false;
        log::info!(
            "warm-up complete: {} pages, {} failed",
            self.progress.completed,
            self.failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeTarget {
        cached: HashSet<u32>,
        warmed: Vec<u32>,
        failing: HashSet<u32>,
        busy: bool,
    }

    impl WarmTarget for FakeTarget {
        fn is_cached(&self, page: u32) -> bool {
            self.cached.contains(&page)
        }

        fn warm(&mut self, page: u32) -> Result<(), RenderError> {
            if self.failing.contains(&page) {
                return Err(RenderError::Backend(format!("page {page} is corrupt")));
            }
            self.warmed.push(page);
            self.cached.insert(page);
            Ok(())
        }

        fn should_yield(&self) -> bool {
            self.busy
        }
    }

    fn scheduler(total: u32) -> WarmupScheduler {
        let mut warmup = WarmupScheduler::new(WarmupConfig::default(), IdleQueue::new());
        warmup.reset(total);
        warmup
    }

    #[test]
    fn eager_phase_warms_first_pages_skipping_cached() {
        let mut warmup = scheduler(50);
        let mut target = FakeTarget { cached: HashSet::from([3, 7]), ..FakeTarget::default() };

        warmup.run_eager(&mut target).unwrap();

        let expected: Vec<u32> = (1..=20).filter(|p| *p != 3 && *p != 7).collect();
        assert_eq!(target.warmed, expected);
        assert_eq!(warmup.progress().next_page, 21);
        assert_eq!(warmup.progress().completed, 20);
        assert_eq!(warmup.phase(), WarmPhase::Eager);
    }

    #[test]
    fn eager_phase_is_bounded_by_page_count() {
        let mut warmup = scheduler(4);
        let mut target = FakeTarget::default();

        warmup.run_eager(&mut target).unwrap();
        assert_eq!(target.warmed, vec![1, 2, 3, 4]);

        assert!(warmup.start_background(Instant::now()));
        assert!(warmup.is_complete());
        assert!(!warmup.progress().visible);
    }

    #[test]
    fn background_runs_in_batches() {
        let mut warmup = scheduler(26);
        let mut target = FakeTarget::default();
        let now = Instant::now();

        warmup.run_eager(&mut target).unwrap();
        assert!(!warmup.start_background(now));
        assert!(warmup.is_scheduled());

        // Busy host before the timeout
        assert_eq!(warmup.run_due(now, false, &mut target).unwrap(), WarmTick::NotDue);

        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::Progressed);
        assert_eq!(target.warmed[20..], [21, 22, 23]);

        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::Completed);
        assert_eq!(target.warmed.len(), 26);
        assert!(warmup.is_complete());
        assert!(!warmup.is_scheduled());
        assert_eq!(warmup.progress().completed, 26);
    }

    #[test]
    fn timeout_makes_slot_due_on_busy_host() {
        let mut warmup = scheduler(30);
        let mut target = FakeTarget::default();
        let now = Instant::now();

        warmup.run_eager(&mut target).unwrap();
        warmup.start_background(now);

        let later = now + Duration::from_millis(250);
        assert_eq!(warmup.run_due(later, false, &mut target).unwrap(), WarmTick::Progressed);
    }

    #[test]
    fn interaction_aborts_without_rescheduling() {
        let mut warmup = scheduler(40);
        let mut target = FakeTarget::default();
        let now = Instant::now();

        warmup.run_eager(&mut target).unwrap();
        warmup.start_background(now);

        target.busy = true;
        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::Paused);
        assert_eq!(warmup.phase(), WarmPhase::Paused);
        assert!(!warmup.is_scheduled());
        assert_eq!(target.warmed.len(), 20);

        // Nothing happens until an explicit resume
        target.busy = false;
        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::NotDue);

        assert!(warmup.resume(now));
        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::Progressed);
        assert_eq!(warmup.progress().next_page, 24);
    }

    #[test]
    fn pause_cancels_pending_slot() {
        let mut warmup = scheduler(40);
        let mut target = FakeTarget::default();
        let now = Instant::now();

        warmup.run_eager(&mut target).unwrap();
        warmup.start_background(now);

        assert!(warmup.pause());
        assert!(!warmup.is_scheduled());
        assert!(!warmup.pause());
        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::NotDue);
    }

    #[test]
    fn resume_only_applies_when_paused() {
        let mut warmup = scheduler(40);
        assert!(!warmup.resume(Instant::now()));
        assert_eq!(warmup.phase(), WarmPhase::Pending);
    }

    #[test]
    fn failed_page_is_skipped_and_counted() {
        let mut warmup = scheduler(24);
        let mut target = FakeTarget { failing: HashSet::from([22]), ..FakeTarget::default() };
        let now = Instant::now();

        warmup.run_eager(&mut target).unwrap();
        warmup.start_background(now);

        assert!(warmup.run_due(now, true, &mut target).is_err());
        assert!(warmup.is_scheduled());
        assert_eq!(warmup.failures(), 1);

        assert_eq!(warmup.run_due(now, true, &mut target).unwrap(), WarmTick::Completed);
        assert!(!target.warmed.contains(&22));
        assert!(target.warmed.contains(&24));
    }

    #[test]
    fn test_mark_complete() {
        let mut warmup = scheduler(50);
        warmup.mark_complete();

        let progress = warmup.progress();
        assert!(warmup.is_complete());
        assert_eq!(progress.completed, 50);
        assert_eq!(progress.next_page, 51);
        assert!(!progress.visible);
    }

    #[test]
    fn test_registry() {
        let registry = WarmRegistry::new();
        let shared = registry.clone();

        assert!(!registry.is_complete("doc"));
        shared.mark_complete("doc");
        assert!(registry.is_complete("doc"));
        assert!(registry.forget("doc"));
        assert!(!shared.is_complete("doc"));
    }
}
