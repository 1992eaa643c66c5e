//! Yield-to-idle scheduling primitive
//!
//! Background work is never run inline. The owner asks for a slot with
//! [`BackgroundScheduler::schedule_when_idle`] and the host event loop later
//! polls [`BackgroundScheduler::take_due`], either when it has nothing
//! better to do or on every tick. A pending slot becomes due when the host
//! reports itself idle or, failing that, once the timeout has elapsed.

use std::time::{Duration, Instant};

/// Identifies one scheduled slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleHandle(u64);

impl IdleHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Idle-time scheduling seam
///
/// Implementations may sit on an OS idle queue, a deferred task pool or a
/// plain timer. At most one slot is pending per scheduler.
pub trait BackgroundScheduler {
    /// Request a slot, replacing any pending one
    fn schedule_when_idle(&mut self, timeout: Duration, now: Instant) -> IdleHandle;

    /// Drop the pending slot, if any
    fn cancel(&mut self);

    /// Claim the pending slot if it is due
    fn take_due(&mut self, now: Instant, host_idle: bool) -> Option<IdleHandle>;

    fn is_scheduled(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    handle: IdleHandle,
    deadline: Instant,
}

/// Timer-backed [`BackgroundScheduler`]
///
/// # Example
///
/// ```
/// use pageflow_scheduler::{BackgroundScheduler, IdleQueue};
/// use std::time::{Duration, Instant};
///
/// let mut queue = IdleQueue::new();
/// let start = Instant::now();
/// let handle = queue.schedule_when_idle(Duration::from_millis(200), start);
///
/// // Busy host, timeout not reached
/// assert_eq!(queue.take_due(start, false), None);
/// // Idle host
/// assert_eq!(queue.take_due(start, true), Some(handle));
/// ```
#[derive(Debug, Default)]
pub struct IdleQueue {
    next_id: u64,
    pending: Option<Pending>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the pending slot will fire regardless of host idleness
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }
}

impl BackgroundScheduler for IdleQueue {
    fn schedule_when_idle(&mut self, timeout: Duration, now: Instant) -> IdleHandle {
        self.next_id += 1;
        let handle = IdleHandle(self.next_id);
        self.pending = Some(Pending { handle, deadline: now + timeout });
        handle
    }

    fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::trace!("idle slot {} cancelled", pending.handle.0);
        }
    }

    fn take_due(&mut self, now: Instant, host_idle: bool) -> Option<IdleHandle> {
        let pending = self.pending?;
        if host_idle || now >= pending.deadline {
            self.pending = None;
            Some(pending.handle)
        } else {
            None
        }
    }

    fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn test_nothing_due_when_unscheduled() {
        let mut queue = IdleQueue::new();
        assert!(!queue.is_scheduled());
        assert_eq!(queue.take_due(Instant::now(), true), None);
    }

    #[test]
    fn test_due_when_host_idle() {
        let mut queue = IdleQueue::new();
        let now = Instant::now();
        let handle = queue.schedule_when_idle(TIMEOUT, now);

        assert_eq!(queue.take_due(now, true), Some(handle));
        assert!(!queue.is_scheduled());
        assert_eq!(queue.take_due(now, true), None);
    }

    #[test]
    fn timeout_fires_even_when_host_busy() {
        let mut queue = IdleQueue::new();
        let now = Instant::now();
        let handle = queue.schedule_when_idle(TIMEOUT, now);

        assert_eq!(queue.take_due(now + Duration::from_millis(199), false), None);
        assert_eq!(queue.take_due(now + TIMEOUT, false), Some(handle));
    }

    #[test]
    fn rescheduling_replaces_pending_slot() {
        let mut queue = IdleQueue::new();
        let now = Instant::now();
        let first = queue.schedule_when_idle(TIMEOUT, now);
        let second = queue.schedule_when_idle(TIMEOUT, now);

        assert_ne!(first, second);
        assert_eq!(queue.take_due(now, true), Some(second));
    }

    #[test]
    fn test_cancel() {
        let mut queue = IdleQueue::new();
        let now = Instant::now();
        queue.schedule_when_idle(TIMEOUT, now);

        queue.cancel();

        assert!(!queue.is_scheduled());
        assert_eq!(queue.deadline(), None);
        assert_eq!(queue.take_due(now + TIMEOUT, true), None);
    }
}
