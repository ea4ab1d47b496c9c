//! Process-wide freezing conditions.
//!
//! `active` counts every freezing condition in effect (system episodes and
//! group episodes alike) and gates the predicate's fast path. The two flags
//! say which system-level episode is running. They are written by the
//! coordinator under its own top-level serialization, never under the
//! freezer lock, and are read lock-free from any context.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Kind of freezing episode a coordinator opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpisodeKind {
    /// Interruptible episode; tasks marked `FREEZER_NOSIG` are exempt.
    Signaled,
    /// Episode that freezes every freezable task and must not rely on
    /// notifications being handled.
    NoSignal,
    /// Group-scoped episode; targets come from the group policy.
    Group,
}

/// Registry of freezing conditions.
///
/// # Examples
///
/// ```
/// use quiesce::FreezingConditions;
///
/// let conditions = FreezingConditions::new();
/// assert!(!conditions.any_active());
///
/// conditions.enter();
/// conditions.set_signaled_freezing(true);
/// assert!(conditions.any_active());
/// assert!(conditions.signaled_freezing());
///
/// conditions.set_signaled_freezing(false);
/// conditions.leave();
/// assert_eq!(conditions.active_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct FreezingConditions {
    active: AtomicUsize,
    signaled: AtomicBool,
    nosig: AtomicBool,
}

impl FreezingConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by [`Freezer::global`](crate::Freezer::global).
    pub fn global() -> &'static Arc<FreezingConditions> {
        static GLOBAL: OnceLock<Arc<FreezingConditions>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(FreezingConditions::new()))
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Fast-path gate: false means no task anywhere needs to freeze.
    #[inline]
    pub fn any_active(&self) -> bool {
        self.active_count() > 0
    }

    pub fn signaled_freezing(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn nosig_freezing(&self) -> bool {
        self.nosig.load(Ordering::Acquire)
    }

    /// Count one more freezing condition. Returns the new count.
    pub fn enter(&self) -> usize {
        self.active.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one freezing condition. Saturates at zero. Returns the new count.
    pub fn leave(&self) -> usize {
        let previous = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn set_signaled_freezing(&self, on: bool) {
        self.signaled.store(on, Ordering::Release);
    }

    pub fn set_nosig_freezing(&self, on: bool) {
        self.nosig.store(on, Ordering::Release);
    }

    /// Set or clear the flag that corresponds to `kind`. Group episodes have
    /// no flag of their own.
    pub fn set_kind(&self, kind: EpisodeKind, on: bool) {
        match kind {
            EpisodeKind::Signaled => self.set_signaled_freezing(on),
            EpisodeKind::NoSignal => self.set_nosig_freezing(on),
            EpisodeKind::Group => {}
        }
    }
}
