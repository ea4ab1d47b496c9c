//! Cooperative task freezing.
//!
//! A coordinator opens a freezing episode in [`FreezingConditions`], then
//! calls [`Freezer::freeze_task`] on each target. Targets notice the request
//! at their next checkpoint ([`Freezer::try_to_freeze`]) and park themselves
//! in the refrigerator until the episode ends and [`Freezer::thaw_task`]
//! kicks them.
//!
//! ## Locking
//!
//! One freezer lock serializes every `FROZEN`/`FREEZING` transition and every
//! check-then-act sequence on them. Each task's scheduling lock nests inside
//! it when a wake is delivered and is never held while taking the freezer
//! lock. Critical sections under the freezer lock never block; the group
//! policy they consult must not block either.
//!
//! ## Usage
//!
//! ```
//! use quiesce::{EpisodeKind, FreezeEpisode, Freezer, FreezingConditions};
//! use quiesce::task::Task;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let conditions = Arc::new(FreezingConditions::new());
//! let freezer = Arc::new(Freezer::new(Arc::clone(&conditions)));
//! let task = Task::new(1, "worker");
//!
//! let episode = FreezeEpisode::begin(&conditions, EpisodeKind::Signaled);
//! assert!(freezer.freezing(&task));
//!
//! let worker = {
//!     let freezer = Arc::clone(&freezer);
//!     task.spawn(move |me| freezer.try_to_freeze(&me)).unwrap()
//! };
//! freezer.freeze_tasks(&[task.clone()], Duration::from_secs(5)).unwrap();
//! assert!(task.is_frozen());
//!
//! episode.thaw(&freezer, &[task.clone()]);
//! worker.join().unwrap();
//! assert!(!task.is_frozen());
//! ```

use arc_swap::ArcSwap;
use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};
use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::conditions::FreezingConditions;
use crate::config::FreezerConfig;
use crate::interfaces::{GroupFreezePolicy, NoGroupFreeze};
use crate::sched::{ExecState, WakeDelivery};
use crate::task::{Task, TaskFlags};

/// Proof that the freezer lock is held.
pub(crate) type FreezerGuard<'a> = MutexGuard<'a, ()>;

/// Freezer lock, predicate and the freeze/thaw operations.
pub struct Freezer {
    conditions: Arc<FreezingConditions>,
    lock: Mutex<()>,
    group_policy: ArcSwap<Box<dyn GroupFreezePolicy>>,
    config: FreezerConfig,
}

impl Freezer {
    pub fn new(conditions: Arc<FreezingConditions>) -> Self {
        Self::with_config(conditions, FreezerConfig::default())
    }

    pub fn with_config(conditions: Arc<FreezingConditions>, config: FreezerConfig) -> Self {
        let policy: Box<dyn GroupFreezePolicy> = Box::new(NoGroupFreeze);
        Self {
            conditions,
            lock: Mutex::new(()),
            group_policy: ArcSwap::new(Arc::new(policy)),
            config,
        }
    }

    /// Process-wide freezer over [`FreezingConditions::global`].
    pub fn global() -> &'static Freezer {
        static GLOBAL: OnceLock<Freezer> = OnceLock::new();
        GLOBAL.get_or_init(|| Freezer::new(Arc::clone(FreezingConditions::global())))
    }

    pub fn conditions(&self) -> &Arc<FreezingConditions> {
        &self.conditions
    }

    pub fn config(&self) -> &FreezerConfig {
        &self.config
    }

    /// Replace the group freeze policy. Safe while tasks are evaluating the
    /// predicate; they see either the old or the new policy.
    pub fn set_group_policy<P: GroupFreezePolicy>(&self, policy: P) {
        let policy: Box<dyn GroupFreezePolicy> = Box::new(policy);
        self.group_policy.store(Arc::new(policy));
    }

    pub(crate) fn lock(&self) -> FreezerGuard<'_> {
        self.lock.lock()
    }

    /// Should `task` enter and stay in the refrigerator right now?
    ///
    /// Lock-free; callable from any context. With no freezing condition
    /// active this is a single atomic load.
    #[inline]
    pub fn freezing(&self, task: &Task) -> bool {
        if !self.conditions.any_active() {
            return false;
        }
        self.freezing_slow_path(task)
    }

    /// Full predicate, evaluated when some freezing condition is active.
    pub fn freezing_slow_path(&self, task: &Task) -> bool {
        let flags = task.flags();
        if flags.contains(TaskFlags::NOFREEZE) {
            return false;
        }

        if self.conditions.nosig_freezing() || self.group_policy.load().is_group_freezing(task) {
            return true;
        }

        self.conditions.signaled_freezing() && !flags.contains(TaskFlags::FREEZER_NOSIG)
    }

    pub fn frozen(&self, task: &Task) -> bool {
        task.is_frozen()
    }

    /// Park the calling task until it is no longer freezing.
    ///
    /// `current` must be the task running this call. With `check_stop`, a
    /// stop request on a cancellable task ends the wait even while freezing
    /// is still requested. Returns whether the task actually slept.
    pub fn refrigerator(&self, current: &Task, check_stop: bool) -> bool {
        let sched = current.sched();
        let saved = sched.current_state();
        let mut was_frozen = false;
        let mut reentered = false;

        let mut guard = self.lock();
        // Opted-out tasks are never frozen, not even for one pass.
        if current.is_nofreeze() {
            return false;
        }
        loop {
            current.insert_flags(&guard, TaskFlags::FROZEN);
            drop(guard);

            debug!("{} entered refrigerator", current.name());

            // A freeze request may have left a wake marker; drop it.
            sched.recalc_pending();

            self.set_freezing_flag(current, true);

            let allow_cancel = check_stop && (!reentered || self.config.cancel_on_reentry);
            let mut cancelled = false;
            loop {
                sched.set_current_state(ExecState::Uninterruptible);
                if !self.freezing(current) {
                    break;
                }
                if allow_cancel && current.should_stop() {
                    cancelled = true;
                    break;
                }
                was_frozen = true;
                sched.schedule();
            }

            self.set_freezing_flag(current, false);

            // Re-check under the lock: a freeze request racing with our exit
            // sees FROZEN still set and relies on us going round again.
            guard = self.lock();
            if !cancelled && self.freezing(current) {
                reentered = true;
                continue;
            }
            current.remove_flags(&guard, TaskFlags::FROZEN);
            drop(guard);
            break;
        }

        debug!("{} left refrigerator", current.name());

        sched.set_current_state(saved);
        was_frozen
    }

    /// Checkpoint: freeze `current` if it should be frozen.
    pub fn try_to_freeze(&self, current: &Task) -> bool {
        if !self.freezing(current) {
            return false;
        }
        self.refrigerator(current, false)
    }

    /// Checkpoint for cancellable workers: freeze if requested, honoring stop
    /// requests while parked, then report whether the worker should stop.
    pub fn freezable_should_stop(&self, current: &Task) -> bool {
        if self.freezing(current) {
            self.refrigerator(current, true);
        }
        current.should_stop()
    }

    /// Ask `task` to freeze.
    ///
    /// Returns false if `task` is not a freeze target or is already frozen.
    /// True only means a wake was issued; the task freezes on its own time.
    pub fn freeze_task(&self, task: &Task) -> bool {
        let _guard = self.lock();
        if !self.freezing(task) || task.is_frozen() {
            return false;
        }

        // Delivery goes through the target's scheduling lock, so a
        // stopped/traced -> running transition cannot slip past a
        // coordinator polling task state.
        let delivery = WakeDelivery::for_flags(task.flags());
        delivery.deliver(task.sched());
        trace!("freeze request sent to {} via {:?}", task.name(), delivery);
        true
    }

    /// Release `task`. The coordinator must already have ended the episode
    /// that made it a target.
    pub fn thaw_task(&self, task: &Task) {
        let _guard = self.lock();
        if task.is_frozen() {
            task.sched().wake_up_process();
            trace!("thawed {}", task.name());
        } else {
            // Never reached the refrigerator: don't leave a stale marker.
            task.sched().recalc_pending_and_wake();
        }
    }

    /// Opt `current` in to freezing and freeze immediately if an episode is
    /// already running. With `with_notify`, freeze requests arrive as
    /// notifications instead of plain wakes.
    pub fn set_freezable(&self, current: &Task, with_notify: bool) -> bool {
        {
            let guard = self.lock();
            current.remove_flags(&guard, TaskFlags::NOFREEZE);
            if with_notify {
                current.remove_flags(&guard, TaskFlags::FREEZER_NOSIG);
            }
        }

        self.try_to_freeze(current)
    }

    /// Opt `current` out of freezing.
    pub fn set_nofreeze(&self, current: &Task) {
        let guard = self.lock();
        current.insert_flags(&guard, TaskFlags::NOFREEZE);
    }

    fn set_freezing_flag(&self, current: &Task, on: bool) {
        let guard = self.lock();
        if on {
            current.insert_flags(&guard, TaskFlags::FREEZING);
        } else {
            current.remove_flags(&guard, TaskFlags::FREEZING);
        }
    }
}

impl fmt::Debug for Freezer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Freezer")
            .field("conditions", &self.conditions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Checkpoint for the task bound to the calling thread, on the global freezer.
pub fn try_to_freeze() -> bool {
    Task::current().is_some_and(|task| Freezer::global().try_to_freeze(&task))
}

/// Make the task bound to the calling thread freezable on the global freezer.
pub fn set_freezable(with_notify: bool) -> bool {
    Task::current().is_some_and(|task| Freezer::global().set_freezable(&task, with_notify))
}
