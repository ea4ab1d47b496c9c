//! Per-task scheduling context: execution state, the task's own scheduling
//! lock, and the wake primitives the freezer drives.
//!
//! The model follows the usual "set state, re-check, sleep" protocol: a task
//! publishes a non-running [`ExecState`], re-checks its wake condition, and only
//! then calls [`SchedContext::schedule`]. A wake that lands between the state
//! change and `schedule` flips the state back to [`ExecState::Running`], so
//! `schedule` returns at once and no wakeup is lost.
//!
//! # Examples
//!
//! ```
//! use quiesce::sched::{ExecState, SchedContext, StateMask};
//!
//! let sched = SchedContext::new();
//! sched.set_current_state(ExecState::Interruptible);
//! assert!(sched.wake_up_state(StateMask::INTERRUPTIBLE));
//! assert_eq!(sched.current_state(), ExecState::Running);
//!
//! // Already running: nothing to wake.
//! assert!(!sched.wake_up_process());
//! ```

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::task::TaskFlags;

/// Externally visible execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecState {
    #[default]
    Running,
    /// Blocked; woken by plain wakes and by notifications.
    Interruptible,
    /// Blocked; ignores notifications, only plain wakes resume it.
    Uninterruptible,
    Stopped,
    Traced,
}

bitflags! {
    /// Set of blocked states a wake is allowed to resume.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateMask: u8 {
        const INTERRUPTIBLE = 0b0001;
        const UNINTERRUPTIBLE = 0b0010;
        const STOPPED = 0b0100;
        const TRACED = 0b1000;
        const NORMAL = Self::INTERRUPTIBLE.bits() | Self::UNINTERRUPTIBLE.bits();
    }
}

impl ExecState {
    /// Mask bit for this state; empty for `Running`.
    pub fn mask(self) -> StateMask {
        match self {
            ExecState::Running => StateMask::empty(),
            ExecState::Interruptible => StateMask::INTERRUPTIBLE,
            ExecState::Uninterruptible => StateMask::UNINTERRUPTIBLE,
            ExecState::Stopped => StateMask::STOPPED,
            ExecState::Traced => StateMask::TRACED,
        }
    }
}

/// Outcome of [`SchedContext::sleep_interruptible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Resumed by a plain wake.
    Woken,
    /// A pending-interrupt marker was set before or during the wait.
    Interrupted,
    TimedOut,
}

#[derive(Debug, Default)]
struct SchedState {
    state: ExecState,
    pending_interrupt: bool,
    pending_triggers: usize,
}

/// Scheduling lock plus the condition variable a task parks on.
#[derive(Debug, Default)]
pub struct SchedContext {
    lock: Mutex<SchedState>,
    wakeup: Condvar,
    parked: AtomicBool,
}

impl SchedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> ExecState {
        self.lock.lock().state
    }

    pub fn set_current_state(&self, state: ExecState) {
        self.lock.lock().state = state;
    }

    /// True while the owning task is blocked inside [`schedule`](Self::schedule).
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    /// Whether the pending-interrupt marker is currently set.
    pub fn pending_interrupt(&self) -> bool {
        self.lock.lock().pending_interrupt
    }

    /// Give up the processor until some wake moves the state back to `Running`.
    ///
    /// Returns immediately if the state is already `Running`. Acquiring the
    /// scheduling lock on return orders every write made before the wake.
    pub fn schedule(&self) {
        let mut guard = self.lock.lock();
        if guard.state == ExecState::Running {
            return;
        }
        self.parked.store(true, Ordering::Release);
        while guard.state != ExecState::Running {
            self.wakeup.wait(&mut guard);
        }
        self.parked.store(false, Ordering::Release);
    }

    /// Block interruptibly until woken, interrupted, or `timeout` elapses.
    ///
    /// The pending-interrupt marker is left untouched; whoever owns the
    /// notification consumes or reconciles it.
    pub fn sleep_interruptible(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        if guard.pending_interrupt {
            return WaitOutcome::Interrupted;
        }
        guard.state = ExecState::Interruptible;
        self.parked.store(true, Ordering::Release);
        let mut outcome = WaitOutcome::Woken;
        while guard.state != ExecState::Running {
            if self.wakeup.wait_until(&mut guard, deadline).timed_out()
                && guard.state != ExecState::Running
            {
                guard.state = ExecState::Running;
                outcome = WaitOutcome::TimedOut;
            }
        }
        self.parked.store(false, Ordering::Release);
        if guard.pending_interrupt {
            WaitOutcome::Interrupted
        } else {
            outcome
        }
    }

    /// Resume the task if its current state is in `mask`.
    pub fn wake_up_state(&self, mask: StateMask) -> bool {
        let mut guard = self.lock.lock();
        self.try_wake_locked(&mut guard, mask)
    }

    /// Plain wake of a task blocked in either normal sleep state.
    pub fn wake_up_process(&self) -> bool {
        self.wake_up_state(StateMask::NORMAL)
    }

    /// Set the pending-interrupt marker and kick the task out of any
    /// interruptible, stopped or traced wait.
    pub fn signal_wake_up(&self) -> bool {
        let mut guard = self.lock.lock();
        guard.pending_interrupt = true;
        self.try_wake_locked(
            &mut guard,
            StateMask::INTERRUPTIBLE | StateMask::STOPPED | StateMask::TRACED,
        )
    }

    /// Recompute the pending-interrupt marker from genuinely pending
    /// triggers, dropping any marker that was only set as a wake side channel.
    pub fn recalc_pending(&self) -> bool {
        let mut guard = self.lock.lock();
        Self::recalc_locked(&mut guard)
    }

    /// [`recalc_pending`](Self::recalc_pending), then wake interruptible
    /// waiters if a real trigger is still outstanding.
    pub fn recalc_pending_and_wake(&self) {
        let mut guard = self.lock.lock();
        if Self::recalc_locked(&mut guard) {
            self.try_wake_locked(&mut guard, StateMask::INTERRUPTIBLE);
        }
    }

    /// Queue a genuine notification for the task.
    pub fn raise_trigger(&self) {
        let mut guard = self.lock.lock();
        guard.pending_triggers += 1;
        guard.pending_interrupt = true;
        self.try_wake_locked(&mut guard, StateMask::INTERRUPTIBLE);
    }

    /// Dequeue one genuine notification, if any.
    pub fn consume_trigger(&self) -> bool {
        let mut guard = self.lock.lock();
        if guard.pending_triggers == 0 {
            return false;
        }
        guard.pending_triggers -= 1;
        Self::recalc_locked(&mut guard);
        true
    }

    fn recalc_locked(guard: &mut MutexGuard<'_, SchedState>) -> bool {
        guard.pending_interrupt = guard.pending_triggers > 0;
        guard.pending_interrupt
    }

    fn try_wake_locked(&self, guard: &mut MutexGuard<'_, SchedState>, mask: StateMask) -> bool {
        if mask.contains(guard.state.mask()) && guard.state != ExecState::Running {
            guard.state = ExecState::Running;
            self.wakeup.notify_all();
            true
        } else {
            false
        }
    }
}

/// How a freeze request reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeDelivery {
    /// Wake plus pending-interrupt marker, so interruptible waits bail out.
    Notify,
    /// Raw wake of an interruptible waiter, no marker.
    Plain,
}

impl WakeDelivery {
    pub fn for_flags(flags: TaskFlags) -> Self {
        if flags.contains(TaskFlags::FREEZER_NOSIG) {
            WakeDelivery::Plain
        } else {
            WakeDelivery::Notify
        }
    }

    /// Deliver the wake through the target's scheduling lock.
    pub fn deliver(self, sched: &SchedContext) -> bool {
        match self {
            WakeDelivery::Notify => sched.signal_wake_up(),
            WakeDelivery::Plain => sched.wake_up_state(StateMask::INTERRUPTIBLE),
        }
    }
}
