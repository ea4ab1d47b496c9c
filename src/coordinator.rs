//! Coordinator-side helpers: episode bracketing and task-set freezing.
//!
//! A coordinator brackets its work with a [`FreezeEpisode`], asks every target
//! to freeze, and polls until each target that is still a valid freeze target
//! reports frozen. Tasks that never reach a checkpoint are reported back as
//! stragglers; nothing here forces a task to stop.

use crossbeam_utils::Backoff;
use log::{trace, warn};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::conditions::{EpisodeKind, FreezingConditions};
use crate::error::{FreezeError, FreezeResult};
use crate::freezer::Freezer;
use crate::task::{Task, TaskRegistry};

/// RAII bracket around one freezing condition.
///
/// Beginning counts the condition and sets the flag for its kind; ending
/// clears the flag and drops the count. Ending happens at most once, either
/// explicitly or on drop.
///
/// # Examples
///
/// ```
/// use quiesce::{EpisodeKind, FreezeEpisode, FreezingConditions};
/// use std::sync::Arc;
///
/// let conditions = Arc::new(FreezingConditions::new());
/// {
///     let _episode = FreezeEpisode::begin(&conditions, EpisodeKind::NoSignal);
///     assert!(conditions.nosig_freezing());
///     assert_eq!(conditions.active_count(), 1);
/// }
/// assert!(!conditions.nosig_freezing());
/// assert_eq!(conditions.active_count(), 0);
/// ```
#[derive(Debug)]
pub struct FreezeEpisode {
    conditions: Arc<FreezingConditions>,
    kind: EpisodeKind,
    ended: bool,
}

impl FreezeEpisode {
    pub fn begin(conditions: &Arc<FreezingConditions>, kind: EpisodeKind) -> Self {
        conditions.enter();
        conditions.set_kind(kind, true);
        trace!("freezing episode {:?} started", kind);
        Self {
            conditions: Arc::clone(conditions),
            kind,
            ended: false,
        }
    }

    pub fn kind(&self) -> EpisodeKind {
        self.kind
    }

    pub fn end(mut self) {
        self.finish();
    }

    /// End the episode, then release `tasks`.
    pub fn thaw(mut self, freezer: &Freezer, tasks: &[Task]) {
        self.finish();
        freezer.thaw_tasks(tasks);
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.conditions.set_kind(self.kind, false);
        self.conditions.leave();
        trace!("freezing episode {:?} ended", self.kind);
    }
}

impl Drop for FreezeEpisode {
    fn drop(&mut self) {
        self.finish();
    }
}

impl Freezer {
    /// Request every task in `tasks` to freeze and wait until all current
    /// targets are frozen. Returns the number of frozen tasks.
    ///
    /// Requests are re-sent every round, so a target that slipped past its
    /// checkpoint is caught on the next one. Tasks that are not targets (opted
    /// out, exempt from this episode kind) are skipped.
    pub fn freeze_tasks(&self, tasks: &[Task], timeout: Duration) -> FreezeResult<usize> {
        if !self.conditions().any_active() {
            return Err(FreezeError::NotFreezing);
        }

        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            let mut frozen = 0;
            let mut stragglers = Vec::new();
            for task in tasks {
                if task.is_frozen() {
                    frozen += 1;
                } else if self.freeze_task(task) {
                    stragglers.push(task.id());
                }
            }

            if stragglers.is_empty() {
                return Ok(frozen);
            }

            if start.elapsed() >= timeout {
                warn!(
                    "freezing timed out after {:?}: {}/{} tasks frozen, stragglers {:?}",
                    timeout,
                    frozen,
                    frozen + stragglers.len(),
                    stragglers
                );
                return Err(FreezeError::Timeout {
                    frozen,
                    total: frozen + stragglers.len(),
                    stragglers,
                });
            }

            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    pub fn thaw_tasks(&self, tasks: &[Task]) {
        for task in tasks {
            self.thaw_task(task);
        }
    }

    /// [`freeze_tasks`](Self::freeze_tasks) over every registered task, with
    /// the configured poll timeout.
    pub fn freeze_registered(&self, registry: &TaskRegistry) -> FreezeResult<usize> {
        self.freeze_tasks(&registry.iter(), self.config().poll_timeout)
    }

    pub fn thaw_registered(&self, registry: &TaskRegistry) {
        self.thaw_tasks(&registry.iter());
    }
}
