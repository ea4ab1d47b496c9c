// Group freeze policy interface and production adapters.
//
// Which tasks belong to a frozen resource group is decided outside the
// freezer. The freezer only asks, from any context and without blocking,
// whether a given task is currently a group target.
use dashmap::DashSet;

use crate::task::Task;

/// Read-only query answering "does a group-level freeze want this task".
pub trait GroupFreezePolicy: Send + Sync + 'static {
    fn is_group_freezing(&self, task: &Task) -> bool;
}

/// Policy for systems without group freezing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroupFreeze;

impl GroupFreezePolicy for NoGroupFreeze {
    fn is_group_freezing(&self, _task: &Task) -> bool {
        false
    }
}

/// Policy backed by a concurrent set of targeted task ids.
///
/// The group manager adds ids when it freezes a group and removes them when
/// it thaws; it is also responsible for holding a
/// [`EpisodeKind::Group`](crate::EpisodeKind::Group) episode open meanwhile.
///
/// # Examples
///
/// ```
/// use quiesce::interfaces::{GroupFreezePolicy, TaskSetPolicy};
/// use quiesce::task::Task;
///
/// let policy = TaskSetPolicy::new();
/// let task = Task::new(4, "db-writer");
/// policy.target(4);
/// assert!(policy.is_group_freezing(&task));
/// policy.release(4);
/// assert!(!policy.is_group_freezing(&task));
/// ```
#[derive(Debug, Default)]
pub struct TaskSetPolicy {
    targets: DashSet<usize>,
}

impl TaskSetPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self, id: usize) {
        self.targets.insert(id);
    }

    pub fn release(&self, id: usize) {
        self.targets.remove(&id);
    }

    pub fn clear(&self) {
        self.targets.clear();
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl GroupFreezePolicy for TaskSetPolicy {
    fn is_group_freezing(&self, task: &Task) -> bool {
        self.targets.contains(&task.id())
    }
}

impl<P: GroupFreezePolicy> GroupFreezePolicy for std::sync::Arc<P> {
    fn is_group_freezing(&self, task: &Task) -> bool {
        (**self).is_group_freezing(task)
    }
}
