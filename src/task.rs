//! Task handles, per-task freezer flags, and the task registry.
//!
//! # Examples
//!
//! ```
//! use quiesce::task::{Task, TaskFlags, TaskRegistry};
//!
//! let worker = Task::with_flags(7, "flusher", TaskFlags::NOFREEZE);
//! assert!(worker.is_nofreeze());
//! assert!(!worker.is_frozen());
//!
//! let registry = TaskRegistry::new();
//! registry.register(worker.clone());
//! assert_eq!(registry.get(7).map(|t| t.id()), Some(7));
//! ```

use bitflags::bitflags;
use dashmap::DashMap;
use std::{
    cell::RefCell,
    fmt, io,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread::{self, JoinHandle},
};

use crate::error::{FreezeError, FreezeResult};
use crate::freezer::FreezerGuard;
use crate::sched::SchedContext;

bitflags! {
    /// Per-task freezer attributes.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// Opted out: never a freeze target.
        const NOFREEZE = 1 << 0;
        /// Prefers a plain wake over a notification.
        const FREEZER_NOSIG = 1 << 1;
        /// Inside the quiescing transition; excluded from load accounting.
        const FREEZING = 1 << 2;
        /// Parked in the refrigerator.
        const FROZEN = 1 << 3;
        /// Launched as a cancellable worker.
        const CANCELLABLE = 1 << 4;
    }
}

impl TaskFlags {
    /// Flags a caller may choose when creating a task.
    pub const CREATION: TaskFlags = TaskFlags::NOFREEZE
        .union(TaskFlags::FREEZER_NOSIG)
        .union(TaskFlags::CANCELLABLE);
}

struct TaskInner {
    id: usize,
    name: String,
    flags: AtomicU32,
    stop_requested: AtomicBool,
    sched: SchedContext,
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Task>> = const { RefCell::new(None) };
}

/// Shared handle to a task. Clones refer to the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self::with_flags(id, name, TaskFlags::empty())
    }

    /// Create a task with creation-time flags; runtime-only bits are ignored.
    pub fn with_flags(id: usize, name: impl Into<String>, flags: TaskFlags) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id,
                name: name.into(),
                flags: AtomicU32::new((flags & TaskFlags::CREATION).bits()),
                stop_requested: AtomicBool::new(false),
                sched: SchedContext::new(),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn sched(&self) -> &SchedContext {
        &self.inner.sched
    }

    pub fn flags(&self) -> TaskFlags {
        TaskFlags::from_bits_truncate(self.inner.flags.load(Ordering::Acquire))
    }

    pub fn is_frozen(&self) -> bool {
        self.flags().contains(TaskFlags::FROZEN)
    }

    pub fn is_freezing(&self) -> bool {
        self.flags().contains(TaskFlags::FREEZING)
    }

    pub fn is_nofreeze(&self) -> bool {
        self.flags().contains(TaskFlags::NOFREEZE)
    }

    pub fn is_freezer_nosig(&self) -> bool {
        self.flags().contains(TaskFlags::FREEZER_NOSIG)
    }

    pub fn is_cancellable(&self) -> bool {
        self.flags().contains(TaskFlags::CANCELLABLE)
    }

    /// Mutating freezer flags requires holding the freezer lock.
    pub(crate) fn insert_flags(&self, _lock: &FreezerGuard<'_>, flags: TaskFlags) {
        self.inner.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_flags(&self, _lock: &FreezerGuard<'_>, flags: TaskFlags) {
        self.inner.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Ask a cancellable task to stop. Returns false for tasks that were not
    /// launched as cancellable workers.
    pub fn request_stop(&self) -> bool {
        if !self.is_cancellable() {
            return false;
        }
        self.inner.stop_requested.store(true, Ordering::Release);
        self.inner.sched.wake_up_process();
        true
    }

    pub fn should_stop(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }

    /// Task bound to the calling thread, if any.
    pub fn current() -> Option<Task> {
        CURRENT_TASK.with(|current| current.borrow().clone())
    }

    /// Bind this task to the calling thread.
    pub fn bind_current(&self) {
        CURRENT_TASK.with(|current| *current.borrow_mut() = Some(self.clone()));
    }

    /// Run `f` on a new OS thread bound to this task.
    pub fn spawn<F, T>(&self, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce(Task) -> T + Send + 'static,
        T: Send + 'static,
    {
        let task = self.clone();
        thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || {
                task.bind_current();
                f(task)
            })
    }

    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Concurrent id-to-task map a coordinator walks when freezing a task set.
#[derive(Clone, Default, Debug)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<usize, Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static TaskRegistry {
        static GLOBAL: OnceLock<TaskRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TaskRegistry::new)
    }

    /// Register a task; an existing entry with the same id is kept.
    pub fn register(&self, task: Task) {
        self.tasks.entry(task.id()).or_insert(task);
    }

    pub fn unregister(&self, id: usize) -> Option<Task> {
        self.tasks.remove(&id).map(|(_, task)| task)
    }

    pub fn get(&self, id: usize) -> Option<Task> {
        self.tasks.get(&id).map(|entry| entry.value().clone())
    }

    pub fn lookup(&self, id: usize) -> FreezeResult<Task> {
        self.get(id).ok_or(FreezeError::UnknownTask(id))
    }

    /// Snapshot of all registered tasks, ordered by id.
    pub fn iter(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_unstable_by_key(Task::id);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
