//! Cooperative task freezing.
//!
//! A coordinator (suspend orchestration, a resource-group freeze policy)
//! asks a set of running tasks to stop making progress; each task parks
//! itself at its next safe point and stays parked until released.
//!
//! - [`conditions`]: process-wide freezing conditions
//! - [`task`]: task handles, freezer flags, registry
//! - [`sched`]: per-task scheduling lock and wake primitives
//! - [`freezer`]: predicate, refrigerator, freeze and thaw requests
//! - [`coordinator`]: episode bracketing and task-set helpers
//! - [`interfaces`]: group freeze policy seam

pub mod conditions;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod freezer;
pub mod interfaces;
pub mod sched;
pub mod task;

pub use conditions::{EpisodeKind, FreezingConditions};
pub use config::FreezerConfig;
pub use coordinator::FreezeEpisode;
pub use error::{FreezeError, FreezeResult};
pub use freezer::{Freezer, set_freezable, try_to_freeze};
pub use task::{Task, TaskFlags, TaskRegistry};
