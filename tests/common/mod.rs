//! Shared fixtures for integration tests.

#![allow(dead_code)]

use quiesce::{Freezer, FreezerConfig, FreezingConditions, Task};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Isolated conditions and freezer, so tests never touch the globals.
pub struct TestFixture {
    pub conditions: Arc<FreezingConditions>,
    pub freezer: Arc<Freezer>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(FreezerConfig::default())
    }

    pub fn with_config(config: FreezerConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let conditions = Arc::new(FreezingConditions::new());
        let freezer = Arc::new(Freezer::with_config(Arc::clone(&conditions), config));
        Self {
            conditions,
            freezer,
        }
    }
}

/// Spin until `condition` holds, failing the test after [`WAIT_TIMEOUT`].
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::yield_now();
    }
}

pub fn wait_until_parked(task: &Task) {
    wait_until(&format!("{} to park", task.name()), || task.sched().is_parked());
}

/// Wait until `task` is asleep inside the refrigerator.
pub fn wait_until_refrigerated(task: &Task) {
    wait_until(&format!("{} to sleep in the refrigerator", task.name()), || {
        task.is_frozen() && task.sched().is_parked()
    });
}
