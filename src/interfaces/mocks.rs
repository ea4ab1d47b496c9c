// Mock group policy for unit tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::interfaces::group::GroupFreezePolicy;
use crate::task::Task;

/// Answers every query with a switchable value and counts calls.
#[derive(Debug, Clone, Default)]
pub struct MockGroupPolicy {
    pub freezing: Arc<AtomicBool>,
    pub query_calls: Arc<AtomicUsize>,
}

impl MockGroupPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_freezing(&self, freezing: bool) {
        self.freezing.store(freezing, Ordering::Release);
    }

    pub fn get_query_call_count(&self) -> usize {
        self.query_calls.load(Ordering::Acquire)
    }
}

impl GroupFreezePolicy for MockGroupPolicy {
    fn is_group_freezing(&self, _task: &Task) -> bool {
        self.query_calls.fetch_add(1, Ordering::AcqRel);
        self.freezing.load(Ordering::Acquire)
    }
}

/// Replays a fixed sequence of answers, then answers `false` forever.
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    answers: Mutex<VecDeque<bool>>,
    pub query_calls: AtomicUsize,
}

impl ScriptedPolicy {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn get_query_call_count(&self) -> usize {
        self.query_calls.load(Ordering::Acquire)
    }
}

impl GroupFreezePolicy for ScriptedPolicy {
    fn is_group_freezing(&self, _task: &Task) -> bool {
        self.query_calls.fetch_add(1, Ordering::AcqRel);
        self.answers.lock().pop_front().unwrap_or(false)
    }
}
