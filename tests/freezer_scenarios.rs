//! End-to-end freeze and thaw scenarios with real threads.

mod common;

use common::{TestFixture, wait_until, wait_until_parked, wait_until_refrigerated};
use quiesce::interfaces::TaskSetPolicy;
use quiesce::sched::{ExecState, WaitOutcome};
use quiesce::{EpisodeKind, FreezeEpisode, Task, TaskFlags, TaskRegistry};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[test]
fn signaled_episode_freezes_and_thaws_default_task() {
    let fx = TestFixture::new();
    let task = Task::new(1, "scenario-a");

    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled);
    assert!(fx.freezer.freezing(&task));

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.refrigerator(&me, false)).unwrap();

    wait_until_refrigerated(&task);
    assert!(task.is_freezing());
    // Already frozen: nothing more to request.
    assert!(!fx.freezer.freeze_task(&task));

    episode.end();
    fx.freezer.thaw_task(&task);

    assert!(handle.join().unwrap());
    assert!(!task.is_frozen());
    assert!(!task.is_freezing());
}

#[test]
fn nosig_task_is_exempt_from_signaled_episode() {
    let fx = TestFixture::new();
    let task = Task::with_flags(2, "scenario-b", TaskFlags::FREEZER_NOSIG);
    let _episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled);

    assert!(!fx.freezer.freezing(&task));
    assert!(!fx.freezer.freeze_task(&task));

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.try_to_freeze(&me)).unwrap();
    assert!(!handle.join().unwrap());
    assert!(!task.is_frozen());
    assert_eq!(
        fx.freezer.freeze_tasks(&[task.clone()], Duration::from_millis(50)),
        Ok(0)
    );
}

#[test]
fn set_freezable_during_nosig_episode_freezes_synchronously() {
    let fx = TestFixture::new();
    let task = Task::with_flags(
        3,
        "scenario-c",
        TaskFlags::NOFREEZE | TaskFlags::FREEZER_NOSIG,
    );
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal);
    assert!(!fx.freezer.freezing(&task));

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.set_freezable(&me, true)).unwrap();

    wait_until_refrigerated(&task);
    assert!(!task.is_nofreeze());
    assert!(!task.is_freezer_nosig());

    episode.thaw(&fx.freezer, &[task.clone()]);
    assert!(handle.join().unwrap());
}

#[test]
fn cancellable_worker_leaves_while_still_freezing() {
    let fx = TestFixture::new();
    let task = Task::with_flags(4, "scenario-d", TaskFlags::CANCELLABLE);
    let _episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal);

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.refrigerator(&me, true)).unwrap();

    wait_until_refrigerated(&task);
    assert!(task.request_stop());

    assert!(handle.join().unwrap());
    assert!(fx.freezer.freezing(&task));
    assert!(!task.is_frozen());
    assert!(!task.is_freezing());
}

#[test]
fn non_cancellable_refrigerator_ignores_stop_requests() {
    let fx = TestFixture::new();
    let task = Task::new(5, "stubborn");
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal);

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.refrigerator(&me, true)).unwrap();

    wait_until_refrigerated(&task);
    assert!(!task.request_stop());
    // A stray wake does not let it out either.
    task.sched().wake_up_process();
    wait_until_refrigerated(&task);

    episode.thaw(&fx.freezer, &[task.clone()]);
    assert!(handle.join().unwrap());
}

#[test]
fn refrigerator_restores_saved_state() {
    let fx = TestFixture::new();
    let task = Task::new(6, "round-trip");
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled);

    let freezer = Arc::clone(&fx.freezer);
    let handle = task
        .spawn(move |me| {
            me.sched().set_current_state(ExecState::Interruptible);
            let was_frozen = freezer.refrigerator(&me, false);
            let restored = me.sched().current_state();
            me.sched().set_current_state(ExecState::Running);
            (was_frozen, restored)
        })
        .unwrap();

    wait_until_refrigerated(&task);
    assert_eq!(task.sched().current_state(), ExecState::Uninterruptible);

    episode.thaw(&fx.freezer, &[task.clone()]);
    assert_eq!(handle.join().unwrap(), (true, ExecState::Interruptible));
}

#[test]
fn freeze_request_interrupts_interruptible_sleep() {
    let fx = TestFixture::new();
    let task = Task::new(7, "sleeper");

    let freezer = Arc::clone(&fx.freezer);
    let handle = task
        .spawn(move |me| {
            let outcome = me.sched().sleep_interruptible(Duration::from_secs(30));
            (outcome, freezer.try_to_freeze(&me))
        })
        .unwrap();

    wait_until_parked(&task);
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled);
    assert!(fx.freezer.freeze_task(&task));

    wait_until_refrigerated(&task);
    // The refrigerator consumed the fake notification.
    assert!(!task.sched().pending_interrupt());

    episode.thaw(&fx.freezer, &[task.clone()]);
    assert_eq!(handle.join().unwrap(), (WaitOutcome::Interrupted, true));
}

#[test]
fn nosig_task_gets_plain_wake() {
    let fx = TestFixture::new();
    let task = Task::with_flags(8, "quiet", TaskFlags::FREEZER_NOSIG);

    let freezer = Arc::clone(&fx.freezer);
    let handle = task
        .spawn(move |me| {
            let outcome = me.sched().sleep_interruptible(Duration::from_secs(30));
            (outcome, freezer.try_to_freeze(&me))
        })
        .unwrap();

    wait_until_parked(&task);
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal);
    assert!(fx.freezer.freeze_task(&task));
    assert!(!task.sched().pending_interrupt());

    wait_until_refrigerated(&task);
    episode.thaw(&fx.freezer, &[task.clone()]);
    assert_eq!(handle.join().unwrap(), (WaitOutcome::Woken, true));
}

#[test]
fn opted_out_task_is_never_a_target() {
    let fx = TestFixture::new();
    let policy = Arc::new(TaskSetPolicy::new());
    policy.target(9);
    fx.freezer.set_group_policy(Arc::clone(&policy));

    let task = Task::with_flags(9, "exempt", TaskFlags::NOFREEZE);
    let episodes = [
        FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled),
        FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal),
        FreezeEpisode::begin(&fx.conditions, EpisodeKind::Group),
    ];

    assert!(!fx.freezer.freezing(&task));
    assert!(!fx.freezer.freeze_task(&task));
    assert!(!fx.freezer.refrigerator(&task, false));
    assert!(!task.is_frozen());
    drop(episodes);
}

#[test]
fn exempt_task_calling_refrigerator_is_never_frozen() {
    let fx = TestFixture::new();
    let task = Task::with_flags(11, "exempt-caller", TaskFlags::NOFREEZE);
    let _episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::NoSignal);
    let done = Arc::new(AtomicBool::new(false));

    let handle = {
        let freezer = Arc::clone(&fx.freezer);
        let done = Arc::clone(&done);
        task.spawn(move |me| {
            let mut entered = 0usize;
            while !done.load(Ordering::Acquire) {
                if freezer.refrigerator(&me, false) {
                    entered += 1;
                }
            }
            entered
        })
        .unwrap()
    };

    let stop_at = Instant::now() + Duration::from_millis(200);
    while Instant::now() < stop_at {
        assert!(!task.is_frozen());
        assert!(!task.is_freezing());
        assert_eq!(
            fx.freezer.freeze_tasks(&[task.clone()], Duration::from_millis(5)),
            Ok(0)
        );
    }

    done.store(true, Ordering::Release);
    assert_eq!(handle.join().unwrap(), 0);
}

#[test]
fn thawing_twice_matches_thawing_once() {
    let fx = TestFixture::new();
    let task = Task::new(10, "twice");
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Signaled);

    let freezer = Arc::clone(&fx.freezer);
    let handle = task.spawn(move |me| freezer.try_to_freeze(&me)).unwrap();
    wait_until_refrigerated(&task);

    episode.end();
    fx.freezer.thaw_task(&task);
    assert!(handle.join().unwrap());
    let once = (
        task.flags(),
        task.sched().current_state(),
        task.sched().pending_interrupt(),
    );

    fx.freezer.thaw_task(&task);
    let twice = (
        task.flags(),
        task.sched().current_state(),
        task.sched().pending_interrupt(),
    );
    assert_eq!(once, twice);
}

#[test]
fn group_episode_freezes_only_targets() {
    let fx = TestFixture::new();
    let policy = Arc::new(TaskSetPolicy::new());
    fx.freezer.set_group_policy(Arc::clone(&policy));

    let registry = TaskRegistry::new();
    let handles: Vec<_> = (20..24)
        .map(|id| {
            let task = Task::with_flags(id, format!("worker-{id}"), TaskFlags::CANCELLABLE);
            registry.register(task.clone());
            let freezer = Arc::clone(&fx.freezer);
            task.spawn(move |me| {
                while !freezer.freezable_should_stop(&me) {
                    me.sched().sleep_interruptible(Duration::from_millis(2));
                }
            })
            .unwrap()
        })
        .collect();

    policy.target(21);
    policy.target(23);
    let episode = FreezeEpisode::begin(&fx.conditions, EpisodeKind::Group);
    assert_eq!(fx.freezer.freeze_registered(&registry), Ok(2));

    let frozen: Vec<usize> = registry
        .iter()
        .into_iter()
        .filter(Task::is_frozen)
        .map(|task| task.id())
        .collect();
    assert_eq!(frozen, vec![21, 23]);

    policy.clear();
    episode.end();
    fx.freezer.thaw_registered(&registry);
    wait_until("group to thaw", || registry.iter().iter().all(|t| !t.is_frozen()));

    for task in registry.iter() {
        assert!(task.request_stop());
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
