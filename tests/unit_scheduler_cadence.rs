use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use gpis::scheduler::{Cadence, CancelToken, InstantSleeper, Job, JobError, Scheduler, Sleeper};

/// Records requested sleeps instead of sleeping.
struct RecordingSleeper(Rc<RefCell<Vec<Duration>>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration, _cancel: &CancelToken) {
        self.0.borrow_mut().push(duration);
    }
}

#[test]
fn test_default_periods_compose_to_100ms_ticks() {
    let c = Cadence::new(Duration::from_millis(1000), Duration::from_millis(300)).expect("cadence");
    assert_eq!(c.tick(), Duration::from_millis(100));
    assert_eq!(c.sync_ticks(), 10);
    assert_eq!(c.watch_ticks(), 3);
}

#[test]
fn test_sync_once_watch_every_third_tick() {
    let tick = Cell::new(0u64);
    let sync_at = RefCell::new(Vec::new());
    let watch_at = RefCell::new(Vec::new());
    let mut sched = Scheduler::new(CancelToken::new())
        .with_sleeper(Box::new(InstantSleeper))
        .with_tick_limit(10);

    let summary = sched
        .run(vec![
            Job::new("sync", Duration::from_millis(1000), || {
                sync_at.borrow_mut().push(tick.get());
                Ok(())
            }),
            Job::new("watch", Duration::from_millis(300), || {
                watch_at.borrow_mut().push(tick.get());
                Ok(())
            }),
            // registered last, so it advances the clock after the others ran
            Job::new("clock", Duration::from_millis(100), || {
                tick.set(tick.get() + 1);
                Ok(())
            }),
        ])
        .expect("run");

    assert_eq!(summary.ticks, 10);
    assert_eq!(*sync_at.borrow(), [0]);
    assert_eq!(*watch_at.borrow(), [0, 3, 6, 9]);
    assert_eq!(summary.runs_of("sync"), 1);
    assert_eq!(summary.runs_of("watch"), 4);
}

#[test]
fn test_sleeps_one_tick_between_iterations() {
    let sleeps = Rc::new(RefCell::new(Vec::new()));
    let mut sched = Scheduler::new(CancelToken::new())
        .with_sleeper(Box::new(RecordingSleeper(Rc::clone(&sleeps))))
        .with_tick_limit(4);
    sched
        .run_pair(
            Duration::from_millis(1000),
            Duration::from_millis(300),
            || Ok(()),
            || Ok(()),
        )
        .expect("run");
    assert_eq!(*sleeps.borrow(), vec![Duration::from_millis(100); 3]);
}

#[test]
fn test_cancel_from_inside_a_job_stops_the_loop() {
    let cancel = CancelToken::new();
    let inner = cancel.clone();
    let mut runs = 0;
    let mut sched = Scheduler::new(cancel).with_sleeper(Box::new(InstantSleeper));
    let summary = sched
        .run_pair(
            Duration::from_millis(200),
            Duration::from_millis(100),
            || Ok(()),
            || {
                runs += 1;
                if runs == 3 {
                    inner.cancel();
                }
                Ok(())
            },
        )
        .expect("run");
    assert!(summary.cancelled);
    assert_eq!(summary.ticks, 3);
}

#[test]
fn test_fatal_job_error_ends_run() {
    let mut sched = Scheduler::new(CancelToken::new())
        .with_sleeper(Box::new(InstantSleeper))
        .with_tick_limit(100);
    let err = sched
        .run_pair(
            Duration::from_millis(100),
            Duration::from_millis(100),
            || Err(JobError::Fatal(anyhow::anyhow!("git vanished"))),
            || Ok(()),
        )
        .expect_err("fatal");
    assert!(err.to_string().contains("sync failed"));
}
