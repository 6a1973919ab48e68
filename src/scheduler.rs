//! Multi-cadence polling scheduler.
//!
//! Several periodic jobs share one timer: the tick interval is the GCD of all
//! job periods and every job keeps its own modulo counter, so each fires once
//! per period without drift. All counters start at zero, which makes every
//! job fire on the first tick. Jobs run in registration order within a tick.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared, clonable cancellation flag observed between ticks, while sleeping
/// and while waiting on child processes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceError {
    NoPeriods,
    ZeroPeriod { index: usize },
    TooLong,
}

impl fmt::Display for CadenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CadenceError::NoPeriods => write!(f, "at least one period is required"),
            CadenceError::ZeroPeriod { index } => {
                write!(f, "period #{index} must be greater than zero")
            }
            CadenceError::TooLong => write!(f, "period too long to schedule"),
        }
    }
}

impl std::error::Error for CadenceError {}

/// Tick interval plus per-period tick counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    tick: Duration,
    ticks: Vec<u64>,
}

impl Cadence {
    /// Two-period form: index 0 is sync, index 1 is watch.
    pub fn new(sync_period: Duration, watch_period: Duration) -> Result<Self, CadenceError> {
        Self::from_periods(&[sync_period, watch_period])
    }

    pub fn from_periods(periods: &[Duration]) -> Result<Self, CadenceError> {
        if periods.is_empty() {
            return Err(CadenceError::NoPeriods);
        }
        let mut nanos = Vec::with_capacity(periods.len());
        for (index, p) in periods.iter().enumerate() {
            let n = p.as_nanos();
            if n == 0 {
                return Err(CadenceError::ZeroPeriod { index });
            }
            nanos.push(n);
        }
        let tick = nanos.iter().copied().fold(0, gcd);
        let ticks = nanos
            .iter()
            .map(|n| u64::try_from(n / tick).map_err(|_| CadenceError::TooLong))
            .collect::<Result<Vec<_>, _>>()?;
        let tick = u64::try_from(tick).map_err(|_| CadenceError::TooLong)?;
        Ok(Self {
            tick: Duration::from_nanos(tick),
            ticks,
        })
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn ticks(&self) -> &[u64] {
        &self.ticks
    }

    pub fn sync_ticks(&self) -> u64 {
        self.ticks[0]
    }

    pub fn watch_ticks(&self) -> u64 {
        self.ticks.get(1).copied().unwrap_or(self.ticks[0])
    }
}

fn gcd(a: u128, b: u128) -> u128 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// How the scheduler waits between ticks.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken);
}

/// Wall-clock sleeper that wakes up early when cancelled.
#[derive(Debug, Clone)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(50),
        }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken) {
        let deadline = Instant::now() + duration;
        while !cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(self.slice));
        }
    }
}

/// Sleeper that returns immediately; ticks are simulated.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {}
}

/// Cancel-aware sleep for callers outside the tick loop (retry backoff).
pub fn sleep_cancellable(duration: Duration, cancel: &CancelToken) {
    ThreadSleeper::default().sleep(duration, cancel);
}

/// Outcome of one failed job invocation.
#[derive(Debug)]
pub enum JobError {
    /// Logged and counted; the loop keeps going.
    Recoverable(anyhow::Error),
    /// Stops the loop and is returned to the caller.
    Fatal(anyhow::Error),
    /// Stops the loop without an error.
    Cancelled,
}

#[derive(Debug)]
pub enum SchedulerError {
    Cadence(CadenceError),
    JobFailed {
        job: &'static str,
        source: anyhow::Error,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Cadence(e) => write!(f, "invalid schedule: {e}"),
            SchedulerError::JobFailed { job, source } => write!(f, "{job} failed: {source:#}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Cadence(e) => Some(e),
            SchedulerError::JobFailed { source, .. } => Some(source.as_ref()),
        }
    }
}

impl From<CadenceError> for SchedulerError {
    fn from(e: CadenceError) -> Self {
        SchedulerError::Cadence(e)
    }
}

type Action<'a> = Box<dyn FnMut() -> Result<(), JobError> + 'a>;

/// A named periodic action.
pub struct Job<'a> {
    name: &'static str,
    period: Duration,
    action: Action<'a>,
}

impl<'a> Job<'a> {
    pub fn new<F>(name: &'static str, period: Duration, action: F) -> Self
    where
        F: FnMut() -> Result<(), JobError> + 'a,
    {
        Self {
            name,
            period,
            action: Box::new(action),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub runs: Vec<(&'static str, u64)>,
    pub failures: u64,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn runs_of(&self, job: &str) -> u64 {
        self.runs
            .iter()
            .find(|(name, _)| *name == job)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

pub struct Scheduler {
    cancel: CancelToken,
    sleeper: Box<dyn Sleeper>,
    tick_limit: Option<u64>,
}

impl Scheduler {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            sleeper: Box::new(ThreadSleeper::default()),
            tick_limit: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Stop after `limit` ticks instead of running until cancelled.
    pub fn with_tick_limit(mut self, limit: u64) -> Self {
        self.tick_limit = Some(limit);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run the sync and watch actions on their own cadences. Sync runs first
    /// whenever both are due in the same tick.
    pub fn run_pair<'a, S, W>(
        &mut self,
        sync_period: Duration,
        watch_period: Duration,
        sync: S,
        watch: W,
    ) -> Result<RunSummary, SchedulerError>
    where
        S: FnMut() -> Result<(), JobError> + 'a,
        W: FnMut() -> Result<(), JobError> + 'a,
    {
        self.run(vec![
            Job::new("sync", sync_period, sync),
            Job::new("watch", watch_period, watch),
        ])
    }

    pub fn run(&mut self, mut jobs: Vec<Job<'_>>) -> Result<RunSummary, SchedulerError> {
        let periods: Vec<Duration> = jobs.iter().map(|j| j.period).collect();
        let cadence = Cadence::from_periods(&periods)?;
        tracing::debug!(
            tick = ?cadence.tick(),
            ticks = ?cadence.ticks(),
            "scheduler started"
        );

        let mut counters = vec![0u64; jobs.len()];
        let mut summary = RunSummary {
            runs: jobs.iter().map(|j| (j.name, 0)).collect(),
            ..RunSummary::default()
        };

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            for (i, job) in jobs.iter_mut().enumerate() {
                if counters[i] != 0 {
                    continue;
                }
                summary.runs[i].1 += 1;
                match (job.action)() {
                    Ok(()) => {}
                    Err(JobError::Recoverable(e)) => {
                        summary.failures += 1;
                        tracing::warn!(job = job.name, error = %format!("{e:#}"), "job failed; continuing");
                    }
                    Err(JobError::Fatal(source)) => {
                        return Err(SchedulerError::JobFailed {
                            job: job.name,
                            source,
                        });
                    }
                    Err(JobError::Cancelled) => {
                        self.cancel.cancel();
                        break;
                    }
                }
            }

            for (counter, ticks) in counters.iter_mut().zip(cadence.ticks()) {
                *counter = (*counter + 1) % ticks;
            }
            summary.ticks += 1;

            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.tick_limit.is_some_and(|limit| summary.ticks >= limit) {
                break;
            }
            self.sleeper.sleep(cadence.tick(), &self.cancel);
        }

        tracing::debug!(ticks = summary.ticks, failures = summary.failures, "scheduler stopped");
        Ok(summary)
    }
}
