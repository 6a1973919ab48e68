//! Pair-session state machine.
//!
//! A controller is created once per process and moves from
//! [`SessionPhase::Uninitialized`] to an active role through exactly one of
//! [`SessionController::init`], [`SessionController::join`] or
//! [`SessionController::start`]. Each of them ends in the watch loop, which
//! pulls on the sync cadence and commits newly detected work on the watch
//! cadence until cancelled.

use std::collections::HashSet;
use std::fmt;

use crate::config::SessionConfig;
use crate::scheduler::{CancelToken, JobError, RunSummary, Scheduler, SchedulerError};
use crate::util::{id, subtract};
use crate::vcs::{with_retry, ChangeScope, VcsError, VcsErrorKind, VcsGateway};
use crate::watch::{ChangeSet, ScanError, SnapshotDiffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Created the session branch (`init`).
    Host,
    /// Attached to an existing session branch (`join`).
    Guest,
    /// Kept watching the current branch (`start`).
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Active(SessionRole),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Branch checked out before `init` switched away from it.
    pub previous_branch: Option<String>,
    pub session_branch: Option<String>,
    /// Commits made by this process; the next message uses `commit_count + 1`.
    pub commit_count: u64,
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// The watch loop ended through cancellation or a tick limit.
    Stopped(RunSummary),
    /// `join` was given a name that is not a session branch; nothing changed.
    Rejected { branch: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { message: String, files: Vec<String> },
    Skipped,
}

#[derive(Debug)]
pub enum SessionError {
    Vcs(VcsError),
    Scan(ScanError),
    AlreadyActive(SessionRole),
    BranchNamesExhausted { attempts: u32 },
    Random(getrandom::Error),
    Scheduler(SchedulerError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Vcs(e) => write!(f, "{e}"),
            SessionError::Scan(e) => write!(f, "{e}"),
            SessionError::AlreadyActive(role) => {
                write!(f, "session already active ({role:?})")
            }
            SessionError::BranchNamesExhausted { attempts } => write!(
                f,
                "could not find an unused session branch name after {attempts} attempts"
            ),
            SessionError::Random(e) => write!(f, "failed to generate branch suffix: {e}"),
            SessionError::Scheduler(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Vcs(e) => Some(e),
            SessionError::Scan(e) => Some(e),
            SessionError::Random(e) => Some(e),
            SessionError::Scheduler(e) => Some(e),
            SessionError::AlreadyActive(_) | SessionError::BranchNamesExhausted { .. } => None,
        }
    }
}

impl From<VcsError> for SessionError {
    fn from(e: VcsError) -> Self {
        SessionError::Vcs(e)
    }
}

impl From<ScanError> for SessionError {
    fn from(e: ScanError) -> Self {
        SessionError::Scan(e)
    }
}

impl From<getrandom::Error> for SessionError {
    fn from(e: getrandom::Error) -> Self {
        SessionError::Random(e)
    }
}

impl From<SchedulerError> for SessionError {
    /// A job that failed with a VCS error is reported as that error so callers
    /// can classify it (missing git, for one).
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::JobFailed { job, source } => match source.downcast::<VcsError>() {
                Ok(vcs) => SessionError::Vcs(vcs),
                Err(source) => SessionError::Scheduler(SchedulerError::JobFailed { job, source }),
            },
            other => SessionError::Scheduler(other),
        }
    }
}

/// True for `<prefix><suffix>` with a non-empty suffix.
pub fn is_valid_session_branch(name: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && name
            .strip_prefix(prefix)
            .is_some_and(|suffix| !suffix.is_empty())
}

pub fn session_branch_name(prefix: &str, suffix_len: usize) -> Result<String, getrandom::Error> {
    Ok(format!("{prefix}{}", id::random_alnum(suffix_len)?))
}

fn job_error(e: VcsError) -> JobError {
    if e.is_cancelled() {
        JobError::Cancelled
    } else if e.is_fatal() {
        JobError::Fatal(e.into())
    } else {
        JobError::Recoverable(e.into())
    }
}

pub struct SessionController<G> {
    gateway: G,
    config: SessionConfig,
    scheduler: Scheduler,
    ignore: HashSet<String>,
    phase: SessionPhase,
    state: SessionState,
}

impl<G: VcsGateway> SessionController<G> {
    /// Capture the files that are already dirty; they are never auto-committed.
    pub fn new(gateway: G, config: SessionConfig, scheduler: Scheduler) -> Result<Self, SessionError> {
        let ignore: HashSet<String> = gateway
            .changed_files(ChangeScope::All)?
            .into_iter()
            .collect();
        tracing::debug!(ignored = ignore.len(), "captured pre-existing changes");
        Ok(Self {
            gateway,
            config,
            scheduler,
            ignore,
            phase: SessionPhase::Uninitialized,
            state: SessionState::default(),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn ignore_set(&self) -> &HashSet<String> {
        &self.ignore
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn cancel(&self) -> CancelToken {
        self.scheduler.cancel_token().clone()
    }

    fn ensure_uninitialized(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Uninitialized => Ok(()),
            SessionPhase::Active(role) => Err(SessionError::AlreadyActive(role)),
        }
    }

    /// Create a fresh session branch, publish it and start watching it.
    pub fn init(&mut self) -> Result<SessionOutcome, SessionError> {
        self.ensure_uninitialized()?;
        let previous = self.gateway.current_branch()?;
        let branch = self.unused_branch_name()?;
        let cancel = self.cancel();
        with_retry(self.config.retry, &cancel, || {
            self.gateway.create_and_switch_branch(&branch)
        })?;
        tracing::info!(branch = %branch, previous = ?previous, "created session branch");
        self.state.previous_branch = previous;
        self.attach(branch, SessionRole::Host)
    }

    /// Check out an existing session branch and start watching it.
    pub fn join(&mut self, branch: &str) -> Result<SessionOutcome, SessionError> {
        self.ensure_uninitialized()?;
        if !is_valid_session_branch(branch, &self.config.branch_prefix) {
            tracing::warn!(
                branch,
                prefix = %self.config.branch_prefix,
                "not a session branch; ignoring join"
            );
            return Ok(SessionOutcome::Rejected {
                branch: branch.to_string(),
            });
        }
        self.attach(branch.to_string(), SessionRole::Guest)
    }

    /// Watch the current branch without creating or switching branches.
    /// A detached HEAD is watched as is.
    pub fn start(&mut self) -> Result<SessionOutcome, SessionError> {
        self.ensure_uninitialized()?;
        let branch = self.gateway.current_branch()?;
        tracing::info!(branch = ?branch, "resuming session on current branch");
        self.state.session_branch = branch;
        self.phase = SessionPhase::Active(SessionRole::Resumed);
        self.watch()
    }

    fn attach(&mut self, branch: String, role: SessionRole) -> Result<SessionOutcome, SessionError> {
        self.gateway.checkout(&branch)?;
        tracing::info!(branch = %branch, role = ?role, "joined session");
        self.state.session_branch = Some(branch);
        self.phase = SessionPhase::Active(role);
        self.watch()
    }

    fn unused_branch_name(&self) -> Result<String, SessionError> {
        let attempts = self.config.branch_name_attempts.max(1);
        let cancel = self.cancel();
        for attempt in 1..=attempts {
            let candidate = session_branch_name(&self.config.branch_prefix, self.config.suffix_len)?;
            let taken = with_retry(self.config.retry, &cancel, || {
                self.gateway.branch_exists(&candidate)
            })?;
            if !taken {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, attempt, "branch name taken on remote");
        }
        Err(SessionError::BranchNamesExhausted { attempts })
    }

    /// Stage, commit and push whatever changed since the session began.
    ///
    /// The stage set comes from VCS status minus the ignore set, not from
    /// `changes`, so repeated notifications for the same edit collapse into
    /// one commit.
    pub fn on_changes_detected(&mut self, changes: &ChangeSet) -> Result<CommitOutcome, VcsError> {
        let cancel = self.cancel();
        let mut committer = Committer {
            gateway: &self.gateway,
            config: &self.config,
            ignore: &self.ignore,
            cancel: &cancel,
            state: &mut self.state,
        };
        committer.commit(changes)
    }

    fn watch(&mut self) -> Result<SessionOutcome, SessionError> {
        let mut differ = SnapshotDiffer::new(&self.config.root, self.config.vcs_dir.as_str())?;
        let cancel = self.cancel();
        let Self {
            gateway,
            config,
            scheduler,
            ignore,
            state,
            ..
        } = &mut *self;
        let gateway = &*gateway;
        let config = &*config;
        let retry = config.retry;

        let mut committer = Committer {
            gateway,
            config,
            ignore,
            cancel: &cancel,
            state,
        };
        let sync = || with_retry(retry, &cancel, || gateway.pull()).map_err(job_error);
        let watch = || {
            let changes = differ
                .scan()
                .map_err(|e| JobError::Recoverable(e.into()))?;
            if changes.is_empty() {
                return Ok(());
            }
            committer.commit(&changes).map(|_| ()).map_err(job_error)
        };

        tracing::info!(
            root = %config.root.display(),
            sync = ?config.sync_period,
            watch = ?config.watch_period,
            "watching"
        );
        let summary = scheduler.run_pair(config.sync_period, config.watch_period, sync, watch)?;
        tracing::info!(
            ticks = summary.ticks,
            commits = committer.state.commit_count,
            "session stopped"
        );
        Ok(SessionOutcome::Stopped(summary))
    }
}

/// Borrowed view of the controller used while the scheduler owns the loop.
struct Committer<'a, G> {
    gateway: &'a G,
    config: &'a SessionConfig,
    ignore: &'a HashSet<String>,
    cancel: &'a CancelToken,
    state: &'a mut SessionState,
}

impl<G: VcsGateway> Committer<'_, G> {
    fn commit(&mut self, changes: &ChangeSet) -> Result<CommitOutcome, VcsError> {
        let status = self.gateway.changed_files(ChangeScope::All)?;
        let files: Vec<String> = subtract(&status, self.ignore).into_iter().cloned().collect();
        if files.is_empty() {
            tracing::debug!(detected = changes.len(), "only pre-existing changes; nothing to commit");
            return Ok(CommitOutcome::Skipped);
        }

        self.gateway.stage(&files)?;
        let message = format!("{}{}", self.config.commit_prefix, self.state.commit_count + 1);
        match self.gateway.commit(&message, &files) {
            Ok(()) => {}
            Err(e) if matches!(e.kind, VcsErrorKind::NothingToCommit) => {
                tracing::debug!("git reported nothing to commit");
                return Ok(CommitOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }
        self.state.commit_count += 1;
        tracing::info!(message = %message, files = files.len(), "committed session changes");

        with_retry(self.config.retry, self.cancel, || self.gateway.push())?;
        Ok(CommitOutcome::Committed { message, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InstantSleeper;
    use crate::vcs::{MemoryGateway, RetryPolicy, VcsOp};
    use crate::watch::{ChangeKind, PathChange};
    use std::path::PathBuf;

    fn config(root: &std::path::Path) -> SessionConfig {
        SessionConfig {
            root: root.to_path_buf(),
            retry: RetryPolicy {
                attempts: 2,
                backoff: std::time::Duration::ZERO,
            },
            ..SessionConfig::default()
        }
    }

    fn scheduler(ticks: u64) -> Scheduler {
        Scheduler::new(CancelToken::new())
            .with_sleeper(Box::new(InstantSleeper))
            .with_tick_limit(ticks)
    }

    fn one_change(path: &str) -> ChangeSet {
        std::iter::once(PathChange {
            path: PathBuf::from(path),
            kind: ChangeKind::Modified,
        })
        .collect()
    }

    #[test]
    fn branch_name_rules() {
        assert!(is_valid_session_branch("__gpis_foo", "__gpis_"));
        assert!(!is_valid_session_branch("foo", "__gpis_"));
        assert!(!is_valid_session_branch("__gpis_", "__gpis_"));
        assert!(!is_valid_session_branch("x__gpis_foo", "__gpis_"));

        let name = session_branch_name("__gpis_", 5).expect("name");
        assert!(name.starts_with("__gpis_"));
        assert_eq!(name.len(), "__gpis_".len() + 5);
        assert!(is_valid_session_branch(&name, "__gpis_"));
    }

    #[test]
    fn pre_existing_changes_are_never_committed() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.modify(["a.txt"]);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        assert!(ctl.ignore_set().contains("a.txt"));

        let out = ctl.on_changes_detected(&one_change("a.txt")).expect("react");
        assert_eq!(out, CommitOutcome::Skipped);
        assert_eq!(ctl.state().commit_count, 0);
        assert!(gw.commits().is_empty());
        assert_eq!(gw.pushes(), 0);

        gw.create(["b.txt"]);
        let out = ctl.on_changes_detected(&one_change("b.txt")).expect("react");
        assert_eq!(
            out,
            CommitOutcome::Committed {
                message: "Session changes count: 1".to_string(),
                files: vec!["b.txt".to_string()],
            }
        );
        assert_eq!(gw.commits()[0].files, ["b.txt"]);
        assert_eq!(gw.pushes(), 1);
    }

    #[test]
    fn commit_messages_count_up_from_one() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        for (i, file) in ["x", "y", "z"].iter().enumerate() {
            gw.modify([*file]);
            ctl.on_changes_detected(&one_change(file)).expect("react");
            assert_eq!(ctl.state().commit_count, i as u64 + 1);
        }
        let messages: Vec<String> = gw.commits().into_iter().map(|c| c.message).collect();
        assert_eq!(
            messages,
            [
                "Session changes count: 1",
                "Session changes count: 2",
                "Session changes count: 3"
            ]
        );
    }

    #[test]
    fn failed_commit_leaves_counter_alone() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        gw.modify(["a"]);
        gw.fail_next(VcsOp::Commit, 1);
        assert!(ctl.on_changes_detected(&one_change("a")).is_err());
        assert_eq!(ctl.state().commit_count, 0);

        let out = ctl.on_changes_detected(&one_change("a")).expect("second try");
        assert!(matches!(out, CommitOutcome::Committed { ref message, .. } if message.ends_with(": 1")));
    }

    #[test]
    fn push_is_retried_on_transient_failure() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        gw.modify(["a"]);
        gw.fail_next(VcsOp::Push, 1);
        ctl.on_changes_detected(&one_change("a")).expect("react");
        assert_eq!(gw.pushes(), 1);
    }

    #[test]
    fn pre_staged_baseline_stays_out_of_session_commits() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.stage_existing(["a.txt"]);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");

        gw.create(["b.txt"]);
        ctl.on_changes_detected(&one_change("b.txt")).expect("react");
        assert_eq!(gw.commits()[0].files, ["b.txt"]);
        assert_eq!(
            gw.changed_files(ChangeScope::Staged).expect("staged"),
            ["a.txt"]
        );
    }

    #[test]
    fn reverted_edit_is_skipped() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        gw.modify(["a"]);
        gw.revert(&["a"]);
        let out = ctl.on_changes_detected(&one_change("a")).expect("react");
        assert_eq!(out, CommitOutcome::Skipped);
        assert!(gw.commits().is_empty());
    }

    #[test]
    fn push_timeout_is_retried() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        gw.modify(["a"]);
        gw.time_out_next(VcsOp::Push, 1);
        ctl.on_changes_detected(&one_change("a")).expect("react");
        assert_eq!(gw.pushes(), 1);
        assert_eq!(gw.calls().iter().filter(|c| *c == "push").count(), 2);
    }

    #[test]
    fn pull_timeout_is_retried_within_the_tick() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.time_out_next(VcsOp::Pull, 1);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        let SessionOutcome::Stopped(summary) = ctl.start().expect("start") else {
            panic!("expected the watch loop to run");
        };
        assert_eq!(summary.failures, 0);
        assert_eq!(gw.pulls(), 1);
        assert_eq!(gw.calls().iter().filter(|c| *c == "pull").count(), 2);
    }

    #[test]
    fn repeated_pull_timeouts_count_as_one_failure() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.time_out_next(VcsOp::Pull, 2);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        let SessionOutcome::Stopped(summary) = ctl.start().expect("start") else {
            panic!("expected the watch loop to run");
        };
        assert_eq!(summary.failures, 1);
        assert_eq!(gw.pulls(), 0);
    }

    #[test]
    fn start_on_detached_head_watches_without_a_branch() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.detach();
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        ctl.start().expect("start");
        assert_eq!(ctl.phase(), SessionPhase::Active(SessionRole::Resumed));
        assert_eq!(ctl.state().session_branch, None);
        assert_eq!(gw.pulls(), 1);
    }

    #[test]
    fn join_rejects_foreign_branch_without_side_effects() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        let out = ctl.join("foo").expect("join");
        assert!(matches!(out, SessionOutcome::Rejected { ref branch } if branch == "foo"));
        assert_eq!(ctl.phase(), SessionPhase::Uninitialized);
        assert_eq!(ctl.state(), &SessionState::default());
        assert_eq!(gw.calls(), ["list changes"]);
    }

    #[test]
    fn join_checks_out_and_watches() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(10)).expect("ctl");
        let out = ctl.join("__gpis_abcde").expect("join");
        let SessionOutcome::Stopped(summary) = out else {
            panic!("expected the watch loop to run");
        };
        assert_eq!(summary.ticks, 10);
        assert_eq!(summary.runs_of("sync"), 1);
        assert_eq!(summary.runs_of("watch"), 4);
        assert_eq!(gw.branch(), "__gpis_abcde");
        assert_eq!(gw.pulls(), 1);
        assert_eq!(ctl.phase(), SessionPhase::Active(SessionRole::Guest));
        assert_eq!(ctl.state().session_branch.as_deref(), Some("__gpis_abcde"));

        let again = ctl.start().expect_err("second entry point");
        assert!(matches!(again, SessionError::AlreadyActive(SessionRole::Guest)));
    }

    #[test]
    fn init_regenerates_taken_names_then_publishes() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.script_branch_exists([true, true, false]);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        ctl.init().expect("init");

        let probes = gw
            .calls()
            .iter()
            .filter(|c| c.starts_with("remote branch probe"))
            .count();
        assert_eq!(probes, 3);
        let branch = gw.branch();
        assert!(is_valid_session_branch(&branch, "__gpis_"));
        assert_eq!(gw.remote_branches(), [branch.clone()]);
        assert_eq!(ctl.state().previous_branch.as_deref(), Some("main"));
        assert_eq!(ctl.state().session_branch.as_deref(), Some(branch.as_str()));
        assert_eq!(ctl.phase(), SessionPhase::Active(SessionRole::Host));
    }

    #[test]
    fn init_gives_up_when_every_name_is_taken() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.script_branch_exists([true; 8]);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(1)).expect("ctl");
        let err = ctl.init().expect_err("exhausted");
        assert!(matches!(err, SessionError::BranchNamesExhausted { attempts: 8 }));
        assert_eq!(gw.branch(), "main");
        assert_eq!(ctl.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn start_keeps_current_branch() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("feature");
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(3)).expect("ctl");
        ctl.start().expect("start");
        assert_eq!(gw.branch(), "feature");
        assert!(!gw.calls().iter().any(|c| c.starts_with("checkout")));
        assert_eq!(ctl.phase(), SessionPhase::Active(SessionRole::Resumed));
    }

    #[test]
    fn pull_failures_are_survived_but_missing_git_is_fatal() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        gw.fail_next(VcsOp::Pull, 2);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(11)).expect("ctl");
        let SessionOutcome::Stopped(summary) = ctl.start().expect("start") else {
            panic!("expected the watch loop to run");
        };
        assert_eq!(summary.failures, 1);
        assert_eq!(gw.pulls(), 1);

        let gw = MemoryGateway::new("main");
        gw.unavailable_next(VcsOp::Pull, 1);
        let mut ctl = SessionController::new(&gw, config(dir.path()), scheduler(10)).expect("ctl");
        let err = ctl.start().expect_err("fatal");
        assert!(matches!(
            err,
            SessionError::Vcs(VcsError {
                kind: VcsErrorKind::Unavailable(_),
                ..
            })
        ));
    }

    #[test]
    fn cancelled_token_stops_before_first_tick() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let gw = MemoryGateway::new("main");
        let cancel = CancelToken::new();
        cancel.cancel();
        let sched = Scheduler::new(cancel).with_sleeper(Box::new(InstantSleeper));
        let mut ctl = SessionController::new(&gw, config(dir.path()), sched).expect("ctl");
        let SessionOutcome::Stopped(summary) = ctl.start().expect("start") else {
            panic!("expected the watch loop to run");
        };
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 0);
        assert_eq!(gw.pulls(), 0);
    }
}
