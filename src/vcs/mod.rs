//! Version-control capability set used by the session engine.
//!
//! The engine only ever talks to a [`VcsGateway`]; [`git::GitGateway`] drives the
//! `git` CLI and [`memory::MemoryGateway`] is a scripted stand-in for tests.

pub mod git;
pub mod memory;
pub mod retry;

use std::fmt;
use std::io;

pub use git::GitGateway;
pub use memory::MemoryGateway;
pub use retry::{with_retry, RetryPolicy};

/// Which part of the working-tree status to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Union of unstaged, staged and untracked, in that order.
    All,
    Unstaged,
    Staged,
    Untracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsOp {
    ListChanges,
    CurrentBranch,
    BranchExists,
    CreateBranch,
    PushUpstream,
    Checkout,
    Stage,
    Commit,
    Push,
    Pull,
}

impl VcsOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsOp::ListChanges => "list changes",
            VcsOp::CurrentBranch => "current branch",
            VcsOp::BranchExists => "remote branch probe",
            VcsOp::CreateBranch => "create branch",
            VcsOp::PushUpstream => "push upstream",
            VcsOp::Checkout => "checkout",
            VcsOp::Stage => "stage",
            VcsOp::Commit => "commit",
            VcsOp::Push => "push",
            VcsOp::Pull => "pull",
        }
    }

    /// Operations that talk to the remote and may fail for network reasons.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            VcsOp::BranchExists | VcsOp::PushUpstream | VcsOp::Push | VcsOp::Pull
        )
    }
}

impl fmt::Display for VcsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum VcsErrorKind {
    /// The backend binary is not available at all.
    Unavailable(io::Error),
    Spawn(io::Error),
    Timeout(std::time::Duration),
    Cancelled,
    Failed { code: Option<i32>, stderr: String },
    NothingToCommit,
}

#[derive(Debug)]
pub struct VcsError {
    pub op: VcsOp,
    pub kind: VcsErrorKind,
}

impl VcsError {
    pub fn new(op: VcsOp, kind: VcsErrorKind) -> Self {
        Self { op, kind }
    }

    pub fn failed(op: VcsOp, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::new(
            op,
            VcsErrorKind::Failed {
                code,
                stderr: stderr.into(),
            },
        )
    }

    /// Worth retrying after a short backoff.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            VcsErrorKind::Timeout(_) => true,
            VcsErrorKind::Failed { .. } => self.op.is_network(),
            _ => false,
        }
    }

    /// The session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            VcsErrorKind::Unavailable(_) | VcsErrorKind::Cancelled
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, VcsErrorKind::Cancelled)
    }
}

impl fmt::Display for VcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VcsErrorKind::Unavailable(e) => write!(f, "{}: git is not available: {e}", self.op),
            VcsErrorKind::Spawn(e) => write!(f, "{}: failed to run git: {e}", self.op),
            VcsErrorKind::Timeout(t) => write!(f, "{}: timed out after {t:?}", self.op),
            VcsErrorKind::Cancelled => write!(f, "{}: cancelled", self.op),
            VcsErrorKind::Failed { code, stderr } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                let detail = stderr.trim();
                if detail.is_empty() {
                    write!(f, "{}: git exited with {code}", self.op)
                } else {
                    write!(f, "{}: git exited with {code}: {detail}", self.op)
                }
            }
            VcsErrorKind::NothingToCommit => write!(f, "{}: nothing to commit", self.op),
        }
    }
}

impl std::error::Error for VcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            VcsErrorKind::Unavailable(e) | VcsErrorKind::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Source-control operations the session engine depends on.
pub trait VcsGateway {
    fn changed_files(&self, scope: ChangeScope) -> Result<Vec<String>, VcsError>;
    /// Name of the checked-out branch; `None` on a detached HEAD.
    fn current_branch(&self) -> Result<Option<String>, VcsError>;
    /// Probe the remote; a missing branch is `Ok(false)`, not an error.
    fn branch_exists(&self, name: &str) -> Result<bool, VcsError>;
    /// Create `name`, switch to it and push it as the upstream tracking branch.
    fn create_and_switch_branch(&self, name: &str) -> Result<(), VcsError>;
    fn checkout(&self, name: &str) -> Result<(), VcsError>;
    /// Stage `paths`; does nothing for an empty slice.
    fn stage(&self, paths: &[String]) -> Result<(), VcsError>;
    /// Commit exactly `paths`; anything else already in the index stays staged.
    fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError>;
    fn push(&self) -> Result<(), VcsError>;
    fn pull(&self) -> Result<(), VcsError>;
}

impl<G: VcsGateway + ?Sized> VcsGateway for &G {
    fn changed_files(&self, scope: ChangeScope) -> Result<Vec<String>, VcsError> {
        (**self).changed_files(scope)
    }
    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        (**self).current_branch()
    }
    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        (**self).branch_exists(name)
    }
    fn create_and_switch_branch(&self, name: &str) -> Result<(), VcsError> {
        (**self).create_and_switch_branch(name)
    }
    fn checkout(&self, name: &str) -> Result<(), VcsError> {
        (**self).checkout(name)
    }
    fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        (**self).stage(paths)
    }
    fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError> {
        (**self).commit(message, paths)
    }
    fn push(&self) -> Result<(), VcsError> {
        (**self).push()
    }
    fn pull(&self) -> Result<(), VcsError> {
        (**self).pull()
    }
}
