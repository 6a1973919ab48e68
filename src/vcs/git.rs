use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;

use super::{ChangeScope, VcsError, VcsErrorKind, VcsGateway, VcsOp};
use crate::util::exec::{ExecError, ExecOutput, ExecRequest, ExecService};
use crate::util::{merge_unique, non_empty_lines};

/// [`VcsGateway`] backed by the `git` CLI, run as `git -C <root> …`.
#[derive(Debug, Clone)]
pub struct GitGateway {
    root: PathBuf,
    remote: String,
    exec: ExecService,
}

impl GitGateway {
    pub fn new(root: impl Into<PathBuf>, remote: impl Into<String>, exec: ExecService) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
            exec,
        }
    }

    fn run<I, S>(&self, op: VcsOp, args: I) -> Result<ExecOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let request = ExecRequest::new("git")
            .arg("-C")
            .arg(self.root.as_os_str())
            .args(args.into_iter().map(|a| a.as_ref().to_os_string()))
            // Never block on credential prompts or merge-message editors.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_MERGE_AUTOEDIT", "no");
        self.exec.run(request).map_err(|e| exec_error(op, e))
    }

    fn run_ok<I, S>(&self, op: VcsOp, args: I) -> Result<ExecOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.run(op, args)?;
        if out.success() {
            Ok(out)
        } else {
            Err(VcsError::failed(op, out.code(), out.stderr))
        }
    }

    fn list(&self, args: &[&str]) -> Result<Vec<String>, VcsError> {
        let out = self.run_ok(VcsOp::ListChanges, args)?;
        Ok(split_nul(&out.stdout))
    }
}

fn exec_error(op: VcsOp, e: ExecError) -> VcsError {
    let kind = match e {
        ExecError::Spawn(io) if io.kind() == io::ErrorKind::NotFound => {
            VcsErrorKind::Unavailable(io)
        }
        ExecError::Spawn(io) | ExecError::Wait(io) => VcsErrorKind::Spawn(io),
        ExecError::Timeout(t) => VcsErrorKind::Timeout(t),
        ExecError::Cancelled => VcsErrorKind::Cancelled,
    };
    VcsError::new(op, kind)
}

/// Split `-z` output into paths, dropping empty records.
fn split_nul(s: &str) -> Vec<String> {
    s.split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_nothing_to_commit(out: &ExecOutput) -> bool {
    let needle = "nothing to commit";
    out.stdout.contains(needle)
        || out.stderr.contains(needle)
        || out.stdout.contains("no changes added to commit")
}

impl VcsGateway for GitGateway {
    fn changed_files(&self, scope: ChangeScope) -> Result<Vec<String>, VcsError> {
        // Paths are reported relative to the tracked root for every scope.
        const UNSTAGED: &[&str] = &["diff", "--name-only", "--relative", "-z"];
        const STAGED: &[&str] = &["diff", "--name-only", "--staged", "--relative", "-z"];
        const UNTRACKED: &[&str] = &["ls-files", "--others", "--exclude-standard", "-z"];

        let mut files = Vec::new();
        if matches!(scope, ChangeScope::All | ChangeScope::Unstaged) {
            merge_unique(&mut files, self.list(UNSTAGED)?);
        }
        if matches!(scope, ChangeScope::All | ChangeScope::Staged) {
            merge_unique(&mut files, self.list(STAGED)?);
        }
        if matches!(scope, ChangeScope::All | ChangeScope::Untracked) {
            merge_unique(&mut files, self.list(UNTRACKED)?);
        }
        Ok(files)
    }

    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        let out = self.run_ok(VcsOp::CurrentBranch, ["branch", "--show-current"])?;
        // Empty output means a detached HEAD.
        let name = non_empty_lines(&out.stdout).next().map(str::to_string);
        Ok(name)
    }

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        let refname = format!("refs/heads/{name}");
        let out = self.run(
            VcsOp::BranchExists,
            [
                "ls-remote",
                "--exit-code",
                "--heads",
                self.remote.as_str(),
                refname.as_str(),
            ],
        )?;
        match out.code() {
            Some(0) => Ok(true),
            // --exit-code: 2 means the remote answered and had no matching ref.
            Some(2) => Ok(false),
            code => Err(VcsError::failed(VcsOp::BranchExists, code, out.stderr)),
        }
    }

    fn create_and_switch_branch(&self, name: &str) -> Result<(), VcsError> {
        // Re-entrant: a retry after a failed upstream push finds the branch already checked out.
        if self.current_branch().ok().flatten().as_deref() != Some(name) {
            self.run_ok(VcsOp::CreateBranch, ["checkout", "-b", name])?;
        }
        self.run_ok(
            VcsOp::PushUpstream,
            ["push", "-u", self.remote.as_str(), name],
        )?;
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<(), VcsError> {
        self.run_ok(VcsOp::Checkout, ["checkout", name])?;
        Ok(())
    }

    fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_ok(VcsOp::Stage, args)?;
        Ok(())
    }

    fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Err(VcsError::new(VcsOp::Commit, VcsErrorKind::NothingToCommit));
        }
        // --only keeps whatever else sits in the index out of this commit.
        let mut args: Vec<&str> = vec!["commit", "--only", "-m", message, "--"];
        args.extend(paths.iter().map(String::as_str));
        let out = self.run(VcsOp::Commit, args)?;
        if out.success() {
            Ok(())
        } else if is_nothing_to_commit(&out) {
            Err(VcsError::new(VcsOp::Commit, VcsErrorKind::NothingToCommit))
        } else {
            Err(VcsError::failed(VcsOp::Commit, out.code(), out.stderr))
        }
    }

    fn push(&self) -> Result<(), VcsError> {
        self.run_ok(VcsOp::Push, ["push"])?;
        Ok(())
    }

    fn pull(&self) -> Result<(), VcsError> {
        self.run_ok(VcsOp::Pull, ["pull", "--no-edit"])?;
        Ok(())
    }
}
