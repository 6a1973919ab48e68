//! In-memory [`VcsGateway`] with scriptable state and failure injection.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{ChangeScope, VcsError, VcsErrorKind, VcsGateway, VcsOp};
use crate::util::merge_unique;

#[derive(Debug, Default)]
struct Inner {
    branch: String,
    remote_branches: BTreeSet<String>,
    exists_answers: VecDeque<bool>,
    unstaged: Vec<String>,
    staged: Vec<String>,
    untracked: Vec<String>,
    commits: Vec<Commit>,
    pushes: usize,
    pulls: usize,
    calls: Vec<String>,
    failures: HashMap<VcsOp, VecDeque<Injected>>,
}

#[derive(Debug, Clone, Copy)]
enum Injected {
    Failed,
    Timeout,
    Unavailable,
}

/// A commit recorded by [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub branch: String,
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
}

impl MemoryGateway {
    pub fn new(branch: impl Into<String>) -> Self {
        let gw = Self::default();
        gw.lock().branch = branch.into();
        gw
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Mark paths as modified in the working tree (unstaged).
    pub fn modify<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut g = self.lock();
        merge_unique(&mut g.unstaged, paths.into_iter().map(Into::into));
    }

    /// Mark paths as new, untracked files.
    pub fn create<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut g = self.lock();
        merge_unique(&mut g.untracked, paths.into_iter().map(Into::into));
    }

    /// Drop paths from every status list, as if their changes were reverted.
    pub fn revert(&self, paths: &[&str]) {
        let mut g = self.lock();
        let inner = &mut *g;
        for list in [&mut inner.unstaged, &mut inner.staged, &mut inner.untracked] {
            list.retain(|p| !paths.contains(&p.as_str()));
        }
    }

    /// Put files in the index ahead of any session, as a user's `git add` would.
    pub fn stage_existing<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut g = self.lock();
        merge_unique(&mut g.staged, paths.into_iter().map(Into::into));
    }

    /// Leave the branch, as `git checkout <sha>` would.
    pub fn detach(&self) {
        self.lock().branch.clear();
    }

    /// Queue answers for upcoming `branch_exists` probes, ahead of the remote set.
    pub fn script_branch_exists<I: IntoIterator<Item = bool>>(&self, answers: I) {
        self.lock().exists_answers.extend(answers);
    }

    /// Fail the next `times` calls of `op` with a non-zero exit.
    pub fn fail_next(&self, op: VcsOp, times: usize) {
        self.inject(op, Injected::Failed, times);
    }

    pub fn time_out_next(&self, op: VcsOp, times: usize) {
        self.inject(op, Injected::Timeout, times);
    }

    /// Behave as if git disappeared for the next `times` calls of `op`.
    pub fn unavailable_next(&self, op: VcsOp, times: usize) {
        self.inject(op, Injected::Unavailable, times);
    }

    fn inject(&self, op: VcsOp, what: Injected, times: usize) {
        let mut g = self.lock();
        let q = g.failures.entry(op).or_default();
        q.extend(std::iter::repeat(what).take(times));
    }

    pub fn branch(&self) -> String {
        self.lock().branch.clone()
    }

    pub fn remote_branches(&self) -> Vec<String> {
        self.lock().remote_branches.iter().cloned().collect()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.lock().commits.clone()
    }

    pub fn pushes(&self) -> usize {
        self.lock().pushes
    }

    pub fn pulls(&self) -> usize {
        self.lock().pulls
    }

    /// Every gateway call in order, as `"op"` or `"op arg"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn enter(&self, op: VcsOp, arg: Option<&str>) -> Result<MutexGuard<'_, Inner>, VcsError> {
        let mut g = self.lock();
        g.calls.push(match arg {
            Some(a) => format!("{} {a}", op.as_str()),
            None => op.as_str().to_string(),
        });
        let injected = g.failures.get_mut(&op).and_then(VecDeque::pop_front);
        match injected {
            None => Ok(g),
            Some(Injected::Failed) => Err(VcsError::failed(op, Some(1), "injected failure")),
            Some(Injected::Timeout) => Err(VcsError::new(
                op,
                VcsErrorKind::Timeout(std::time::Duration::from_secs(30)),
            )),
            Some(Injected::Unavailable) => Err(VcsError::new(
                op,
                VcsErrorKind::Unavailable(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "git",
                )),
            )),
        }
    }
}

impl VcsGateway for MemoryGateway {
    fn changed_files(&self, scope: ChangeScope) -> Result<Vec<String>, VcsError> {
        let g = self.enter(VcsOp::ListChanges, None)?;
        let mut files = Vec::new();
        if matches!(scope, ChangeScope::All | ChangeScope::Unstaged) {
            merge_unique(&mut files, g.unstaged.iter().cloned());
        }
        if matches!(scope, ChangeScope::All | ChangeScope::Staged) {
            merge_unique(&mut files, g.staged.iter().cloned());
        }
        if matches!(scope, ChangeScope::All | ChangeScope::Untracked) {
            merge_unique(&mut files, g.untracked.iter().cloned());
        }
        Ok(files)
    }

    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        let g = self.enter(VcsOp::CurrentBranch, None)?;
        Ok(Some(g.branch.clone()).filter(|b| !b.is_empty()))
    }

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        let mut g = self.enter(VcsOp::BranchExists, Some(name))?;
        match g.exists_answers.pop_front() {
            Some(answer) => Ok(answer),
            None => Ok(g.remote_branches.contains(name)),
        }
    }

    fn create_and_switch_branch(&self, name: &str) -> Result<(), VcsError> {
        let mut g = self.enter(VcsOp::CreateBranch, Some(name))?;
        g.branch = name.to_string();
        g.remote_branches.insert(name.to_string());
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<(), VcsError> {
        let mut g = self.enter(VcsOp::Checkout, Some(name))?;
        g.branch = name.to_string();
        Ok(())
    }

    fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut g = self.enter(VcsOp::Stage, Some(&paths.join(" ")))?;
        for p in paths {
            g.unstaged.retain(|u| u != p);
            g.untracked.retain(|u| u != p);
        }
        merge_unique(&mut g.staged, paths.iter().cloned());
        Ok(())
    }

    fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError> {
        let mut g = self.enter(VcsOp::Commit, Some(message))?;
        let files: Vec<String> = g
            .staged
            .iter()
            .filter(|s| paths.contains(s))
            .cloned()
            .collect();
        if files.is_empty() {
            return Err(VcsError::new(VcsOp::Commit, VcsErrorKind::NothingToCommit));
        }
        g.staged.retain(|s| !paths.contains(s));
        let branch = g.branch.clone();
        g.commits.push(Commit {
            branch,
            message: message.to_string(),
            files,
        });
        Ok(())
    }

    fn push(&self) -> Result<(), VcsError> {
        let mut g = self.enter(VcsOp::Push, None)?;
        g.pushes += 1;
        Ok(())
    }

    fn pull(&self) -> Result<(), VcsError> {
        let mut g = self.enter(VcsOp::Pull, None)?;
        g.pulls += 1;
        Ok(())
    }
}
