use fs2::FileExt;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = "gpis.lock";

/// Exclusive per-tree session lock; unlocks and removes the file on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        for _ in 0..10 {
            if !self.path.exists() || fs::remove_file(&self.path).is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
}

/// Lock the tree at `root`, trying each candidate path in turn.
pub fn acquire_session_lock(root: &Path, vcs_dir: &str) -> io::Result<SessionLock> {
    let paths = candidate_lock_paths(root, vcs_dir);
    let mut last_err: Option<io::Error> = None;
    for p in &paths {
        match acquire_lock_at(p) {
            Ok(lock) => {
                tracing::debug!(path = %p.display(), "acquired session lock");
                return Ok(lock);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(e),
            Err(e) => last_err = Some(e),
        }
    }
    let tried = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut msg = format!("failed to create lock file in any candidate location: {tried}");
    if let Some(e) = last_err {
        msg.push_str(&format!(" (last error: {e})"));
    }
    Err(io::Error::other(msg))
}

/// Acquire a lock at a specific path. A held lock yields `WouldBlock`.
pub fn acquire_lock_at(p: &Path) -> io::Result<SessionLock> {
    if let Some(parent) = p.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(SessionLock {
            file,
            path: p.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "another gpis session is already watching this tree (lock held)",
        )),
        Err(e) => Err(e),
    }
}

/// Candidate lock file locations:
/// 1) `<root>/<vcs_dir>/gpis.lock` when the metadata directory exists
/// 2) `<runtime or temp dir>/gpis.<hash(root)>.lock`
pub fn candidate_lock_paths(root: &Path, vcs_dir: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let meta = root.join(vcs_dir);
    if meta.is_dir() {
        paths.push(meta.join(LOCK_FILE_NAME));
    }
    let base = env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir);
    let key = normalized_root_key(root);
    paths.push(base.join(format!("gpis.{}.lock", hash_key_hex(&key))));
    paths
}

fn normalized_root_key(p: &Path) -> String {
    fs::canonicalize(p)
        .unwrap_or_else(|_| p.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// 64-bit FNV-1a as 16 lowercase hex digits.
fn hash_key_hex(s: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 1099511628211;
    let mut h: u64 = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    format!("{h:016x}")
}
