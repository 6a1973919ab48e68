/*!
Test support helpers shared across integration tests.

- have_git(): check git availability on PATH
- git(dir, args): run git in `dir`, panicking with stderr on failure
- init_repo_with_default_user(dir): initialize a git repo with a test identity
- repo_with_origin(tmp): bare `origin` plus a clone with one initial commit

These helpers do not print skip messages themselves so tests keep their own
"skipping: ..." lines.
*/

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Return true if `git` is available on PATH.
#[allow(dead_code)]
pub fn have_git() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run git in `dir` and return trimmed stdout.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Initialize a git repo in `dir` with a default identity and `main` as the
/// initial branch.
#[allow(dead_code)]
pub fn init_repo_with_default_user(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let _ = Command::new("git")
        .args(["init", "-q"])
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = Command::new("git")
        .args(["symbolic-ref", "HEAD", "refs/heads/main"])
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    for (key, value) in [
        ("user.name", "GPIS Test"),
        ("user.email", "gpis@example.com"),
        ("commit.gpgsign", "false"),
    ] {
        let _ = Command::new("git")
            .args(["config", key, value])
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    Ok(())
}

/// Create `<tmp>/origin.git` (bare) and `<tmp>/work`, a clone with one commit
/// on `main` pushed upstream. Returns the work tree path.
#[allow(dead_code)]
pub fn repo_with_origin(tmp: &Path) -> PathBuf {
    let origin = tmp.join("origin.git");
    let work = tmp.join("work");
    std::fs::create_dir_all(&origin).expect("mkdir origin");
    git(&origin, &["init", "-q", "--bare"]);
    git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    init_repo_with_default_user(&work).expect("init work");
    std::fs::write(work.join("README.md"), "pair session\n").expect("write readme");
    git(&work, &["add", "README.md"]);
    git(&work, &["commit", "-q", "-m", "initial"]);
    let origin_url = origin.to_string_lossy().to_string();
    git(&work, &["remote", "add", "origin", &origin_url]);
    git(&work, &["push", "-q", "-u", "origin", "main"]);
    work
}
