//! Session configuration: built-in defaults, YAML files, `GPIS_*` environment
//! variables and CLI flags, applied in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::vcs::RetryPolicy;

pub const DEFAULT_BRANCH_PREFIX: &str = "__gpis_";
pub const DEFAULT_COMMIT_PREFIX: &str = "Session changes count: ";
pub const REPO_CONFIG_FILE: &str = ".gpis.yml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Tracked subtree and working directory for git.
    pub root: PathBuf,
    pub sync_period: Duration,
    pub watch_period: Duration,
    pub branch_prefix: String,
    pub commit_prefix: String,
    pub suffix_len: usize,
    pub vcs_dir: String,
    pub remote: String,
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
    pub branch_name_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            sync_period: Duration::from_millis(1000),
            watch_period: Duration::from_millis(300),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
            suffix_len: 5,
            vcs_dir: ".git".to_string(),
            remote: "origin".to_string(),
            command_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            branch_name_attempts: 8,
        }
    }
}

/// On-disk YAML shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    sync_period: Option<String>,
    watch_period: Option<String>,
    branch_prefix: Option<String>,
    commit_prefix: Option<String>,
    suffix_len: Option<usize>,
    vcs_dir: Option<String>,
    remote: Option<String>,
    command_timeout: Option<String>,
    retry_attempts: Option<u32>,
    retry_backoff: Option<String>,
    branch_name_attempts: Option<u32>,
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub sync_period: Option<Duration>,
    pub watch_period: Option<Duration>,
    pub remote: Option<String>,
}

/// Load with the process environment.
pub fn load(overrides: &ConfigOverrides) -> Result<SessionConfig> {
    load_with(overrides, |k| std::env::var(k).ok())
}

pub fn load_with<E>(overrides: &ConfigOverrides, env: E) -> Result<SessionConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let mut cfg = SessionConfig::default();
    let trimmed = |k: &str| trimmed_var(&env, k);

    if let Some(root) = overrides.root.clone().or_else(|| trimmed("GPIS_ROOT").map(PathBuf::from)) {
        cfg.root = root;
    }

    for file in config_files(&cfg.root, overrides.config_file.as_deref(), trimmed("GPIS_CONFIG")) {
        let parsed = read_file(&file)?;
        apply_file(&mut cfg, parsed).with_context(|| format!("invalid config {}", file.display()))?;
        tracing::debug!(file = %file.display(), "applied config file");
    }

    apply_env(&mut cfg, &env)?;

    if let Some(d) = overrides.sync_period {
        cfg.sync_period = d;
    }
    if let Some(d) = overrides.watch_period {
        cfg.watch_period = d;
    }
    if let Some(r) = &overrides.remote {
        cfg.remote = r.clone();
    }

    validate(&cfg)?;
    Ok(cfg)
}

/// User-level file first, then the explicit or repository file.
fn config_files(root: &Path, explicit: Option<&Path>, from_env: Option<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(home) = home::home_dir() {
        let user = home.join(".config").join("gpis").join("config.yml");
        if user.is_file() {
            files.push(user);
        }
    }
    match explicit.map(Path::to_path_buf).or_else(|| from_env.map(PathBuf::from)) {
        // An explicitly named file must exist; read_file reports it otherwise.
        Some(p) => files.push(p),
        None => {
            let repo = root.join(REPO_CONFIG_FILE);
            if repo.is_file() {
                files.push(repo);
            }
        }
    }
    files
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

fn trimmed_var<E>(env: &E, key: &str) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim()).with_context(|| format!("{key}: invalid duration {raw:?}"))
}

fn apply_file(cfg: &mut SessionConfig, f: FileConfig) -> Result<()> {
    if let Some(v) = f.sync_period {
        cfg.sync_period = duration("sync_period", &v)?;
    }
    if let Some(v) = f.watch_period {
        cfg.watch_period = duration("watch_period", &v)?;
    }
    if let Some(v) = f.branch_prefix {
        cfg.branch_prefix = v;
    }
    if let Some(v) = f.commit_prefix {
        cfg.commit_prefix = v;
    }
    if let Some(v) = f.suffix_len {
        cfg.suffix_len = v;
    }
    if let Some(v) = f.vcs_dir {
        cfg.vcs_dir = v;
    }
    if let Some(v) = f.remote {
        cfg.remote = v;
    }
    if let Some(v) = f.command_timeout {
        cfg.command_timeout = duration("command_timeout", &v)?;
    }
    if let Some(v) = f.retry_attempts {
        cfg.retry.attempts = v;
    }
    if let Some(v) = f.retry_backoff {
        cfg.retry.backoff = duration("retry_backoff", &v)?;
    }
    if let Some(v) = f.branch_name_attempts {
        cfg.branch_name_attempts = v;
    }
    Ok(())
}

fn apply_env<E>(cfg: &mut SessionConfig, env: &E) -> Result<()>
where
    E: Fn(&str) -> Option<String>,
{
    fn number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
        match raw.parse() {
            Ok(v) => Ok(v),
            Err(_) => bail!("{key}: expected a number, got {raw:?}"),
        }
    }

    let get = |k: &str| trimmed_var(env, k);

    if let Some(v) = get("GPIS_SYNC_PERIOD") {
        cfg.sync_period = duration("GPIS_SYNC_PERIOD", &v)?;
    }
    if let Some(v) = get("GPIS_WATCH_PERIOD") {
        cfg.watch_period = duration("GPIS_WATCH_PERIOD", &v)?;
    }
    if let Some(v) = get("GPIS_BRANCH_PREFIX") {
        cfg.branch_prefix = v;
    }
    // Taken verbatim: the default prefix ends in a space.
    if let Some(v) = env("GPIS_COMMIT_PREFIX").filter(|v| !v.is_empty()) {
        cfg.commit_prefix = v;
    }
    if let Some(v) = get("GPIS_SUFFIX_LEN") {
        cfg.suffix_len = number("GPIS_SUFFIX_LEN", &v)?;
    }
    if let Some(v) = get("GPIS_VCS_DIR") {
        cfg.vcs_dir = v;
    }
    if let Some(v) = get("GPIS_REMOTE") {
        cfg.remote = v;
    }
    if let Some(v) = get("GPIS_COMMAND_TIMEOUT") {
        cfg.command_timeout = duration("GPIS_COMMAND_TIMEOUT", &v)?;
    }
    if let Some(v) = get("GPIS_RETRY_ATTEMPTS") {
        cfg.retry.attempts = number("GPIS_RETRY_ATTEMPTS", &v)?;
    }
    if let Some(v) = get("GPIS_RETRY_BACKOFF") {
        cfg.retry.backoff = duration("GPIS_RETRY_BACKOFF", &v)?;
    }
    if let Some(v) = get("GPIS_BRANCH_NAME_ATTEMPTS") {
        cfg.branch_name_attempts = number("GPIS_BRANCH_NAME_ATTEMPTS", &v)?;
    }
    Ok(())
}

fn validate(cfg: &SessionConfig) -> Result<()> {
    if cfg.sync_period.is_zero() {
        bail!("sync period must be greater than zero");
    }
    if cfg.watch_period.is_zero() {
        bail!("watch period must be greater than zero");
    }
    if cfg.command_timeout.is_zero() {
        bail!("command timeout must be greater than zero");
    }
    if cfg.suffix_len == 0 {
        bail!("suffix length must be at least 1");
    }
    if cfg.branch_prefix.is_empty() {
        bail!("branch prefix must not be empty");
    }
    if cfg.vcs_dir.is_empty() {
        bail!("vcs metadata directory must not be empty");
    }
    if cfg.remote.is_empty() {
        bail!("remote must not be empty");
    }
    if cfg.retry.attempts == 0 || cfg.branch_name_attempts == 0 {
        bail!("attempt counts must be at least 1");
    }
    Ok(())
}
