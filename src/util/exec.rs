use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::scheduler::CancelToken;

/// Granularity at which a running child is polled for cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Structured command execution with timeouts and cooperative cancellation.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
    cancel: CancelToken,
}

#[derive(Debug)]
pub enum ExecError {
    /// The program could not be started (missing binary, permissions).
    Spawn(io::Error),
    /// Waiting on the child or reading its output failed.
    Wait(io::Error),
    /// The child outlived its timeout and was killed.
    Timeout(Duration),
    /// The cancel token fired while the child was running; it was killed.
    Cancelled,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Spawn(e) => write!(f, "failed to spawn process: {e}"),
            ExecError::Wait(e) => write!(f, "failed to wait for process: {e}"),
            ExecError::Timeout(t) => write!(f, "process timed out after {t:?}"),
            ExecError::Cancelled => write!(f, "process cancelled"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Spawn(e) | ExecError::Wait(e) => Some(e),
            _ => None,
        }
    }
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancel token so in-flight commands are killed on shutdown.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(program = ?request.program, args = ?request.args, "exec");
        let mut child = cmd.spawn().map_err(ExecError::Spawn)?;

        // Drain both pipes concurrently; a chatty child would otherwise block on a full pipe.
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let timeout = self.default_timeout;
        let started = Instant::now();
        let status = loop {
            let slice = if timeout.is_zero() {
                WAIT_SLICE
            } else {
                match timeout.checked_sub(started.elapsed()) {
                    Some(rest) if !rest.is_zero() => rest.min(WAIT_SLICE),
                    _ => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecError::Timeout(timeout));
                    }
                }
            };
            if let Some(status) = child.wait_timeout(slice).map_err(ExecError::Wait)? {
                break status;
            }
            if self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Cancelled);
            }
        };

        let duration = started.elapsed();
        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;

        Ok(ExecOutput {
            status,
            duration,
            stdout,
            stderr,
        })
    }
}

fn drain(mut stream: impl Read + Send + 'static) -> JoinHandle<io::Result<String>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: Option<JoinHandle<io::Result<String>>>) -> Result<String, ExecError> {
    match handle {
        None => Ok(String::new()),
        Some(h) => h
            .join()
            .map_err(|_| ExecError::Wait(io::Error::other("output reader thread panicked")))?
            .map_err(ExecError::Wait),
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[derive(Debug, Default)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let svc = ExecService::new(Duration::from_secs(5));
        let out = svc
            .run(ExecRequest::new("sh").args(["-c", "printf 'a\\nb\\n'; exit 3"]))
            .expect("run sh");
        assert_eq!(out.stdout, "a\nb\n");
        assert_eq!(out.code(), Some(3));
        assert!(!out.success());
    }

    #[test]
    fn kills_child_after_timeout() {
        let svc = ExecService::new(Duration::from_millis(150));
        let started = Instant::now();
        let err = svc
            .run(ExecRequest::new("sh").args(["-c", "sleep 5"]))
            .expect_err("should time out");
        assert!(matches!(err, ExecError::Timeout(_)), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn refuses_to_start_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let svc = ExecService::default().with_cancel(cancel);
        let err = svc
            .run(ExecRequest::new("sh").args(["-c", "true"]))
            .expect_err("cancelled");
        assert!(matches!(err, ExecError::Cancelled));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let svc = ExecService::default();
        let err = svc
            .run(ExecRequest::new("gpis-definitely-not-a-binary"))
            .expect_err("spawn");
        match err {
            ExecError::Spawn(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected: {other}"),
        }
    }
}
