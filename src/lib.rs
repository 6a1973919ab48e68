#![allow(clippy::module_name_repetitions)]
//! gpis: pair sessions over a git working tree.
//!
//! A session watches the tree by polling, commits and pushes new work onto a
//! shared session branch, and pulls on its own cadence so collaborators see
//! each other's changes.

pub mod color;
pub mod config;
pub mod errors;
pub mod lock;
pub mod scheduler;
pub mod session;
pub mod signals;
pub mod telemetry;
pub mod util;
pub mod vcs;
pub mod watch;

pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr, paint,
    set_color_mode, ColorMode,
};
pub use config::{ConfigOverrides, SessionConfig};
pub use errors::{display_for_session_error, exit_code_for_io_error, exit_code_for_session_error};
pub use lock::{acquire_session_lock, SessionLock};
pub use scheduler::{CancelToken, Cadence, RunSummary, Scheduler};
pub use session::{
    is_valid_session_branch, CommitOutcome, SessionController, SessionError, SessionOutcome,
    SessionPhase, SessionRole, SessionState,
};
pub use signals::install_cancel_handlers;
pub use telemetry::telemetry_init;
pub use vcs::{ChangeScope, GitGateway, MemoryGateway, VcsError, VcsErrorKind, VcsGateway, VcsOp};
pub use watch::{ChangeKind, ChangeSet, SnapshotDiffer};
