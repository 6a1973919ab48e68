//! SIGINT/SIGTERM/SIGHUP request a clean stop of the watch loop.
//!
//! Handlers only store into an atomic flag shared with the session's
//! [`CancelToken`]; the scheduler notices it between ticks, while sleeping or
//! while waiting on git.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::scheduler::CancelToken;

static CANCEL_FLAG: OnceCell<Arc<AtomicBool>> = OnceCell::new();

#[cfg(unix)]
extern "C" fn handle_stop(_sig: i32) {
    if let Some(flag) = CANCEL_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Route termination signals to `cancel`. Only the first token passed in is
/// wired up; later calls return false.
#[cfg(unix)]
pub fn install_cancel_handlers(cancel: &CancelToken) -> bool {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    if CANCEL_FLAG.set(cancel.flag()).is_err() {
        return false;
    }
    let act = SigAction::new(
        SigHandler::Handler(handle_stop),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only performs an atomic store.
        if let Err(e) = unsafe { signal::sigaction(sig, &act) } {
            tracing::warn!(signal = ?sig, error = %e, "failed to install signal handler");
        }
    }
    true
}

#[cfg(not(unix))]
pub fn install_cancel_handlers(cancel: &CancelToken) -> bool {
    CANCEL_FLAG.set(cancel.flag()).is_ok()
}
