//! Exit-code mapping:
//! - Missing `git` (io::ErrorKind::NotFound) maps to 127; everything else to 1.
//! - Cancellation is not an error and never reaches these helpers.
use std::io;

use crate::session::SessionError;
use crate::vcs::{VcsError, VcsErrorKind};

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

pub fn exit_code_for_vcs_error(e: &VcsError) -> u8 {
    match &e.kind {
        VcsErrorKind::Unavailable(ioe) | VcsErrorKind::Spawn(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}

pub fn exit_code_for_session_error(e: &SessionError) -> u8 {
    match e {
        SessionError::Vcs(vcs) => exit_code_for_vcs_error(vcs),
        _ => 1,
    }
}

/// One-line user-facing rendering, with a hint where the fix is obvious.
pub fn display_for_session_error(e: &SessionError) -> String {
    match e {
        SessionError::Vcs(VcsError {
            kind: VcsErrorKind::Unavailable(_),
            ..
        }) => "git not found in PATH; install git and try again".to_string(),
        SessionError::BranchNamesExhausted { .. } => {
            format!("{e}; try a longer suffix (GPIS_SUFFIX_LEN)")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::VcsOp;

    #[test]
    fn missing_git_is_127_everything_else_is_1() {
        let missing = SessionError::Vcs(VcsError::new(
            VcsOp::Pull,
            VcsErrorKind::Unavailable(io::Error::new(io::ErrorKind::NotFound, "git")),
        ));
        assert_eq!(exit_code_for_session_error(&missing), 127);
        assert!(display_for_session_error(&missing).contains("git not found"));

        let failed = SessionError::Vcs(VcsError::failed(VcsOp::Checkout, Some(1), "nope"));
        assert_eq!(exit_code_for_session_error(&failed), 1);
        assert_eq!(
            exit_code_for_session_error(&SessionError::BranchNamesExhausted { attempts: 8 }),
            1
        );
        assert_eq!(
            exit_code_for_io_error(&io::Error::new(io::ErrorKind::PermissionDenied, "x")),
            1
        );
    }
}
