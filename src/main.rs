mod cli;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use gpis::util::exec::ExecService;
use gpis::{
    acquire_session_lock, color_enabled_stderr, display_for_session_error,
    exit_code_for_session_error, install_cancel_handlers, is_valid_session_branch,
    log_error_stderr, log_info_stderr, log_warn_stderr, set_color_mode, telemetry_init,
    CancelToken, GitGateway, Scheduler, SessionController, SessionError, SessionOutcome,
};

use crate::cli::{Cli, Command};

// Parameter problems are reported on stdout and are not failures.
const INSUFFICIENT_PARAMETERS: &str = "Insufficient parameters provided";
const INVALID_PARAMETERS: &str = "Invalid parameters provided";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = e.print();
            } else {
                println!("{INVALID_PARAMETERS}");
            }
            return ExitCode::SUCCESS;
        }
    };

    if let Some(mode) = cli.color {
        set_color_mode(mode);
    }
    let use_err = color_enabled_stderr();

    let Some(command) = cli.command.clone() else {
        println!("{INSUFFICIENT_PARAMETERS}");
        return ExitCode::SUCCESS;
    };

    telemetry_init(cli.verbose);

    let config = match gpis::config::load(&cli.overrides()) {
        Ok(c) => c,
        Err(e) => {
            log_error_stderr(use_err, &format!("gpis: {e:#}"));
            return ExitCode::from(1);
        }
    };

    if let Command::Join { branch } = &command {
        if !is_valid_session_branch(branch, &config.branch_prefix) {
            println!("{INVALID_PARAMETERS}");
            return ExitCode::SUCCESS;
        }
    }

    if which::which("git").is_err() {
        log_error_stderr(use_err, "gpis: git not found in PATH");
        return ExitCode::from(127);
    }

    // Held until the session ends; released on drop.
    let _lock = match acquire_session_lock(&config.root, &config.vcs_dir) {
        Ok(lock) => lock,
        Err(e) => {
            log_error_stderr(use_err, &format!("gpis: {e}"));
            return ExitCode::from(1);
        }
    };

    let cancel = CancelToken::new();
    install_cancel_handlers(&cancel);
    let exec = ExecService::new(config.command_timeout).with_cancel(cancel.clone());
    let gateway = GitGateway::new(config.root.clone(), config.remote.clone(), exec);
    let scheduler = Scheduler::new(cancel);

    let result = SessionController::new(gateway, config, scheduler).and_then(|mut session| {
        match &command {
            Command::Start => session.start(),
            Command::Init => session.init(),
            Command::Join { branch } => session.join(branch),
        }
    });

    match result {
        Ok(SessionOutcome::Stopped(summary)) => {
            let msg = format!(
                "gpis: session stopped after {} ticks ({} failures)",
                summary.ticks, summary.failures
            );
            if summary.failures > 0 {
                log_warn_stderr(use_err, &msg);
            } else {
                log_info_stderr(use_err, &msg);
            }
            ExitCode::SUCCESS
        }
        Ok(SessionOutcome::Rejected { .. }) => {
            println!("{INVALID_PARAMETERS}");
            ExitCode::SUCCESS
        }
        Err(SessionError::Vcs(e)) if e.is_cancelled() => ExitCode::SUCCESS,
        Err(e) => {
            log_error_stderr(use_err, &format!("gpis: {}", display_for_session_error(&e)));
            ExitCode::from(exit_code_for_session_error(&e))
        }
    }
}
