use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::{Pid, close, dup2, execv, getpid, setpgid, tcsetpgrp};
use std::ffi::CString;
use std::os::unix::io::RawFd;
use tracing::debug;

use super::signal::reset_child_signals;
use super::state::ProcessState;
use crate::shell::SHELL_TERMINAL;

/// Distinguished exit statuses the child uses when exec fails, so the parent
/// can tell a launch failure from a successful run. Never zero.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
pub const EXIT_EXEC_FAILED: i32 = 127;

/// One pipeline stage: the resolved program, its argv, and the descriptors
/// it should run with. The pid is filled in by the fork.
#[derive(Debug)]
pub struct Process {
    pub cmd: String,
    pub argv: Vec<String>,
    pub pid: Option<Pid>,
    pub state: ProcessState,
    pub stdin: RawFd,
    pub stdout: RawFd,
}

impl Process {
    pub fn new(cmd: String, argv: Vec<String>) -> Self {
        Process {
            cmd,
            argv,
            pid: None,
            state: ProcessState::Running,
            stdin: STDIN_FILENO,
            stdout: STDOUT_FILENO,
        }
    }

    /// Child-side setup and exec. Joins the pipeline's process group, claims
    /// the terminal when launched as the interactive foreground, restores
    /// default signal handling, wires up the stage's descriptors and execs.
    /// Returns only on failure; the caller must exit the child with the
    /// returned status.
    pub(crate) fn exec_child(&self, pgid: Pid, claim_terminal: bool, close_fds: &[RawFd]) -> i32 {
        let pid = getpid();
        if let Err(e) = setpgid(pid, pgid) {
            eprintln!("tysh: setpgid failed: {e}");
            return EXIT_EXEC_FAILED;
        }

        // Terminal hand-off happens while SIGTTOU is still ignored
        // (inherited from the shell), before dispositions are reset.
        if claim_terminal {
            let _ = tcsetpgrp(SHELL_TERMINAL, pgid);
        }

        if let Err(e) = reset_child_signals() {
            eprintln!("tysh: failed to reset signals: {e}");
            return EXIT_EXEC_FAILED;
        }

        if let Err(e) = copy_fd(self.stdin, STDIN_FILENO) {
            eprintln!("tysh: {}: stdin setup failed: {e}", self.cmd);
            return EXIT_EXEC_FAILED;
        }
        if let Err(e) = copy_fd(self.stdout, STDOUT_FILENO) {
            eprintln!("tysh: {}: stdout setup failed: {e}", self.cmd);
            return EXIT_EXEC_FAILED;
        }

        // Unused pipe ends and redirect descriptors; leaking any write end
        // would keep a sibling stage from ever seeing EOF.
        for fd in close_fds {
            let _ = close(*fd);
        }

        let cmd = match CString::new(self.cmd.clone()) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("tysh: {}: {e}", self.cmd);
                return EXIT_EXEC_FAILED;
            }
        };
        let argv: Result<Vec<CString>, _> =
            self.argv.clone().into_iter().map(CString::new).collect();
        let argv = match argv {
            Ok(argv) => argv,
            Err(e) => {
                eprintln!("tysh: {}: {e}", self.cmd);
                return EXIT_EXEC_FAILED;
            }
        };

        debug!("execv cmd:{cmd:?} argv:{argv:?} pgid:{pgid}");
        match execv(&cmd, &argv) {
            Ok(_) => unreachable!("execv returned Ok"),
            Err(nix::errno::Errno::EACCES) => {
                eprintln!("tysh: {}: permission denied", self.cmd);
                EXIT_NOT_EXECUTABLE
            }
            Err(err) => {
                eprintln!("tysh: {}: {err}", self.cmd);
                EXIT_EXEC_FAILED
            }
        }
    }
}

/// Move `from` onto `to`, closing the original when they differ.
fn copy_fd(from: RawFd, to: RawFd) -> nix::Result<()> {
    if from != to {
        dup2(from, to)?;
        close(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn test_new_process_defaults() {
        init();
        let process = Process::new("/bin/true".to_string(), vec!["true".to_string()]);
        assert!(process.pid.is_none());
        assert_eq!(process.state, ProcessState::Running);
        assert_eq!(process.stdin, STDIN_FILENO);
        assert_eq!(process.stdout, STDOUT_FILENO);
    }

    #[test]
    fn test_exit_statuses_distinguished() {
        init();
        assert_ne!(EXIT_EXEC_FAILED, 0);
        assert_ne!(EXIT_NOT_EXECUTABLE, 0);
        assert_ne!(EXIT_EXEC_FAILED, EXIT_NOT_EXECUTABLE);
    }

    #[test]
    fn test_state_transitions() {
        init();
        let mut process = Process::new("sleep".to_string(), vec!["sleep".to_string()]);
        assert!(process.state.is_running());
        process.state = ProcessState::Stopped(Pid::from_raw(42), Signal::SIGTSTP);
        assert!(process.state.is_stopped());
        process.state = ProcessState::Completed(0, None);
        assert!(process.state.is_completed());
    }
}
