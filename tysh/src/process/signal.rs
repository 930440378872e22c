use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, Signal, SigmaskHow, killpg, sigaction, sigprocmask,
};
use nix::unistd::Pid;
use tracing::{debug, error};
use tysh_types::{ShellError, ShellResult};

/// Blocks SIGCHLD for the calling thread until dropped. The launcher holds
/// one of these across the fork/register window.
pub struct SigChldBlock {
    was_blocked: bool,
}

impl SigChldBlock {
    pub fn new() -> ShellResult<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut old = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old))?;
        Ok(SigChldBlock {
            was_blocked: old.contains(Signal::SIGCHLD),
        })
    }
}

impl Drop for SigChldBlock {
    fn drop(&mut self) {
        if self.was_blocked {
            return;
        }
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        // Best-effort restore.
        let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None);
    }
}

/// Send a signal to a whole process group.
pub(crate) fn send_signal_group(pgid: Pid, signal: Signal) -> ShellResult<()> {
    debug!("sending {signal:?} to process group {pgid}");
    killpg(pgid, signal).map_err(|e| {
        error!("failed to send {signal:?} to pgid {pgid}: {e}");
        ShellError::Sys(e)
    })
}

/// Restore default dispositions for the job-control signals the shell
/// ignores, and clear the inherited signal mask. Called in the child between
/// fork and exec (refer
/// https://www.gnu.org/software/libc/manual/html_node/Launching-Jobs.html).
pub(crate) fn reset_child_signals() -> ShellResult<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGQUIT, &action)?;
        sigaction(Signal::SIGTSTP, &action)?;
        sigaction(Signal::SIGTTIN, &action)?;
        sigaction(Signal::SIGTTOU, &action)?;
        sigaction(Signal::SIGCHLD, &action)?;
    }
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)?;
    Ok(())
}

/// Make the shell itself immune to terminal-originated job-control signals
/// so they only ever reach the foreground process group.
pub fn ignore_job_control_signals() {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        for sig in [
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGTTOU,
        ] {
            if let Err(e) = sigaction(sig, &action) {
                error!("failed to ignore {sig:?}: {e}");
            }
        }
    }
}
