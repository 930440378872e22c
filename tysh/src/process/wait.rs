use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, error};

use super::state::ProcessState;

/// Collect one pending child status change without blocking. Returns `None`
/// when no status is currently available (or there are no children at all).
/// Callers drain by looping until `None`; a single SIGCHLD can stand for
/// several pending changes.
pub(crate) fn wait_any_nohang() -> Option<(Pid, ProcessState)> {
    let options = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED | WaitPidFlag::WNOHANG;

    match waitpid(None, Some(options)) {
        Ok(WaitStatus::Exited(pid, status)) => {
            debug!("child {pid} exited with status {status}");
            Some((pid, ProcessState::Completed(status as u8, None)))
        }
        Ok(WaitStatus::Signaled(pid, signal, core_dumped)) => {
            debug!("child {pid} killed by {signal:?} (core dumped: {core_dumped})");
            Some((pid, ProcessState::Completed(1, Some(signal))))
        }
        Ok(WaitStatus::Stopped(pid, signal)) => {
            debug!("child {pid} stopped by {signal:?}");
            Some((pid, ProcessState::Stopped(pid, signal)))
        }
        Ok(WaitStatus::Continued(pid)) => {
            debug!("child {pid} continued");
            Some((pid, ProcessState::Running))
        }
        Ok(WaitStatus::StillAlive) => None,
        Err(nix::errno::Errno::ECHILD) => None,
        Err(nix::errno::Errno::EINTR) => None,
        status => {
            error!("unexpected waitpid result: {status:?}");
            None
        }
    }
}
