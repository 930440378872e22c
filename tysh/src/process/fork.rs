use nix::unistd::{ForkResult, Pid, fork, setpgid};
use std::os::unix::io::RawFd;
use tracing::debug;
use tysh_types::{ShellError, ShellResult};

use super::process::Process;

/// Fork one pipeline stage. The first stage founds the process group (pgid =
/// its own pid); later stages join it. Both parent and child call `setpgid`
/// so neither side races the other.
pub(crate) fn fork_stage(
    process: &mut Process,
    job_pgid: Option<Pid>,
    claim_terminal: bool,
    close_fds: &[RawFd],
) -> ShellResult<Pid> {
    let pid = unsafe { fork() }.map_err(|e| ShellError::Launch(format!("fork failed: {e}")))?;

    match pid {
        ForkResult::Parent { child } => {
            let pgid = job_pgid.unwrap_or(child);
            // EACCES here means the child already exec'd after doing its own
            // setpgid; harmless.
            if let Err(e) = setpgid(child, pgid) {
                debug!("parent setpgid({child}, {pgid}) failed: {e}");
            }
            process.pid = Some(child);
            debug!("forked stage {} pid:{child} pgid:{pgid}", process.cmd);
            Ok(child)
        }
        ForkResult::Child => {
            let pgid = job_pgid.unwrap_or_else(nix::unistd::getpid);
            let status = process.exec_child(pgid, claim_terminal, close_fds);
            // Reached only when exec failed; the status is the distinguished
            // launch-failure code.
            std::process::exit(status);
        }
    }
}
