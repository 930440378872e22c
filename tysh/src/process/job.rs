use nix::unistd::Pid;
use tracing::warn;

use super::process::Process;
use super::state::ProcessState;

/// One pipeline running as a single process group.
///
/// `pgid` equals the leader (first stage) pid and is the only externally
/// visible handle; `job_id` is the small user-facing number shown by `jobs`.
#[derive(Debug)]
pub struct Job {
    pub job_id: usize,
    pub pgid: Pid,
    pub cmd: String,
    pub foreground: bool,
    pub processes: Vec<Process>,
}

impl Job {
    pub fn new(
        job_id: usize,
        pgid: Pid,
        cmd: String,
        foreground: bool,
        processes: Vec<Process>,
    ) -> Self {
        Job {
            job_id,
            pgid,
            cmd,
            foreground,
            processes,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == Some(pid))
    }

    /// Record a state change for the member process with this pid. A
    /// completed process never changes state again.
    pub fn set_state(&mut self, pid: Pid, state: ProcessState) -> bool {
        for process in self.processes.iter_mut() {
            if process.pid == Some(pid) {
                if process.state.is_completed() {
                    warn!(
                        "ignoring state change for finished pid {pid} in job {}",
                        self.job_id
                    );
                    return false;
                }
                process.state = state;
                return true;
            }
        }
        false
    }

    /// Resume all stopped members. Used by `fg`/`bg` right before SIGCONT so
    /// the table already reflects the resumed state when the continue status
    /// is observed asynchronously.
    pub fn mark_running(&mut self) {
        for process in self.processes.iter_mut() {
            if process.state.is_stopped() {
                process.state = ProcessState::Running;
            }
        }
    }

    /// Aggregate state of the group: stopped if any member is stopped,
    /// completed once every member is, running otherwise. The reported exit
    /// status is the last stage's.
    pub fn state(&self) -> ProcessState {
        for process in &self.processes {
            if let ProcessState::Stopped(pid, signal) = process.state {
                return ProcessState::Stopped(pid, signal);
            }
        }
        if self.processes.iter().all(|p| p.state.is_completed()) {
            return self
                .processes
                .last()
                .map(|p| p.state)
                .unwrap_or(ProcessState::Completed(0, None));
        }
        ProcessState::Running
    }
}
