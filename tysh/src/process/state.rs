use nix::sys::signal::Signal;
use nix::unistd::Pid;

/// Observed state of one child process, and the aggregate state of a job.
/// `Completed` is terminal; nothing transitions out of it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProcessState {
    Running,
    Completed(u8, Option<Signal>),
    Stopped(Pid, Signal),
}

impl ProcessState {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessState::Completed(_, _))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Stopped(_, _))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProcessState::Running => formatter.write_str("running"),
            ProcessState::Completed(_, signal) => {
                if let Some(signal) = signal {
                    if signal == &Signal::SIGKILL {
                        formatter.write_str("killed")
                    } else if signal == &Signal::SIGTERM {
                        formatter.write_str("terminated")
                    } else {
                        formatter.write_str("done")
                    }
                } else {
                    formatter.write_str("done")
                }
            }
            ProcessState::Stopped(_, _) => formatter.write_str("stopped"),
        }
    }
}
