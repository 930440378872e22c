use anyhow::Result;
use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::Pid;
use std::fmt::Debug;
use std::fs::File;
use std::io::Write;
use std::mem;
use std::os::unix::io::{FromRawFd, RawFd};
use thiserror::Error;

/// Error taxonomy of the execution core.
///
/// Everything here is recovered at the point of command dispatch; none of
/// these terminate the shell process.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The command name resolves to neither a builtin nor an executable file.
    #[error("{0}: command not found")]
    NotFound(String),

    /// Pipe or fork creation failed; the attempted launch is abandoned.
    #[error("failed to launch job: {0}")]
    Launch(String),

    /// A redirection source/destination could not be opened.
    #[error("{path}: {source}")]
    Redirection {
        path: String,
        source: std::io::Error,
    },

    /// `fg`/`bg` named a job that is not in the job table.
    #[error("{0}: no such job")]
    NoSuchJob(String),

    /// A pipeline value that violates its own construction rules.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ShellResult<T> = std::result::Result<T, ShellError>;

/// Result of executing one command or pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The job finished and the shell observed this exit code.
    ExitedWith(i32),
    /// The job keeps running in the background under this process group.
    Running(Pid),
}

/// Per-dispatch execution context handed through the engine and into
/// builtins. Carries the shell's identity and the stdio targets the current
/// command should use.
#[derive(Clone)]
pub struct Context {
    pub shell_pid: Pid,
    pub shell_pgid: Pid,
    pub foreground: bool,
    pub interactive: bool,
    pub infile: RawFd,
    pub outfile: RawFd,
    pub errfile: RawFd,
}

impl Context {
    pub fn new(shell_pid: Pid, shell_pgid: Pid, interactive: bool) -> Self {
        Context {
            shell_pid,
            shell_pgid,
            foreground: true,
            interactive,
            infile: STDIN_FILENO,
            outfile: STDOUT_FILENO,
            errfile: STDERR_FILENO,
        }
    }

    /// Write a line to the context's stdout without taking ownership of the
    /// underlying descriptor.
    pub fn write_stdout(&self, msg: &str) -> Result<()> {
        let mut file = unsafe { File::from_raw_fd(self.outfile) };
        writeln!(&mut file, "{msg}")?;
        mem::forget(file);
        Ok(())
    }

    /// Write a line to the context's stderr without taking ownership of the
    /// underlying descriptor.
    pub fn write_stderr(&self, msg: &str) -> Result<()> {
        let mut file = unsafe { File::from_raw_fd(self.errfile) };
        writeln!(&mut file, "{msg}")?;
        mem::forget(file);
        Ok(())
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::result::Result<(), std::fmt::Error> {
        f.debug_struct("Context")
            .field("shell_pid", &self.shell_pid)
            .field("shell_pgid", &self.shell_pgid)
            .field("foreground", &self.foreground)
            .field("interactive", &self.interactive)
            .field("infile", &self.infile)
            .field("outfile", &self.outfile)
            .field("errfile", &self.errfile)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::getpid;

    #[test]
    fn test_context_defaults() {
        let pid = getpid();
        let ctx = Context::new(pid, pid, false);
        assert!(ctx.foreground);
        assert!(!ctx.interactive);
        assert_eq!(ctx.infile, STDIN_FILENO);
        assert_eq!(ctx.outfile, STDOUT_FILENO);
        assert_eq!(ctx.errfile, STDERR_FILENO);
    }

    #[test]
    fn test_error_display() {
        let err = ShellError::NotFound("frobnicate".to_string());
        assert_eq!(err.to_string(), "frobnicate: command not found");

        let err = ShellError::NoSuchJob("%7".to_string());
        assert_eq!(err.to_string(), "%7: no such job");
    }
}
