use libc::{STDIN_FILENO, c_int};
use nix::sys::signal::Signal;
use nix::unistd::{Pid, close, getpgrp, getpid, isatty, pipe, setpgid, tcsetpgrp};
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tysh_types::{Context, ExitStatus, ShellError, ShellResult};

use crate::command::{OutputMode, Pipeline};
use crate::path;
use crate::process::fork::fork_stage;
use crate::process::job::Job;
use crate::process::reaper::{Reaper, drain_statuses};
use crate::process::signal::{SigChldBlock, ignore_job_control_signals, send_signal_group};
use crate::process::state::ProcessState;
use crate::process::table::{JobNotice, JobTable};
use crate::process::Process;
use tysh_builtin::ShellProxy;

pub const APP_NAME: &str = "tysh";

/// The controlling terminal descriptor used for foreground hand-off.
pub const SHELL_TERMINAL: c_int = STDIN_FILENO;

const WAIT_TICK: Duration = Duration::from_millis(50);

/// The execution core: resolves commands, launches jobs and owns the job
/// table and its reaper. One instance per shell process.
#[derive(Debug)]
pub struct Shell {
    pub pid: Pid,
    pub pgid: Pid,
    pub interactive: bool,
    table: Arc<JobTable>,
    _reaper: Reaper,
    exited: Option<ExitStatus>,
    exit_warned: bool,
}

impl Shell {
    /// Set up the shell process for job control. When stdin is a terminal
    /// the shell takes its own process group, grabs the terminal and shields
    /// itself from the job-control signals meant for foreground jobs.
    pub fn new() -> Self {
        let pid = getpid();
        let interactive = isatty(SHELL_TERMINAL).unwrap_or(false);
        if interactive {
            if let Err(e) = setpgid(pid, pid) {
                debug!("setpgid({pid}, {pid}) failed: {e}");
            }
            let _ = tcsetpgrp(SHELL_TERMINAL, getpgrp());
            ignore_job_control_signals();
        }
        let pgid = getpgrp();

        let table = Arc::new(JobTable::new());
        let reaper = Reaper::spawn(Arc::clone(&table));
        debug!("shell pid:{pid} pgid:{pgid} interactive:{interactive}");

        Shell {
            pid,
            pgid,
            interactive,
            table,
            _reaper: reaper,
            exited: None,
            exit_warned: false,
        }
    }

    pub fn context(&self) -> Context {
        Context::new(self.pid, self.pgid, self.interactive)
    }

    /// Set once the exit policy lets an `exit` request through.
    pub fn exited(&self) -> Option<ExitStatus> {
        self.exited
    }

    pub fn live_jobs(&self) -> usize {
        self.table.live_jobs()
    }

    pub fn job_lines(&self) -> Vec<String> {
        self.table.job_lines()
    }

    /// Drain deferred job announcements. Callers print these at safe points
    /// between commands; each transition is handed out exactly once.
    pub fn take_notices(&self) -> Vec<JobNotice> {
        self.table.take_notices()
    }

    pub fn print_notices(&self, ctx: &Context) {
        for notice in self.table.take_notices() {
            if let Err(e) = ctx.write_stdout(&notice.to_string()) {
                warn!("failed to print job notice: {e}");
            }
        }
    }

    /// Execute one pipeline. A single non-background command whose name is a
    /// registered builtin runs in-process; everything else is launched as an
    /// external job.
    pub fn run_pipeline(&mut self, ctx: &Context, pipeline: &Pipeline) -> ShellResult<ExitStatus> {
        if pipeline.commands.len() == 1 && !pipeline.background {
            let cmd = &pipeline.commands[0];
            if cmd.stdin_file.is_none() && cmd.stdout_file.is_none() {
                if let Some(builtin) = tysh_builtin::get_command(cmd.name()) {
                    debug!("running builtin {}", cmd.name());
                    return Ok(builtin(ctx, cmd.argv.clone(), self));
                }
            }
        }
        self.launch_job(ctx, pipeline)
    }

    /// Launch a pipeline as one job: resolve every stage up front, open the
    /// redirections, wire the pipes, then fork all stages into a single
    /// process group. Nothing is forked unless every stage resolves.
    fn launch_job(&mut self, ctx: &Context, pipeline: &Pipeline) -> ShellResult<ExitStatus> {
        let mut processes: Vec<Process> = Vec::with_capacity(pipeline.commands.len());
        for cmd in &pipeline.commands {
            let resolved = path::resolve(cmd.name())?;
            processes.push(Process::new(
                resolved.to_string_lossy().into_owned(),
                cmd.argv.clone(),
            ));
        }
        let last = processes.len() - 1;
        processes[0].stdin = ctx.infile;
        processes[last].stdout = ctx.outfile;

        // Redirections. The guards keep the descriptors open across the
        // forks and close the parent's copies when this function returns.
        let mut redirect_guards: Vec<File> = Vec::new();
        if let Some(ref file) = pipeline.commands[0].stdin_file {
            let opened = File::open(file).map_err(|e| ShellError::Redirection {
                path: file.clone(),
                source: e,
            })?;
            processes[0].stdin = opened.as_raw_fd();
            redirect_guards.push(opened);
        }
        if let Some((ref file, mode)) = pipeline.commands[last].stdout_file {
            let opened = match mode {
                OutputMode::Truncate => OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(file),
                OutputMode::Append => OpenOptions::new().append(true).create(true).open(file),
            }
            .map_err(|e| ShellError::Redirection {
                path: file.clone(),
                source: e,
            })?;
            processes[last].stdout = opened.as_raw_fd();
            redirect_guards.push(opened);
        }

        let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(last);
        for i in 0..last {
            match pipe() {
                Ok((read, write)) => {
                    processes[i].stdout = write;
                    processes[i + 1].stdin = read;
                    pipes.push((read, write));
                }
                Err(e) => {
                    close_pipes(&pipes);
                    return Err(ShellError::Launch(format!("pipe failed: {e}")));
                }
            }
        }

        // Every descriptor a child inherits but must not keep. Each stage
        // additionally drops its own ends inside exec_child.
        let mut inherited: Vec<RawFd> = pipes.iter().flat_map(|(r, w)| [*r, *w]).collect();
        inherited.extend(redirect_guards.iter().map(|f| f.as_raw_fd()));

        let foreground = !pipeline.background;
        let claim_terminal = foreground && self.interactive;

        // The table lock is held across the forks until the job is
        // registered, so the reaper cannot observe a child pid with no
        // owning job. SIGCHLD is kept blocked for the same window.
        let sigchld_block = SigChldBlock::new()?;
        let mut launch = self.table.begin_launch();
        let job_id = launch.next_job_id();

        let mut pgid: Option<Pid> = None;
        for process in processes.iter_mut() {
            let close_fds: Vec<RawFd> = inherited
                .iter()
                .copied()
                .filter(|fd| *fd != process.stdin && *fd != process.stdout)
                .collect();
            match fork_stage(process, pgid, claim_terminal, &close_fds) {
                Ok(child) => {
                    if pgid.is_none() {
                        pgid = Some(child);
                    }
                }
                Err(e) => {
                    if let Some(pgid) = pgid {
                        let _ = send_signal_group(pgid, Signal::SIGKILL);
                    }
                    close_pipes(&pipes);
                    return Err(e);
                }
            }
        }
        let pgid = pgid.ok_or_else(|| ShellError::InvalidPipeline("no commands".to_string()))?;

        // The children own these now.
        close_pipes(&pipes);
        drop(redirect_guards);

        launch.insert(Job::new(
            job_id,
            pgid,
            pipeline.display_line(),
            foreground,
            processes,
        ));
        drop(launch);
        drop(sigchld_block);

        if foreground {
            self.wait_foreground(pgid)
        } else {
            if let Err(e) = ctx.write_stdout(&format!("[{job_id}] {pgid}")) {
                warn!("failed to announce background job: {e}");
            }
            Ok(ExitStatus::Running(pgid))
        }
    }

    /// Block the main flow until the foreground job completes or stops. The
    /// terminal is handed to the job for the duration and always taken back,
    /// whatever the outcome.
    fn wait_foreground(&mut self, pgid: Pid) -> ShellResult<ExitStatus> {
        if self.interactive {
            let _ = tcsetpgrp(SHELL_TERMINAL, pgid);
        }

        let status = loop {
            drain_statuses(&self.table);
            match self.table.state_of(pgid) {
                Some(ProcessState::Completed(code, signal)) => {
                    self.table.remove(pgid);
                    let code = match signal {
                        Some(signal) => 128 + signal as i32,
                        None => code as i32,
                    };
                    break ExitStatus::ExitedWith(code);
                }
                Some(ProcessState::Stopped(_, signal)) => {
                    // The job stays in the table as a stopped background
                    // job; its notice is already queued.
                    self.table.set_foreground(pgid, false);
                    break ExitStatus::ExitedWith(128 + signal as i32);
                }
                Some(ProcessState::Running) => self.table.wait_timeout(WAIT_TICK),
                None => {
                    warn!("foreground job pgid:{pgid} vanished from the table");
                    break ExitStatus::ExitedWith(0);
                }
            }
        };

        if self.interactive {
            let _ = tcsetpgrp(SHELL_TERMINAL, self.pgid);
        }
        debug!("foreground job pgid:{pgid} finished: {status:?}");
        Ok(status)
    }

    /// Look up a job by user spec (`%n`, a job id, or a raw pgid).
    pub fn find_job(&self, spec: &str) -> ShellResult<Pid> {
        self.find_pgid_for(Some(spec))
    }

    fn find_pgid_for(&self, spec: Option<&str>) -> ShellResult<Pid> {
        match spec {
            Some(spec) => self
                .table
                .find_pgid(spec)
                .ok_or_else(|| ShellError::NoSuchJob(spec.to_string())),
            None => self
                .table
                .current_pgid()
                .ok_or_else(|| ShellError::NoSuchJob("current".to_string())),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new()
    }
}

impl ShellProxy for Shell {
    /// Exit policy: refuse once while jobs are unfinished, honor the request
    /// the second time regardless.
    fn exit_shell(&mut self, ctx: &Context) {
        let live = self.table.live_jobs();
        if live > 0 && !self.exit_warned {
            self.exit_warned = true;
            let _ = ctx.write_stderr(&format!("{APP_NAME}: there are {live} unfinished jobs"));
            return;
        }
        self.exited = Some(ExitStatus::ExitedWith(0));
    }

    fn dispatch(&mut self, ctx: &Context, cmd: &str, argv: Vec<String>) -> anyhow::Result<()> {
        match cmd {
            "jobs" => {
                for line in self.table.job_lines() {
                    ctx.write_stdout(&line)?;
                }
                Ok(())
            }
            "fg" => {
                let pgid = self.find_pgid_for(argv.get(1).map(String::as_str))?;
                // Flip the table first so the asynchronous continue status
                // is observed without a transition.
                self.table.mark_running(pgid, true);
                send_signal_group(pgid, Signal::SIGCONT)?;
                let status = self.wait_foreground(pgid)?;
                debug!("fg pgid:{pgid} returned {status:?}");
                Ok(())
            }
            "bg" => {
                let pgid = self.find_pgid_for(argv.get(1).map(String::as_str))?;
                self.table.mark_running(pgid, false);
                send_signal_group(pgid, Signal::SIGCONT)?;
                if let Some(line) = self.table.line_for(pgid) {
                    ctx.write_stdout(&line)?;
                }
                Ok(())
            }
            _ => {
                warn!("unsupported dispatch: {cmd}");
                Ok(())
            }
        }
    }

    fn changepwd(&mut self, path: &str) -> anyhow::Result<()> {
        std::env::set_current_dir(path)?;
        let pwd = std::env::current_dir()?;
        unsafe { std::env::set_var("PWD", &pwd) };
        Ok(())
    }
}

fn close_pipes(pipes: &[(RawFd, RawFd)]) {
    for (read, write) in pipes {
        let _ = close(*read);
        let _ = close(*write);
    }
}
