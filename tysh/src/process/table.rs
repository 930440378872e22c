use nix::unistd::Pid;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::job::Job;
use super::state::ProcessState;

/// A deferred announcement of a job state transition. Queued by whoever
/// applies the status (usually the reaper) and printed exactly once at the
/// next safe point in the main control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNotice {
    pub job_id: usize,
    pub pid: Pid,
    pub state: ProcessState,
    pub cmd: String,
}

impl std::fmt::Display for JobNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&format_line(self.job_id, self.pid, self.state, &self.cmd))
    }
}

fn format_line(job_id: usize, pid: Pid, state: ProcessState, cmd: &str) -> String {
    format!("[{job_id}] ({pid}) {state}\t{cmd}")
}

#[derive(Debug, Default)]
struct Inner {
    // keyed by raw pgid: an opaque index, never a reference
    jobs: HashMap<i32, Job>,
    notices: Vec<JobNotice>,
}

/// The shared registry of jobs, keyed by process-group id.
///
/// Mutated by the launcher (insert), the reaper (status application) and the
/// builtin dispatcher (fg/bg/jobs, reclamation). All access funnels through
/// one mutex; the condvar wakes foreground waiters whenever a status lands.
#[derive(Debug, Default)]
pub struct JobTable {
    inner: Mutex<Inner>,
    cond: Condvar,
}

/// Holds the table lock across the fork/insert window so the reaper cannot
/// observe a child pid before its job is registered.
pub struct LaunchGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl LaunchGuard<'_> {
    /// Next free user-facing job id: one past the highest id still tracked,
    /// so ids grow monotonically and are reused only after reclamation.
    pub fn next_job_id(&self) -> usize {
        self.inner
            .jobs
            .values()
            .map(|j| j.job_id)
            .max()
            .map(|id| id + 1)
            .unwrap_or(1)
    }

    pub fn insert(&mut self, job: Job) {
        debug!("registering job [{}] pgid:{} '{}'", job.job_id, job.pgid, job.cmd);
        self.inner.jobs.insert(job.pgid.as_raw(), job);
    }
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    pub fn begin_launch(&self) -> LaunchGuard<'_> {
        LaunchGuard {
            inner: self.inner.lock(),
        }
    }

    /// Apply one observed child status change to the owning job. The reaped
    /// pid need not be the group leader; it maps to its job by membership.
    /// Statuses for untracked pids are a logged anomaly, nothing more.
    pub fn apply(&self, pid: Pid, state: ProcessState) {
        let mut inner = self.inner.lock();
        let Some(pgid) = inner
            .jobs
            .values()
            .find(|j| j.contains(pid))
            .map(|j| j.pgid)
        else {
            warn!("status for untracked pid {pid} ({state}); ignored");
            return;
        };

        let notice = {
            let job = inner
                .jobs
                .get_mut(&pgid.as_raw())
                .expect("job vanished under lock");
            let old = job.state();
            job.set_state(pid, state);
            let new = job.state();
            if new == old {
                None
            } else {
                debug!(
                    "job [{}] pgid:{} state {old} -> {new}",
                    job.job_id, job.pgid
                );
                let announce = match new {
                    // stops are always announced; a continue only when it
                    // undoes an observed stop; completions only for jobs the
                    // main flow is not already waiting on
                    ProcessState::Stopped(_, _) => true,
                    ProcessState::Running => old.is_stopped(),
                    ProcessState::Completed(_, _) => !job.foreground,
                };
                announce.then(|| JobNotice {
                    job_id: job.job_id,
                    pid: job.pgid,
                    state: new,
                    cmd: job.cmd.clone(),
                })
            }
        };

        if let Some(notice) = notice {
            inner.notices.push(notice);
        }
        drop(inner);
        self.cond.notify_all();
    }

    pub fn state_of(&self, pgid: Pid) -> Option<ProcessState> {
        let inner = self.inner.lock();
        inner.jobs.get(&pgid.as_raw()).map(|j| j.state())
    }

    pub fn remove(&self, pgid: Pid) -> Option<Job> {
        let mut inner = self.inner.lock();
        inner.jobs.remove(&pgid.as_raw())
    }

    pub fn set_foreground(&self, pgid: Pid, foreground: bool) {
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.get_mut(&pgid.as_raw()) {
            job.foreground = foreground;
        }
    }

    /// Flip every stopped member of the job to running and classify it
    /// foreground/background. Done before SIGCONT so a racing continue
    /// status observes no transition.
    pub fn mark_running(&self, pgid: Pid, foreground: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(&pgid.as_raw()) {
            Some(job) => {
                job.mark_running();
                job.foreground = foreground;
                true
            }
            None => false,
        }
    }

    /// Look up a job by user spec: `%n` (or a bare number) matches a job id
    /// first, then a raw pgid. Jobs already finished but not yet reclaimed
    /// are not addressable; their process group no longer exists.
    pub fn find_pgid(&self, spec: &str) -> Option<Pid> {
        let digits = spec.strip_prefix('%').unwrap_or(spec);
        let n: i64 = digits.parse().ok()?;
        let inner = self.inner.lock();
        if let Some(job) = inner
            .jobs
            .values()
            .find(|j| j.job_id == n as usize && !j.state().is_completed())
        {
            return Some(job.pgid);
        }
        inner
            .jobs
            .get(&(n as i32))
            .filter(|j| !j.state().is_completed())
            .map(|j| j.pgid)
    }

    /// The default job for `fg`/`bg` with no argument: the most recently
    /// launched live one.
    pub fn current_pgid(&self) -> Option<Pid> {
        let inner = self.inner.lock();
        inner
            .jobs
            .values()
            .filter(|j| !j.state().is_completed())
            .max_by_key(|j| j.job_id)
            .map(|j| j.pgid)
    }

    /// `jobs` output: one line per live job, ascending job id. Idempotent
    /// while no state changes.
    pub fn job_lines(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut jobs: Vec<&Job> = inner
            .jobs
            .values()
            .filter(|j| !j.state().is_completed())
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs.iter()
            .map(|j| format_line(j.job_id, j.pgid, j.state(), &j.cmd))
            .collect()
    }

    /// The display line for one job, if it is still tracked.
    pub fn line_for(&self, pgid: Pid) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .jobs
            .get(&pgid.as_raw())
            .map(|j| format_line(j.job_id, j.pgid, j.state(), &j.cmd))
    }

    /// Count of jobs that have not finished (running or stopped).
    pub fn live_jobs(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .jobs
            .values()
            .filter(|j| !j.state().is_completed())
            .count()
    }

    /// Drain pending announcements and reclaim jobs whose completion has now
    /// been reported. Each transition is delivered exactly once.
    pub fn take_notices(&self) -> Vec<JobNotice> {
        let mut inner = self.inner.lock();
        let notices = std::mem::take(&mut inner.notices);
        inner.jobs.retain(|_, j| !j.state().is_completed());
        notices
    }

    /// Park until the reaper applies a status or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        let _ = self.cond.wait_for(&mut inner, timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::process::Process;
    use nix::sys::signal::Signal;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn insert_job(table: &JobTable, pgid: i32, stages: &[i32], foreground: bool) -> usize {
        let mut launch = table.begin_launch();
        let job_id = launch.next_job_id();
        let processes: Vec<Process> = stages
            .iter()
            .map(|pid| {
                let mut p = Process::new("/bin/sleep".to_string(), vec!["sleep".to_string()]);
                p.pid = Some(Pid::from_raw(*pid));
                p
            })
            .collect();
        launch.insert(Job::new(
            job_id,
            Pid::from_raw(pgid),
            format!("sleep {pgid}"),
            foreground,
            processes,
        ));
        job_id
    }

    #[test]
    fn test_job_ids_increase_and_reuse_after_reclaim() {
        init();
        let table = JobTable::new();
        assert_eq!(insert_job(&table, 100, &[100], false), 1);
        assert_eq!(insert_job(&table, 200, &[200], false), 2);

        table.apply(Pid::from_raw(100), ProcessState::Completed(0, None));
        // id 2 still live, so the next id must not collide
        table.take_notices();
        assert_eq!(insert_job(&table, 300, &[300], false), 3);

        table.apply(Pid::from_raw(200), ProcessState::Completed(0, None));
        table.apply(Pid::from_raw(300), ProcessState::Completed(0, None));
        table.take_notices();
        // table drained: small ids are reclaimed
        assert_eq!(insert_job(&table, 400, &[400], false), 1);
    }

    #[test]
    fn test_apply_maps_member_pid_to_job() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100, 101], false);

        // non-leader member completes; job still running
        table.apply(Pid::from_raw(101), ProcessState::Completed(0, None));
        assert!(
            table
                .state_of(Pid::from_raw(100))
                .unwrap()
                .is_running()
        );

        table.apply(Pid::from_raw(100), ProcessState::Completed(0, None));
        assert!(
            table
                .state_of(Pid::from_raw(100))
                .unwrap()
                .is_completed()
        );
    }

    #[test]
    fn test_untracked_pid_is_ignored() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], false);
        table.apply(Pid::from_raw(9999), ProcessState::Completed(0, None));
        assert_eq!(table.live_jobs(), 1);
        assert!(table.take_notices().is_empty());
    }

    #[test]
    fn test_background_done_notice_exactly_once() {
        init();
        let table = JobTable::new();
        let job_id = insert_job(&table, 100, &[100], false);

        table.apply(Pid::from_raw(100), ProcessState::Completed(0, None));
        let notices = table.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].job_id, job_id);
        assert!(notices[0].state.is_completed());
        assert_eq!(notices[0].to_string(), "[1] (100) done\tsleep 100");

        // reported and reclaimed: nothing left
        assert!(table.take_notices().is_empty());
        assert_eq!(table.live_jobs(), 0);
        assert!(table.state_of(Pid::from_raw(100)).is_none());
    }

    #[test]
    fn test_foreground_completion_is_not_announced() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], true);
        table.apply(Pid::from_raw(100), ProcessState::Completed(0, None));
        assert!(table.take_notices().is_empty());
    }

    #[test]
    fn test_stop_and_continue_notices() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], false);

        table.apply(
            Pid::from_raw(100),
            ProcessState::Stopped(Pid::from_raw(100), Signal::SIGTSTP),
        );
        let notices = table.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].state.is_stopped());

        // an asynchronous continue is announced too
        table.apply(Pid::from_raw(100), ProcessState::Running);
        let notices = table.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].state.is_running());
    }

    #[test]
    fn test_mark_running_suppresses_continue_notice() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], false);
        table.apply(
            Pid::from_raw(100),
            ProcessState::Stopped(Pid::from_raw(100), Signal::SIGSTOP),
        );
        table.take_notices();

        // bg builtin resumes the job synchronously before SIGCONT
        assert!(table.mark_running(Pid::from_raw(100), false));
        table.apply(Pid::from_raw(100), ProcessState::Running);
        assert!(table.take_notices().is_empty());
    }

    #[test]
    fn test_job_lines_sorted_and_idempotent() {
        init();
        let table = JobTable::new();
        insert_job(&table, 300, &[300], false);
        insert_job(&table, 100, &[100], false);

        let first = table.job_lines();
        assert_eq!(first.len(), 2);
        assert!(first[0].starts_with("[1] "));
        assert!(first[1].starts_with("[2] "));
        assert_eq!(first, table.job_lines());
    }

    #[test]
    fn test_find_pgid_by_spec() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], false);
        insert_job(&table, 200, &[200], false);

        assert_eq!(table.find_pgid("%2"), Some(Pid::from_raw(200)));
        assert_eq!(table.find_pgid("1"), Some(Pid::from_raw(100)));
        // bare pgid works when it does not collide with a job id
        assert_eq!(table.find_pgid("200"), Some(Pid::from_raw(200)));
        assert_eq!(table.find_pgid("%9"), None);
        assert_eq!(table.find_pgid("bogus"), None);

        assert_eq!(table.current_pgid(), Some(Pid::from_raw(200)));
    }

    #[test]
    fn test_find_pgid_skips_finished_jobs() {
        init();
        let table = JobTable::new();
        insert_job(&table, 100, &[100], false);
        table.apply(Pid::from_raw(100), ProcessState::Completed(0, None));

        // done but not yet reclaimed: no longer addressable by fg/bg
        assert_eq!(table.find_pgid("%1"), None);
        assert_eq!(table.find_pgid("100"), None);
        assert_eq!(table.current_pgid(), None);
    }
}
