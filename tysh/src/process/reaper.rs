use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use super::table::JobTable;
use super::wait::wait_any_nohang;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drain every currently pending child status change into the table.
/// Returns how many were applied. Shared by the reaper thread and the
/// foreground wait loop; the table serializes the two.
pub fn drain_statuses(table: &JobTable) -> usize {
    let mut applied = 0;
    while let Some((pid, state)) = wait_any_nohang() {
        table.apply(pid, state);
        applied += 1;
    }
    applied
}

/// Background collector of child status changes. Runs for the life of the
/// shell and keeps the job table current while the main flow is busy, so
/// background jobs never linger as zombies.
#[derive(Debug)]
pub struct Reaper {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn(table: Arc<JobTable>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("tysh-reaper".to_string())
            .spawn(move || {
                debug!("reaper started");
                while !stop.load(Ordering::Acquire) {
                    drain_statuses(&table);
                    thread::park_timeout(POLL_INTERVAL);
                }
                debug!("reaper stopped");
            })
            .expect("failed to spawn reaper thread");
        Reaper {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn test_drain_without_children() {
        init();
        let table = JobTable::new();
        assert_eq!(drain_statuses(&table), 0);
    }

    #[test]
    fn test_reaper_shutdown_joins() {
        init();
        let table = Arc::new(JobTable::new());
        let mut reaper = Reaper::spawn(Arc::clone(&table));
        reaper.shutdown();
        // idempotent
        reaper.shutdown();
    }
}
