pub mod fork;
pub mod job;
pub mod process;
pub mod reaper;
pub mod signal;
pub mod state;
pub mod table;
pub mod wait;

pub use job::Job;
pub use process::Process;
pub use reaper::{Reaper, drain_statuses};
pub use state::ProcessState;
pub use table::{JobNotice, JobTable};
