pub mod command;
pub mod errors;
pub mod path;
pub mod process;
pub mod shell;

pub use command::{Command, OutputMode, Pipeline};
pub use process::{Job, JobNotice, JobTable, ProcessState};
pub use shell::{APP_NAME, SHELL_TERMINAL, Shell};
pub use tysh_types::{Context, ExitStatus, ShellError, ShellResult};
