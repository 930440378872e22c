use anyhow::Result;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use tysh_types::{Context, ExitStatus};

mod bg;
pub mod cd;
mod fg;
mod jobs;

/// Interface builtin commands use to reach back into the shell without a
/// direct dependency on it.
pub trait ShellProxy {
    /// Request shell termination. The shell applies its exit policy (it may
    /// refuse while background jobs remain).
    fn exit_shell(&mut self, ctx: &Context);

    /// Hand a job-control command (`jobs`, `fg`, `bg`) to the shell, which
    /// owns the job table.
    fn dispatch(&mut self, ctx: &Context, cmd: &str, argv: Vec<String>) -> Result<()>;

    /// Change the working directory and update `$PWD`.
    fn changepwd(&mut self, path: &str) -> Result<()>;
}

/// Function signature every builtin conforms to.
pub type BuiltinCommand =
    fn(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus;

/// Registry of builtin commands, keyed by argv[0]. Names not present here
/// fall through to external command resolution.
pub static BUILTIN_COMMAND: Lazy<Mutex<HashMap<&str, BuiltinCommand>>> = Lazy::new(|| {
    let mut builtin = HashMap::new();

    builtin.insert("exit", exit as BuiltinCommand);
    builtin.insert("cd", cd::command as BuiltinCommand);

    // Job control
    builtin.insert("jobs", jobs::command as BuiltinCommand);
    builtin.insert("fg", fg::command as BuiltinCommand);
    builtin.insert("bg", bg::command as BuiltinCommand);

    Mutex::new(builtin)
});

/// Look up a builtin by name.
pub fn get_command(name: &str) -> Option<BuiltinCommand> {
    if let Ok(builtin) = BUILTIN_COMMAND.lock() {
        builtin.get(name).copied()
    } else {
        None
    }
}

/// `exit` builtin. Termination policy lives in the shell.
pub fn exit(ctx: &Context, _argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    debug!("exit command called");
    proxy.exit_shell(ctx);
    ExitStatus::ExitedWith(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn test_registry_contents() {
        init();
        for name in ["exit", "cd", "jobs", "fg", "bg"] {
            assert!(get_command(name).is_some(), "missing builtin {name}");
        }
        assert!(get_command("ls").is_none());
        assert!(get_command("").is_none());
    }
}
