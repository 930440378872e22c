use super::ShellProxy;
use tysh_types::{Context, ExitStatus};

/// `fg [%n]` resumes a job in the foreground and waits for it to stop or
/// finish. With no argument the most recent live job is targeted.
pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    match proxy.dispatch(ctx, "fg", argv) {
        Ok(()) => ExitStatus::ExitedWith(0),
        // typically "no such job"
        Err(err) => {
            ctx.write_stderr(&format!("fg: {err}")).ok();
            ExitStatus::ExitedWith(1)
        }
    }
}
