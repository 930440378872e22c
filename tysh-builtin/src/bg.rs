use super::ShellProxy;
use tysh_types::{Context, ExitStatus};

/// `bg [%n]` resumes a stopped job without giving it the terminal; the shell
/// prints the job's line and keeps the prompt.
pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    let resumed = proxy.dispatch(ctx, "bg", argv);
    match resumed {
        Ok(()) => ExitStatus::ExitedWith(0),
        Err(err) => {
            ctx.write_stderr(&format!("bg: {err}")).ok();
            ExitStatus::ExitedWith(1)
        }
    }
}
