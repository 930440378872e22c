use super::ShellProxy;
use tysh_types::{Context, ExitStatus};

/// `jobs` lists the live entries of the shell's job table, ascending by id.
/// The table lives in the shell, so this is a pure dispatch.
pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    if let Err(err) = proxy.dispatch(ctx, "jobs", argv) {
        ctx.write_stderr(&format!("jobs: {err}")).ok();
        return ExitStatus::ExitedWith(1);
    }
    ExitStatus::ExitedWith(0)
}
