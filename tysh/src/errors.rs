use tracing::debug;
use tysh_types::ShellError;

use crate::shell::APP_NAME;

/// Display an error in a user-friendly format without stack traces.
///
/// Lookup failures already name the offending word in their message; system
/// errors get the shell name prefixed so the source is unambiguous.
pub fn display_user_error(err: &ShellError) {
    match err {
        ShellError::NotFound(_) | ShellError::NoSuchJob(_) => {
            debug!("user error: {err}");
            eprintln!("{APP_NAME}: {err}");
        }
        _ => {
            eprintln!("{APP_NAME}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn test_messages_name_the_offending_word() {
        init();
        let err = ShellError::NotFound("frobnicate".to_string());
        assert_eq!(err.to_string(), "frobnicate: command not found");

        let err = ShellError::NoSuchJob("%7".to_string());
        assert_eq!(err.to_string(), "%7: no such job");
    }
}
