use tysh_types::{ShellError, ShellResult};

/// How an output redirection opens its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Truncate,
    Append,
}

/// One parsed command: argv plus optional redirection targets. Produced by an
/// external parser; immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<(String, OutputMode)>,
}

impl Command {
    pub fn new<S: Into<String>>(argv: Vec<S>) -> Self {
        Command {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin_file: None,
            stdout_file: None,
        }
    }

    /// The program or builtin name (argv[0]).
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// One or more commands chained stdout-to-stdin, launched as a single
/// process group. Input redirection is only legal on the first stage and
/// output redirection on the last; both are checked at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

impl Pipeline {
    pub fn new(commands: Vec<Command>, background: bool) -> ShellResult<Self> {
        if commands.is_empty() {
            return Err(ShellError::InvalidPipeline("no commands".to_string()));
        }
        let last = commands.len() - 1;
        for (i, cmd) in commands.iter().enumerate() {
            if cmd.name().is_empty() {
                return Err(ShellError::InvalidPipeline(format!(
                    "stage {i} has an empty argv"
                )));
            }
            if i != 0 && cmd.stdin_file.is_some() {
                return Err(ShellError::InvalidPipeline(
                    "input redirection on a non-first stage".to_string(),
                ));
            }
            if i != last && cmd.stdout_file.is_some() {
                return Err(ShellError::InvalidPipeline(
                    "output redirection on a non-last stage".to_string(),
                ));
            }
        }
        Ok(Pipeline {
            commands,
            background,
        })
    }

    /// Convenience constructor for a single command.
    pub fn single(command: Command, background: bool) -> ShellResult<Self> {
        Pipeline::new(vec![command], background)
    }

    /// Human-readable command line, used as the job's display text.
    pub fn display_line(&self) -> String {
        let mut stages: Vec<String> = Vec::with_capacity(self.commands.len());
        for cmd in &self.commands {
            let mut stage = cmd.argv.join(" ");
            if let Some(ref file) = cmd.stdin_file {
                stage.push_str(&format!(" < {file}"));
            }
            if let Some((ref file, mode)) = cmd.stdout_file {
                match mode {
                    OutputMode::Truncate => stage.push_str(&format!(" > {file}")),
                    OutputMode::Append => stage.push_str(&format!(" >> {file}")),
                }
            }
            stages.push(stage);
        }
        let mut line = stages.join(" | ");
        if self.background {
            line.push_str(" &");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_pipeline() {
        assert!(matches!(
            Pipeline::new(vec![], false),
            Err(ShellError::InvalidPipeline(_))
        ));
        assert!(matches!(
            Pipeline::new(vec![Command::new(Vec::<String>::new())], false),
            Err(ShellError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn test_redirection_placement() {
        let mut first = Command::new(vec!["cat"]);
        first.stdin_file = Some("in.txt".to_string());
        let mut last = Command::new(vec!["wc", "-l"]);
        last.stdout_file = Some(("out.txt".to_string(), OutputMode::Truncate));

        assert!(Pipeline::new(vec![first.clone(), last.clone()], false).is_ok());

        // input redirect on the second stage is illegal
        let mut bad = Command::new(vec!["wc"]);
        bad.stdin_file = Some("in.txt".to_string());
        assert!(matches!(
            Pipeline::new(vec![Command::new(vec!["cat"]), bad], false),
            Err(ShellError::InvalidPipeline(_))
        ));

        // output redirect on the first of two stages is illegal
        let mut bad = Command::new(vec!["cat"]);
        bad.stdout_file = Some(("out.txt".to_string(), OutputMode::Append));
        assert!(matches!(
            Pipeline::new(vec![bad, Command::new(vec!["wc"])], false),
            Err(ShellError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn test_display_line() {
        let mut first = Command::new(vec!["sort"]);
        first.stdin_file = Some("data".to_string());
        let mut last = Command::new(vec!["uniq", "-c"]);
        last.stdout_file = Some(("counts".to_string(), OutputMode::Append));

        let pipeline = Pipeline::new(vec![first, last], true).unwrap();
        assert_eq!(
            pipeline.display_line(),
            "sort < data | uniq -c >> counts &"
        );

        let simple = Pipeline::single(Command::new(vec!["ls", "-la"]), false).unwrap();
        assert_eq!(simple.display_line(), "ls -la");
    }
}
