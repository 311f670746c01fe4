//! Command building and representation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ExecError, Result};

/// Immutable description of a single process invocation.
///
/// Built through [`CommandSpec::new`], [`CommandSpec::shell`] or
/// [`CommandSpec::builder`]; all of them reject an empty program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    arguments: Vec<String>,
    working_directory: Option<PathBuf>,
    environment: BTreeMap<String, String>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    shell_mode: bool,
    capture_output: bool,
    fail_on_stderr: bool,
    ignore_exit_code: bool,
}

impl CommandSpec {
    /// Create a command that runs `program` directly with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(program).args(args).build()
    }

    /// Create a command handed verbatim to the platform shell.
    pub fn shell(command_line: impl Into<String>) -> Result<Self> {
        Self::builder(command_line).shell_mode(true).build()
    }

    /// Start building a command for `program`.
    pub fn builder(program: impl Into<String>) -> CommandSpecBuilder {
        CommandSpecBuilder::new(program)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Environment overrides, merged over the inherited environment.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn shell_mode(&self) -> bool {
        self.shell_mode
    }

    pub fn capture_output(&self) -> bool {
        self.capture_output
    }

    pub fn fail_on_stderr(&self) -> bool {
        self.fail_on_stderr
    }

    pub fn ignore_exit_code(&self) -> bool {
        self.ignore_exit_code
    }

    /// Derive a copy of this command that is fed `input` on stdin.
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The human-readable command line.
    ///
    /// In shell mode this is exactly the string handed to the shell.
    /// Otherwise each word is quoted the way a POSIX shell would need it.
    pub fn command_line(&self) -> String {
        if self.shell_mode {
            return std::iter::once(self.program.as_str())
                .chain(self.arguments.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
        }
        std::iter::once(self.program.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .map(quote_word)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_simple_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            matches!(c,
                'a'..='z' | 'A'..='Z' | '0'..='9'
                | '_' | '-' | '.' | '/' | ':' | '+' | '%' | '@' | '=' | ',')
        })
}

fn quote_word(s: &str) -> String {
    if is_simple_word(s) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Builder for [`CommandSpec`].
#[derive(Debug)]
pub struct CommandSpecBuilder {
    spec: CommandSpec,
}

impl CommandSpecBuilder {
    /// Create a builder for `program` with default options.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            spec: CommandSpec {
                program: program.into(),
                arguments: Vec::new(),
                working_directory: None,
                environment: BTreeMap::new(),
                stdin: None,
                timeout: None,
                shell_mode: false,
                capture_output: true,
                fail_on_stderr: false,
                ignore_exit_code: false,
            },
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.arguments.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_directory = Some(dir.into());
        self
    }

    /// Add an environment variable override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.environment.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variable overrides.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.spec.environment.insert(k.into(), v.into());
        }
        self
    }

    /// Set the bytes written to the child's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.spec.stdin = Some(input.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.spec.timeout = Some(duration);
        self
    }

    /// Hand the command line to the platform shell instead of running it directly.
    pub fn shell_mode(mut self, enabled: bool) -> Self {
        self.spec.shell_mode = enabled;
        self
    }

    /// Set whether to capture output. When disabled the child inherits stdout/stderr.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.spec.capture_output = capture;
        self
    }

    /// Treat any stderr output as a failure.
    pub fn fail_on_stderr(mut self, enabled: bool) -> Self {
        self.spec.fail_on_stderr = enabled;
        self
    }

    /// Report non-zero exit codes in the result instead of failing.
    pub fn ignore_exit_code(mut self, enabled: bool) -> Self {
        self.spec.ignore_exit_code = enabled;
        self
    }

    /// Build the command.
    ///
    /// Fails with [`ExecError::InvalidCommand`] if the program name is blank.
    pub fn build(self) -> Result<CommandSpec> {
        if self.spec.program.trim().is_empty() {
            return Err(ExecError::InvalidCommand("program name is empty".into()));
        }
        Ok(self.spec)
    }
}
