//! Blocking command execution.

use std::io::{self, Write};
use std::process::{Child, ChildStdin};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::command::CommandSpec;
use super::options::{Listeners, RunOptions};
use super::outcome::OutcomePolicy;
use super::process::{exit_code_of, kill_blocking, terminate_blocking, Launcher, POLL_INTERVAL};
use super::result::ProcessResult;
use super::state::ExecState;
use crate::config::{Config, ExecSettings};
use crate::diagnostics::DiagnosticSink;
use crate::env::EnvProvider;
use crate::error::{ExecError, Result};
use crate::output::{BoxedReader, CapturedOutput, NextLine, OutputMultiplexer, StreamLine};

/// Runs commands to completion on the calling thread.
///
/// Cheap to clone; holds no per-invocation state.
#[derive(Debug, Clone, Default)]
pub struct SyncExecutor {
    launcher: Launcher,
}

impl SyncExecutor {
    /// Create an executor with default settings, a tracing sink and the
    /// process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new().with_settings(config.exec_settings())
    }

    pub fn with_settings(mut self, settings: ExecSettings) -> Self {
        self.launcher.settings = settings;
        self
    }

    /// Send diagnostic lines to `sink`.
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.launcher.sink = std::sync::Arc::new(sink);
        self
    }

    /// Resolve configured variables through `env`.
    pub fn with_env(mut self, env: impl EnvProvider + 'static) -> Self {
        self.launcher.env = std::sync::Arc::new(env);
        self
    }

    pub fn settings(&self) -> &ExecSettings {
        &self.launcher.settings
    }

    /// Options used by [`run`](Self::run) and [`stream`](Self::stream).
    pub fn default_options(&self) -> RunOptions {
        self.launcher.default_options()
    }

    /// Run `spec` to completion.
    pub fn run(&self, spec: &CommandSpec) -> Result<ProcessResult> {
        self.run_with(spec, &mut Listeners::new(), &self.default_options())
    }

    /// Run `spec` to completion, calling `listeners` for each output line.
    ///
    /// Blocks until the process exits or its timeout elapses. On timeout the
    /// child is terminated and reaped before [`ExecError::Timeout`] is
    /// returned.
    pub fn run_with(
        &self,
        spec: &CommandSpec,
        listeners: &mut Listeners,
        options: &RunOptions,
    ) -> Result<ProcessResult> {
        if options.dry_run {
            return Ok(self.launcher.dry_run(spec, options));
        }

        let mut lines = StreamLines::spawn(&self.launcher, spec, options)?;
        while let Some(line) = lines.next_line() {
            listeners.dispatch(&line?);
        }
        lines.finish()
    }

    /// Start `spec` and iterate over its output lines as they arrive.
    pub fn stream(&self, spec: &CommandSpec) -> Result<StreamLines> {
        self.stream_with(spec, &self.default_options())
    }

    /// Like [`stream`](Self::stream) with explicit options. A dry run yields
    /// no lines.
    pub fn stream_with(&self, spec: &CommandSpec, options: &RunOptions) -> Result<StreamLines> {
        if options.dry_run {
            self.launcher.dry_run(spec, options);
            return Ok(StreamLines::empty(spec));
        }
        StreamLines::spawn(&self.launcher, spec, options)
    }
}

/// Blocking iterator over a running command's output.
///
/// Yields lines from stdout and stderr in arrival order. After the last
/// line the child is reaped, and a final `Err` is yielded if the command
/// failed or timed out. Dropping the iterator early kills and reaps the
/// child.
pub struct StreamLines {
    child: Option<Child>,
    mux: OutputMultiplexer,
    stdin_writer: Option<JoinHandle<io::Result<()>>>,
    captured: CapturedOutput,
    command: String,
    policy: OutcomePolicy,
    options: RunOptions,
    launcher: Launcher,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    started: Instant,
    state: ExecState,
    spawned: bool,
    finished: bool,
}

impl StreamLines {
    fn spawn(launcher: &Launcher, spec: &CommandSpec, options: &RunOptions) -> Result<Self> {
        let command = spec.command_line();
        let mut state = ExecState::Created;
        launcher.echo(options, &format!("Executing: {}", command));

        state.advance(ExecState::Spawning, &command);
        let mut child = match launcher.command(spec).spawn() {
            Ok(child) => child,
            Err(source) => {
                state.advance(ExecState::SpawnFailed, &command);
                state.advance(ExecState::Resolved, &command);
                debug!("spawn failed for {}: {}", command, source);
                return Err(ExecError::SpawnFailed { command, source });
            }
        };
        let started = Instant::now();
        debug!(pid = child.id(), "spawned {}", command);

        let stdin_writer = match (child.stdin.take(), spec.stdin()) {
            (Some(stdin), Some(input)) => match spawn_stdin_writer(stdin, input.to_vec()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    terminate_blocking(&mut child, launcher.settings.kill_grace);
                    return Err(ExecError::Io(e));
                }
            },
            _ => None,
        };

        let stdout = child.stdout.take().map(|s| Box::new(s) as BoxedReader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as BoxedReader);
        let mux = match OutputMultiplexer::new(stdout, stderr) {
            Ok(mux) => mux,
            Err(e) => {
                terminate_blocking(&mut child, launcher.settings.kill_grace);
                return Err(ExecError::Io(e));
            }
        };

        state.advance(ExecState::Running, &command);
        let timeout = launcher.timeout_for(spec);

        Ok(Self {
            child: Some(child),
            mux,
            stdin_writer,
            captured: CapturedOutput::default(),
            command,
            policy: OutcomePolicy::of(spec),
            options: *options,
            launcher: launcher.clone(),
            timeout,
            deadline: timeout.map(|t| started + t),
            started,
            state,
            spawned: true,
            finished: false,
        })
    }

    fn empty(spec: &CommandSpec) -> Self {
        Self {
            child: None,
            mux: OutputMultiplexer::closed(),
            stdin_writer: None,
            captured: CapturedOutput::default(),
            command: spec.command_line(),
            policy: OutcomePolicy::of(spec),
            options: RunOptions::default(),
            launcher: Launcher::default(),
            timeout: None,
            deadline: None,
            started: Instant::now(),
            state: ExecState::Resolved,
            spawned: false,
            finished: true,
        }
    }

    /// The composed command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Output captured so far.
    pub fn captured(&self) -> &CapturedOutput {
        &self.captured
    }

    /// Block for the next line. `None` once both streams are closed.
    ///
    /// A timeout or read error is returned as `Some(Err(..))`; the child is
    /// terminated before it is returned and nothing follows it.
    pub fn next_line(&mut self) -> Option<Result<StreamLine>> {
        if self.finished || self.state != ExecState::Running {
            return None;
        }

        match self.mux.next_line_until(self.deadline) {
            Ok(NextLine::Line(line)) => {
                trace!("{}", line);
                self.captured.push(&line);
                self.launcher.echo(&self.options, &line.to_string());
                Some(Ok(line))
            }
            Ok(NextLine::Done) => {
                self.state.advance(ExecState::Draining, &self.command);
                None
            }
            Ok(NextLine::TimedOut) => Some(Err(self.time_out())),
            Err(e) => {
                self.abort();
                Some(Err(ExecError::Io(e)))
            }
        }
    }

    /// Drain any remaining output, reap the child and apply the outcome
    /// policy.
    pub fn finish(mut self) -> Result<ProcessResult> {
        self.finish_inner()
    }

    fn finish_inner(&mut self) -> Result<ProcessResult> {
        while let Some(line) = self.next_line() {
            line?;
        }
        self.finished = true;

        let Some(child) = self.child.as_mut() else {
            if self.spawned {
                return Err(ExecError::Io(io::Error::other(format!(
                    "process already terminated: {}",
                    self.command
                ))));
            }
            return Ok(ProcessResult::new(
                0,
                String::new(),
                String::new(),
                self.command.clone(),
            ));
        };

        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if self.deadline.is_some_and(|d| Instant::now() >= d) => {
                    return Err(self.time_out());
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };
        self.child = None;
        self.state.advance(ExecState::Terminated, &self.command);

        if let Some(writer) = self.stdin_writer.take() {
            writer
                .join()
                .map_err(|_| io::Error::other("stdin writer panicked"))??;
        }

        let exit_code = exit_code_of(status);
        let duration = self.started.elapsed();
        debug!(exit_code, ?duration, "finished {}", self.command);
        self.state.advance(ExecState::Resolved, &self.command);

        let captured = std::mem::take(&mut self.captured);
        let result = ProcessResult::new(
            exit_code,
            captured.stdout,
            captured.stderr,
            self.command.clone(),
        )
        .with_duration(duration);
        self.policy.evaluate(result)
    }

    /// Terminate after the deadline passed and build the timeout error.
    fn time_out(&mut self) -> ExecError {
        self.finished = true;
        self.state.advance(ExecState::TimedOut, &self.command);
        if let Some(mut child) = self.child.take() {
            debug!(pid = child.id(), "timed out, terminating {}", self.command);
            terminate_blocking(&mut child, self.launcher.settings.kill_grace);
        }
        self.state.advance(ExecState::Terminated, &self.command);

        // The write end is closed now; keep whatever was still in flight.
        let drain_deadline = Instant::now() + self.launcher.settings.drain_window;
        while let Ok(NextLine::Line(line)) = self.mux.next_line_until(Some(drain_deadline)) {
            self.captured.push(&line);
        }
        self.state.advance(ExecState::Resolved, &self.command);

        ExecError::Timeout {
            command: self.command.clone(),
            timeout: self.timeout.unwrap_or_default(),
            stdout: self.captured.stdout.clone(),
            stderr: self.captured.stderr.clone(),
        }
    }

    fn abort(&mut self) {
        self.finished = true;
        if let Some(mut child) = self.child.take() {
            terminate_blocking(&mut child, self.launcher.settings.kill_grace);
        }
        self.state.advance(ExecState::Terminated, &self.command);
        self.state.advance(ExecState::Resolved, &self.command);
    }
}

impl Iterator for StreamLines {
    type Item = Result<StreamLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.next_line() {
            return Some(item);
        }
        if self.finished {
            return None;
        }
        self.finish_inner().err().map(Err)
    }
}

impl Drop for StreamLines {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if self.state.has_live_child() && matches!(child.try_wait(), Ok(None)) {
            debug!(pid = child.id(), "stream dropped, killing {}", self.command);
            kill_blocking(&mut child);
        }
        let _ = child.wait();
    }
}

fn spawn_stdin_writer(
    mut stdin: ChildStdin,
    input: Vec<u8>,
) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("procexec-stdin".into())
        .spawn(move || {
            stdin.write_all(&input)?;
            stdin.flush()
            // stdin is dropped here, closing the pipe
        })
}

/// Run a program with arguments using a default executor.
pub fn run<I, S>(program: &str, args: I) -> Result<ProcessResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SyncExecutor::new().run(&CommandSpec::new(program, args)?)
}

/// Run a program and return its stdout. Fails on a non-zero exit code.
pub fn output<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run(program, args).map(|result| result.stdout)
}

/// Run a command line through the platform shell.
pub fn shell(command_line: &str) -> Result<ProcessResult> {
    SyncExecutor::new().run(&CommandSpec::shell(command_line)?)
}
