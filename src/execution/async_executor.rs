//! Async command execution on tokio.
//!
//! Children are spawned with `kill_on_drop(true)`: dropping a pending
//! [`AsyncExecutor::run`] future or a [`LineStream`] kills the child.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::command::CommandSpec;
use super::options::{Listeners, RunOptions};
use super::outcome::OutcomePolicy;
use super::process::{exit_code_of, start_kill, terminate, Launcher};
use super::result::ProcessResult;
use super::state::ExecState;
use crate::config::{Config, ExecSettings};
use crate::diagnostics::DiagnosticSink;
use crate::env::EnvProvider;
use crate::error::{ExecError, Result};
use crate::output::{AsyncOutputMultiplexer, BoxedAsyncReader, CapturedOutput, StreamLine};

/// Runs commands on the tokio runtime.
///
/// Same contract as [`SyncExecutor`](super::SyncExecutor); the caller's task
/// is suspended instead of blocked.
#[derive(Debug, Clone, Default)]
pub struct AsyncExecutor {
    launcher: Launcher,
}

impl AsyncExecutor {
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

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.launcher.sink = Arc::new(sink);
        self
    }

    pub fn with_env(mut self, env: impl EnvProvider + 'static) -> Self {
        self.launcher.env = Arc::new(env);
        self
    }

    pub fn settings(&self) -> &ExecSettings {
        &self.launcher.settings
    }

    pub fn default_options(&self) -> RunOptions {
        self.launcher.default_options()
    }

    /// Run `spec` to completion.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ProcessResult> {
        self.run_with(spec, &mut Listeners::new(), &self.default_options())
            .await
    }

    /// Run `spec` to completion, calling `listeners` for each output line.
    pub async fn run_with(
        &self,
        spec: &CommandSpec,
        listeners: &mut Listeners,
        options: &RunOptions,
    ) -> Result<ProcessResult> {
        if options.dry_run {
            return Ok(self.launcher.dry_run(spec, options));
        }

        let mut run = AsyncRun::spawn(&self.launcher, spec, options)?;
        while let Some(line) = run.next_line().await {
            listeners.dispatch(&line?);
        }
        run.finish().await
    }

    /// Lazily run `spec`, yielding output lines as they are polled.
    ///
    /// Nothing is spawned or echoed until the stream is first polled. A dry
    /// run echoes the command on that poll and yields no lines.
    pub fn stream(&self, spec: &CommandSpec) -> LineStream {
        self.stream_with(spec, &self.default_options())
    }

    pub fn stream_with(&self, spec: &CommandSpec, options: &RunOptions) -> LineStream {
        let command = spec.command_line();
        let start = StreamState::Pending {
            launcher: self.launcher.clone(),
            spec: spec.clone(),
            options: *options,
        };
        LineStream {
            command,
            inner: stream::unfold(start, advance_stream).fuse().boxed(),
        }
    }
}

/// One running invocation.
struct AsyncRun {
    child: Option<Child>,
    mux: AsyncOutputMultiplexer,
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
    finished: bool,
}

impl AsyncRun {
    fn spawn(launcher: &Launcher, spec: &CommandSpec, options: &RunOptions) -> Result<Self> {
        let command = spec.command_line();
        let mut state = ExecState::Created;
        launcher.echo(options, &format!("Executing: {}", command));

        state.advance(ExecState::Spawning, &command);
        let mut cmd = Command::from(launcher.command(spec));
        cmd.kill_on_drop(true);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                state.advance(ExecState::SpawnFailed, &command);
                state.advance(ExecState::Resolved, &command);
                debug!("spawn failed for {}: {}", command, source);
                return Err(ExecError::SpawnFailed { command, source });
            }
        };
        let started = Instant::now();
        debug!(pid = ?child.id(), "spawned {}", command);

        let stdin_writer = match (child.stdin.take(), spec.stdin()) {
            (Some(mut stdin), Some(input)) => {
                let input = input.to_vec();
                Some(tokio::spawn(async move {
                    stdin.write_all(&input).await?;
                    stdin.shutdown().await
                }))
            }
            _ => None,
        };

        let mux = AsyncOutputMultiplexer::new(
            child.stdout.take().map(|s| Box::new(s) as BoxedAsyncReader),
            child.stderr.take().map(|s| Box::new(s) as BoxedAsyncReader),
        );

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
            finished: false,
        })
    }

    /// Wait for the next line, racing the output against the deadline.
    async fn next_line(&mut self) -> Option<Result<StreamLine>> {
        if self.finished || self.state != ExecState::Running {
            return None;
        }

        let deadline = self.deadline;
        let next = match deadline {
            Some(deadline) => tokio::select! {
                next = self.mux.next_line() => Some(next),
                _ = time::sleep_until(deadline) => None,
            },
            None => Some(self.mux.next_line().await),
        };

        match next {
            Some(Some(Ok(line))) => {
                trace!("{}", line);
                self.captured.push(&line);
                self.launcher.echo(&self.options, &line.to_string());
                Some(Ok(line))
            }
            Some(None) => {
                self.state.advance(ExecState::Draining, &self.command);
                None
            }
            Some(Some(Err(e))) => {
                self.abort().await;
                Some(Err(ExecError::Io(e)))
            }
            None => Some(Err(self.time_out().await)),
        }
    }

    async fn finish(&mut self) -> Result<ProcessResult> {
        while let Some(line) = self.next_line().await {
            line?;
        }
        self.finished = true;

        let deadline = self.deadline;
        let Some(child) = self.child.as_mut() else {
            return Err(ExecError::Io(io::Error::other(format!(
                "process already terminated: {}",
                self.command
            ))));
        };
        let waited = match deadline {
            Some(deadline) => time::timeout_at(deadline, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };
        let status = match waited {
            Some(status) => status?,
            None => return Err(self.time_out().await),
        };
        self.child = None;
        self.state.advance(ExecState::Terminated, &self.command);

        if let Some(writer) = self.stdin_writer.take() {
            writer.await.map_err(io::Error::other)??;
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

    async fn time_out(&mut self) -> ExecError {
        self.finished = true;
        self.state.advance(ExecState::TimedOut, &self.command);
        self.stop_stdin();
        if let Some(mut child) = self.child.take() {
            debug!(pid = ?child.id(), "timed out, terminating {}", self.command);
            let grace = self.launcher.settings.kill_grace;
            terminate(&mut child, grace).await;
        }
        self.state.advance(ExecState::Terminated, &self.command);

        let drain_window = self.launcher.settings.drain_window;
        let mux = &mut self.mux;
        let captured = &mut self.captured;
        let _ = time::timeout(drain_window, async {
            while let Some(Ok(line)) = mux.next_line().await {
                captured.push(&line);
            }
        })
        .await;
        self.state.advance(ExecState::Resolved, &self.command);

        ExecError::Timeout {
            command: self.command.clone(),
            timeout: self.timeout.unwrap_or_default(),
            stdout: self.captured.stdout.clone(),
            stderr: self.captured.stderr.clone(),
        }
    }

    async fn abort(&mut self) {
        self.finished = true;
        self.stop_stdin();
        if let Some(mut child) = self.child.take() {
            let grace = self.launcher.settings.kill_grace;
            terminate(&mut child, grace).await;
        }
        self.state.advance(ExecState::Terminated, &self.command);
        self.state.advance(ExecState::Resolved, &self.command);
    }

    fn stop_stdin(&mut self) {
        if let Some(writer) = self.stdin_writer.take() {
            writer.abort();
        }
    }
}

impl Drop for AsyncRun {
    fn drop(&mut self) {
        self.stop_stdin();
        // kill_on_drop only reaches the child itself.
        if let Some(child) = self.child.as_mut() {
            if self.state.has_live_child() {
                debug!(pid = ?child.id(), "run dropped, killing {}", self.command);
                start_kill(child);
            }
        }
    }
}

enum StreamState {
    Pending {
        launcher: Launcher,
        spec: CommandSpec,
        options: RunOptions,
    },
    Running(Box<AsyncRun>),
    Done,
}

async fn advance_stream(state: StreamState) -> Option<(Result<StreamLine>, StreamState)> {
    let run = match state {
        StreamState::Pending {
            launcher,
            spec,
            options,
        } if options.dry_run => {
            launcher.dry_run(&spec, &options);
            return None;
        }
        StreamState::Pending {
            launcher,
            spec,
            options,
        } => match AsyncRun::spawn(&launcher, &spec, &options) {
            Ok(run) => Box::new(run),
            Err(e) => return Some((Err(e), StreamState::Done)),
        },
        StreamState::Running(run) => run,
        StreamState::Done => return None,
    };
    next_stream_item(run).await
}

async fn next_stream_item(mut run: Box<AsyncRun>) -> Option<(Result<StreamLine>, StreamState)> {
    if let Some(item) = run.next_line().await {
        let next = if item.is_ok() {
            StreamState::Running(run)
        } else {
            StreamState::Done
        };
        return Some((item, next));
    }
    match run.finish().await {
        Ok(_) => None,
        Err(e) => Some((Err(e), StreamState::Done)),
    }
}

/// Lazy stream of a command's output lines.
///
/// The child is spawned on the first poll and reaped after the last line.
/// A failing outcome is yielded as a final `Err`. Dropping the stream
/// early kills the child.
pub struct LineStream {
    command: String,
    inner: BoxStream<'static, Result<StreamLine>>,
}

impl LineStream {
    /// The composed command line.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Stream for LineStream {
    type Item = Result<StreamLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Run a program with arguments using a default executor.
pub async fn run_async<I, S>(program: &str, args: I) -> Result<ProcessResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let spec = CommandSpec::new(program, args)?;
    AsyncExecutor::new().run(&spec).await
}

/// Run a program and return its stdout. Fails on a non-zero exit code.
pub async fn output_async<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_async(program, args).await.map(|result| result.stdout)
}
