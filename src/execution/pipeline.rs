//! Sequential pipelines: each stage's stdout becomes the next stage's stdin.

use std::fmt;

use tracing::debug;

use super::async_executor::AsyncExecutor;
use super::command::CommandSpec;
use super::options::{Listeners, RunOptions};
use super::result::ProcessResult;
use super::sync_executor::SyncExecutor;
use crate::error::{ExecError, Result};

/// An ordered, non-empty list of stages.
///
/// Stages run one after another, not concurrently. Each stage finishes
/// before the next one starts, and its failure flags decide whether the
/// pipeline continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<CommandSpec>,
}

impl Pipeline {
    pub fn new(first: CommandSpec) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Append a stage. Any stdin it carries is replaced by the previous
    /// stage's stdout.
    pub fn pipe(mut self, spec: CommandSpec) -> Self {
        self.stages.push(spec);
        self
    }

    pub fn stages(&self) -> &[CommandSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; a pipeline has at least one stage.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage and return the last stage's result.
    pub fn run(&self, executor: &SyncExecutor) -> Result<ProcessResult> {
        self.run_with(executor, &executor.default_options())
    }

    pub fn run_with(&self, executor: &SyncExecutor, options: &RunOptions) -> Result<ProcessResult> {
        let (first, rest) = self.split()?;
        debug!(stage = 0, "pipeline: {}", first.command_line());
        let mut last = executor.run_with(first, &mut Listeners::new(), options)?;

        for (index, spec) in rest.iter().enumerate() {
            let spec = last.pipe_to(spec.clone());
            debug!(stage = index + 1, "pipeline: {}", spec.command_line());
            last = executor.run_with(&spec, &mut Listeners::new(), options)?;
        }
        Ok(last)
    }

    /// Async version of [`run`](Self::run).
    pub async fn run_async(&self, executor: &AsyncExecutor) -> Result<ProcessResult> {
        self.run_async_with(executor, &executor.default_options())
            .await
    }

    pub async fn run_async_with(
        &self,
        executor: &AsyncExecutor,
        options: &RunOptions,
    ) -> Result<ProcessResult> {
        let (first, rest) = self.split()?;
        debug!(stage = 0, "pipeline: {}", first.command_line());
        let mut last = executor
            .run_with(first, &mut Listeners::new(), options)
            .await?;

        for (index, spec) in rest.iter().enumerate() {
            let spec = last.pipe_to(spec.clone());
            debug!(stage = index + 1, "pipeline: {}", spec.command_line());
            last = executor
                .run_with(&spec, &mut Listeners::new(), options)
                .await?;
        }
        Ok(last)
    }

    fn split(&self) -> Result<(&CommandSpec, &[CommandSpec])> {
        self.stages
            .split_first()
            .ok_or_else(|| ExecError::InvalidCommand("pipeline has no stages".into()))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.stages.iter().map(CommandSpec::command_line).collect();
        write!(f, "{}", lines.join(" | "))
    }
}

/// Build a pipeline from a first stage and the stages that follow it.
pub fn pipe(first: CommandSpec, rest: impl IntoIterator<Item = CommandSpec>) -> Pipeline {
    rest.into_iter().fold(Pipeline::new(first), Pipeline::pipe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec::new(program, args.iter().copied()).unwrap()
    }

    #[test]
    fn test_pipe_builds_stages() {
        let pipeline = pipe(spec("ls", &["-1"]), [spec("sort", &[]), spec("wc", &["-l"])]);

        assert_eq!(pipeline.len(), 3);
        assert!(!pipeline.is_empty());
        assert_eq!(pipeline.stages()[2].program(), "wc");
        assert_eq!(pipeline.to_string(), "ls -1 | sort | wc -l");
    }

    #[test]
    fn test_dry_run_pipeline() {
        let pipeline = Pipeline::new(spec("definitely-not-a-real-tool", &[])).pipe(spec("wc", &[]));
        let result = pipeline
            .run_with(&SyncExecutor::new(), &RunOptions::new().dry_run(true))
            .unwrap();

        assert!(result.success());
        assert_eq!(result.command, "wc");
    }

    #[test]
    fn test_first_stage_failure_stops_pipeline() {
        let pipeline = Pipeline::new(spec("definitely-not-a-real-tool", &[])).pipe(spec("wc", &[]));
        let err = pipeline.run(&SyncExecutor::new()).unwrap_err();

        assert!(matches!(err, ExecError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_feeds_next_stage() {
        let pipeline = Pipeline::new(spec("printf", &["x\\ny\\n"])).pipe(spec("wc", &["-l"]));
        let result = pipeline.run(&SyncExecutor::new()).unwrap();

        assert_eq!(result.stdout.trim(), "2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_async_pipeline() {
        let pipeline = Pipeline::new(spec("echo", &["abc"])).pipe(spec("tr", &["a-z", "A-Z"]));
        let result = pipeline.run_async(&AsyncExecutor::new()).await.unwrap();

        assert_eq!(result.stdout, "ABC\n");
    }
}
