//! # procexec
//!
//! Run external processes and capture their output.
//!
//! A [`CommandSpec`] describes one invocation. An executor spawns it, merges
//! stdout and stderr line by line, enforces the timeout and turns the exit
//! status into a [`ProcessResult`] or an [`ExecError`].
//!
//! ## Features
//!
//! - **Blocking and async**: [`SyncExecutor`] on threads, [`AsyncExecutor`] on tokio
//! - **Streaming**: iterate output lines while the process runs
//! - **Timeouts**: SIGTERM, a grace period, then kill, with partial output kept
//! - **Pipelines**: feed one command's stdout into the next command's stdin
//!
//! ## Quick Start
//!
//! ```no_run
//! use procexec::{AsyncExecutor, CommandSpec, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> procexec::Result<()> {
//!     procexec::logging::try_init().ok();
//!
//!     let executor = AsyncExecutor::new();
//!     let result = executor.run(&CommandSpec::new("echo", ["hello"])?).await?;
//!     assert_eq!(result.stdout, "hello\n");
//!
//!     let count = Pipeline::new(CommandSpec::new("ls", ["-1"])?)
//!         .pipe(CommandSpec::new("wc", ["-l"])?)
//!         .run_async(&executor)
//!         .await?;
//!     println!("{} entries", count.stdout_trimmed());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;

// Re-export commonly used types
pub use config::{Config, ConfigError, ExecSettings};
pub use diagnostics::{DiagnosticSink, MemorySink, NullSink, TracingSink};
pub use env::{EnvProvider, MapEnv, ProcessEnv};
pub use error::{ExecError, FailureReason, Result};
pub use execution::{
    output, output_async, pipe, run, run_async, shell, AsyncExecutor, CommandSpec,
    CommandSpecBuilder, LineStream, Listeners, Pipeline, ProcessResult, RunOptions, StreamLines,
    SyncExecutor,
};
pub use output::{StreamLine, StreamName};
