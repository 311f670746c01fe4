//! Command execution engine.
//!
//! This module provides:
//! - [`CommandSpec`]: an immutable description of one invocation
//! - [`SyncExecutor`] and [`AsyncExecutor`]: run a spec and capture its output
//! - [`Pipeline`]: chain specs through stdin/stdout
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use procexec::execution::{CommandSpec, SyncExecutor};
//!
//! let spec = CommandSpec::builder("cargo")
//!     .arg("build")
//!     .timeout(Duration::from_secs(60))
//!     .build()?;
//! let result = SyncExecutor::new().run(&spec)?;
//! println!("{}", result.stdout);
//! # Ok::<(), procexec::ExecError>(())
//! ```

mod async_executor;
mod command;
mod options;
mod outcome;
mod pipeline;
mod process;
mod result;
mod state;
mod sync_executor;

pub use async_executor::{output_async, run_async, AsyncExecutor, LineStream};
pub use command::{CommandSpec, CommandSpecBuilder};
pub use options::{LineCallback, Listeners, RunOptions};
pub use pipeline::{pipe, Pipeline};
pub use result::ProcessResult;
pub use state::ExecState;
pub use sync_executor::{output, run, shell, StreamLines, SyncExecutor};
