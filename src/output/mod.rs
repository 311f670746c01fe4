//! Line-oriented capture of child output.
//!
//! Both multiplexers merge stdout and stderr into one sequence of
//! [`StreamLine`] with exact per-stream order.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use procexec::output::{OutputMultiplexer, StreamName};
//!
//! let mux = OutputMultiplexer::new(
//!     Some(Box::new(Cursor::new(b"out\n".to_vec()))),
//!     Some(Box::new(Cursor::new(b"err\n".to_vec()))),
//! )?;
//! let mut lines: Vec<_> = mux.map(|l| l.map(|l| l.stream)).collect::<Result<_, _>>()?;
//! lines.sort_by_key(|s| s.as_str());
//! assert_eq!(lines, vec![StreamName::Stderr, StreamName::Stdout]);
//! # Ok::<(), std::io::Error>(())
//! ```

mod async_multiplexer;
mod line;
mod multiplexer;

pub use async_multiplexer::{AsyncOutputMultiplexer, BoxedAsyncReader};
pub use line::{CapturedOutput, StreamLine, StreamName};
pub use multiplexer::{BoxedReader, NextLine, OutputMultiplexer};
