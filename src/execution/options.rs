//! Call-site options: line listeners and run flags.

use std::fmt;

use crate::output::{StreamLine, StreamName};

/// Callback invoked with the text of each output line.
pub type LineCallback = Box<dyn FnMut(&str) + Send>;

/// Optional per-stream line callbacks.
///
/// Listeners see every line as it is produced. Output is captured in full
/// regardless of whether listeners are attached.
#[derive(Default)]
pub struct Listeners {
    on_stdout: Option<LineCallback>,
    on_stderr: Option<LineCallback>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `f` for each stdout line.
    pub fn on_stdout(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stdout = Some(Box::new(f));
        self
    }

    /// Call `f` for each stderr line.
    pub fn on_stderr(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stderr = Some(Box::new(f));
        self
    }

    pub(crate) fn dispatch(&mut self, line: &StreamLine) {
        let listener = match line.stream {
            StreamName::Stdout => self.on_stdout.as_mut(),
            StreamName::Stderr => self.on_stderr.as_mut(),
        };
        if let Some(listener) = listener {
            listener(&line.text);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// Per-call execution flags. Kept out of [`CommandSpec`](super::CommandSpec)
/// so a command only describes what runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Do not echo the command and its output to the diagnostic sink.
    pub silent: bool,
    /// Log the command instead of running it; report exit code 0.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
