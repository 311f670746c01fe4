//! Diagnostic sinks for human-readable trace lines.
//!
//! Executors echo the command they run and every output line to a sink
//! unless the call is silent. Writes never fail the caller, and the order of
//! lines from concurrent invocations is unspecified.

use std::sync::{Arc, Mutex};

/// Append-only destination for diagnostic lines.
pub trait DiagnosticSink: Send + Sync {
    fn write(&self, line: &str);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write(&self, line: &str) {
        self(line)
    }
}

/// Emits each line as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn write(&self, line: &str) {
        tracing::debug!(target: "procexec::diagnostic", "{}", line);
    }
}

/// Drops every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn write(&self, _line: &str) {}
}

/// Keeps lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.lines.lock() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn write(&self, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shared_between_clones() {
        let sink = MemorySink::new();
        let clone = sink.clone();

        sink.write("Executing: echo hello");
        clone.write("[stdout] hello");

        assert_eq!(
            sink.lines(),
            vec!["Executing: echo hello", "[stdout] hello"]
        );

        clone.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink = move |line: &str| captured.lock().unwrap().push(line.len());

        sink.write("abc");
        DiagnosticSink::write(&sink, "de");

        assert_eq!(*seen.lock().unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_tracing_and_null_sinks_do_not_panic() {
        let _ = crate::logging::try_init();
        TracingSink.write("traced line");
        NullSink.write("dropped line");
    }
}
