//! Tagged output lines.

use std::fmt;

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamName {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of child output tagged with its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLine {
    /// Originating stream.
    pub stream: StreamName,
    /// Line text without the trailing newline.
    pub text: String,
    terminated: bool,
}

impl StreamLine {
    /// Create a newline-terminated line.
    pub fn new(stream: StreamName, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
            terminated: true,
        }
    }

    /// Decode a raw line as read from a pipe (best effort UTF-8).
    pub fn from_bytes(stream: StreamName, raw: &[u8]) -> Self {
        let (body, terminated) = match raw.strip_suffix(b"\n") {
            Some(body) => (body, true),
            None => (raw, false),
        };
        Self {
            stream,
            text: String::from_utf8_lossy(body).into_owned(),
            terminated,
        }
    }

    /// Whether the line ended with a newline. Only the final line of a
    /// stream can be unterminated.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Append this line, including its newline if it had one, to `buf`.
    pub fn append_to(&self, buf: &mut String) {
        buf.push_str(&self.text);
        if self.terminated {
            buf.push('\n');
        }
    }
}

impl fmt::Display for StreamLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream, self.text)
    }
}

/// Splits captured lines back into per-stream text.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn push(&mut self, line: &StreamLine) {
        match line.stream {
            StreamName::Stdout => line.append_to(&mut self.stdout),
            StreamName::Stderr => line.append_to(&mut self.stderr),
        }
    }
}
