//! Async merge of a child's stdout and stderr.
//!
//! Keeps one pending line read per stream and races them with
//! `tokio::select!`. Only the stream that produced a line is re-armed, and a
//! stream at end-of-stream is never polled again.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, trace};

use super::line::{StreamLine, StreamName};

/// Boxed async reader for one child stream.
pub type BoxedAsyncReader = Box<dyn AsyncRead + Send + Unpin + 'static>;

struct ChannelReader {
    name: StreamName,
    reader: Option<BufReader<BoxedAsyncReader>>,
    // Bytes of a partially read line survive a cancelled read here.
    buf: Vec<u8>,
}

impl ChannelReader {
    fn new(name: StreamName, reader: Option<BoxedAsyncReader>) -> Self {
        Self {
            name,
            reader: reader.map(BufReader::new),
            buf: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Read the next line. `Ok(None)` marks end-of-stream.
    ///
    /// Cancel safe: `read_until` keeps partial input in `self.buf`.
    async fn read_line(&mut self) -> io::Result<Option<StreamLine>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let n = reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            trace!("{} closed", self.name);
            self.reader = None;
            return Ok(None);
        }
        let line = StreamLine::from_bytes(self.name, &self.buf);
        self.buf.clear();
        Ok(Some(line))
    }

    fn close(&mut self) {
        self.reader = None;
        self.buf.clear();
    }
}

/// Merges two async readers into one ordered sequence of [`StreamLine`].
pub struct AsyncOutputMultiplexer {
    stdout: ChannelReader,
    stderr: ChannelReader,
}

impl AsyncOutputMultiplexer {
    /// Create a multiplexer. A missing stream counts as already closed.
    pub fn new(stdout: Option<BoxedAsyncReader>, stderr: Option<BoxedAsyncReader>) -> Self {
        Self {
            stdout: ChannelReader::new(StreamName::Stdout, stdout),
            stderr: ChannelReader::new(StreamName::Stderr, stderr),
        }
    }

    /// Wait for whichever stream yields a line first.
    ///
    /// Returns `None` once both streams are done. After a read error both
    /// streams are closed and `None` follows. Cancel safe.
    pub async fn next_line(&mut self) -> Option<io::Result<StreamLine>> {
        loop {
            let stdout_open = self.stdout.is_open();
            let stderr_open = self.stderr.is_open();
            if !stdout_open && !stderr_open {
                return None;
            }

            let result = tokio::select! {
                r = self.stdout.read_line(), if stdout_open => r,
                r = self.stderr.read_line(), if stderr_open => r,
            };

            match result {
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => continue,
                Err(e) => {
                    debug!("output read failed: {}", e);
                    self.stdout.close();
                    self.stderr.close();
                    return Some(Err(e));
                }
            }
        }
    }
}
