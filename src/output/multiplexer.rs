//! Blocking merge of a child's stdout and stderr.
//!
//! Each stream gets its own reader thread with exactly one line read in
//! flight. Lines land in a single bounded queue, so the consumer sees
//! whichever stream produced first while per-stream order stays exact.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Instant;

use tracing::{debug, trace};

use super::line::{StreamLine, StreamName};

/// Capacity of the shared line queue.
const QUEUE_CAPACITY: usize = 64;

/// Boxed blocking reader for one child stream.
pub type BoxedReader = Box<dyn Read + Send + 'static>;

enum ReaderEvent {
    Line(StreamLine),
    Eof(StreamName),
    Failed(StreamName, io::Error),
}

/// Result of waiting for the next line with a deadline.
#[derive(Debug)]
pub enum NextLine {
    /// A line arrived.
    Line(StreamLine),
    /// Both streams reached end-of-stream.
    Done,
    /// The deadline passed before anything arrived.
    TimedOut,
}

/// Merges two blocking readers into one ordered sequence of [`StreamLine`].
pub struct OutputMultiplexer {
    rx: Receiver<ReaderEvent>,
    open: usize,
    failed: bool,
}

impl OutputMultiplexer {
    /// Start reader threads for the given streams. A missing stream counts
    /// as already closed.
    pub fn new(stdout: Option<BoxedReader>, stderr: Option<BoxedReader>) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        let mut open = 0;

        for (name, reader) in [(StreamName::Stdout, stdout), (StreamName::Stderr, stderr)] {
            if let Some(reader) = reader {
                spawn_reader(name, reader, tx.clone())?;
                open += 1;
            }
        }

        Ok(Self {
            rx,
            open,
            failed: false,
        })
    }

    /// A multiplexer with no streams; yields nothing.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::sync_channel(0);
        Self {
            rx,
            open: 0,
            failed: false,
        }
    }

    /// Block until the next line arrives. `None` once both streams are done.
    pub fn next_line(&mut self) -> Option<io::Result<StreamLine>> {
        match self.next_line_until(None) {
            Ok(NextLine::Line(line)) => Some(Ok(line)),
            Ok(NextLine::Done) | Ok(NextLine::TimedOut) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Wait for the next line until `deadline` (forever if `None`).
    ///
    /// After a read error the multiplexer stops and reports [`NextLine::Done`].
    pub fn next_line_until(&mut self, deadline: Option<Instant>) -> io::Result<NextLine> {
        loop {
            if self.open == 0 || self.failed {
                return Ok(NextLine::Done);
            }

            let event = match deadline {
                None => match self.rx.recv() {
                    Ok(event) => event,
                    Err(_) => return Ok(NextLine::Done),
                },
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(remaining) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => return Ok(NextLine::TimedOut),
                        Err(RecvTimeoutError::Disconnected) => return Ok(NextLine::Done),
                    }
                }
            };

            match event {
                ReaderEvent::Line(line) => return Ok(NextLine::Line(line)),
                ReaderEvent::Eof(name) => {
                    trace!("{} closed", name);
                    self.open -= 1;
                }
                ReaderEvent::Failed(name, e) => {
                    debug!("{} read failed: {}", name, e);
                    self.failed = true;
                    return Err(e);
                }
            }
        }
    }
}

impl Iterator for OutputMultiplexer {
    type Item = io::Result<StreamLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
    }
}

fn spawn_reader(
    name: StreamName,
    reader: BoxedReader,
    tx: SyncSender<ReaderEvent>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("procexec-{}", name))
        .spawn(move || read_lines(name, reader, tx))?;
    Ok(())
}

fn read_lines(name: StreamName, reader: BoxedReader, tx: SyncSender<ReaderEvent>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => ReaderEvent::Eof(name),
            Ok(_) => ReaderEvent::Line(StreamLine::from_bytes(name, &buf)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => ReaderEvent::Failed(name, e),
        };
        let last = !matches!(event, ReaderEvent::Line(_));

        if tx.send(event).is_err() {
            trace!("{} reader: consumer gone", name);
            break;
        }
        if last {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn reader(data: &'static [u8]) -> Option<BoxedReader> {
        Some(Box::new(Cursor::new(data)))
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    /// Never produces data; blocks the reader thread until the test ends.
    struct StallingReader(Receiver<()>);

    impl Read for StallingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_per_stream_order_preserved() {
        let mux = OutputMultiplexer::new(reader(b"o1\no2\no3\n"), reader(b"e1\ne2\n")).unwrap();
        let lines: Vec<StreamLine> = mux.map(|l| l.unwrap()).collect();

        let stdout: Vec<_> = lines
            .iter()
            .filter(|l| l.stream == StreamName::Stdout)
            .map(|l| l.text.as_str())
            .collect();
        let stderr: Vec<_> = lines
            .iter()
            .filter(|l| l.stream == StreamName::Stderr)
            .map(|l| l.text.as_str())
            .collect();

        assert_eq!(stdout, vec!["o1", "o2", "o3"]);
        assert_eq!(stderr, vec!["e1", "e2"]);
    }

    #[test]
    fn test_missing_streams() {
        let mut mux = OutputMultiplexer::new(None, None).unwrap();
        assert!(mux.next_line().is_none());

        let lines: Vec<_> = OutputMultiplexer::new(reader(b"only\n"), None)
            .unwrap()
            .map(|l| l.unwrap().text)
            .collect();
        assert_eq!(lines, vec!["only"]);
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut mux = OutputMultiplexer::new(reader(b"a\nb"), None).unwrap();
        let first = mux.next_line().unwrap().unwrap();
        let second = mux.next_line().unwrap().unwrap();

        assert!(first.is_terminated());
        assert_eq!(second.text, "b");
        assert!(!second.is_terminated());
        assert!(mux.next_line().is_none());
    }

    #[test]
    fn test_read_error_surfaces_and_stops() {
        let mut mux =
            OutputMultiplexer::new(Some(Box::new(FailingReader)), reader(b"")).unwrap();

        let mut saw_error = false;
        while let Some(item) = mux.next_line() {
            if let Err(e) = item {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(mux.next_line().is_none());
    }

    #[test]
    fn test_deadline_times_out() {
        let (_hold, rx) = mpsc::channel();
        let mut mux =
            OutputMultiplexer::new(Some(Box::new(StallingReader(rx))), None).unwrap();

        let start = Instant::now();
        let next = mux
            .next_line_until(Some(Instant::now() + Duration::from_millis(50)))
            .unwrap();

        assert!(matches!(next, NextLine::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
