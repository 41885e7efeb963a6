//! Buffered, deadline-bounded reads over a shell transport

use super::{ReadOutcome, ShellTransport};
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) enum ExpectError {
    Timeout,
    Eof,
    Io(io::Error),
}

/// Owns the spawned transport for the lifetime of one session.
///
/// The transport is closed exactly once, either explicitly or on drop.
pub(crate) struct ShellIo {
    transport: Box<dyn ShellTransport>,
    buffer: String,
    eof: bool,
    closed: bool,
}

impl ShellIo {
    pub(crate) fn new(transport: Box<dyn ShellTransport>) -> Self {
        Self {
            transport,
            buffer: String::new(),
            eof: false,
            closed: false,
        }
    }

    pub(crate) fn send_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = String::with_capacity(line.len() + 1);
        data.push_str(line);
        data.push('\n');
        self.transport.send(&data)
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// Take everything buffered so far
    pub(crate) fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Wait until any output has arrived, returning and consuming it
    pub(crate) fn expect_any(&mut self, timeout: Duration) -> Result<String, ExpectError> {
        self.wait_for(timeout, |buf| {
            if buf.is_empty() {
                None
            } else {
                Some((buf.len(), buf.len()))
            }
        })
    }

    /// Wait for `pattern` anywhere in the stream; returns the text before it
    pub(crate) fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ExpectError> {
        self.wait_for(timeout, |buf| buf.find(pattern).map(|i| (i, i + pattern.len())))
    }

    /// Wait for `token` at the start of a line; returns the text before it
    pub(crate) fn expect_line_start(
        &mut self,
        token: &str,
        timeout: Duration,
    ) -> Result<String, ExpectError> {
        self.wait_for(timeout, |buf| {
            find_at_line_start(buf, token).map(|i| (i, i + token.len()))
        })
    }

    /// Read until end-of-stream; returns everything buffered
    pub(crate) fn expect_eof(&mut self, timeout: Duration) -> Result<String, ExpectError> {
        let deadline = Instant::now() + timeout;
        while !self.eof {
            self.fill(deadline)?;
        }
        Ok(self.take_buffer())
    }

    fn wait_for<F>(&mut self, timeout: Duration, find: F) -> Result<String, ExpectError>
    where
        F: Fn(&str) -> Option<(usize, usize)>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((start, end)) = find(&self.buffer) {
                let before = self.buffer[..start].to_string();
                self.buffer.drain(..end);
                return Ok(before);
            }
            if self.eof {
                return Err(ExpectError::Eof);
            }
            self.fill(deadline)?;
        }
    }

    /// One bounded read into the buffer
    fn fill(&mut self, deadline: Instant) -> Result<(), ExpectError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(ExpectError::Timeout);
        }
        match self.transport.read_chunk(deadline - now) {
            Ok(ReadOutcome::Data(data)) => self.buffer.push_str(&data),
            Ok(ReadOutcome::Timeout) => {}
            Ok(ReadOutcome::Eof) => self.eof = true,
            Err(e) => return Err(ExpectError::Io(e)),
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.transport.close();
        }
    }
}

impl Drop for ShellIo {
    fn drop(&mut self) {
        self.close();
    }
}

/// Byte index of the first `token` that begins a line
fn find_at_line_start(haystack: &str, token: &str) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(token) {
        let idx = from + rel;
        let before = &haystack[..idx];
        if before.is_empty() || before.ends_with('\n') || before.ends_with('\r') {
            return Some(idx);
        }
        from = idx + token.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays canned reads; an empty queue reads as a timeout
    struct Replay {
        reads: VecDeque<ReadOutcome>,
        closes: Arc<AtomicUsize>,
    }

    impl ShellTransport for Replay {
        fn send(&mut self, _data: &str) -> io::Result<()> {
            Ok(())
        }

        fn read_chunk(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
            match self.reads.pop_front() {
                Some(r) => Ok(r),
                None => {
                    std::thread::sleep(timeout.min(Duration::from_millis(2)));
                    Ok(ReadOutcome::Timeout)
                }
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn io_with(reads: Vec<ReadOutcome>) -> (ShellIo, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let io = ShellIo::new(Box::new(Replay {
            reads: reads.into(),
            closes: closes.clone(),
        }));
        (io, closes)
    }

    fn data(s: &str) -> ReadOutcome {
        ReadOutcome::Data(s.to_string())
    }

    #[test]
    fn test_expect_across_chunks() {
        let (mut io, _) = io_with(vec![data("hello PRO"), data("MPT> rest")]);
        let before = io.expect("PROMPT> ", Duration::from_secs(1)).unwrap();
        assert_eq!(before, "hello ");
        assert_eq!(io.take_buffer(), "rest");
    }

    #[test]
    fn test_expect_timeout_keeps_buffer() {
        let (mut io, _) = io_with(vec![data("partial")]);
        let err = io.expect("PROMPT> ", Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ExpectError::Timeout));
        assert_eq!(io.take_buffer(), "partial");
    }

    #[test]
    fn test_expect_eof() {
        let (mut io, _) = io_with(vec![data("bye\r\n"), ReadOutcome::Eof]);
        let err = io.expect("PROMPT> ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ExpectError::Eof));
        assert!(io.is_eof());
    }

    #[test]
    fn test_line_start_skips_echoed_command() {
        let (mut io, _) = io_with(vec![data("echo __CMD_END__\r\n__CMD_END__\r\nPROMPT> ")]);
        let before = io
            .expect_line_start("__CMD_END__", Duration::from_secs(1))
            .unwrap();
        assert_eq!(before, "echo __CMD_END__\r\n");
        assert_eq!(io.take_buffer(), "\r\nPROMPT> ");
    }

    #[test]
    fn test_expect_eof_collects_everything() {
        let (mut io, _) = io_with(vec![data("exit\r\n"), data("logout\r\n"), ReadOutcome::Eof]);
        assert_eq!(io.expect_eof(Duration::from_secs(1)).unwrap(), "exit\r\nlogout\r\n");
    }

    #[test]
    fn test_expect_any() {
        let (mut io, _) = io_with(vec![ReadOutcome::Timeout, data("$ ")]);
        assert_eq!(io.expect_any(Duration::from_secs(1)).unwrap(), "$ ");
        assert_eq!(io.take_buffer(), "");
    }

    #[test]
    fn test_close_once_including_drop() {
        let (mut io, closes) = io_with(vec![]);
        io.close();
        io.close();
        drop(io);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (io, closes) = io_with(vec![]);
        drop(io);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_find_at_line_start() {
        assert_eq!(find_at_line_start("TOK", "TOK"), Some(0));
        assert_eq!(find_at_line_start("echo TOK\nTOK", "TOK"), Some(9));
        assert_eq!(find_at_line_start("echo TOK", "TOK"), None);
        assert_eq!(find_at_line_start("x\r\nTOK", "TOK"), Some(3));
    }
}
