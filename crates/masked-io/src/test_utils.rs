//! Test utilities for masked-io.
//!
//! In-memory sinks for asserting what a [`MaskedWriter`](crate::MaskedWriter)
//! forwarded, and a failing sink for exercising error paths.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A cloneable in-memory sink.
///
/// Every clone appends to the same buffer, so a test can keep one clone and
/// hand the other to a writer.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    inner: Arc<Mutex<SinkState>>,
}

#[derive(Debug, Default)]
struct SinkState {
    data: Vec<u8>,
    writes: usize,
    flushes: usize,
}

impl SharedSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Get everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.with_state(|s| s.data.clone())
    }

    /// Get everything written so far as a string (lossy).
    #[must_use]
    pub fn contents_string(&self) -> String {
        self.with_state(|s| String::from_utf8_lossy(&s.data).into_owned())
    }

    /// Get the number of `write` calls received.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.with_state(|s| s.writes)
    }

    /// Get the number of `flush` calls received.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.with_state(|s| s.flushes)
    }

    /// Discard everything written so far.
    pub fn clear(&self) {
        self.with_state(|s| s.data.clear());
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_state(|s| {
            s.data.extend_from_slice(buf);
            s.writes += 1;
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_state(|s| s.flushes += 1);
        Ok(())
    }
}

/// A sink whose writes fail, optionally after accepting a few bytes.
#[derive(Debug, Clone, Copy)]
pub struct FailingSink {
    kind: io::ErrorKind,
    budget: usize,
}

impl Default for FailingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingSink {
    /// Create a sink that fails with `BrokenPipe`.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_kind(io::ErrorKind::BrokenPipe)
    }

    /// Create a sink that fails with the given error kind.
    #[must_use]
    pub const fn with_kind(kind: io::ErrorKind) -> Self {
        Self { kind, budget: 0 }
    }

    /// Create a sink that discards `budget` bytes, then fails with `BrokenPipe`.
    #[must_use]
    pub const fn after(budget: usize) -> Self {
        Self {
            kind: io::ErrorKind::BrokenPipe,
            budget,
        }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(self.kind, "sink rejected write"));
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_sink_clones_share_buffer() {
        let sink = SharedSink::new();
        let mut other = sink.clone();
        other.write_all(b"abc").unwrap();
        other.flush().unwrap();

        assert_eq!(sink.contents(), b"abc");
        assert_eq!(sink.write_count(), 1);
        assert_eq!(sink.flush_count(), 1);

        sink.clear();
        assert_eq!(sink.contents_string(), "");
    }

    #[test]
    fn failing_sink_fails() {
        let mut sink = FailingSink::with_kind(io::ErrorKind::PermissionDenied);
        let err = sink.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn failing_sink_after_budget() {
        let mut sink = FailingSink::after(4);
        assert_eq!(sink.write(b"abc").unwrap(), 3);
        assert_eq!(sink.write(b"def").unwrap(), 1);
        assert!(sink.write(b"g").is_err());
    }
}
