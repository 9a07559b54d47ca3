//! Capture buffer for the streams of a single run.
//!
//! The worker installs a [`CaptureBuffer`] as `sys.stdout` / `sys.stderr`
//! before running learner code. Only stdout is reported back as the run's
//! output; stderr is kept so it counts toward the same byte cap and can be
//! logged.

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Which stream a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A write was refused because it would exceed the byte cap.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Output limit exceeded: {limit_bytes} bytes")]
pub struct CaptureOverflow {
    pub limit_bytes: usize,
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit_bytes: usize,
    overflowed: bool,
}

/// Shared handle to the captured bytes of one run. Clones share state.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureBuffer {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Captured {
                stdout: Vec::new(),
                stderr: Vec::new(),
                limit_bytes,
                overflowed: false,
            })),
        }
    }

    /// Append `data` to `stream`. A write that would take the combined size
    /// past the cap is refused whole and leaves the buffer unchanged.
    pub fn write(&self, stream: Stream, data: &[u8]) -> Result<(), CaptureOverflow> {
        let mut inner = self.inner.lock().expect("capture buffer mutex poisoned");
        if inner.stdout.len() + inner.stderr.len() + data.len() > inner.limit_bytes {
            inner.overflowed = true;
            return Err(CaptureOverflow {
                limit_bytes: inner.limit_bytes,
            });
        }
        match stream {
            Stream::Stdout => inner.stdout.extend_from_slice(data),
            Stream::Stderr => inner.stderr.extend_from_slice(data),
        }
        Ok(())
    }

    pub fn overflowed(&self) -> bool {
        self.inner
            .lock()
            .expect("capture buffer mutex poisoned")
            .overflowed
    }

    /// Captured stdout, with invalid UTF-8 replaced by U+FFFD.
    pub fn stdout(&self) -> String {
        let inner = self.inner.lock().expect("capture buffer mutex poisoned");
        String::from_utf8_lossy(&inner.stdout).into_owned()
    }

    /// Captured stderr, with invalid UTF-8 replaced by U+FFFD.
    pub fn stderr(&self) -> String {
        let inner = self.inner.lock().expect("capture buffer mutex poisoned");
        String::from_utf8_lossy(&inner.stderr).into_owned()
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // (1) streams are kept apart
    #[test]
    fn test_streams_are_separate() {
        let buf = CaptureBuffer::new(64);
        buf.write(Stream::Stdout, b"out").unwrap();
        buf.write(Stream::Stderr, b"err").unwrap();
        assert_eq!(buf.stdout(), "out");
        assert_eq!(buf.stderr(), "err");
    }

    // (2) the cap covers both streams and a refused write changes nothing
    #[test]
    fn test_combined_cap() {
        let buf = CaptureBuffer::new(8);
        buf.write(Stream::Stdout, b"12345").unwrap();
        let err = buf.write(Stream::Stderr, b"6789").unwrap_err();
        assert_eq!(err.limit_bytes, 8);
        assert!(buf.overflowed());
        assert_eq!(buf.stderr(), "");
        // Exactly filling the cap is fine.
        buf.write(Stream::Stderr, b"678").unwrap();
        assert_eq!(buf.stderr(), "678");
    }

    // (3) clones observe the same bytes
    #[test]
    fn test_clone_shares_state() {
        let buf = CaptureBuffer::new(64);
        let writer = buf.clone();
        writer.write(Stream::Stdout, b"shared").unwrap();
        assert_eq!(buf.stdout(), "shared");
    }

    // (4) invalid UTF-8 is replaced, not a panic
    #[test]
    fn test_lossy_decoding() {
        let buf = CaptureBuffer::new(64);
        buf.write(Stream::Stdout, &[b'a', 0xFF]).unwrap();
        assert_eq!(buf.stdout(), "a\u{FFFD}");
    }
}
