//! Scripted snapshot source for tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use super::{MemorySnapshot, SnapshotSource};

#[derive(Debug)]
enum Outcome {
    Snapshot(Bytes),
    Failure(io::ErrorKind, String),
}

/// Returns a fixed buffer (or a fixed error) on every capture.
#[derive(Debug)]
pub struct MockSnapshotSource {
    outcome: Outcome,
    delay: Duration,
    captures: AtomicUsize,
}

impl MockSnapshotSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            outcome: Outcome::Snapshot(data.into()),
            delay: Duration::ZERO,
            captures: AtomicUsize::new(0),
        }
    }

    /// A source whose every capture fails with `kind`.
    pub fn failing(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failure(kind, message.into()),
            delay: Duration::ZERO,
            captures: AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` before each capture returns.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MockSnapshotSource {
    fn capture(&self, _pid: u32) -> io::Result<MemorySnapshot> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match &self.outcome {
            Outcome::Snapshot(data) => Ok(MemorySnapshot::new(data.clone())),
            Outcome::Failure(kind, message) => Err(io::Error::new(*kind, message.clone())),
        }
    }
}
