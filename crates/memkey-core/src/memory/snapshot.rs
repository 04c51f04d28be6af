use std::fs;
use std::io;
use std::ops::Range;
use std::path::PathBuf;

use bytes::Bytes;
use tracing::debug;

/// Point-in-time copy of a process's readable memory.
///
/// Cloning and slicing share the underlying buffer; it is freed once the
/// snapshot and every chunk taken from it are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    data: Bytes,
}

impl MemorySnapshot {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Zero-copy view of `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        self.data.slice(range)
    }
}

impl From<Vec<u8>> for MemorySnapshot {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Captures the memory of a process.
///
/// Failures include permission denial, the process exiting mid-read and
/// platform API errors; any of them aborts the current extraction attempt.
///
/// The snapshot is one flat buffer. Sources that join disjoint regions make
/// seam-crossing matches possible; those are only ever candidates and never
/// reach the caller unless the validator accepts them.
pub trait SnapshotSource: Send + Sync {
    fn capture(&self, pid: u32) -> io::Result<MemorySnapshot>;
}

/// Reads a raw memory dump from disk instead of a live process.
///
/// The PID passed to [`SnapshotSource::capture`] is ignored.
#[derive(Debug, Clone)]
pub struct DumpFileSource {
    path: PathBuf,
}

impl DumpFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSource for DumpFileSource {
    fn capture(&self, _pid: u32) -> io::Result<MemorySnapshot> {
        let data = fs::read(&self.path)?;
        debug!(
            "Loaded memory dump {} ({} bytes)",
            self.path.display(),
            data.len()
        );
        Ok(MemorySnapshot::new(data))
    }
}
