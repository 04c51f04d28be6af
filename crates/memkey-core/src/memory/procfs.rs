//! Linux snapshot source backed by `/proc/<pid>/maps` and `/proc/<pid>/mem`.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;

use tracing::{debug, warn};

use super::{DEFAULT_MAX_SNAPSHOT_SIZE, MemorySnapshot, SnapshotSource};

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsRegion {
    pub start: u64,
    pub end: u64,
    pub readable: bool,
    pub writable: bool,
    pub private: bool,
    pub path: String,
}

impl MapsRegion {
    /// Parse a maps line such as
    /// `7f1c2a000000-7f1c2a021000 rw-p 00000000 00:00 0    [heap]`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let range = fields.next()?;
        let perms = fields.next()?.as_bytes();
        // offset, device, inode
        let path = fields.nth(3).unwrap_or("").to_string();

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        if end <= start || perms.len() < 4 {
            return None;
        }

        Some(Self {
            start,
            end,
            readable: perms[0] == b'r',
            writable: perms[1] == b'w',
            private: perms[3] == b'p',
            path,
        })
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Heap-like data: private, read/write, anonymous or `[heap]`.
    ///
    /// Key material lives in allocations; mapped files and kernel-provided
    /// regions such as `[vvar]` are skipped.
    pub fn is_heap_like(&self) -> bool {
        self.readable
            && self.writable
            && self.private
            && (self.path.is_empty() || self.path == "[heap]" || self.path.starts_with("[anon:"))
    }
}

/// Captures heap-like regions of a live process.
///
/// Regions are copied back to back in address order. A signature or
/// candidate read across the seam of two regions never existed in the
/// process; it costs one validator call and can only be accepted if the
/// validator accepts garbage.
#[derive(Debug, Clone)]
pub struct ProcMemSource {
    max_size: usize,
}

impl ProcMemSource {
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SNAPSHOT_SIZE,
        }
    }

    /// Stop capturing once `max_size` bytes have been read.
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    fn regions(&self, pid: u32) -> io::Result<Vec<MapsRegion>> {
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid))?;
        Ok(maps
            .lines()
            .filter_map(MapsRegion::parse)
            .filter(MapsRegion::is_heap_like)
            .collect())
    }
}

impl Default for ProcMemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for ProcMemSource {
    fn capture(&self, pid: u32) -> io::Result<MemorySnapshot> {
        let regions = self.regions(pid)?;
        let mem = File::open(format!("/proc/{}/mem", pid))?;

        let mut data = Vec::new();
        let mut last_error: Option<io::Error> = None;
        let mut skipped = 0usize;

        for region in &regions {
            let remaining = self.max_size.saturating_sub(data.len());
            if remaining == 0 {
                warn!(
                    "Snapshot size limit of {} bytes reached, remaining regions skipped",
                    self.max_size
                );
                break;
            }

            let size = (region.size() as usize).min(remaining);
            let offset = data.len();
            data.resize(offset + size, 0);

            match mem.read_exact_at(&mut data[offset..], region.start) {
                Ok(()) => {}
                Err(e) => {
                    // Regions can be unmapped between reading maps and mem
                    debug!(
                        "Skipping region 0x{:X}-0x{:X}: {}",
                        region.start, region.end, e
                    );
                    data.truncate(offset);
                    skipped += 1;
                    last_error = Some(e);
                }
            }
        }

        if data.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no readable heap regions in process {}", pid),
                )
            }));
        }

        debug!(
            "Captured {} bytes from {} regions of process {} ({} skipped)",
            data.len(),
            regions.len() - skipped,
            pid,
            skipped
        );
        Ok(MemorySnapshot::new(data))
    }
}
