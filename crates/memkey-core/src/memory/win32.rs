//! Windows snapshot source backed by `VirtualQueryEx` and `ReadProcessMemory`.

use std::ffi::c_void;
use std::io;
use std::mem::size_of;

use tracing::{debug, warn};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_PRIVATE, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_READWRITE, VirtualQueryEx,
};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};

use super::{DEFAULT_MAX_SNAPSHOT_SIZE, MemorySnapshot, SnapshotSource};

/// Closes the process handle on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by OpenProcess and is closed once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Captures committed private read/write pages of a live process.
///
/// Regions are copied back to back as the Linux `/proc` source does, so
/// matches across a region seam are spurious and left to the validator to
/// reject.
#[derive(Debug, Clone)]
pub struct WindowsMemorySource {
    max_size: usize,
}

impl WindowsMemorySource {
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SNAPSHOT_SIZE,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl Default for WindowsMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

fn is_heap_like(info: &MEMORY_BASIC_INFORMATION) -> bool {
    info.State == MEM_COMMIT
        && info.Type == MEM_PRIVATE
        && (info.Protect.0 & PAGE_READWRITE.0) != 0
        && (info.Protect.0 & PAGE_GUARD.0) == 0
}

impl SnapshotSource for WindowsMemorySource {
    fn capture(&self, pid: u32) -> io::Result<MemorySnapshot> {
        // SAFETY: OpenProcess has no memory-safety preconditions.
        let handle = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) }
            .map_err(io::Error::other)?;
        let handle = OwnedHandle(handle);

        let mut data = Vec::new();
        let mut address = 0usize;
        let mut regions = 0usize;

        loop {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: `info` is a valid, writable MEMORY_BASIC_INFORMATION.
            let written = unsafe {
                VirtualQueryEx(
                    handle.0,
                    Some(address as *const c_void),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 || info.RegionSize == 0 {
                break;
            }

            if is_heap_like(&info) {
                let remaining = self.max_size.saturating_sub(data.len());
                if remaining == 0 {
                    warn!(
                        "Snapshot size limit of {} bytes reached, remaining regions skipped",
                        self.max_size
                    );
                    break;
                }

                let size = info.RegionSize.min(remaining);
                let offset = data.len();
                data.resize(offset + size, 0);

                let mut read = 0usize;
                // SAFETY: the destination slice is `size` bytes long.
                let result = unsafe {
                    ReadProcessMemory(
                        handle.0,
                        info.BaseAddress,
                        data[offset..].as_mut_ptr().cast(),
                        size,
                        Some(&mut read),
                    )
                };
                match result {
                    Ok(()) => {
                        data.truncate(offset + read);
                        regions += 1;
                    }
                    Err(e) => {
                        debug!("Skipping region {:p}: {}", info.BaseAddress, e);
                        data.truncate(offset);
                    }
                }
            }

            address = match (info.BaseAddress as usize).checked_add(info.RegionSize) {
                Some(next) => next,
                None => break,
            };
        }

        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no readable heap regions in process {}", pid),
            ));
        }

        debug!(
            "Captured {} bytes from {} regions of process {}",
            data.len(),
            regions,
            pid
        );
        Ok(MemorySnapshot::new(data))
    }
}
