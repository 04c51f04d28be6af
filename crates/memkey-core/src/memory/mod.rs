use std::sync::Arc;

mod access;
mod snapshot;

#[cfg(target_os = "linux")]
mod procfs;
#[cfg(target_os = "windows")]
mod win32;

// Scripted snapshot source for unit and integration tests
#[doc(hidden)]
pub mod mock;

pub use access::{AccessGate, AlwaysPermitted, HostAccessGate};
pub use snapshot::{DumpFileSource, MemorySnapshot, SnapshotSource};

#[cfg(target_os = "linux")]
pub use procfs::{MapsRegion, ProcMemSource};
#[cfg(target_os = "windows")]
pub use win32::WindowsMemorySource;

#[doc(hidden)]
pub use mock::MockSnapshotSource;

/// Default cap on the bytes captured from a live process (1GB)
pub const DEFAULT_MAX_SNAPSHOT_SIZE: usize = 1024 * 1024 * 1024;

/// Live memory source for the host platform.
#[cfg(target_os = "linux")]
pub fn host_source() -> Arc<dyn SnapshotSource> {
    Arc::new(ProcMemSource::new())
}

/// Live memory source for the host platform.
#[cfg(target_os = "windows")]
pub fn host_source() -> Arc<dyn SnapshotSource> {
    Arc::new(WindowsMemorySource::new())
}

/// Live memory source for the host platform. Every capture fails with
/// [`std::io::ErrorKind::Unsupported`] here.
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn host_source() -> Arc<dyn SnapshotSource> {
    struct Unsupported;

    impl SnapshotSource for Unsupported {
        fn capture(&self, _pid: u32) -> std::io::Result<MemorySnapshot> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "live memory capture is not supported on this platform",
            ))
        }
    }

    Arc::new(Unsupported)
}
