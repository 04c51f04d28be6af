//! CLI command implementations.

pub mod candidates;
pub mod extract;
pub mod patterns;

use std::sync::Arc;

use anyhow::Result;
use memkey_core::{
    AccessGate, AlwaysPermitted, DumpFileSource, Error, HostAccessGate, ProcessHandle,
    ProcessStatus, SnapshotSource, host_source,
};

use crate::cli::Target;

/// Memory to scan, resolved from the command line.
pub struct OpenTarget {
    pub process: ProcessHandle,
    pub source: Arc<dyn SnapshotSource>,
    pub access: Arc<dyn AccessGate>,
}

/// Open a live process, or treat a dump file as an always-running process.
pub fn open_target(target: &Target) -> Result<OpenTarget> {
    if let Some(path) = &target.dump {
        if !path.is_file() {
            anyhow::bail!("Dump file not found: {}", path.display());
        }
        return Ok(OpenTarget {
            process: ProcessHandle::new(0, path.display().to_string(), ProcessStatus::Running),
            source: Arc::new(DumpFileSource::new(path)),
            access: Arc::new(AlwaysPermitted),
        });
    }

    let Some(pid) = target.pid else {
        anyhow::bail!("Either --pid or --dump is required");
    };
    let process = ProcessHandle::open(pid)?;
    println!(
        "Found process (PID: {}, Name: {}, Status: {})",
        process.pid, process.name, process.status
    );

    Ok(OpenTarget {
        process,
        source: host_source(),
        access: Arc::new(HostAccessGate),
    })
}

impl OpenTarget {
    /// Same checks, in the same order, the extractor makes before reading
    /// memory: the process must be running and access must be permitted.
    pub fn preflight(&self) -> Result<()> {
        if !self.process.is_running() {
            return Err(Error::ProcessOffline.into());
        }
        if !self.access.is_memory_access_permitted() {
            return Err(Error::AccessProtected.into());
        }
        Ok(())
    }
}
