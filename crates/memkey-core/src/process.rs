//! Target process identity and liveness.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProcessStatus {
    Running,
    Offline,
}

/// The process whose memory is searched for key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub status: ProcessStatus,
}

impl ProcessHandle {
    pub fn new(pid: u32, name: impl Into<String>, status: ProcessStatus) -> Self {
        Self {
            pid,
            name: name.into(),
            status,
        }
    }

    /// Look up a process by PID and record whether it is currently running.
    #[cfg(target_os = "linux")]
    pub fn open(pid: u32) -> Result<Self> {
        let proc_dir = std::path::PathBuf::from(format!("/proc/{}", pid));
        if !proc_dir.exists() {
            return Err(Error::ProcessNotFound(pid));
        }

        let name = std::fs::read_to_string(proc_dir.join("comm"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let status = match std::fs::read_to_string(proc_dir.join("stat")) {
            Ok(stat) => parse_stat_status(&stat),
            Err(_) => ProcessStatus::Offline,
        };

        Ok(Self { pid, name, status })
    }

    /// Look up a process by PID. Liveness is only probed on Linux; elsewhere
    /// the process is assumed to be running and a dead PID surfaces later as
    /// a memory read failure.
    #[cfg(not(target_os = "linux"))]
    pub fn open(pid: u32) -> Result<Self> {
        if pid == 0 {
            return Err(Error::ProcessNotFound(pid));
        }
        Ok(Self {
            pid,
            name: String::new(),
            status: ProcessStatus::Running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }
}

/// Zombie and dead entries in `/proc/<pid>/stat` count as offline.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat_status(stat: &str) -> ProcessStatus {
    // The command name is parenthesised and may itself contain spaces or ')'
    let state = stat
        .rfind(')')
        .and_then(|pos| stat[pos + 1..].split_whitespace().next());

    match state {
        Some("Z") | Some("X") | Some("x") | None => ProcessStatus::Offline,
        Some(_) => ProcessStatus::Running,
    }
}
