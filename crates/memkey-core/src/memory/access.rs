//! Host preconditions for reading another process's memory.

/// Answers whether the host currently allows memory inspection.
///
/// Queried once per extraction attempt, before any memory is read.
pub trait AccessGate: Send + Sync {
    fn is_memory_access_permitted(&self) -> bool;
}

/// Checks the platform protection that blocks cross-process reads.
///
/// - macOS: System Integrity Protection must be disabled
/// - Linux: Yama `ptrace_scope` must not be 3 (attach disabled)
/// - Other platforms: always permitted
#[derive(Debug, Clone, Copy, Default)]
pub struct HostAccessGate;

impl AccessGate for HostAccessGate {
    #[cfg(target_os = "macos")]
    fn is_memory_access_permitted(&self) -> bool {
        match std::process::Command::new("csrutil").arg("status").output() {
            Ok(output) => sip_disabled(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!("Failed to query SIP status: {}", e);
                false
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn is_memory_access_permitted(&self) -> bool {
        match std::fs::read_to_string("/proc/sys/kernel/yama/ptrace_scope") {
            Ok(scope) => ptrace_scope_permits(&scope),
            // Yama not built into this kernel
            Err(_) => true,
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn is_memory_access_permitted(&self) -> bool {
        true
    }
}

/// Skips the host check entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPermitted;

impl AccessGate for AlwaysPermitted {
    fn is_memory_access_permitted(&self) -> bool {
        true
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn sip_disabled(status: &str) -> bool {
    status
        .to_ascii_lowercase()
        .contains("system integrity protection status: disabled")
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn ptrace_scope_permits(scope: &str) -> bool {
    scope.trim().parse::<u8>().map(|v| v < 3).unwrap_or(false)
}
