//! # memkey-core
//!
//! Core library for recovering a database key from the memory of a running
//! application process.
//!
//! This crate provides:
//! - A registry of known key signatures and candidate offsets
//! - Process memory snapshots (Linux `/proc`, Windows, raw dump files)
//! - A parallel chunked scanner that validates 32-byte key candidates
//! - Cooperative cancellation with optional deadlines
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use memkey_core::{CancelToken, KeyExtractor, ProcessHandle};
//!
//! let mut extractor = KeyExtractor::new(Default::default())?;
//! extractor.set_validator(Arc::new(|candidate: &[u8; 32]| check_db_header(candidate)));
//!
//! let process = ProcessHandle::open(pid)?;
//! let key = extractor.extract(&process, &CancelToken::with_timeout(timeout))?;
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod memory;
pub mod pattern;
pub mod process;
pub mod validator;

pub use cancel::{CancelReason, CancelToken};
pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use error::{Error, Result};
pub use extract::{
    ChunkPlan, KeyExtractor, MemoryChunk, ScanOutcome, ScanStats, plan_chunks, search_key,
};
pub use memory::{
    AccessGate, AlwaysPermitted, DumpFileSource, HostAccessGate, MemorySnapshot, SnapshotSource,
    host_source,
};
#[cfg(target_os = "linux")]
pub use memory::ProcMemSource;
#[cfg(target_os = "windows")]
pub use memory::WindowsMemorySource;
pub use pattern::{
    KEY_LEN, KeyPattern, PatternRegistry, format_signature, load_patterns, parse_signature,
    save_patterns,
};
pub use process::{ProcessHandle, ProcessStatus};
pub use validator::KeyValidator;
