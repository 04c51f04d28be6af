use thiserror::Error;

use crate::cancel::CancelReason;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Target process is not running")]
    ProcessOffline,

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Memory access is blocked by a platform protection; disable it and retry")]
    AccessProtected,

    #[error("No key validator configured")]
    ValidatorMissing,

    #[error("Failed to read process memory: {0}")]
    MemoryReadFailed(#[source] std::io::Error),

    #[error("Extraction cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("No valid key found in process memory")]
    NoValidKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether running the whole extraction again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::MemoryReadFailed(_) | Error::NoValidKey)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
