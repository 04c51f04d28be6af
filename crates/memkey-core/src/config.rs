//! Tuning for the chunked key search.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::PatternRegistry;

/// Upper bound on scan workers
pub const MAX_WORKERS: usize = 8;
/// Lower bound on scan workers
pub const MIN_WORKERS: usize = 2;
/// Snapshots at or below this size are scanned as a single chunk (1MB)
pub const MIN_CHUNK_SIZE: usize = 1024 * 1024;
/// Bytes each chunk reaches back into its lower neighbour
pub const CHUNK_OVERLAP_BYTES: usize = 1024;
/// Target chunk count is `workers * CHUNK_MULTIPLIER`
pub const CHUNK_MULTIPLIER: usize = 2;
/// Chunks buffered between the producer and the workers
pub const QUEUE_CAPACITY: usize = 100;
/// Interval between cancellation checks while waiting for a result (ms)
pub const POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Fixed worker count; `None` sizes the pool from available parallelism
    pub workers: Option<usize>,
    pub min_workers: usize,
    pub max_workers: usize,
    pub min_chunk_size: usize,
    pub overlap: usize,
    pub chunk_multiplier: usize,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            workers: None,
            min_workers: MIN_WORKERS,
            max_workers: MAX_WORKERS,
            min_chunk_size: MIN_CHUNK_SIZE,
            overlap: CHUNK_OVERLAP_BYTES,
            chunk_multiplier: CHUNK_MULTIPLIER,
            queue_capacity: QUEUE_CAPACITY,
            poll_interval_ms: POLL_INTERVAL_MS,
        }
    }
}

impl ExtractorConfig {
    /// Create a new configuration builder
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::default()
    }

    /// Number of scan workers to start.
    pub fn worker_count(&self) -> usize {
        if let Some(workers) = self.workers {
            return workers.max(1);
        }
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        available.clamp(self.min_workers, self.max_workers)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check that the configuration can scan `registry` without missing
    /// occurrences at chunk boundaries.
    pub fn validate(&self, registry: &PatternRegistry) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(Error::InvalidConfig(format!(
                "invalid worker bounds: min={} max={}",
                self.min_workers, self.max_workers
            )));
        }
        if self.min_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "min_chunk_size must be non-zero".to_string(),
            ));
        }
        if self.chunk_multiplier == 0 {
            return Err(Error::InvalidConfig(
                "chunk_multiplier must be non-zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }

        let required = registry.required_overlap();
        if self.overlap < required {
            return Err(Error::InvalidConfig(format!(
                "overlap of {} bytes is smaller than the {} bytes the registered patterns need",
                self.overlap, required
            )));
        }
        if self.overlap >= self.min_chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than min_chunk_size ({})",
                self.overlap, self.min_chunk_size
            )));
        }
        Ok(())
    }
}

/// Builder for ExtractorConfig
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfigBuilder {
    workers: Option<usize>,
    min_chunk_size: Option<usize>,
    overlap: Option<usize>,
    chunk_multiplier: Option<usize>,
    queue_capacity: Option<usize>,
    poll_interval_ms: Option<u64>,
}

impl ExtractorConfigBuilder {
    /// Use exactly `workers` scan workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = Some(size);
        self
    }

    pub fn overlap(mut self, overlap: usize) -> Self {
        self.overlap = Some(overlap);
        self
    }

    pub fn chunk_multiplier(mut self, multiplier: usize) -> Self {
        self.chunk_multiplier = Some(multiplier);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = Some(interval.as_millis().max(1) as u64);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ExtractorConfig {
        let default = ExtractorConfig::default();
        ExtractorConfig {
            workers: self.workers.or(default.workers),
            min_workers: default.min_workers,
            max_workers: default.max_workers,
            min_chunk_size: self.min_chunk_size.unwrap_or(default.min_chunk_size),
            overlap: self.overlap.unwrap_or(default.overlap),
            chunk_multiplier: self.chunk_multiplier.unwrap_or(default.chunk_multiplier),
            queue_capacity: self.queue_capacity.unwrap_or(default.queue_capacity),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(default.poll_interval_ms),
        }
    }
}
