//! Parallel key extraction from a process memory snapshot.
//!
//! One producer thread captures the snapshot and feeds overlapping chunks,
//! highest addresses first, into a bounded queue. A fixed pool of scan
//! workers drains the queue, searching each chunk for every registered
//! signature and validating candidate keys. The first validated key wins;
//! everything else is cancelled and joined before [`KeyExtractor::extract`]
//! returns.
//!
//! ```text
//!   SnapshotSource ──► producer ──► [chunk queue] ──► worker × N ──► [result slot, cap 1]
//!                                                                          │
//!   caller CancelToken ──► search scope (child) ◄── cancel on result ◄── orchestrator
//! ```

mod chunk;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};

use crate::cancel::{CancelReason, CancelToken};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::memory::{AccessGate, HostAccessGate, SnapshotSource, host_source};
use crate::pattern::PatternRegistry;
use crate::process::ProcessHandle;
use crate::validator::KeyValidator;

pub use chunk::{ChunkPlan, MemoryChunk, plan_chunks};
pub use worker::{ScanOutcome, search_key};

/// Shared progress counters updated by the producer and the workers.
#[derive(Debug, Default)]
pub(crate) struct ScanCounters {
    pub snapshot_size: AtomicUsize,
    pub chunks_planned: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
    pub chunks_scanned: AtomicUsize,
    pub candidates_tried: AtomicUsize,
}

/// Statistics for one extraction attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub workers: usize,
    pub snapshot_size: usize,
    pub chunks_planned: usize,
    pub chunks_emitted: usize,
    /// Chunks searched to completion (or until a key was found)
    pub chunks_scanned: usize,
    /// Candidates passed to the validator
    pub candidates_tried: usize,
}

impl ScanCounters {
    fn stats(&self, workers: usize) -> ScanStats {
        ScanStats {
            workers,
            snapshot_size: self.snapshot_size.load(Ordering::Relaxed),
            chunks_planned: self.chunks_planned.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_scanned: self.chunks_scanned.load(Ordering::Relaxed),
            candidates_tried: self.candidates_tried.load(Ordering::Relaxed),
        }
    }
}

/// What the orchestrator observed first while waiting.
enum Received {
    Key(String),
    Exhausted,
    Cancelled(CancelReason),
}

/// Recovers a database key from a running process.
pub struct KeyExtractor {
    config: ExtractorConfig,
    registry: Arc<PatternRegistry>,
    validator: Option<Arc<dyn KeyValidator>>,
    source: Arc<dyn SnapshotSource>,
    access: Arc<dyn AccessGate>,
}

impl KeyExtractor {
    /// Create an extractor for the builtin patterns reading live memory of
    /// the host platform.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        Self::with_patterns(config, PatternRegistry::builtin())
    }

    pub fn with_patterns(config: ExtractorConfig, registry: PatternRegistry) -> Result<Self> {
        config.validate(&registry)?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
            validator: None,
            source: host_source(),
            access: Arc::new(HostAccessGate),
        })
    }

    /// Replace where snapshots come from (e.g. a dump file).
    pub fn with_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_access_gate(mut self, access: Arc<dyn AccessGate>) -> Self {
        self.access = access;
        self
    }

    /// Set the validator that confirms candidate keys. Required before
    /// [`extract`](Self::extract).
    pub fn set_validator(&mut self, validator: Arc<dyn KeyValidator>) {
        self.validator = Some(validator);
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Search the memory of `process` for the key.
    ///
    /// Returns the lowercase hex encoding of the first candidate the
    /// validator accepts. `cancel` may carry a deadline; it is never
    /// cancelled by the extractor itself.
    ///
    /// Every thread is joined before returning, so after cancellation or a
    /// deadline this still waits for in-flight work: at most one validator
    /// call per worker, or a whole [`SnapshotSource::capture`] when the
    /// snapshot is still being read, since a capture cannot be interrupted.
    pub fn extract(&self, process: &ProcessHandle, cancel: &CancelToken) -> Result<String> {
        self.extract_with_stats(process, cancel).0
    }

    /// Like [`extract`](Self::extract), also returning run statistics.
    pub fn extract_with_stats(
        &self,
        process: &ProcessHandle,
        cancel: &CancelToken,
    ) -> (Result<String>, ScanStats) {
        let counters = ScanCounters::default();
        let workers = self.config.worker_count();

        let result = self
            .preflight(process)
            .and_then(|validator| self.run(process, validator, workers, cancel, &counters));
        let stats = counters.stats(workers);

        match &result {
            Ok(_) => info!(
                "Key found after scanning {}/{} chunks ({} candidates)",
                stats.chunks_scanned, stats.chunks_planned, stats.candidates_tried
            ),
            Err(e) => info!(
                "Key extraction failed: {} (scanned {}/{} chunks, {} candidates)",
                e, stats.chunks_scanned, stats.chunks_planned, stats.candidates_tried
            ),
        }

        (result, stats)
    }

    fn preflight(&self, process: &ProcessHandle) -> Result<&dyn KeyValidator> {
        if !process.is_running() {
            return Err(Error::ProcessOffline);
        }
        if !self.access.is_memory_access_permitted() {
            return Err(Error::AccessProtected);
        }
        self.validator.as_deref().ok_or(Error::ValidatorMissing)
    }

    fn run(
        &self,
        process: &ProcessHandle,
        validator: &dyn KeyValidator,
        workers: usize,
        cancel: &CancelToken,
        counters: &ScanCounters,
    ) -> Result<String> {
        let search = cancel.child();
        let (chunk_tx, chunk_rx) = bounded::<MemoryChunk>(self.config.queue_capacity);
        let (result_tx, result_rx) = bounded::<String>(1);

        debug!("Starting {} workers for key search", workers);

        let registry = self.registry.as_ref();
        let source = self.source.as_ref();
        let config = &self.config;
        let search_ref = &search;

        thread::scope(|scope| {
            let producer = scope.spawn(move || {
                let result = chunk::produce_chunks(
                    source,
                    process.pid,
                    workers,
                    config,
                    chunk_tx,
                    search_ref,
                    counters,
                );
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        warn!("Failed to read memory: {}", e);
                        search_ref.cancel();
                    }
                }
                result
            });

            for id in 0..workers {
                let queue = chunk_rx.clone();
                let results = result_tx.clone();
                scope.spawn(move || {
                    worker::run_worker(
                        id,
                        queue,
                        results,
                        registry,
                        validator,
                        search_ref,
                        counters,
                        config.poll_interval(),
                    )
                });
            }

            // Workers hold the only remaining handles: the result channel
            // disconnects once every worker has exited
            drop(chunk_rx);
            drop(result_tx);

            let received = self.await_result(&result_rx, cancel);
            search.cancel();

            let producer_result = producer
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload));

            match received {
                Received::Key(key) => Ok(key),
                Received::Cancelled(reason) => Err(Error::Cancelled(reason)),
                Received::Exhausted => match producer_result {
                    Err(e) if !e.is_cancelled() => Err(e),
                    _ => match cancel.reason() {
                        Some(reason) => Err(Error::Cancelled(reason)),
                        None => Err(Error::NoValidKey),
                    },
                },
            }
        })
    }

    /// Wait for a key, pipeline exhaustion, or caller cancellation.
    fn await_result(&self, results: &Receiver<String>, cancel: &CancelToken) -> Received {
        let poll_interval = self.config.poll_interval();
        loop {
            if let Some(reason) = cancel.reason() {
                return Received::Cancelled(reason);
            }

            let wait = cancel
                .remaining()
                .map_or(poll_interval, |remaining| remaining.min(poll_interval));

            match results.recv_timeout(wait) {
                Ok(key) => return Received::Key(key),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Received::Exhausted,
            }
        }
    }
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExtractor")
            .field("config", &self.config)
            .field("patterns", &self.registry.len())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
