//! Splitting a snapshot into overlapping chunks and feeding the scan queue.

use std::ops::Range;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::debug;

use super::ScanCounters;
use crate::cancel::CancelToken;
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::memory::SnapshotSource;

/// A contiguous view into a snapshot handed to one worker.
#[derive(Debug, Clone)]
pub struct MemoryChunk {
    /// Position of this chunk in address order (0 is the lowest range)
    pub index: usize,
    /// Offset of `data[0]` within the snapshot
    pub start: usize,
    pub data: Bytes,
}

impl MemoryChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn end(&self) -> usize {
        self.start + self.data.len()
    }
}

/// How a snapshot of a given size is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
}

/// Decide the chunk layout for a snapshot of `total_size` bytes scanned by
/// `workers` workers.
///
/// Small snapshots become a single chunk. Otherwise the target is
/// `workers * chunk_multiplier` chunks, reduced whenever that would make a
/// chunk smaller than `min_chunk_size`.
pub fn plan_chunks(total_size: usize, workers: usize, config: &ExtractorConfig) -> ChunkPlan {
    let min_chunk_size = config.min_chunk_size.max(1);

    if total_size <= min_chunk_size {
        return ChunkPlan {
            total_size,
            chunk_count: 1,
            chunk_size: total_size,
            overlap: config.overlap,
        };
    }

    let mut chunk_count = workers.max(1) * config.chunk_multiplier.max(1);
    let mut chunk_size = total_size / chunk_count;
    if chunk_size < min_chunk_size {
        chunk_count = (total_size / min_chunk_size).max(1);
        chunk_size = total_size / chunk_count;
    }

    ChunkPlan {
        total_size,
        chunk_count,
        chunk_size,
        overlap: config.overlap,
    }
}

impl ChunkPlan {
    /// Byte range of chunk `index` within the snapshot.
    ///
    /// The highest chunk runs to the end of the snapshot so trailing bytes
    /// lost to integer division are still scanned. Every chunk above the
    /// lowest one starts `overlap` bytes early (clamped to zero).
    pub fn range(&self, index: usize) -> Range<usize> {
        let mut start = index * self.chunk_size;
        let mut end = (index + 1) * self.chunk_size;

        if index + 1 == self.chunk_count {
            end = self.total_size;
        }
        if index > 0 {
            start = start.saturating_sub(self.overlap);
        }

        start..end
    }

    /// Chunk indices and ranges in emission order: highest addresses first.
    pub fn ranges(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        (0..self.chunk_count)
            .rev()
            .map(move |index| (index, self.range(index)))
    }
}

/// Capture the process snapshot and push its chunks onto the scan queue.
///
/// The queue closes when `queue` is dropped on return, whatever the outcome.
/// A capture failure is returned before any chunk is sent.
pub(crate) fn produce_chunks(
    source: &dyn SnapshotSource,
    pid: u32,
    workers: usize,
    config: &ExtractorConfig,
    queue: Sender<MemoryChunk>,
    cancel: &CancelToken,
    counters: &ScanCounters,
) -> Result<()> {
    let snapshot = source.capture(pid).map_err(Error::MemoryReadFailed)?;
    debug!("Read memory snapshot, size: {} bytes", snapshot.len());

    let plan = plan_chunks(snapshot.len(), workers, config);
    counters.snapshot_size.store(snapshot.len(), Ordering::Relaxed);
    counters
        .chunks_planned
        .store(plan.chunk_count, Ordering::Relaxed);

    for (index, range) in plan.ranges() {
        if let Some(reason) = cancel.reason() {
            return Err(Error::Cancelled(reason));
        }

        debug!(
            chunk_index = index + 1,
            total_chunks = plan.chunk_count,
            chunk_size = range.len(),
            start_offset = range.start,
            end_offset = range.end,
            "Processing memory chunk"
        );

        let mut chunk = MemoryChunk {
            index,
            start: range.start,
            data: snapshot.slice(range),
        };

        // Block while the queue is full, waking up to notice cancellation
        loop {
            match queue.send_timeout(chunk, config.poll_interval()) {
                Ok(()) => {
                    counters.chunks_emitted.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if let Some(reason) = cancel.reason() {
                        return Err(Error::Cancelled(reason));
                    }
                    chunk = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!("All scan workers exited, stopping chunk producer");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
