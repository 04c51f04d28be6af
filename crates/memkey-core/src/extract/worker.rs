//! Backward signature search over a chunk and the scan worker loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use memchr::memmem::FinderRev;
use tracing::debug;

use super::{MemoryChunk, ScanCounters};
use crate::cancel::CancelToken;
use crate::pattern::{KEY_LEN, PatternRegistry, format_signature};
use crate::validator::KeyValidator;

/// Result of searching one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Lowercase hex of the validated key
    Found(String),
    /// Every occurrence of every pattern was tried
    Exhausted,
    /// Cancellation was observed mid-scan; nothing is reported
    Cancelled,
}

/// Search `memory` for a key the validator accepts.
///
/// For each pattern in registration order, occurrences are visited from the
/// highest offset downward. Each occurrence tries every candidate offset;
/// candidates that would start before the chunk or end past it are never
/// handed to the validator.
pub fn search_key(
    memory: &[u8],
    registry: &PatternRegistry,
    validator: &dyn KeyValidator,
    cancel: &CancelToken,
) -> ScanOutcome {
    for pattern in registry {
        let finder = FinderRev::new(&pattern.signature);
        let sig_len = pattern.signature.len();
        let mut end = memory.len();

        loop {
            if cancel.is_cancelled() {
                return ScanOutcome::Cancelled;
            }

            let Some(index) = finder.rfind(&memory[..end]) else {
                break;
            };

            for &offset in &pattern.offsets {
                let Some(key_offset) = index.checked_add_signed(offset) else {
                    continue;
                };
                if key_offset + KEY_LEN > memory.len() {
                    continue;
                }
                let Ok(candidate) = <&[u8; KEY_LEN]>::try_from(&memory[key_offset..key_offset + KEY_LEN])
                else {
                    continue;
                };

                if validator.validate(candidate) {
                    let key = hex::encode(candidate);
                    debug!(
                        pattern = %format_signature(&pattern.signature),
                        offset,
                        "Key found"
                    );
                    return ScanOutcome::Found(key);
                }
            }

            // Drop the occurrence at `index` but keep any that overlap it
            end = index + sig_len - 1;
        }
    }

    ScanOutcome::Exhausted
}

/// Counts validator calls on behalf of the run statistics.
struct CountingValidator<'a> {
    inner: &'a dyn KeyValidator,
    calls: &'a AtomicUsize,
}

impl KeyValidator for CountingValidator<'_> {
    fn validate(&self, candidate: &[u8; KEY_LEN]) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.validate(candidate)
    }
}

/// Pull chunks until the queue is closed and drained or `cancel` fires.
///
/// At most one key is ever delivered on `results`: publishing never blocks,
/// and a key arriving after another has been published is dropped.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_worker(
    id: usize,
    queue: Receiver<MemoryChunk>,
    results: Sender<String>,
    registry: &PatternRegistry,
    validator: &dyn KeyValidator,
    cancel: &CancelToken,
    counters: &ScanCounters,
    poll_interval: Duration,
) {
    let validator = CountingValidator {
        inner: validator,
        calls: &counters.candidates_tried,
    };

    loop {
        if cancel.is_cancelled() {
            debug!(worker = id, "Scan worker cancelled");
            return;
        }

        let chunk = match queue.recv_timeout(poll_interval) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!(worker = id, "Chunk queue drained, scan worker exiting");
                return;
            }
        };

        match search_key(&chunk.data, registry, &validator, cancel) {
            ScanOutcome::Found(key) => {
                counters.chunks_scanned.fetch_add(1, Ordering::Relaxed);
                match results.try_send(key) {
                    Ok(()) => debug!(worker = id, chunk = chunk.index, "Published key"),
                    Err(TrySendError::Full(_)) => {
                        debug!(worker = id, "Key already published, discarding duplicate")
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
            ScanOutcome::Exhausted => {
                counters.chunks_scanned.fetch_add(1, Ordering::Relaxed);
            }
            ScanOutcome::Cancelled => return,
        }
    }
}
