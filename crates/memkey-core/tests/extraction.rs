//! End-to-end extraction against scripted memory snapshots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use memkey_core::memory::MockSnapshotSource;
use memkey_core::{
    AlwaysPermitted, CancelReason, CancelToken, Error, ExtractorConfig, KEY_LEN, KeyExtractor,
    KeyValidator, PatternRegistry, ProcessHandle, ProcessStatus, ScanOutcome, plan_chunks,
    search_key,
};

const MB: usize = 1024 * 1024;
const SIG: [u8; 8] = [0x20, 0x66, 0x74, 0x73, 0x35, 0x28, 0x25, 0x00];

fn process() -> ProcessHandle {
    ProcessHandle::new(1234, "target", ProcessStatus::Running)
}

fn test_key(seed: u8) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    for (i, b) in key.iter_mut().enumerate() {
        *b = seed.wrapping_add((i as u8).wrapping_mul(7)) | 0x01;
    }
    key
}

fn place(buffer: &mut [u8], at: usize, bytes: &[u8]) {
    buffer[at..at + bytes.len()].copy_from_slice(bytes);
}

fn extractor(data: impl Into<Bytes>, config: ExtractorConfig) -> KeyExtractor {
    KeyExtractor::new(config)
        .unwrap()
        .with_source(Arc::new(MockSnapshotSource::new(data)))
        .with_access_gate(Arc::new(AlwaysPermitted))
}

fn accept(keys: Vec<[u8; KEY_LEN]>) -> Arc<dyn KeyValidator> {
    Arc::new(move |candidate: &[u8; KEY_LEN]| keys.contains(candidate))
}

#[test]
fn test_concrete_scenario() {
    let key = test_key(0x40);
    let mut memory = vec![0u8; 2 * MB];
    place(&mut memory, 500_000, &SIG);
    place(&mut memory, 500_000 + 64, &key);

    let mut extractor = extractor(memory, ExtractorConfig::default());
    extractor.set_validator(accept(vec![key]));

    let found = extractor.extract(&process(), &CancelToken::new()).unwrap();
    assert_eq!(found, hex::encode(key));
}

#[test]
fn test_found_near_every_chunk_boundary() {
    let config = ExtractorConfig::builder().workers(2).build();
    let total = 4 * MB;
    let plan = plan_chunks(total, 2, &config);
    assert_eq!(plan.chunk_count, 4);

    let key = test_key(0x11);
    for boundary in [MB, 2 * MB, 3 * MB] {
        for &offset in &[16isize, -80, 64] {
            let positions = [
                boundary - config.overlap,
                boundary - config.overlap + 1,
                boundary - 120,
                boundary - 96,
                boundary - 40,
                boundary - SIG.len(),
                boundary - 3,
                boundary,
                boundary + 5,
            ];
            for position in positions {
                let key_at = position.checked_add_signed(offset).unwrap();
                let mut memory = vec![0u8; total];
                place(&mut memory, position, &SIG);
                place(&mut memory, key_at, &key);

                let mut extractor = extractor(memory, config.clone());
                extractor.set_validator(accept(vec![key]));

                let result = extractor.extract(&process(), &CancelToken::new());
                assert_eq!(
                    result.ok(),
                    Some(hex::encode(key)),
                    "signature at {} (boundary {}), offset {}",
                    position,
                    boundary,
                    offset
                );
            }
        }
    }
}

#[test]
fn test_found_at_snapshot_edges() {
    let config = ExtractorConfig::builder().workers(2).build();
    let total = 3 * MB + 17;
    let key = test_key(0x22);

    let cases: [(usize, isize); 3] = [(80, -80), (0, 16), (total - 96, 64)];
    for (position, offset) in cases {
        let mut memory = vec![0u8; total];
        place(&mut memory, position, &SIG);
        place(&mut memory, position.checked_add_signed(offset).unwrap(), &key);

        let mut extractor = extractor(memory, config.clone());
        extractor.set_validator(accept(vec![key]));
        assert_eq!(
            extractor.extract(&process(), &CancelToken::new()).unwrap(),
            hex::encode(key),
            "signature at {}, offset {}",
            position,
            offset
        );
    }
}

/// Scan every planned chunk the way the workers do and report whether the key
/// was found in any of them.
fn scan_with_overlap(memory: &[u8], overlap: usize, key: [u8; KEY_LEN]) -> bool {
    let config = ExtractorConfig {
        overlap,
        ..ExtractorConfig::default()
    };
    let plan = plan_chunks(memory.len(), 2, &config);
    let registry = PatternRegistry::builtin();
    let validator = move |candidate: &[u8; KEY_LEN]| *candidate == key;

    plan.ranges().any(|(_, range)| {
        matches!(
            search_key(&memory[range], &registry, &validator, &CancelToken::new()),
            ScanOutcome::Found(_)
        )
    })
}

#[test]
fn test_straddling_signature_needs_required_overlap() {
    let registry = PatternRegistry::builtin();
    let required = registry.required_overlap();
    let key = test_key(0x33);

    // Occurrence + candidate span [b - 95, b + 1): only the upper chunk can
    // hold all of it, and only if it reaches back at least 95 bytes
    let boundary = 2 * MB;
    let position = boundary - required;
    let mut memory = vec![0u8; 4 * MB];
    place(&mut memory, position, &SIG);
    place(&mut memory, position + 64, &key);

    assert!(scan_with_overlap(&memory, required, key));
    assert!(scan_with_overlap(&memory, 1024, key));

    // Regression guard: an overlap one byte short misses the key
    assert!(!scan_with_overlap(&memory, required - 1, key));
    assert!(!scan_with_overlap(&memory, 32, key));

    // The extractor refuses to run with such an overlap at all
    let config = ExtractorConfig::builder().overlap(required - 1).build();
    assert!(matches!(
        KeyExtractor::new(config),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_at_most_one_result_and_prompt_cancellation() {
    let config = ExtractorConfig::builder().workers(4).build();
    let total = 16 * MB;
    let key_high = test_key(0x44);
    let key_low = test_key(0x55);

    let mut memory = vec![0u8; total];
    // Plenty of decoys so the scan would take a while if left running
    for i in 0..20_000 {
        place(&mut memory, 4096 + i * 700, &SIG);
    }
    place(&mut memory, total - MB, &SIG);
    place(&mut memory, total - MB + 16, &key_high);
    place(&mut memory, total - 3 * MB, &SIG);
    place(&mut memory, total - 3 * MB + 16, &key_low);

    let calls = Arc::new(AtomicUsize::new(0));
    let first_accept: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let validator = {
        let calls = Arc::clone(&calls);
        let first_accept = Arc::clone(&first_accept);
        move |candidate: &[u8; KEY_LEN]| {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_micros(200));
            let accepted = *candidate == key_high || *candidate == key_low;
            if accepted {
                first_accept.lock().unwrap().get_or_insert_with(Instant::now);
            }
            accepted
        }
    };

    let mut extractor = extractor(memory, config);
    extractor.set_validator(Arc::new(validator));

    let (result, stats) = extractor.extract_with_stats(&process(), &CancelToken::new());
    let returned_at = Instant::now();
    let key = result.unwrap();
    assert!(key == hex::encode(key_high) || key == hex::encode(key_low));

    let published = first_accept.lock().unwrap().expect("a key was accepted");
    assert!(returned_at.duration_since(published) < Duration::from_secs(2));

    // Every decoy carries three candidates; far fewer were tried
    assert!(stats.candidates_tried < 20_000 * 3);

    // Nothing keeps validating after return
    let after_return = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), after_return);
}

#[test]
fn test_no_match_scans_every_chunk() {
    let config = ExtractorConfig::builder().workers(3).build();
    let total = 6 * MB + 5;
    let memory = vec![0x5Au8; total];

    let mut extractor = extractor(memory, config.clone());
    let validator = |_: &[u8; KEY_LEN]| -> bool { panic!("no signature, no candidate") };
    extractor.set_validator(Arc::new(validator));

    let (result, stats) = extractor.extract_with_stats(&process(), &CancelToken::new());
    assert!(matches!(result, Err(Error::NoValidKey)));

    let expected = plan_chunks(total, 3, &config).chunk_count;
    assert_eq!(expected, 6);
    assert_eq!(stats.chunks_planned, expected);
    assert_eq!(stats.chunks_emitted, expected);
    assert_eq!(stats.chunks_scanned, expected);
    assert_eq!(stats.candidates_tried, 0);
    assert_eq!(stats.snapshot_size, total);
}

#[test]
fn test_no_match_with_rejected_candidates() {
    let config = ExtractorConfig::builder().workers(2).build();
    let mut memory = vec![0u8; 3 * MB];
    for at in [1000, MB + 1000, 2 * MB + 1000] {
        place(&mut memory, at, &SIG);
    }

    let mut extractor = extractor(memory, config);
    extractor.set_validator(Arc::new(|_: &[u8; KEY_LEN]| false));

    let (result, stats) = extractor.extract_with_stats(&process(), &CancelToken::new());
    assert!(matches!(result, Err(Error::NoValidKey)));
    assert_eq!(stats.chunks_scanned, 3);
    assert_eq!(stats.candidates_tried, 9);
}

fn slow_decoy_extractor(calls: Arc<AtomicUsize>) -> KeyExtractor {
    let config = ExtractorConfig::builder().workers(2).build();
    let mut memory = vec![0u8; 4 * MB];
    for i in 0..5_000 {
        place(&mut memory, 200 + i * 800, &SIG);
    }

    let mut extractor = extractor(memory, config);
    extractor.set_validator(Arc::new(move |_: &[u8; KEY_LEN]| {
        calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        false
    }));
    extractor
}

#[test]
fn test_cancelled_before_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = slow_decoy_extractor(Arc::clone(&calls));

    let cancel = CancelToken::new();
    cancel.cancel();

    let err = extractor.extract(&process(), &cancel).unwrap_err();
    assert!(matches!(err, Error::Cancelled(CancelReason::Requested)));

    let after_return = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), after_return);
}

#[test]
fn test_cancelled_mid_scan() {
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = slow_decoy_extractor(Arc::clone(&calls));

    let cancel = CancelToken::new();
    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        })
    };

    let started = Instant::now();
    let err = extractor.extract(&process(), &cancel).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Cancelled(CancelReason::Requested)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(calls.load(Ordering::SeqCst) < 5_000 * 3);

    let after_return = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), after_return);
}

#[test]
fn test_deadline_exceeded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = slow_decoy_extractor(Arc::clone(&calls));

    let started = Instant::now();
    let err = extractor
        .extract(&process(), &CancelToken::with_timeout(Duration::from_millis(50)))
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(CancelReason::DeadlineExceeded)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_validator_only_sees_in_bounds_candidates() {
    let config = ExtractorConfig::builder().workers(2).build();
    let total = 4 * MB;
    let plan = plan_chunks(total, 2, &config);

    let mut memory = vec![0u8; total];
    // Edges of the snapshot and of every chunk
    let mut positions = vec![0, 40, total - SIG.len(), total - 60];
    for index in 1..plan.chunk_count {
        let range = plan.range(index);
        positions.extend([range.start, range.start + 10, index * plan.chunk_size - 4]);
    }
    for &at in &positions {
        place(&mut memory, at, &SIG);
    }

    let snapshot = Bytes::from(memory);
    let base = snapshot.as_ptr() as usize;
    let chunk_ranges: Vec<_> = plan.ranges().map(|(_, r)| r).collect();
    let out_of_range = Arc::new(AtomicUsize::new(0));

    let validator = {
        let out_of_range = Arc::clone(&out_of_range);
        move |candidate: &[u8; KEY_LEN]| {
            let start = candidate.as_ptr() as usize - base;
            let inside = chunk_ranges
                .iter()
                .any(|r| r.start <= start && start + KEY_LEN <= r.end);
            if !inside {
                out_of_range.fetch_add(1, Ordering::SeqCst);
            }
            false
        }
    };

    let mut extractor = extractor(snapshot, config);
    extractor.set_validator(Arc::new(validator));

    let (result, stats) = extractor.extract_with_stats(&process(), &CancelToken::new());
    assert!(matches!(result, Err(Error::NoValidKey)));
    assert!(stats.candidates_tried > 0);
    assert_eq!(out_of_range.load(Ordering::SeqCst), 0);
}

#[test]
fn test_match_across_region_seam_is_only_a_candidate() {
    // Two regions joined back to back, the way live sources build snapshots:
    // the first ends with half a signature, the second starts with the rest
    let key = test_key(0x66);
    let mut lower = vec![0u8; 64 * 1024];
    place(&mut lower, 1000, &SIG);
    place(&mut lower, 1000 + 16, &key);
    let seam = lower.len() - 4;
    place(&mut lower, seam, &SIG[..4]);

    let mut upper = vec![0xC3u8; 64 * 1024];
    place(&mut upper, 0, &SIG[4..]);

    let mut memory = lower;
    memory.extend_from_slice(&upper);

    let tried = Arc::new(Mutex::new(Vec::new()));
    let validator = {
        let tried = Arc::clone(&tried);
        move |candidate: &[u8; KEY_LEN]| {
            tried.lock().unwrap().push(*candidate);
            *candidate == key
        }
    };

    let mut extractor = extractor(memory, ExtractorConfig::builder().workers(2).build());
    extractor.set_validator(Arc::new(validator));

    let found = extractor.extract(&process(), &CancelToken::new()).unwrap();
    assert_eq!(found, hex::encode(key));

    // The seam match was offered first and rejected
    let tried = tried.lock().unwrap();
    assert_eq!(tried[0], [0xC3u8; KEY_LEN]);
    assert_eq!(tried.last(), Some(&key));
}

#[test]
fn test_capture_failure_maps_to_memory_read_failure() {
    let mut extractor = KeyExtractor::new(ExtractorConfig::builder().workers(2).build())
        .unwrap()
        .with_source(Arc::new(MockSnapshotSource::failing(
            std::io::ErrorKind::UnexpectedEof,
            "process exited during read",
        )))
        .with_access_gate(Arc::new(AlwaysPermitted));
    extractor.set_validator(accept(vec![test_key(1)]));

    let err = extractor.extract(&process(), &CancelToken::new()).unwrap_err();
    match err {
        Error::MemoryReadFailed(io) => assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("unexpected error: {other}"),
    }
}
