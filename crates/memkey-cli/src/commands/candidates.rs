//! Candidates command implementation.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use memkey_core::{CancelToken, KEY_LEN, PatternRegistry, SnapshotSource, search_key};

use super::open_target;
use crate::cli::Target;
use crate::config::CliConfig;

/// Run the candidates command
pub fn run(target: &Target, patterns: Option<&Path>, limit: usize) -> Result<()> {
    let registry = CliConfig::default().registry(patterns)?;
    let opened = open_target(target)?;

    opened.preflight()?;
    let snapshot = opened.source.capture(opened.process.pid)?;
    println!("Read memory snapshot ({} bytes)", snapshot.len());

    let candidates = collect_candidates(snapshot.as_bytes(), &registry, limit);

    println!();
    println!("=== Candidates ({} shown) ===", candidates.len());
    for (offset, key) in &candidates {
        println!("  0x{:010X}: {}", offset, key);
    }
    if candidates.len() == limit {
        println!("  ... limit of {} reached", limit);
    }

    Ok(())
}

/// Walk the snapshot the same way the scanner does, recording each in-bounds
/// candidate as (snapshot offset, lowercase hex) until `limit` is reached.
fn collect_candidates(
    memory: &[u8],
    registry: &PatternRegistry,
    limit: usize,
) -> Vec<(usize, String)> {
    let base = memory.as_ptr() as usize;
    let found = Mutex::new(Vec::new());
    let stop = CancelToken::new();

    let recorder = |candidate: &[u8; KEY_LEN]| {
        let Ok(mut found) = found.lock() else {
            return false;
        };
        if found.len() < limit {
            found.push((candidate.as_ptr() as usize - base, hex::encode(candidate)));
        }
        if found.len() >= limit {
            stop.cancel();
        }
        false
    };

    if limit > 0 {
        search_key(memory, registry, &recorder, &stop);
    }
    found.into_inner().unwrap_or_default()
}
