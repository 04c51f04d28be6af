//! Extract command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use memkey_core::{CancelToken, KEY_LEN, KeyExtractor, KeyValidator};
use owo_colors::OwoColorize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::open_target;
use crate::cli::Target;
use crate::config::CliConfig;

/// Accepts the candidate whose SHA-256 matches a known digest.
#[derive(Debug, Clone)]
pub struct DigestValidator {
    digest: [u8; 32],
}

impl DigestValidator {
    /// Parse a 64 character hex digest.
    pub fn from_hex(digest: &str) -> Result<Self> {
        let bytes = hex::decode(digest.trim()).context("Key digest is not valid hex")?;
        let digest = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| anyhow::anyhow!("Key digest must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self { digest })
    }
}

impl KeyValidator for DigestValidator {
    fn validate(&self, candidate: &[u8; KEY_LEN]) -> bool {
        Sha256::digest(candidate).as_slice() == self.digest
    }
}

/// Run the extract command
pub fn run(
    target: &Target,
    timeout: Option<u64>,
    patterns: Option<&Path>,
    config_path: Option<&Path>,
    key_digest: &str,
) -> Result<()> {
    let config = CliConfig::load_or_default(config_path)?;
    let registry = config.registry(patterns)?;
    let validator = DigestValidator::from_hex(key_digest)?;
    let opened = open_target(target)?;

    let mut extractor = KeyExtractor::with_patterns(config.extractor, registry)?
        .with_source(opened.source)
        .with_access_gate(opened.access);
    extractor.set_validator(Arc::new(validator));

    let cancel = match timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let cancel_ctrlc = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt, cancelling search...");
        cancel_ctrlc.cancel();
    })?;

    let started = Instant::now();
    let (result, stats) = extractor.extract_with_stats(&opened.process, &cancel);

    println!(
        "Scanned {}/{} chunks of a {} byte snapshot with {} workers ({} candidates, {:.2?})",
        stats.chunks_scanned,
        stats.chunks_planned,
        stats.snapshot_size,
        stats.workers,
        stats.candidates_tried,
        started.elapsed()
    );

    match result {
        Ok(key) => {
            println!("{} {}", "Key:".green().bold(), key);
            Ok(())
        }
        Err(e) => bail!("{}", e.red()),
    }
}
