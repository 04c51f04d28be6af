//! TOML configuration file for the command line tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memkey_core::{ExtractorConfig, PatternRegistry, load_patterns};
use serde::{Deserialize, Serialize};

/// Contents of a `memkey.toml` file.
///
/// ```toml
/// patterns = "patterns.json"
///
/// [extractor]
/// workers = 4
/// overlap = 1024
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub extractor: ExtractorConfig,
    /// Pattern file used when `--patterns` is not given
    pub patterns: Option<PathBuf>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Resolve the pattern registry: an explicit file wins over the config
    /// entry, which wins over the builtin patterns.
    pub fn registry(&self, override_path: Option<&Path>) -> Result<PatternRegistry> {
        match override_path.or(self.patterns.as_deref()) {
            Some(path) => load_patterns(path)
                .with_context(|| format!("Failed to load patterns from {}", path.display())),
            None => Ok(PatternRegistry::builtin()),
        }
    }
}
