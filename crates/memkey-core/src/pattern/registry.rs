use serde::{Deserialize, Serialize};

use super::KEY_LEN;
use super::signature::{deserialize_signature, serialize_signature};
use crate::error::{Error, Result};

/// Largest candidate offset magnitude a pattern may declare (1MB)
pub const MAX_CANDIDATE_OFFSET: isize = 1024 * 1024;

/// A signature found near key material, plus every offset (relative to the
/// start of a signature match) where a key candidate may begin.
///
/// Several offsets cover layout differences between application builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPattern {
    #[serde(
        serialize_with = "serialize_signature",
        deserialize_with = "deserialize_signature"
    )]
    pub signature: Vec<u8>,
    pub offsets: Vec<isize>,
}

impl KeyPattern {
    pub fn new(signature: impl Into<Vec<u8>>, offsets: impl Into<Vec<isize>>) -> Self {
        Self {
            signature: signature.into(),
            offsets: offsets.into(),
        }
    }

    /// Widest byte range covered by one occurrence together with any of its
    /// candidates.
    fn max_span(&self) -> usize {
        let sig_len = self.signature.len() as isize;
        self.offsets
            .iter()
            .map(|&offset| {
                let end = sig_len.max(offset.saturating_add(KEY_LEN as isize));
                let start = offset.min(0);
                end.saturating_sub(start) as usize
            })
            .max()
            .unwrap_or(self.signature.len())
    }
}

/// Ordered, immutable set of key patterns searched in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRegistry {
    patterns: Vec<KeyPattern>,
}

impl PatternRegistry {
    pub fn new(patterns: Vec<KeyPattern>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::InvalidPattern(
                "Pattern registry must not be empty".to_string(),
            ));
        }
        for (index, pattern) in patterns.iter().enumerate() {
            if pattern.signature.is_empty() {
                return Err(Error::InvalidPattern(format!(
                    "Pattern #{} has an empty signature",
                    index
                )));
            }
            if pattern.offsets.is_empty() {
                return Err(Error::InvalidPattern(format!(
                    "Pattern #{} has no candidate offsets",
                    index
                )));
            }
            if let Some(offset) = pattern
                .offsets
                .iter()
                .find(|offset| offset.unsigned_abs() > MAX_CANDIDATE_OFFSET.unsigned_abs())
            {
                return Err(Error::InvalidPattern(format!(
                    "Pattern #{} offset {} is outside +/-{} bytes",
                    index, offset, MAX_CANDIDATE_OFFSET
                )));
            }
        }
        Ok(Self { patterns })
    }

    /// Patterns for the current desktop client (version 4 database layout).
    pub fn builtin() -> Self {
        Self {
            patterns: vec![KeyPattern::new(
                [0x20, 0x66, 0x74, 0x73, 0x35, 0x28, 0x25, 0x00],
                [16, -80, 64],
            )],
        }
    }

    pub fn patterns(&self) -> &[KeyPattern] {
        &self.patterns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyPattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Minimum chunk overlap that keeps every occurrence and its candidates
    /// inside at least one chunk.
    ///
    /// A range of `span` bytes that straddles a chunk boundary lies wholly
    /// inside the upper chunk once that chunk reaches `span - 1` bytes below
    /// the boundary.
    pub fn required_overlap(&self) -> usize {
        self.patterns
            .iter()
            .map(KeyPattern::max_span)
            .max()
            .unwrap_or(0)
            .saturating_sub(1)
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> IntoIterator for &'a PatternRegistry {
    type Item = &'a KeyPattern;
    type IntoIter = std::slice::Iter<'a, KeyPattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.patterns.iter()
    }
}
