use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{KeyPattern, PatternRegistry};
use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    patterns: Vec<KeyPattern>,
}

/// Load a pattern registry from a JSON pattern file.
pub fn load_patterns<P: AsRef<Path>>(path: P) -> Result<PatternRegistry> {
    let content = fs::read_to_string(&path)?;
    let file: PatternFile = serde_json::from_str(&content)?;
    PatternRegistry::new(file.patterns)
}

pub fn save_patterns<P: AsRef<Path>>(path: P, registry: &PatternRegistry) -> Result<()> {
    let file = PatternFile {
        patterns: registry.patterns().to_vec(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    fs::write(path, content)?;
    Ok(())
}

/// Parse a signature written as whitespace-separated hex bytes
/// (e.g. `"20 66 74 73 35 28 25 00"`).
///
/// Only fixed bytes are accepted; wildcard tokens are rejected.
pub fn parse_signature(signature: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in signature.split_whitespace() {
        if token.contains('?') {
            return Err(Error::InvalidPattern(format!(
                "Wildcard token '{}' is not supported in key signatures",
                token
            )));
        }

        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidPattern(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(value);
    }

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("Signature is empty".to_string()));
    }

    Ok(bytes)
}

pub fn format_signature(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn serialize_signature<S: Serializer>(
    bytes: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_signature(bytes))
}

pub(crate) fn deserialize_signature<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_signature(&text).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_signature() {
        let bytes = parse_signature("20 66 74 73 35 28 25 00").unwrap();
        assert_eq!(bytes, vec![0x20, 0x66, 0x74, 0x73, 0x35, 0x28, 0x25, 0x00]);
    }

    #[test]
    fn test_parse_signature_rejects_wildcards() {
        let err = parse_signature("48 8D ?? 05").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern(_)));
    }

    #[test]
    fn test_parse_signature_rejects_garbage() {
        assert!(parse_signature("").is_err());
        assert!(parse_signature("   ").is_err());
        assert!(parse_signature("GG").is_err());
        assert!(parse_signature("123").is_err());
    }

    #[test]
    fn test_format_signature() {
        assert_eq!(format_signature(&[0x20, 0x0A, 0xFF]), "20 0A FF");
        assert_eq!(format_signature(&[]), "");
    }

    #[test]
    fn test_save_and_load_patterns() {
        let temp_file = NamedTempFile::new().unwrap();
        let registry = PatternRegistry::builtin();

        save_patterns(temp_file.path(), &registry).unwrap();
        let loaded = load_patterns(temp_file.path()).unwrap();

        assert_eq!(loaded.patterns(), registry.patterns());
    }

    #[test]
    fn test_load_patterns_from_handwritten_json() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(
            temp_file.path(),
            r#"{ "patterns": [ { "signature": "de ad be ef", "offsets": [-40, 8] } ] }"#,
        )
        .unwrap();

        let registry = load_patterns(temp_file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.patterns()[0].signature, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(registry.patterns()[0].offsets, vec![-40, 8]);
    }

    #[test]
    fn test_load_patterns_rejects_empty_offsets() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(
            temp_file.path(),
            r#"{ "patterns": [ { "signature": "de ad", "offsets": [] } ] }"#,
        )
        .unwrap();

        assert!(matches!(
            load_patterns(temp_file.path()),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_load_patterns_rejects_extreme_offsets() {
        for offsets in ["[-9223372036854775808]", "[9223372036854775807]"] {
            let temp_file = NamedTempFile::new().unwrap();
            fs::write(
                temp_file.path(),
                format!(
                    r#"{{ "patterns": [ {{ "signature": "de ad", "offsets": {} }} ] }}"#,
                    offsets
                ),
            )
            .unwrap();

            assert!(matches!(
                load_patterns(temp_file.path()),
                Err(Error::InvalidPattern(_))
            ));
        }
    }

    #[test]
    fn test_load_patterns_missing_file() {
        let err = load_patterns("/nonexistent/patterns.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
