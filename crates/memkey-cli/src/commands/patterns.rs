//! Patterns command implementation.

use std::path::Path;

use anyhow::Result;
use memkey_core::{PatternRegistry, format_signature, save_patterns};

/// Run the patterns command
pub fn run(output: Option<&Path>) -> Result<()> {
    let registry = PatternRegistry::builtin();

    if let Some(path) = output {
        save_patterns(path, &registry)?;
        println!("Patterns saved to: {}", path.display());
        return Ok(());
    }

    println!("=== Builtin Patterns ({}) ===", registry.len());
    for (i, pattern) in registry.iter().enumerate() {
        let offsets: Vec<String> = pattern.offsets.iter().map(|o| format!("{:+}", o)).collect();
        println!(
            "  [{}] {}  offsets: {}",
            i,
            format_signature(&pattern.signature),
            offsets.join(", ")
        );
    }
    println!();
    println!("Required chunk overlap: {} bytes", registry.required_overlap());

    Ok(())
}
