//! Verify command implementation.

use super::open_existing;
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let store = open_existing(path)?;
    let report = store.validate()?;
    for problem in &report.problems {
        println!("  - {problem}");
    }

    println!();
    if report.is_clean() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!(
            "✗ Store verification failed ({} problems)",
            report.problems.len()
        );
        Err("Verification failed".into())
    }
}
