use super::types::TestResults;
use anyhow::{Context, Result};
use std::path::Path;

/// Write `test-results.json` into `output_dir`
pub fn write_report(results: &TestResults, output_dir: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    let path = output_dir.join("test-results.json");
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("JSON report saved to: {}", path.display());
    Ok(())
}
