pub mod check;
pub mod parse;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use replayhost_engine::config::{parse_harness, validate_harness, HarnessConfig};

/// Parse and validate a harness file.
pub(crate) fn load_harness(harness_path: &Path) -> Result<HarnessConfig> {
    let config = parse_harness(harness_path)
        .with_context(|| format!("Failed to parse harness: {}", harness_path.display()))?;
    validate_harness(&config)?;
    Ok(config)
}
