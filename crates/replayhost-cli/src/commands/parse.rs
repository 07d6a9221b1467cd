use std::path::Path;

use anyhow::Result;
use replayhost_engine::Session;

/// Execute the `parse` command: run one replay and print its JSON.
pub async fn execute(harness_path: &Path, file: &str) -> Result<()> {
    let config = super::load_harness(harness_path)?;
    let mut session = Session::open(&config).await?;

    let output = session.parse_file(file).await?;
    tracing::debug!(file, game_id = %output.game_id, bytes = output.output_bytes, "Parsed replay");
    println!("{}", serde_json::to_string_pretty(&output.document)?);
    Ok(())
}
