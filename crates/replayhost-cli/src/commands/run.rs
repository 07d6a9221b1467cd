use std::path::Path;

use anyhow::Result;
use replayhost_engine::config::validate_harness;
use replayhost_engine::{BatchReport, Session};
use replayhost_types::ParseMode;

/// Execute the `run` command: load the harness, run the batch, print results.
pub async fn execute(
    harness_path: &Path,
    iterations: Option<u32>,
    mode: Option<u32>,
    json: bool,
) -> Result<()> {
    let mut config = super::load_harness(harness_path)?;
    if let Some(iterations) = iterations {
        config.iterations = iterations;
    }
    if let Some(mode) = mode {
        config.mode = ParseMode(mode);
    }
    validate_harness(&config)?;

    tracing::info!(
        module = %config.module.display(),
        root = %config.root.display(),
        extension = %config.extension,
        iterations = config.iterations,
        "Harness validated"
    );

    let mut session = Session::open(&config).await?;
    let report = session.run_batch().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.failed > 0 {
        anyhow::bail!(
            "{} of {} replay(s) failed",
            report.failed,
            report.attempted
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    for file in &report.files {
        match (&file.game_id, &file.message) {
            (Some(game_id), _) => println!("{:<40} {game_id}", file.name),
            (None, Some(message)) => println!("{:<40} {}: {message}", file.name, file.outcome),
            (None, None) => println!("{:<40} {}", file.name, file.outcome),
        }
    }

    let input_bytes: u64 = report.files.iter().map(|f| f.input_bytes).sum();
    println!();
    println!("Batch completed.");
    println!("  Files:           {}", report.attempted);
    println!("  Succeeded:       {}", report.succeeded);
    println!("  Failed:          {}", report.failed);
    for (kind, count) in report.failures_by_kind() {
        println!("    {kind:<22} {count}");
    }
    println!("  Input:           {}", format_bytes(input_bytes));
    println!("  Resets:          {}", report.resets);
    if report.reset_failures > 0 {
        println!("  Reset failures:  {}", report.reset_failures);
    }
    println!("  Module load:     {}ms", report.module_load_ms);
    println!("  Duration:        {:.2}s", report.duration_secs);
    println!("  Throughput:      {:.0} files/sec", report.files_per_sec());
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
