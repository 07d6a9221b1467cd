//! Batch orchestration: list replay files under the root and feed them
//! sequentially through one module instance.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use replayhost_runtime::ModuleInstance;
use replayhost_types::{CallProtocol, InvocationError, ReplayOutput};

use crate::driver::{InputDescriptor, InvocationDriver, ResetGuard};
use crate::report::{BatchReport, FileReport};

/// What a batch runs over.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Host directory holding the replays; also the sandbox root.
    pub root: PathBuf,
    /// Where `root` is mounted inside the sandbox.
    pub guest_root: String,
    pub extension: String,
    pub iterations: u32,
}

/// `true` when `name` ends with `.{extension}`, compared exactly.
#[must_use]
pub fn matches_extension(name: &str, extension: &str) -> bool {
    name.strip_suffix(extension)
        .is_some_and(|stem| stem.ends_with('.'))
}

/// Path of a root-level file as the module sees it.
#[must_use]
pub fn guest_path(guest_root: &str, name: &str) -> String {
    let root = guest_root.trim_end_matches('/');
    format!("{root}/{name}")
}

/// List regular files directly under `root` whose name ends with
/// `.{extension}`, in directory listing order.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub async fn list_candidates(root: &Path, extension: &str) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("Failed to list replay directory: {}", root.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if !matches_extension(&name, extension) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        names.push(name);
    }
    Ok(names)
}

/// Run every candidate file through `driver`, `plan.iterations` times.
///
/// Per-file failures are recorded, never propagated.
///
/// # Errors
///
/// Returns an error only if the root cannot be listed.
pub async fn run_batch(
    instance: &mut ModuleInstance,
    driver: &InvocationDriver,
    plan: &BatchPlan,
) -> Result<BatchReport> {
    let start = Instant::now();
    let candidates = list_candidates(&plan.root, &plan.extension).await?;
    let resets_before = instance.resets();
    let reset_failures_before = instance.reset_failures();

    tracing::info!(
        module = instance.label(),
        root = %plan.root.display(),
        files = candidates.len(),
        iterations = plan.iterations,
        protocol = %instance.protocol(),
        mode = %driver.mode(),
        "Starting batch"
    );

    let mut report = BatchReport::default();
    for iteration in 0..plan.iterations {
        for name in &candidates {
            let file_start = Instant::now();
            let (result, input_bytes) = invoke_file(instance, driver, plan, name).await;

            match &result {
                Ok(output) => tracing::debug!(
                    file = %name,
                    iteration,
                    game_id = %output.game_id,
                    "Parsed replay"
                ),
                Err(err) => tracing::warn!(
                    file = %name,
                    iteration,
                    kind = %err.kind(),
                    error = %err,
                    "Replay failed"
                ),
            }

            report.record(FileReport::new(
                name,
                iteration,
                &result,
                input_bytes,
                file_start.elapsed(),
            ));
        }
    }

    report.resets = instance.resets() - resets_before;
    report.reset_failures = instance.reset_failures() - reset_failures_before;
    report.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        resets = report.resets,
        reset_failures = report.reset_failures,
        duration_secs = report.duration_secs,
        "Batch complete"
    );
    Ok(report)
}

async fn invoke_file(
    instance: &mut ModuleInstance,
    driver: &InvocationDriver,
    plan: &BatchPlan,
    name: &str,
) -> (Result<ReplayOutput, InvocationError>, u64) {
    let host_path = plan.root.join(name);
    match instance.protocol() {
        CallProtocol::Path => {
            let input_bytes = tokio::fs::metadata(&host_path)
                .await
                .map_or(0, |meta| meta.len());
            let path = guest_path(&plan.guest_root, name);
            let result = driver.invoke(instance, InputDescriptor::Path(&path));
            (result, input_bytes)
        }
        CallProtocol::Buffer => match tokio::fs::read(&host_path).await {
            Ok(bytes) => {
                let result = driver.invoke(instance, InputDescriptor::Bytes(&bytes));
                (result, bytes.len() as u64)
            }
            Err(err) => {
                // Counted as an attempt, so it takes its reset like any other.
                let _reset = ResetGuard::new(instance);
                (Err(InvocationError::InputUnreadable(err.to_string())), 0)
            }
        },
    }
}
