//! Batch result types.

use std::collections::BTreeMap;
use std::time::Duration;

use replayhost_types::{InvocationError, OutcomeKind, ReplayOutput};
use serde::Serialize;

/// Outcome of one file in one iteration.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub iteration: u32,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Error text for failed files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub input_bytes: u64,
    pub elapsed_ms: f64,
}

impl FileReport {
    #[must_use]
    pub fn new(
        name: &str,
        iteration: u32,
        result: &Result<ReplayOutput, InvocationError>,
        input_bytes: u64,
        elapsed: Duration,
    ) -> Self {
        let (outcome, game_id, message) = match result {
            Ok(output) => (OutcomeKind::Success, Some(output.game_id.clone()), None),
            Err(err) => (err.kind(), None, Some(err.to_string())),
        };
        Self {
            name: name.to_string(),
            iteration,
            outcome,
            game_id,
            message,
            input_bytes,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Resets issued during the batch, one per attempted file.
    pub resets: u64,
    pub reset_failures: u64,
    pub duration_secs: f64,
    pub module_load_ms: u64,
}

impl BatchReport {
    pub fn record(&mut self, file: FileReport) {
        self.attempted += 1;
        if file.outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.files.push(file);
    }

    /// Failure counts grouped by outcome, in a stable order.
    #[must_use]
    pub fn failures_by_kind(&self) -> BTreeMap<OutcomeKind, u64> {
        let mut counts = BTreeMap::new();
        for file in self.files.iter().filter(|f| !f.outcome.is_success()) {
            *counts.entry(file.outcome).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn files_per_sec(&self) -> f64 {
        if self.duration_secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let attempted = self.attempted as f64;
            attempted / self.duration_secs
        } else {
            0.0
        }
    }
}
