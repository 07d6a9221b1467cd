//! Per-file invocation errors.
//!
//! Every variant here is non-fatal for a batch: the driver resets the module
//! and the orchestrator records the failure against the offending file.

use crate::mode::CallProtocol;
use crate::outcome::OutcomeKind;

/// Failure of a single parse invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// A guest access fell outside the current linear memory.
    #[error("guest access out of bounds: offset {offset} + {len} bytes exceeds memory size {memory_size}")]
    OutOfBounds {
        offset: u32,
        len: usize,
        memory_size: usize,
    },

    /// The path does not fit in the reserved low region.
    #[error("path is {len} bytes but the reserved path region holds {capacity}")]
    PathTooLong { len: usize, capacity: u32 },

    /// The module allocator returned the null offset.
    #[error("module allocator returned null for {size} bytes")]
    AllocationFailed { size: usize },

    /// The parse entry point returned a zero output length.
    #[error("parser returned no output")]
    ParseFailed,

    /// `getOutput` returned the null offset after a successful parse.
    #[error("parser reported output but getOutput returned null")]
    OutputUnavailable,

    /// Output bytes were not UTF-8 JSON carrying `header.game_id`.
    #[error("malformed output: {reason}")]
    MalformedOutput { reason: String },

    /// The module trapped inside an export.
    #[error("module trapped in `{export}`: {message}")]
    ModuleTrap { export: String, message: String },

    /// A region obtained before the last reset was used after it.
    #[error("region at offset {offset} is from generation {region_generation}, instance is at {current_generation}")]
    StaleRegion {
        offset: u32,
        region_generation: u64,
        current_generation: u64,
    },

    /// The input descriptor does not match the protocol of the instance.
    #[error("input descriptor does not match the {protocol} protocol")]
    ProtocolMismatch { protocol: CallProtocol },

    /// The host could not read the input file.
    #[error("failed to read input: {0}")]
    InputUnreadable(String),
}

impl InvocationError {
    /// Outcome tag recorded in batch reports.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::OutOfBounds { .. } => OutcomeKind::OutOfBounds,
            Self::PathTooLong { .. } => OutcomeKind::PathTooLong,
            Self::AllocationFailed { .. } => OutcomeKind::AllocationFailed,
            Self::ParseFailed => OutcomeKind::ParseFailed,
            Self::OutputUnavailable => OutcomeKind::OutputUnavailable,
            Self::MalformedOutput { .. } => OutcomeKind::MalformedOutput,
            Self::ModuleTrap { .. } => OutcomeKind::ModuleTrap,
            Self::StaleRegion { .. } => OutcomeKind::StaleRegion,
            Self::ProtocolMismatch { .. } => OutcomeKind::ProtocolMismatch,
            Self::InputUnreadable(_) => OutcomeKind::InputUnreadable,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
        }
    }

    pub fn trap(export: &str, err: &impl std::fmt::Display) -> Self {
        Self::ModuleTrap {
            export: export.to_string(),
            message: format!("{err:#}"),
        }
    }
}
