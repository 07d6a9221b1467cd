//! Per-file outcome tags and decoded parser output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvocationError;

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    OutOfBounds,
    PathTooLong,
    AllocationFailed,
    ParseFailed,
    OutputUnavailable,
    MalformedOutput,
    ModuleTrap,
    StaleRegion,
    ProtocolMismatch,
    InputUnreadable,
}

impl OutcomeKind {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::OutOfBounds => "out_of_bounds",
            Self::PathTooLong => "path_too_long",
            Self::AllocationFailed => "allocation_failed",
            Self::ParseFailed => "parse_failed",
            Self::OutputUnavailable => "output_unavailable",
            Self::MalformedOutput => "malformed_output",
            Self::ModuleTrap => "module_trap",
            Self::StaleRegion => "stale_region",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::InputUnreadable => "input_unreadable",
        };
        f.write_str(s)
    }
}

/// Decoded output of one successful parse.
///
/// Owns a copy of the JSON, so it stays valid after the module resets and
/// reuses the memory the output was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutput {
    /// `header.game_id` of the replay.
    pub game_id: String,
    /// Full JSON document produced by the parser.
    pub document: serde_json::Value,
    /// Size of the raw output in bytes.
    pub output_bytes: usize,
}

impl ReplayOutput {
    /// Decode raw output bytes as UTF-8 JSON and extract `header.game_id`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::MalformedOutput`] when the bytes are not
    /// UTF-8, not JSON, or lack a string or numeric `header.game_id`.
    pub fn decode(bytes: &[u8]) -> Result<Self, InvocationError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| InvocationError::malformed(format!("output is not UTF-8: {e}")))?;
        let document: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| InvocationError::malformed(format!("output is not JSON: {e}")))?;

        let game_id = match document.pointer("/header/game_id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(InvocationError::malformed(format!(
                    "header.game_id has unexpected type: {other}"
                )))
            }
            None => return Err(InvocationError::malformed("missing header.game_id")),
        };

        Ok(Self {
            game_id,
            document,
            output_bytes: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_extracts_game_id() {
        let out = ReplayOutput::decode(br#"{"header":{"game_id":"abc123"},"players":[]}"#).unwrap();
        assert_eq!(out.game_id, "abc123");
        assert_eq!(out.output_bytes, 44);
        assert!(out.document["players"].is_array());
    }

    #[test]
    fn decode_accepts_numeric_game_id() {
        let out = ReplayOutput::decode(br#"{"header":{"game_id":77}}"#).unwrap();
        assert_eq!(out.game_id, "77");
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = ReplayOutput::decode(&[0x7b, 0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), OutcomeKind::MalformedOutput);
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn decode_rejects_truncated_json() {
        let err = ReplayOutput::decode(br#"{"header":{"game_id":"ab"#).unwrap_err();
        assert_eq!(err.kind(), OutcomeKind::MalformedOutput);
    }

    #[test]
    fn decode_rejects_missing_game_id() {
        let err = ReplayOutput::decode(br#"{"header":{}}"#).unwrap_err();
        assert!(err.to_string().contains("missing header.game_id"));
    }

    #[test]
    fn outcome_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OutcomeKind::AllocationFailed).unwrap(),
            "\"allocation_failed\""
        );
        assert_eq!(OutcomeKind::ParseFailed.to_string(), "parse_failed");
        assert!(OutcomeKind::Success.is_success());
        assert!(!OutcomeKind::ModuleTrap.is_success());
    }
}
