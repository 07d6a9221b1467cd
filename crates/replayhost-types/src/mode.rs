//! Parse mode flag and call protocol selection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque parser mode flag passed through to the module unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParseMode(pub u32);

impl ParseMode {
    /// Header and metadata only; the parser skips the packet stream.
    pub const METADATA_ONLY: Self = Self(1);

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Default for ParseMode {
    fn default() -> Self {
        Self::METADATA_ONLY
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ParseMode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// How input reaches the module for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallProtocol {
    /// The host writes a path into the reserved low region and the module
    /// opens the file through its WASI preopen.
    Path,
    /// The host copies the file bytes into a region handed out by the
    /// module allocator.
    Buffer,
}

impl fmt::Display for CallProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Path => "path",
            Self::Buffer => "buffer",
        };
        f.write_str(s)
    }
}

/// Configured protocol preference. `Auto` picks buffer-mode when the module
/// exports an allocator and falls back to path-mode otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPreference {
    #[default]
    Auto,
    Buffer,
    Path,
}
