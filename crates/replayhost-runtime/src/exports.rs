//! Export names of the parser contract and call protocol detection.

use anyhow::{bail, Result};
use replayhost_types::{CallProtocol, ProtocolPreference};
use serde::{Deserialize, Serialize};

/// Names of the module exports the harness drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportNames {
    pub memory: String,
    pub init: String,
    pub cleanup: String,
    pub alloc: String,
    pub parse_by_path: String,
    pub parse_from_memory: String,
    pub get_output: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            memory: "memory".into(),
            init: "init".into(),
            cleanup: "cleanup".into(),
            alloc: "alloc".into(),
            parse_by_path: "parseDemoFile".into(),
            parse_from_memory: "parseDemoFileFromMemory".into(),
            get_output: "getOutput".into(),
        }
    }
}

impl ExportNames {
    /// All configured names, paired with their config key.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("memory", self.memory.as_str()),
            ("init", self.init.as_str()),
            ("cleanup", self.cleanup.as_str()),
            ("alloc", self.alloc.as_str()),
            ("parse_by_path", self.parse_by_path.as_str()),
            ("parse_from_memory", self.parse_from_memory.as_str()),
            ("get_output", self.get_output.as_str()),
        ]
    }
}

/// Pick the call protocol from the preference and the exports present.
///
/// Buffer-mode needs both the allocator and the in-memory parse entry point;
/// path-mode needs the path entry point. `Auto` prefers buffer-mode.
///
/// # Errors
///
/// Returns an error when the preferred protocol (or, for `Auto`, any
/// protocol) is not supported by the module.
pub fn resolve_protocol(
    preference: ProtocolPreference,
    has_alloc: bool,
    has_parse_from_memory: bool,
    has_parse_by_path: bool,
) -> Result<CallProtocol> {
    let buffer_ok = has_alloc && has_parse_from_memory;
    match preference {
        ProtocolPreference::Auto if buffer_ok => Ok(CallProtocol::Buffer),
        ProtocolPreference::Auto if has_parse_by_path => Ok(CallProtocol::Path),
        ProtocolPreference::Auto => {
            bail!("module exports neither an allocator with an in-memory parse entry point nor a path parse entry point")
        }
        ProtocolPreference::Buffer if buffer_ok => Ok(CallProtocol::Buffer),
        ProtocolPreference::Buffer => {
            bail!("buffer protocol requested but the module lacks the allocator or in-memory parse export")
        }
        ProtocolPreference::Path if has_parse_by_path => Ok(CallProtocol::Path),
        ProtocolPreference::Path => {
            bail!("path protocol requested but the module lacks the path parse export")
        }
    }
}
