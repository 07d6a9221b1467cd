//! Harness configuration types, deserialized from `harness.yaml`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use replayhost_runtime::{ExportNames, SandboxConfig};
use replayhost_types::{ParseMode, ProtocolPreference};
use serde::{Deserialize, Serialize};

/// Capacity of the reserved low region the path is written into.
pub const DEFAULT_PATH_REGION_BYTES: u32 = 1024;

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub version: String,
    /// Parser module, `.wasm` or `.wat`.
    pub module: PathBuf,
    /// The one directory the module may read; replay files are listed here.
    pub root: PathBuf,
    #[serde(default = "default_guest_root")]
    pub guest_root: String,
    /// File extension to select, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub mode: ParseMode,
    #[serde(default)]
    pub protocol: ProtocolPreference,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub limits: HarnessLimits,
    #[serde(default)]
    pub exports: ExportNames,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_guest_root() -> String {
    replayhost_runtime::sandbox::DEFAULT_GUEST_ROOT.to_string()
}

fn default_extension() -> String {
    "sdfz".to_string()
}

fn default_iterations() -> u32 {
    1
}

fn default_path_region_bytes() -> u32 {
    DEFAULT_PATH_REGION_BYTES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessLimits {
    /// Store memory limit, e.g. `256mb`. Unlimited when absent.
    #[serde(default)]
    pub max_memory: Option<String>,
    #[serde(default = "default_path_region_bytes")]
    pub path_region_bytes: u32,
}

impl Default for HarnessLimits {
    fn default() -> Self {
        Self {
            max_memory: None,
            path_region_bytes: DEFAULT_PATH_REGION_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Overrides `REPLAYHOST_WASMTIME_AOT` when set.
    #[serde(default)]
    pub aot: Option<bool>,
}

impl HarnessConfig {
    /// Resolve relative `module` and `root` against `base`, normally the
    /// directory holding the config file.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.module.is_relative() {
            self.module = base.join(&self.module);
        }
        if self.root.is_relative() {
            self.root = base.join(&self.root);
        }
    }

    /// Parsed `limits.max_memory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the size string is invalid.
    pub fn max_memory_bytes(&self) -> Result<Option<u64>> {
        self.limits
            .max_memory
            .as_deref()
            .map(parse_byte_size)
            .transpose()
            .context("invalid limits.max_memory")
    }

    /// Sandbox capabilities for the module instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `limits.max_memory` is invalid.
    pub fn sandbox(&self) -> Result<SandboxConfig> {
        Ok(SandboxConfig::new(&self.root)
            .guest_root(&self.guest_root)
            .max_memory_bytes(self.max_memory_bytes()?))
    }
}

/// Parse a human byte size: `4096`, `64kb`, `16mb`, `1gb` (powers of 1024,
/// case-insensitive, optional `i` as in `mib`).
///
/// # Errors
///
/// Returns an error on an empty value, unknown unit, or overflow.
pub fn parse_byte_size(raw: &str) -> Result<u64> {
    let s = raw.trim().to_ascii_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        bail!("byte size '{raw}' has no numeric part");
    }
    let value: u64 = digits
        .parse()
        .with_context(|| format!("byte size '{raw}' is out of range"))?;

    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        other => bail!("unknown byte size unit '{other}' in '{raw}'"),
    };

    value
        .checked_mul(multiplier)
        .with_context(|| format!("byte size '{raw}' overflows"))
}
