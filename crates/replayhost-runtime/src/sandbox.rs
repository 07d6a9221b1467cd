//! WASI sandbox configuration: the single preopened root, stdio passthrough,
//! and store limits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use wasmtime::{StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

/// Guest path the root directory is mounted at when none is configured.
pub const DEFAULT_GUEST_ROOT: &str = "/";

/// Capabilities handed to one module instance.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Host directory the module may read. Nothing else is reachable.
    pub root: PathBuf,
    /// Path the root appears at inside the sandbox.
    pub guest_root: String,
    /// Upper bound on linear memory. Growth past it fails softly
    /// (`memory.grow` returns -1) so the module allocator can report null.
    pub max_memory_bytes: Option<u64>,
}

impl SandboxConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guest_root: DEFAULT_GUEST_ROOT.to_string(),
            max_memory_bytes: None,
        }
    }

    #[must_use]
    pub fn guest_root(mut self, guest_root: impl Into<String>) -> Self {
        self.guest_root = guest_root.into();
        self
    }

    #[must_use]
    pub fn max_memory_bytes(mut self, bytes: Option<u64>) -> Self {
        self.max_memory_bytes = bytes;
        self
    }
}

/// Store data for a parser instance.
pub struct HostState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) limits: StoreLimits,
}

impl HostState {
    /// Build the WASI context and limits for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, not a directory, or cannot be
    /// preopened.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Ok(Self {
            wasi: build_wasi_ctx(config)?,
            limits: build_store_limits(config.max_memory_bytes),
        })
    }
}

/// Build a WASI preview-1 context exposing exactly one read-only directory.
///
/// No args, no env, no network. Host stdout/stderr are inherited so parser
/// diagnostics reach the terminal.
///
/// # Errors
///
/// Returns an error if the root cannot be preopened.
pub fn build_wasi_ctx(config: &SandboxConfig) -> Result<WasiP1Ctx> {
    ensure_root_dir(&config.root)?;

    let mut builder = WasiCtxBuilder::new();
    builder.inherit_stdout();
    builder.inherit_stderr();

    builder.allow_tcp(false);
    builder.allow_udp(false);
    builder.allow_ip_name_lookup(false);

    builder
        .preopened_dir(
            &config.root,
            &config.guest_root,
            DirPerms::READ,
            FilePerms::READ,
        )
        .with_context(|| {
            format!(
                "failed to preopen '{}' as '{}'",
                config.root.display(),
                config.guest_root
            )
        })?;

    tracing::debug!(
        root = %config.root.display(),
        guest_root = %config.guest_root,
        "WASI sandbox configured"
    );

    Ok(builder.build_p1())
}

fn ensure_root_dir(root: &Path) -> Result<()> {
    let meta = std::fs::metadata(root)
        .with_context(|| format!("sandbox root '{}' is not accessible", root.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("sandbox root '{}' is not a directory", root.display());
    }
    Ok(())
}

/// Build Wasmtime store limits.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn build_store_limits(max_memory_bytes: Option<u64>) -> StoreLimits {
    let mut builder = StoreLimitsBuilder::new();
    if let Some(max_bytes) = max_memory_bytes {
        builder = builder.memory_size(max_bytes as usize);
    }
    builder = builder.instances(1).trap_on_grow_failure(false);
    builder.build()
}
