//! On-disk store of precompiled parser modules.
//!
//! Artifacts are named by a SHA-256 over the engine's compatibility tag and
//! the module bytes, so a Wasmtime upgrade or a changed engine `Config`
//! never picks up an artifact it cannot load.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use wasmtime::{Engine, Module};

use crate::error::{Result, RuntimeError};

pub(crate) const AOT_ENV: &str = "REPLAYHOST_WASMTIME_AOT";
pub(crate) const AOT_DIR_ENV: &str = "REPLAYHOST_WASMTIME_AOT_DIR";

/// `false` only when `REPLAYHOST_WASMTIME_AOT` holds a recognised "off" value.
pub(crate) fn enabled_by_env() -> bool {
    std::env::var(AOT_ENV).map_or(true, |raw| !is_off(&raw))
}

fn is_off(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// `REPLAYHOST_WASMTIME_AOT_DIR`, else `~/.replayhost/cache/wasmtime-aot`,
/// else a directory under the system temp dir.
pub(crate) fn default_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(AOT_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".replayhost/cache/wasmtime-aot"),
        None => std::env::temp_dir().join("replayhost-wasmtime-aot"),
    }
}

pub(crate) struct ArtifactCache {
    dir: PathBuf,
    engine_tag: u64,
}

impl ArtifactCache {
    /// Create `dir` if needed and bind the cache to `engine`'s compatibility tag.
    pub(crate) fn open(dir: PathBuf, engine: &Engine) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let mut hasher = DefaultHasher::new();
        engine.precompile_compatibility_hash().hash(&mut hasher);
        Ok(Self {
            dir,
            engine_tag: hasher.finish(),
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn artifact_path(&self, bytes: &[u8]) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.engine_tag.to_le_bytes());
        hasher.update(bytes);
        let digest = hasher.finalize();
        let key: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{key}.cwasm"))
    }

    /// Load `bytes` from its cached artifact, compiling and storing it on a miss.
    ///
    /// An unreadable artifact is discarded and rebuilt. Failing to store a
    /// fresh artifact only costs the next run a recompile.
    pub(crate) fn load(&self, engine: &Engine, bytes: &[u8], label: &str) -> Result<Module> {
        let path = self.artifact_path(bytes);

        if path.is_file() {
            // SAFETY: files in this directory are written only by `store` from
            // `Engine::precompile_module` output, and the name pins the engine
            // tag. Anything else fails Wasmtime's header checks and is rebuilt.
            match unsafe { Module::deserialize_file(engine, &path) } {
                Ok(module) => {
                    tracing::debug!(module = label, artifact = %path.display(), "AOT cache hit");
                    return Ok(module);
                }
                Err(err) => {
                    tracing::warn!(
                        artifact = %path.display(),
                        error = %err,
                        "Discarding unreadable AOT artifact"
                    );
                    if let Err(err) = std::fs::remove_file(&path) {
                        tracing::debug!(error = %err, "Could not remove AOT artifact");
                    }
                }
            }
        }

        let artifact = engine
            .precompile_module(bytes)
            .with_context(|| format!("Failed to compile Wasm module: {label}"))
            .map_err(RuntimeError::Compile)?;

        match self.store(&path, &artifact) {
            Ok(()) => {
                tracing::debug!(module = label, artifact = %path.display(), "AOT artifact stored");
            }
            Err(err) => tracing::warn!(
                artifact = %path.display(),
                error = %err,
                "Failed to store AOT artifact"
            ),
        }

        // SAFETY: `artifact` was just produced by `precompile_module` on `engine`.
        unsafe { Module::deserialize(engine, &artifact) }
            .with_context(|| format!("Failed to load precompiled module: {label}"))
            .map_err(RuntimeError::Compile)
    }

    /// Write through a temp file in the cache dir so readers never see a
    /// partial artifact.
    fn store(&self, path: &Path, artifact: &[u8]) -> io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(artifact)?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}
