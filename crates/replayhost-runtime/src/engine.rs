//! Wasmtime engine ownership and module compilation.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use wasmtime::{Config, Engine, Module};

use crate::cache::{self, ArtifactCache};
use crate::error::{Result, RuntimeError};

/// A compiled parser module, ready to instantiate.
#[derive(Clone)]
pub struct CompiledModule {
    pub(crate) module: Module,
    pub(crate) label: String,
    load_ms: u64,
}

impl CompiledModule {
    /// Human-readable origin of the module (file path or caller label).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wall-clock time spent compiling or loading the module.
    #[must_use]
    pub fn load_ms(&self) -> u64 {
        self.load_ms
    }

    #[must_use]
    pub fn has_export(&self, name: &str) -> bool {
        self.module.get_export(name).is_some()
    }
}

/// Owns the Wasmtime engine and compiles parser modules.
///
/// One runtime compiles the module once; the resulting [`CompiledModule`] is
/// instantiated once and reused for every file of a batch.
pub struct ParserRuntime {
    engine: Engine,
    cache: Option<ArtifactCache>,
}

impl ParserRuntime {
    /// Create a runtime; the AOT cache follows `REPLAYHOST_WASMTIME_AOT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime engine cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_aot(cache::enabled_by_env())
    }

    /// Create a runtime with the AOT cache explicitly enabled or disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime engine cannot be created.
    pub fn with_aot(aot: bool) -> Result<Self> {
        let mut config = Config::new();
        // Parsers built with threads import a shared memory.
        config.wasm_threads(true);

        let engine = Engine::new(&config)
            .context("Failed to initialize Wasmtime engine")
            .map_err(RuntimeError::Compile)?;

        let cache = if aot {
            let dir = cache::default_dir();
            match ArtifactCache::open(dir.clone(), &engine) {
                Ok(cache) => {
                    tracing::debug!(dir = %cache.dir().display(), "Wasmtime AOT cache enabled");
                    Some(cache)
                }
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "AOT cache directory unusable; compiling without cache"
                    );
                    None
                }
            }
        } else {
            tracing::debug!("Wasmtime AOT cache disabled");
            None
        };

        Ok(Self { engine, cache })
    }

    /// Load and compile a module from disk (`.wasm` or `.wat`).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the file cannot be read and
    /// [`RuntimeError::Compile`] if it is not a valid module.
    pub fn load_module(&self, wasm_path: &Path) -> Result<CompiledModule> {
        let bytes = std::fs::read(wasm_path)?;
        self.compile(&bytes, &wasm_path.display().to_string())
    }

    /// Compile module bytes (binary or WAT text), through the AOT cache
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Compile`] on a malformed module.
    pub fn compile(&self, bytes: &[u8], label: &str) -> Result<CompiledModule> {
        let started = Instant::now();

        let module = match &self.cache {
            Some(cache) => cache.load(&self.engine, bytes, label)?,
            None => Module::new(&self.engine, bytes)
                .with_context(|| format!("Failed to compile Wasm module: {label}"))
                .map_err(RuntimeError::Compile)?,
        };

        let load_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(module = label, load_ms, "Parser module compiled");

        Ok(CompiledModule {
            module,
            label: label.to_string(),
            load_ms,
        })
    }
}
