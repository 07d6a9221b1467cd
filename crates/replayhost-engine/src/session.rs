//! A harness session: one compiled module, one started instance, reused for
//! everything the session runs.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use replayhost_runtime::{CompiledModule, ModuleInstance, ParserRuntime};
use replayhost_types::{CallProtocol, ReplayOutput};

use crate::batch::{guest_path, run_batch, BatchPlan};
use crate::config::HarnessConfig;
use crate::driver::{InputDescriptor, InvocationDriver};
use crate::report::BatchReport;

pub struct Session {
    instance: ModuleInstance,
    driver: InvocationDriver,
    plan: BatchPlan,
    module_load_ms: u64,
}

impl Session {
    /// Compile, instantiate and start the module named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be read, compiled, instantiated
    /// or started. All of these are fatal for the run.
    pub async fn open(config: &HarnessConfig) -> Result<Self> {
        let load_start = Instant::now();
        let module_path = config.module.clone();
        let aot = config.cache.aot;

        let compiled: CompiledModule = tokio::task::spawn_blocking(move || -> Result<_> {
            let runtime = match aot {
                Some(enabled) => ParserRuntime::with_aot(enabled)?,
                None => ParserRuntime::new()?,
            };
            runtime
                .load_module(&module_path)
                .with_context(|| format!("Failed to load parser module: {}", module_path.display()))
        })
        .await
        .context("Module load task panicked")??;

        let sandbox = config.sandbox()?;
        let mut instance = ModuleInstance::instantiate(
            &compiled,
            &sandbox,
            &config.exports,
            config.protocol,
        )?;
        instance.start()?;

        let module_load_ms = u64::try_from(load_start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            module = compiled.label(),
            protocol = %instance.protocol(),
            compile_ms = compiled.load_ms(),
            module_load_ms,
            memory_bytes = instance.current_memory_size(),
            "Parser module ready"
        );

        Ok(Self {
            instance,
            driver: InvocationDriver::new(config.mode, config.limits.path_region_bytes),
            plan: BatchPlan {
                root: config.root.clone(),
                guest_root: config.guest_root.clone(),
                extension: config.extension.clone(),
                iterations: config.iterations,
            },
            module_load_ms,
        })
    }

    #[must_use]
    pub fn instance(&self) -> &ModuleInstance {
        &self.instance
    }

    #[must_use]
    pub fn module_load_ms(&self) -> u64 {
        self.module_load_ms
    }

    /// Run the configured batch over the root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub async fn run_batch(&mut self) -> Result<BatchReport> {
        let mut report = run_batch(&mut self.instance, &self.driver, &self.plan).await?;
        report.module_load_ms = self.module_load_ms;
        Ok(report)
    }

    /// Parse a single file that lives directly under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a plain file name, the file cannot
    /// be read, or the invocation fails.
    pub async fn parse_file(&mut self, name: &str) -> Result<ReplayOutput> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!("'{name}' is not a file name under the replay root");
        }

        let output = match self.instance.protocol() {
            CallProtocol::Path => {
                let path = guest_path(&self.plan.guest_root, name);
                self.driver
                    .invoke(&mut self.instance, InputDescriptor::Path(&path))
            }
            CallProtocol::Buffer => {
                let host_path = self.plan.root.join(name);
                let bytes = tokio::fs::read(&host_path)
                    .await
                    .with_context(|| format!("Failed to read replay: {}", host_path.display()))?;
                self.driver
                    .invoke(&mut self.instance, InputDescriptor::Bytes(&bytes))
            }
        };
        output.with_context(|| format!("Failed to parse {name}"))
    }
}
