//! A live parser instance: store, resolved exports, linear memory and the
//! reset bookkeeping that keeps one instance usable across a whole batch.

use anyhow::{bail, Context};
use replayhost_types::{CallProtocol, InvocationError, ParseMode, ProtocolPreference};
use wasmtime::{
    Extern, ExternType, Instance, Linker, Memory, Module, SharedMemory, Store, TypedFunc,
    WasmParams, WasmResults,
};

use crate::engine::CompiledModule;
use crate::error::{Result, RuntimeError};
use crate::exports::{resolve_protocol, ExportNames};
use crate::memory::{check_bounds, GuestMemory, GuestRegion};
use crate::sandbox::{HostState, SandboxConfig};

const REACTOR_ENTRY: &str = "_initialize";
const COMMAND_ENTRY: &str = "_start";

enum EntryPoint {
    /// WASI reactor: `_initialize` runs constructors and returns.
    Reactor(TypedFunc<(), ()>),
    /// WASI command: `_start` may end in `proc_exit`.
    Command(TypedFunc<(), ()>),
}

type ParseFn = TypedFunc<(u32, u32, u32), u32>;

struct ParserExports {
    entry: Option<EntryPoint>,
    init: TypedFunc<(), ()>,
    cleanup: TypedFunc<(), ()>,
    get_output: TypedFunc<(), u32>,
    alloc: Option<TypedFunc<u32, u32>>,
    parse_by_path: Option<ParseFn>,
    parse_from_memory: Option<ParseFn>,
}

impl ParserExports {
    fn resolve(
        instance: &Instance,
        store: &mut Store<HostState>,
        names: &ExportNames,
    ) -> anyhow::Result<Self> {
        let entry = if let Some(f) = typed_export(instance, store, REACTOR_ENTRY)? {
            Some(EntryPoint::Reactor(f))
        } else {
            typed_export(instance, store, COMMAND_ENTRY)?.map(EntryPoint::Command)
        };

        Ok(Self {
            entry,
            init: required_export(instance, store, &names.init)?,
            cleanup: required_export(instance, store, &names.cleanup)?,
            get_output: required_export(instance, store, &names.get_output)?,
            alloc: typed_export(instance, store, &names.alloc)?,
            parse_by_path: typed_export(instance, store, &names.parse_by_path)?,
            parse_from_memory: typed_export(instance, store, &names.parse_from_memory)?,
        })
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<HostState>,
    name: &str,
) -> anyhow::Result<Option<TypedFunc<P, R>>>
where
    P: WasmParams,
    R: WasmResults,
{
    match instance.get_func(&mut *store, name) {
        None => Ok(None),
        Some(func) => func
            .typed::<P, R>(&*store)
            .map(Some)
            .with_context(|| format!("export `{name}` has an unexpected signature")),
    }
}

fn required_export<P, R>(
    instance: &Instance,
    store: &mut Store<HostState>,
    name: &str,
) -> anyhow::Result<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    typed_export(instance, store, name)?
        .with_context(|| format!("module does not export required function `{name}`"))
}

/// Satisfy a memory import with a host-created memory of the declared type.
fn define_imported_memory(
    linker: &mut Linker<HostState>,
    store: &mut Store<HostState>,
    module: &Module,
) -> anyhow::Result<Option<GuestMemory>> {
    let mut found = None;
    for import in module.imports() {
        let ExternType::Memory(ty) = import.ty() else {
            continue;
        };
        if found.is_some() {
            bail!("module imports more than one memory");
        }

        let shared = ty.is_shared();
        let memory = if shared {
            let memory = SharedMemory::new(module.engine(), ty)
                .context("failed to create imported shared memory")?;
            linker.define(&*store, import.module(), import.name(), memory.clone())?;
            GuestMemory::Shared(memory)
        } else {
            let memory =
                Memory::new(&mut *store, ty).context("failed to create imported memory")?;
            linker.define(&*store, import.module(), import.name(), memory)?;
            GuestMemory::Local(memory)
        };

        tracing::debug!(
            module = import.module(),
            name = import.name(),
            shared,
            "Defined imported linear memory"
        );
        found = Some(memory);
    }
    Ok(found)
}

/// One live parser module.
///
/// Owned by the caller and passed by `&mut` into the invocation driver; there
/// is no global instance. All offsets are module-relative.
pub struct ModuleInstance {
    store: Store<HostState>,
    memory: GuestMemory,
    exports: ParserExports,
    names: ExportNames,
    protocol: CallProtocol,
    label: String,
    started: bool,
    generation: u64,
    resets: u64,
    reset_failures: u64,
}

impl ModuleInstance {
    /// Instantiate `compiled` inside a sandbox rooted at `sandbox.root`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiate`] when imports cannot be satisfied,
    /// a required export is missing or mistyped, or no call protocol fits.
    pub fn instantiate(
        compiled: &CompiledModule,
        sandbox: &SandboxConfig,
        names: &ExportNames,
        preference: ProtocolPreference,
    ) -> Result<Self> {
        Self::instantiate_inner(compiled, sandbox, names, preference)
            .with_context(|| format!("failed to instantiate {}", compiled.label))
            .map_err(RuntimeError::Instantiate)
    }

    fn instantiate_inner(
        compiled: &CompiledModule,
        sandbox: &SandboxConfig,
        names: &ExportNames,
        preference: ProtocolPreference,
    ) -> anyhow::Result<Self> {
        let module = &compiled.module;
        let engine = module.engine();

        let mut store = Store::new(engine, HostState::new(sandbox)?);
        store.limiter(|state| &mut state.limits);

        let mut linker: Linker<HostState> = Linker::new(engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| {
            &mut state.wasi
        })
        .context("Failed to add WASI imports to linker")?;

        let imported_memory = define_imported_memory(&mut linker, &mut store, module)?;
        let instance = linker.instantiate(&mut store, module)?;

        let memory = match instance.get_export(&mut store, &names.memory) {
            Some(Extern::Memory(memory)) => GuestMemory::Local(memory),
            Some(Extern::SharedMemory(memory)) => GuestMemory::Shared(memory),
            Some(_) => bail!("export `{}` is not a memory", names.memory),
            None => imported_memory.with_context(|| {
                format!(
                    "module neither exports `{}` nor imports a memory",
                    names.memory
                )
            })?,
        };

        let exports = ParserExports::resolve(&instance, &mut store, names)?;
        let protocol = resolve_protocol(
            preference,
            exports.alloc.is_some(),
            exports.parse_from_memory.is_some(),
            exports.parse_by_path.is_some(),
        )?;

        tracing::debug!(
            module = %compiled.label,
            %protocol,
            shared_memory = memory.is_shared(),
            memory_bytes = memory.size(&store),
            "Parser module instantiated"
        );

        Ok(Self {
            store,
            memory,
            exports,
            names: names.clone(),
            protocol,
            label: compiled.label.clone(),
            started: false,
            generation: 0,
            resets: 0,
            reset_failures: 0,
        })
    }

    /// Run the module's entry routine, then `init`. Allowed once.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyStarted`] on a second call and
    /// [`RuntimeError::Instantiate`] if the entry routine or `init` traps.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.started = true;

        match &self.exports.entry {
            Some(EntryPoint::Reactor(f)) => f
                .call(&mut self.store, ())
                .with_context(|| format!("`{REACTOR_ENTRY}` trapped"))
                .map_err(RuntimeError::Instantiate)?,
            Some(EntryPoint::Command(f)) => {
                if let Err(err) = f.call(&mut self.store, ()) {
                    let clean_exit = err
                        .downcast_ref::<wasmtime_wasi::I32Exit>()
                        .is_some_and(|exit| exit.0 == 0);
                    if !clean_exit {
                        return Err(RuntimeError::Instantiate(
                            err.context(format!("`{COMMAND_ENTRY}` failed")),
                        ));
                    }
                }
            }
            None => {}
        }

        self.exports
            .init
            .call(&mut self.store, ())
            .with_context(|| format!("`{}` trapped during start", self.names.init))
            .map_err(RuntimeError::Instantiate)?;

        tracing::debug!(module = %self.label, "Parser module started");
        Ok(())
    }

    /// Return the module to a clean allocator state: `cleanup` then `init`.
    ///
    /// Always bumps the generation, so every region handed out before this
    /// call is stale afterwards, whether or not the calls succeed. `init`
    /// runs even when `cleanup` traps.
    ///
    /// # Errors
    ///
    /// Returns the first trap from `cleanup` or `init`.
    pub fn reset(&mut self) -> std::result::Result<(), InvocationError> {
        self.resets += 1;
        self.generation += 1;

        let cleanup = self
            .exports
            .cleanup
            .call(&mut self.store, ())
            .map_err(|e| InvocationError::trap(&self.names.cleanup, &e));
        let init = self
            .exports
            .init
            .call(&mut self.store, ())
            .map_err(|e| InvocationError::trap(&self.names.init, &e));

        let result = cleanup.and(init);
        if result.is_err() {
            self.reset_failures += 1;
        }
        tracing::trace!(generation = self.generation, ok = result.is_ok(), "Module reset");
        result
    }

    /// Ask the module allocator for `size` bytes. `Ok(None)` is the null offset.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::ProtocolMismatch`] when the module has no
    /// allocator and [`InvocationError::ModuleTrap`] if it traps.
    pub fn alloc(&mut self, size: u32) -> std::result::Result<Option<GuestRegion>, InvocationError> {
        let Some(alloc) = &self.exports.alloc else {
            return Err(InvocationError::ProtocolMismatch {
                protocol: self.protocol,
            });
        };
        let offset = alloc
            .call(&mut self.store, size)
            .map_err(|e| InvocationError::trap(&self.names.alloc, &e))?;
        if offset == 0 {
            return Ok(None);
        }
        Ok(Some(self.region_at(offset, size)))
    }

    /// Call the in-memory parse entry point over `input`.
    ///
    /// # Errors
    ///
    /// Fails on a stale region, a missing export, or a trap.
    pub fn parse_from_memory(
        &mut self,
        input: &GuestRegion,
        mode: ParseMode,
    ) -> std::result::Result<u32, InvocationError> {
        self.ensure_current(input)?;
        let Some(parse) = &self.exports.parse_from_memory else {
            return Err(InvocationError::ProtocolMismatch {
                protocol: self.protocol,
            });
        };
        parse
            .call(&mut self.store, (input.offset, input.len, mode.as_u32()))
            .map_err(|e| InvocationError::trap(&self.names.parse_from_memory, &e))
    }

    /// Call the path parse entry point over the path stored at `path`.
    ///
    /// # Errors
    ///
    /// Fails on a stale region, a missing export, or a trap.
    pub fn parse_by_path(
        &mut self,
        path: &GuestRegion,
        mode: ParseMode,
    ) -> std::result::Result<u32, InvocationError> {
        self.ensure_current(path)?;
        let Some(parse) = &self.exports.parse_by_path else {
            return Err(InvocationError::ProtocolMismatch {
                protocol: self.protocol,
            });
        };
        parse
            .call(&mut self.store, (path.offset, path.len, mode.as_u32()))
            .map_err(|e| InvocationError::trap(&self.names.parse_by_path, &e))
    }

    /// Offset of the last parse result, `0` when unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::ModuleTrap`] if `getOutput` traps.
    pub fn output_offset(&mut self) -> std::result::Result<u32, InvocationError> {
        self.exports
            .get_output
            .call(&mut self.store, ())
            .map_err(|e| InvocationError::trap(&self.names.get_output, &e))
    }

    /// A region in the current generation.
    #[must_use]
    pub fn region_at(&self, offset: u32, len: u32) -> GuestRegion {
        GuestRegion {
            offset,
            len,
            generation: self.generation,
        }
    }

    /// Current linear memory size in bytes. Re-queried on every call.
    #[must_use]
    pub fn current_memory_size(&self) -> usize {
        self.memory.size(&self.store)
    }

    /// Copy `bytes` into linear memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::OutOfBounds`] if the range exceeds memory.
    pub fn write_bytes(
        &mut self,
        offset: u32,
        bytes: &[u8],
    ) -> std::result::Result<(), InvocationError> {
        self.memory.write(&mut self.store, offset, bytes)
    }

    /// Copy `len` bytes out of linear memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::OutOfBounds`] if the range exceeds memory.
    pub fn read_bytes(&self, offset: u32, len: usize) -> std::result::Result<Vec<u8>, InvocationError> {
        self.memory.read(&self.store, offset, len)
    }

    /// Write into a region obtained in the current generation. `bytes` must
    /// fit the region's capacity.
    ///
    /// # Errors
    ///
    /// Fails on a stale region or when `bytes` exceed the region or memory.
    pub fn write_region(
        &mut self,
        region: &GuestRegion,
        bytes: &[u8],
    ) -> std::result::Result<(), InvocationError> {
        self.ensure_current(region)?;
        check_bounds(0, bytes.len(), region.len_usize()).map_err(|_| {
            InvocationError::OutOfBounds {
                offset: region.offset,
                len: bytes.len(),
                memory_size: region.len_usize(),
            }
        })?;
        self.write_bytes(region.offset, bytes)
    }

    /// Read a whole region obtained in the current generation.
    ///
    /// # Errors
    ///
    /// Fails on a stale region or when the region exceeds memory.
    pub fn read_region(&self, region: &GuestRegion) -> std::result::Result<Vec<u8>, InvocationError> {
        self.ensure_current(region)?;
        self.read_bytes(region.offset, region.len_usize())
    }

    fn ensure_current(&self, region: &GuestRegion) -> std::result::Result<(), InvocationError> {
        if region.generation == self.generation {
            Ok(())
        } else {
            Err(InvocationError::StaleRegion {
                offset: region.offset,
                region_generation: region.generation,
                current_generation: self.generation,
            })
        }
    }

    #[must_use]
    pub fn protocol(&self) -> CallProtocol {
        self.protocol
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of resets issued since instantiation.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Number of resets in which `cleanup` or `init` trapped.
    #[must_use]
    pub fn reset_failures(&self) -> u64 {
        self.reset_failures
    }

    #[must_use]
    pub fn has_shared_memory(&self) -> bool {
        self.memory.is_shared()
    }

    #[must_use]
    pub fn export_names(&self) -> &ExportNames {
        &self.names
    }
}
