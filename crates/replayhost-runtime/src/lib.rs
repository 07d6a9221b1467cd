//! Wasmtime runtime for replay parser modules.
//!
//! Compiles the parser once, instantiates it behind a WASI preview-1 sandbox
//! restricted to a single directory, and exposes the module's flat export
//! contract plus bounds-checked access to its linear memory.

#![warn(clippy::pedantic)]

mod cache;
pub mod engine;
pub mod error;
pub mod exports;
pub mod instance;
pub mod memory;
pub mod sandbox;

pub use engine::{CompiledModule, ParserRuntime};
pub use error::{Result, RuntimeError};
pub use exports::{resolve_protocol, ExportNames};
pub use instance::ModuleInstance;
pub use memory::{check_bounds, GuestRegion};
pub use sandbox::SandboxConfig;
