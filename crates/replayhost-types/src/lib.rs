//! Shared replayhost types: parse modes, call protocols, and the per-file
//! invocation error model.
//!
//! This crate carries no Wasm runtime dependency so that reporting and
//! configuration code can use it without pulling in Wasmtime.

pub mod error;
pub mod mode;
pub mod outcome;

pub use error::InvocationError;
pub use mode::{CallProtocol, ParseMode, ProtocolPreference};
pub use outcome::{OutcomeKind, ReplayOutput};
