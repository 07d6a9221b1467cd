//! Harness engine for replay parser modules.
//!
//! Drives one long-lived [`ModuleInstance`](replayhost_runtime::ModuleInstance)
//! over a batch of replay files: per-invocation memory protocol, mandatory
//! reset after every attempt, and the aggregate report.

#![warn(clippy::pedantic)]

pub mod batch;
pub mod config;
pub mod driver;
pub mod report;
pub mod session;

pub use batch::{list_candidates, run_batch, BatchPlan};
pub use config::{parse_harness, validate_harness, HarnessConfig};
pub use driver::{InputDescriptor, InvocationDriver, ResetGuard};
pub use report::{BatchReport, FileReport};
pub use session::Session;
