//! One parse invocation: write the input, call the parser, read the output,
//! and reset the module on every exit path.

use std::ops::{Deref, DerefMut};

use replayhost_runtime::ModuleInstance;
use replayhost_types::{CallProtocol, InvocationError, ParseMode, ReplayOutput};

use crate::config::types::DEFAULT_PATH_REGION_BYTES;

/// Input for one invocation. Must match the instance's call protocol.
#[derive(Debug, Clone, Copy)]
pub enum InputDescriptor<'a> {
    /// Guest path, written into the reserved region at offset 0.
    Path(&'a str),
    /// Raw file bytes, copied into a module allocation.
    Bytes(&'a [u8]),
}

/// Resets the module (`cleanup` then `init`) when dropped.
///
/// Borrowing the instance through the guard means no code path between
/// construction and drop can skip the reset.
pub struct ResetGuard<'a> {
    instance: &'a mut ModuleInstance,
}

impl<'a> ResetGuard<'a> {
    pub fn new(instance: &'a mut ModuleInstance) -> Self {
        Self { instance }
    }
}

impl Deref for ResetGuard<'_> {
    type Target = ModuleInstance;

    fn deref(&self) -> &ModuleInstance {
        self.instance
    }
}

impl DerefMut for ResetGuard<'_> {
    fn deref_mut(&mut self) -> &mut ModuleInstance {
        self.instance
    }
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.instance.reset() {
            tracing::error!(
                module = self.instance.label(),
                generation = self.instance.generation(),
                error = %err,
                "Module reset failed"
            );
        }
    }
}

/// Runs single parse invocations against a started instance.
#[derive(Debug, Clone, Copy)]
pub struct InvocationDriver {
    mode: ParseMode,
    path_region_bytes: u32,
}

impl Default for InvocationDriver {
    fn default() -> Self {
        Self::new(ParseMode::METADATA_ONLY, DEFAULT_PATH_REGION_BYTES)
    }
}

impl InvocationDriver {
    #[must_use]
    pub fn new(mode: ParseMode, path_region_bytes: u32) -> Self {
        Self {
            mode,
            path_region_bytes,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Parse one input and decode the module's JSON output.
    ///
    /// The instance is reset exactly once before this returns, whatever the
    /// outcome, so the returned output never borrows module memory.
    ///
    /// # Errors
    ///
    /// Returns the per-file [`InvocationError`] of the first failing step.
    pub fn invoke(
        &self,
        instance: &mut ModuleInstance,
        input: InputDescriptor<'_>,
    ) -> Result<ReplayOutput, InvocationError> {
        let mut guard = ResetGuard::new(instance);
        self.invoke_once(&mut guard, input)
    }

    fn invoke_once(
        &self,
        instance: &mut ModuleInstance,
        input: InputDescriptor<'_>,
    ) -> Result<ReplayOutput, InvocationError> {
        let output_len = match (instance.protocol(), input) {
            (CallProtocol::Path, InputDescriptor::Path(path)) => self.parse_path(instance, path)?,
            (CallProtocol::Buffer, InputDescriptor::Bytes(bytes)) => {
                self.parse_buffer(instance, bytes)?
            }
            (protocol, _) => return Err(InvocationError::ProtocolMismatch { protocol }),
        };
        if output_len == 0 {
            return Err(InvocationError::ParseFailed);
        }

        let offset = instance.output_offset()?;
        if offset == 0 {
            return Err(InvocationError::OutputUnavailable);
        }

        let output = instance.region_at(offset, output_len);
        let bytes = instance.read_region(&output)?;
        tracing::trace!(offset, len = output_len, "Read parser output");
        ReplayOutput::decode(&bytes)
    }

    fn parse_path(
        &self,
        instance: &mut ModuleInstance,
        path: &str,
    ) -> Result<u32, InvocationError> {
        let too_long = || InvocationError::PathTooLong {
            len: path.len(),
            capacity: self.path_region_bytes,
        };
        let len = u32::try_from(path.len()).map_err(|_| too_long())?;
        if len > self.path_region_bytes {
            return Err(too_long());
        }

        instance.write_bytes(0, path.as_bytes())?;
        let region = instance.region_at(0, len);
        instance.parse_by_path(&region, self.mode)
    }

    fn parse_buffer(
        &self,
        instance: &mut ModuleInstance,
        bytes: &[u8],
    ) -> Result<u32, InvocationError> {
        let failed = || InvocationError::AllocationFailed { size: bytes.len() };
        let size = u32::try_from(bytes.len()).map_err(|_| failed())?;

        let region = instance.alloc(size)?.ok_or_else(failed)?;
        instance.write_region(&region, bytes)?;
        tracing::trace!(offset = region.offset, len = size, "Wrote input buffer");
        instance.parse_from_memory(&region, self.mode)
    }
}
